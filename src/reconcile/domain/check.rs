//! CI check reports and their reduction into a go/no-go decision.

use super::{CommitSha, ParseCheckStateError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Execution status reported for a check run or check suite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    /// Waiting in a queue.
    Queued,
    /// Currently executing.
    InProgress,
    /// Finished; a conclusion is available.
    Completed,
    /// Waiting for a deployment protection rule.
    Waiting,
    /// Requested but not yet queued.
    Requested,
    /// Pending for another reason.
    Pending,
}

impl CheckStatus {
    /// Returns `true` for the only terminal status.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Returns the canonical lowercase representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Waiting => "waiting",
            Self::Requested => "requested",
            Self::Pending => "pending",
        }
    }
}

impl FromStr for CheckStatus {
    type Err = ParseCheckStateError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "queued" => Ok(Self::Queued),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "waiting" => Ok(Self::Waiting),
            "requested" => Ok(Self::Requested),
            "pending" => Ok(Self::Pending),
            other => Err(ParseCheckStateError(other.to_owned())),
        }
    }
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final outcome of a completed check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckConclusion {
    /// The check passed.
    Success,
    /// The check finished without a verdict.
    Neutral,
    /// The check was explicitly skipped.
    Skipped,
    /// The check failed.
    Failure,
    /// The check was cancelled.
    Cancelled,
    /// The check exceeded its time limit.
    TimedOut,
    /// The check needs manual action.
    ActionRequired,
    /// The check became stale.
    Stale,
    /// The check could not start.
    StartupFailure,
}

impl CheckConclusion {
    /// Returns `true` for conclusions that do not block reconciliation.
    #[must_use]
    pub const fn is_accepted(self) -> bool {
        matches!(self, Self::Success | Self::Neutral | Self::Skipped)
    }

    /// Returns the canonical lowercase representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Neutral => "neutral",
            Self::Skipped => "skipped",
            Self::Failure => "failure",
            Self::Cancelled => "cancelled",
            Self::TimedOut => "timed_out",
            Self::ActionRequired => "action_required",
            Self::Stale => "stale",
            Self::StartupFailure => "startup_failure",
        }
    }
}

impl FromStr for CheckConclusion {
    type Err = ParseCheckStateError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "success" => Ok(Self::Success),
            "neutral" => Ok(Self::Neutral),
            "skipped" => Ok(Self::Skipped),
            "failure" => Ok(Self::Failure),
            "cancelled" => Ok(Self::Cancelled),
            "timed_out" => Ok(Self::TimedOut),
            "action_required" => Ok(Self::ActionRequired),
            "stale" => Ok(Self::Stale),
            "startup_failure" => Ok(Self::StartupFailure),
            other => Err(ParseCheckStateError(other.to_owned())),
        }
    }
}

impl fmt::Display for CheckConclusion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which hosting query feeds readiness evaluation for a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckSource {
    /// Individual check runs attached to the branch head.
    #[default]
    CheckRuns,
    /// Check suites attached to the branch head.
    CheckSuites,
}

/// One CI report attached to a commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckReport {
    name: String,
    status: CheckStatus,
    conclusion: Option<CheckConclusion>,
    head_sha: CommitSha,
}

impl CheckReport {
    /// Creates a check report.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        status: CheckStatus,
        conclusion: Option<CheckConclusion>,
        head_sha: CommitSha,
    ) -> Self {
        Self {
            name: name.into(),
            status,
            conclusion,
            head_sha,
        }
    }

    /// Creates a completed report with the given conclusion.
    #[must_use]
    pub fn completed(
        name: impl Into<String>,
        conclusion: CheckConclusion,
        head_sha: CommitSha,
    ) -> Self {
        Self::new(name, CheckStatus::Completed, Some(conclusion), head_sha)
    }

    /// Returns the check name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the execution status.
    #[must_use]
    pub const fn status(&self) -> CheckStatus {
        self.status
    }

    /// Returns the conclusion, if the check has one.
    #[must_use]
    pub const fn conclusion(&self) -> Option<CheckConclusion> {
        self.conclusion
    }

    /// Returns the commit the check ran against.
    #[must_use]
    pub const fn head_sha(&self) -> &CommitSha {
        &self.head_sha
    }

    /// Returns `true` when the check is terminal with an accepted conclusion.
    #[must_use]
    pub fn passed(&self) -> bool {
        self.status.is_terminal() && self.conclusion.is_some_and(CheckConclusion::is_accepted)
    }
}

/// Reduction of all check reports for one branch head.
///
/// `ready` holds only when every report is terminal with an accepted
/// conclusion and all reports agree on the head commit. `head_sha` carries
/// the last commit seen while scanning, even when not ready.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckAggregate {
    ready: bool,
    head_sha: Option<CommitSha>,
}

impl CheckAggregate {
    /// Reduces a set of check reports.
    ///
    /// An empty set is not ready and carries no head commit: CI has not
    /// reported yet.
    #[must_use]
    pub fn from_reports(reports: &[CheckReport]) -> Self {
        let Some(first) = reports.first() else {
            return Self::pending();
        };

        let mut ready = true;
        let mut head_sha = first.head_sha();
        for report in reports {
            if !report.passed() || report.head_sha() != head_sha {
                ready = false;
            }
            head_sha = report.head_sha();
        }

        Self {
            ready,
            head_sha: Some(head_sha.clone()),
        }
    }

    /// Returns the aggregate for a branch with no reports.
    #[must_use]
    pub const fn pending() -> Self {
        Self {
            ready: false,
            head_sha: None,
        }
    }

    /// Returns `true` when reconciliation may proceed.
    #[must_use]
    pub const fn is_ready(&self) -> bool {
        self.ready
    }

    /// Returns the head commit carried by the reports.
    #[must_use]
    pub const fn head_sha(&self) -> Option<&CommitSha> {
        self.head_sha.as_ref()
    }

    /// Returns the commit to reconcile against, if any.
    ///
    /// When the trigger carried an expected head, the aggregate must match it
    /// exactly; a mismatch means a newer head is still being checked.
    #[must_use]
    pub fn accepted_head(&self, expected: Option<&CommitSha>) -> Option<&CommitSha> {
        if !self.ready {
            return None;
        }
        let head = self.head_sha.as_ref()?;
        match expected {
            Some(expected_sha) if expected_sha != head => None,
            _ => Some(head),
        }
    }
}

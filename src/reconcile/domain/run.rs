//! Reconciliation run phases, outcomes and reports.

use super::{
    BranchName, CommitSha, EventKind, PullRequestNumber, ReconcileDomainError, RepositoryFullName,
    RetirementReport, RunId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Phase of a single reconciliation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    /// Trigger accepted, nothing done yet.
    Idle,
    /// Resolving the installation and aggregating checks.
    Evaluating,
    /// Retiring obsolete pull requests.
    Cleaning,
    /// Creating the branch and mutating a working copy.
    Mutating,
    /// Committing, pushing and opening the pull request.
    Proposing,
    /// The run finished, with or without a proposal.
    Done,
    /// Preconditions were not met.
    Skipped,
    /// A step failed.
    Failed,
}

impl RunPhase {
    /// Returns the canonical representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Evaluating => "evaluating",
            Self::Cleaning => "cleaning",
            Self::Mutating => "mutating",
            Self::Proposing => "proposing",
            Self::Done => "done",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
        }
    }

    /// Returns `true` when no further transition is possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Skipped | Self::Failed)
    }

    /// Returns `true` when moving from `self` to `next` follows the run
    /// state machine.
    ///
    /// Any non-terminal phase may fail; a clean working copy ends the run
    /// from `Mutating` without proposing.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        if self.is_terminal() {
            return false;
        }
        matches!(
            (self, next),
            (_, Self::Failed)
                | (Self::Idle, Self::Evaluating)
                | (Self::Evaluating, Self::Cleaning | Self::Skipped)
                | (Self::Cleaning, Self::Mutating)
                | (Self::Mutating, Self::Proposing | Self::Done)
                | (Self::Proposing, Self::Done)
        )
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered record of the phases a run passed through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseLog {
    phases: Vec<RunPhase>,
}

impl PhaseLog {
    /// Starts a log in [`RunPhase::Idle`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            phases: vec![RunPhase::Idle],
        }
    }

    /// Returns the current phase.
    #[must_use]
    pub fn current(&self) -> RunPhase {
        self.phases.last().copied().unwrap_or(RunPhase::Idle)
    }

    /// Moves to `next`.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileDomainError::InvalidPhaseTransition`] when the
    /// state machine forbids the move.
    pub fn advance(&mut self, next: RunPhase) -> Result<(), ReconcileDomainError> {
        let current = self.current();
        if !current.can_transition_to(next) {
            return Err(ReconcileDomainError::InvalidPhaseTransition {
                from: current.as_str().to_owned(),
                to: next.as_str().to_owned(),
            });
        }
        self.phases.push(next);
        Ok(())
    }

    /// Returns every phase visited, starting with `Idle`.
    #[must_use]
    pub fn phases(&self) -> &[RunPhase] {
        &self.phases
    }

    /// Consumes the log and returns the visited phases.
    #[must_use]
    pub fn into_phases(self) -> Vec<RunPhase> {
        self.phases
    }
}

impl Default for PhaseLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Why a run was skipped without touching the manifest repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Checks are missing, still running, or not all accepted.
    ChecksNotReady,
    /// Checks pass, but for a different head than the trigger reported.
    StaleHead {
        /// Head commit the trigger was raised for.
        expected: CommitSha,
        /// Head commit the checks reported.
        actual: CommitSha,
    },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ChecksNotReady => f.write_str("checks not ready"),
            Self::StaleHead { expected, actual } => {
                write!(f, "stale head: expected {expected}, checks report {actual}")
            }
        }
    }
}

/// Outcome of a run that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The event did not concern the target branch.
    Ignored,
    /// Preconditions were not met.
    Skipped(SkipReason),
    /// The mutation left the manifests unchanged; no commit, push or pull
    /// request was made.
    NoChange {
        /// Branch created for the attempt.
        branch: BranchName,
        /// Retirement pass that preceded the mutation.
        retirement: RetirementReport,
    },
    /// A pull request was opened.
    Proposed {
        /// Proposal branch.
        branch: BranchName,
        /// Opened pull request.
        pull_request: PullRequestNumber,
        /// Retirement pass that preceded the mutation.
        retirement: RetirementReport,
    },
}

impl RunOutcome {
    /// Returns a short label for logs.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Ignored => "ignored",
            Self::Skipped(_) => "skipped",
            Self::NoChange { .. } => "no_change",
            Self::Proposed { .. } => "proposed",
        }
    }
}

/// Summary of one completed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// Correlation identifier.
    pub run_id: RunId,
    /// Target repository.
    pub target: RepositoryFullName,
    /// Event kind that started the run.
    pub trigger: EventKind,
    /// Phases visited, in order.
    pub phases: Vec<RunPhase>,
    /// Final outcome.
    pub outcome: RunOutcome,
    /// Start timestamp.
    pub started_at: DateTime<Utc>,
    /// End timestamp.
    pub finished_at: DateTime<Utc>,
}

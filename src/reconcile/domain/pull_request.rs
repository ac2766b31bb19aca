//! Pull-request views exchanged with the hosting platform and retirement
//! bookkeeping.

use super::{BranchName, PullRequestNumber};
use serde::{Deserialize, Serialize};
use std::fmt;

/// An open pull request as listed by the hosting platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenPullRequest {
    /// Pull-request number.
    pub number: PullRequestNumber,
    /// Source branch name.
    pub head_ref: String,
}

impl OpenPullRequest {
    /// Creates an open pull-request view.
    #[must_use]
    pub fn new(number: PullRequestNumber, head_ref: impl Into<String>) -> Self {
        Self {
            number,
            head_ref: head_ref.into(),
        }
    }
}

/// Request to open a pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPullRequest {
    /// Pull-request title.
    pub title: String,
    /// Source branch.
    pub head: BranchName,
    /// Destination branch.
    pub base: BranchName,
    /// Optional description.
    pub body: Option<String>,
    /// Whether maintainers of the base repository may push to the head.
    pub maintainer_can_modify: bool,
}

impl NewPullRequest {
    /// Creates a maintainer-editable pull-request request with no body.
    #[must_use]
    pub fn new(title: impl Into<String>, head: BranchName, base: BranchName) -> Self {
        Self {
            title: title.into(),
            head,
            base,
            body: None,
            maintainer_can_modify: true,
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }
}

/// Step of a single retirement that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetirementStep {
    /// Closing the pull request.
    Close,
    /// Deleting the source branch.
    DeleteBranch,
}

impl fmt::Display for RetirementStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Close => "close",
            Self::DeleteBranch => "delete_branch",
        })
    }
}

/// One failed retirement step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetirementFailure {
    /// Pull request being retired.
    pub number: PullRequestNumber,
    /// Step that failed.
    pub step: RetirementStep,
    /// Rendered cause.
    pub message: String,
}

/// Result of one retirement pass.
///
/// Every pull request under the prefix is attempted exactly once, whatever
/// happens to the others.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetirementReport {
    attempted: Vec<PullRequestNumber>,
    failures: Vec<RetirementFailure>,
    untouched: usize,
}

impl RetirementReport {
    /// Creates an empty report.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            attempted: Vec::new(),
            failures: Vec::new(),
            untouched: 0,
        }
    }

    /// Records a pull request that did not match the prefix.
    pub const fn record_untouched(&mut self) {
        self.untouched += 1;
    }

    /// Records the outcome of one attempted retirement.
    pub fn record_attempt(&mut self, number: PullRequestNumber, failures: Vec<RetirementFailure>) {
        self.attempted.push(number);
        self.failures.extend(failures);
    }

    /// Returns the pull requests a close/delete was attempted for.
    #[must_use]
    pub fn attempted(&self) -> &[PullRequestNumber] {
        &self.attempted
    }

    /// Returns the pull requests whose close and delete both succeeded.
    #[must_use]
    pub fn retired(&self) -> Vec<PullRequestNumber> {
        self.attempted
            .iter()
            .copied()
            .filter(|number| !self.failures.iter().any(|failure| failure.number == *number))
            .collect()
    }

    /// Returns the failed steps.
    #[must_use]
    pub fn failures(&self) -> &[RetirementFailure] {
        &self.failures
    }

    /// Returns how many open pull requests belonged to other actors.
    #[must_use]
    pub const fn untouched(&self) -> usize {
        self.untouched
    }
}

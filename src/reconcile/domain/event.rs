//! Typed inbound events that can trigger a reconciliation run.

use super::{BranchName, CommitSha, InstallationId, RepositoryFullName};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of inbound event, used for routing and log correlation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A push to a branch.
    Push,
    /// A check suite finished on a commit.
    CheckSuite,
    /// A branch or tag was created.
    BranchCreated,
}

impl EventKind {
    /// Returns the canonical representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Push => "push",
            Self::CheckSuite => "check_suite",
            Self::BranchCreated => "branch_created",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A push to some ref of a repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushEvent {
    /// Repository that received the push.
    pub repository: RepositoryFullName,
    /// Fully qualified ref that was pushed (e.g. `refs/heads/main`).
    pub git_ref: String,
    /// Installation that delivered the event, if reported.
    pub installation: Option<InstallationId>,
}

/// Completion of a check suite for one commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckSuiteCompletedEvent {
    /// Repository the suite belongs to.
    pub repository: RepositoryFullName,
    /// Branch the suite ran for, if the platform reported one.
    pub head_branch: Option<String>,
    /// Commit the suite ran against.
    pub head_sha: CommitSha,
    /// Installation that delivered the event, if reported.
    pub installation: Option<InstallationId>,
}

/// Creation of a branch or tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchCreatedEvent {
    /// Repository the ref was created in.
    pub repository: RepositoryFullName,
    /// Ref namespace reported by the platform (`branch` or `tag`).
    pub ref_type: String,
    /// Short ref name (e.g. `main`).
    pub git_ref: String,
    /// Installation that delivered the event, if reported.
    pub installation: Option<InstallationId>,
}

/// Inbound event routed through the target registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WebhookEvent {
    /// See [`PushEvent`].
    Push(PushEvent),
    /// See [`CheckSuiteCompletedEvent`].
    CheckSuite(CheckSuiteCompletedEvent),
    /// See [`BranchCreatedEvent`].
    BranchCreated(BranchCreatedEvent),
}

impl WebhookEvent {
    /// Returns the event kind.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::Push(_) => EventKind::Push,
            Self::CheckSuite(_) => EventKind::CheckSuite,
            Self::BranchCreated(_) => EventKind::BranchCreated,
        }
    }

    /// Returns the repository the event concerns.
    #[must_use]
    pub const fn repository(&self) -> &RepositoryFullName {
        match self {
            Self::Push(event) => &event.repository,
            Self::CheckSuite(event) => &event.repository,
            Self::BranchCreated(event) => &event.repository,
        }
    }
}

/// What a run needs to know about the event that started it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunTrigger {
    kind: EventKind,
    expected_head: Option<CommitSha>,
    installation: Option<InstallationId>,
}

impl RunTrigger {
    /// Creates a trigger with no expected head.
    #[must_use]
    pub const fn new(kind: EventKind, installation: Option<InstallationId>) -> Self {
        Self {
            kind,
            expected_head: None,
            installation,
        }
    }

    /// Requires the aggregated head commit to equal `sha`.
    #[must_use]
    pub fn with_expected_head(mut self, sha: CommitSha) -> Self {
        self.expected_head = Some(sha);
        self
    }

    /// Returns the triggering event kind.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        self.kind
    }

    /// Returns the head commit the trigger was raised for, if any.
    #[must_use]
    pub const fn expected_head(&self) -> Option<&CommitSha> {
        self.expected_head.as_ref()
    }

    /// Returns the installation reported with the event, if any.
    #[must_use]
    pub const fn installation(&self) -> Option<InstallationId> {
        self.installation
    }
}

impl PushEvent {
    /// Returns a trigger when the push updated `target_branch`.
    #[must_use]
    pub fn trigger_for(&self, target_branch: &BranchName) -> Option<RunTrigger> {
        (self.git_ref == target_branch.qualified())
            .then(|| RunTrigger::new(EventKind::Push, self.installation))
    }
}

impl CheckSuiteCompletedEvent {
    /// Returns a trigger pinned to the suite's head when the suite ran for
    /// `target_branch`.
    #[must_use]
    pub fn trigger_for(&self, target_branch: &BranchName) -> Option<RunTrigger> {
        (self.head_branch.as_deref() == Some(target_branch.as_str())).then(|| {
            RunTrigger::new(EventKind::CheckSuite, self.installation)
                .with_expected_head(self.head_sha.clone())
        })
    }
}

impl BranchCreatedEvent {
    /// Returns a trigger when the created ref is the branch `target_branch`.
    #[must_use]
    pub fn trigger_for(&self, target_branch: &BranchName) -> Option<RunTrigger> {
        (self.ref_type == "branch" && self.git_ref == target_branch.as_str())
            .then(|| RunTrigger::new(EventKind::BranchCreated, self.installation))
    }
}

//! Domain model for manifest reconciliation.
//!
//! The domain covers CI check aggregation, managed targets, deterministic
//! proposal naming and the run state machine. Everything here is pure: the
//! hosting platform, working copies and the manifest editing tool stay
//! behind the ports.

mod branch;
mod check;
mod error;
mod event;
mod ids;
mod intent;
mod pull_request;
mod run;
mod target;

pub use branch::{BranchName, BranchPrefix};
pub use check::{CheckAggregate, CheckConclusion, CheckReport, CheckSource, CheckStatus};
pub use error::{ParseCheckStateError, ReconcileDomainError};
pub use event::{
    BranchCreatedEvent, CheckSuiteCompletedEvent, EventKind, PushEvent, RunTrigger, WebhookEvent,
};
pub use ids::{
    CommitSha, InstallationId, PullRequestNumber, RepositoryFullName, RunId, SHORT_SHA_LEN,
    ShortSha,
};
pub use intent::{ImageEdit, PullRequestIntent};
pub use pull_request::{
    NewPullRequest, OpenPullRequest, RetirementFailure, RetirementReport, RetirementStep,
};
pub use run::{PhaseLog, RunOutcome, RunPhase, RunReport, SkipReason};
pub use target::{
    CommitIdentity, DEFAULT_COMMIT_MESSAGE_TEMPLATE, DEFAULT_TAG_TEMPLATE, ImageName, ImageUpdate,
    ManagedTarget,
};

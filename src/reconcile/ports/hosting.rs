//! Hosting-platform port: checks, refs and pull requests.

use crate::reconcile::domain::{
    BranchName, CheckReport, CommitSha, NewPullRequest, OpenPullRequest, PullRequestNumber,
    RepositoryFullName,
};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Result type for hosting-platform operations.
pub type HostingResult<T> = Result<T, HostingError>;

/// Remote operations the reconciler performs against the hosting platform.
///
/// Every call is a fallible remote call; implementations do not retry.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HostingClient: Send + Sync {
    /// Lists check runs attached to the head of `branch`.
    async fn list_check_runs(
        &self,
        repository: &RepositoryFullName,
        branch: &BranchName,
    ) -> HostingResult<Vec<CheckReport>>;

    /// Lists check suites attached to the head of `branch`.
    async fn list_check_suites(
        &self,
        repository: &RepositoryFullName,
        branch: &BranchName,
    ) -> HostingResult<Vec<CheckReport>>;

    /// Returns the commit `branch` currently points at.
    ///
    /// # Errors
    ///
    /// Returns [`HostingError::NotFound`] when the branch does not exist.
    async fn branch_tip(
        &self,
        repository: &RepositoryFullName,
        branch: &BranchName,
    ) -> HostingResult<CommitSha>;

    /// Creates `branch` pointing at `sha`.
    ///
    /// # Errors
    ///
    /// Returns [`HostingError::RefAlreadyExists`] when the branch exists.
    async fn create_branch(
        &self,
        repository: &RepositoryFullName,
        branch: &BranchName,
        sha: &CommitSha,
    ) -> HostingResult<()>;

    /// Deletes a branch by its short name.
    async fn delete_branch(&self, repository: &RepositoryFullName, branch: &str)
    -> HostingResult<()>;

    /// Lists open pull requests.
    async fn list_open_pull_requests(
        &self,
        repository: &RepositoryFullName,
    ) -> HostingResult<Vec<OpenPullRequest>>;

    /// Marks a pull request closed.
    async fn close_pull_request(
        &self,
        repository: &RepositoryFullName,
        number: PullRequestNumber,
    ) -> HostingResult<()>;

    /// Opens a pull request and returns its number.
    async fn create_pull_request(
        &self,
        repository: &RepositoryFullName,
        request: &NewPullRequest,
    ) -> HostingResult<PullRequestNumber>;
}

/// Errors returned by hosting-platform adapters.
#[derive(Debug, Clone, Error)]
pub enum HostingError {
    /// The ref to create already exists.
    #[error("ref refs/heads/{branch} already exists in {repository}")]
    RefAlreadyExists {
        /// Repository the ref was created in.
        repository: RepositoryFullName,
        /// Branch name.
        branch: String,
    },

    /// The addressed resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The platform rejected the request.
    #[error("hosting platform rejected request with status {status}: {message}")]
    Rejected {
        /// HTTP-like status code.
        status: u16,
        /// Message reported by the platform.
        message: String,
    },

    /// The response could not be decoded.
    #[error("unexpected hosting response: {0}")]
    Decode(String),

    /// Network or transport failure.
    #[error("hosting transport error: {0}")]
    Transport(Arc<dyn std::error::Error + Send + Sync>),
}

impl HostingError {
    /// Wraps a transport error.
    pub fn transport(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Transport(Arc::new(err))
    }
}

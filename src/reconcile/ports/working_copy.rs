//! Working-copy port: clone, branch, commit and push.

use super::InstallationToken;
use crate::reconcile::domain::{BranchName, CommitIdentity, RepositoryFullName};
use async_trait::async_trait;
use camino::Utf8Path;
use std::sync::Arc;
use thiserror::Error;

/// Result type for working-copy operations.
pub type WorkingCopyResult<T> = Result<T, WorkingCopyError>;

/// Remote repository and the credentials used to reach it.
#[derive(Debug, Clone)]
pub struct RemoteSpec {
    /// Repository to clone.
    pub repository: RepositoryFullName,
    /// Installation token embedded in the remote URL.
    pub token: InstallationToken,
}

/// Clones disposable working copies.
#[async_trait]
pub trait WorkingCopyProvider: Send + Sync {
    /// Clones `base` of `remote` into a fresh, exclusively owned directory.
    ///
    /// The directory is removed when the returned working copy is dropped,
    /// on every exit path.
    async fn clone_branch(
        &self,
        remote: &RemoteSpec,
        base: &BranchName,
    ) -> WorkingCopyResult<Box<dyn WorkingCopy>>;
}

/// A checked-out working copy owned by one run.
#[async_trait]
pub trait WorkingCopy: Send + Sync {
    /// Returns the working-copy root.
    fn root(&self) -> &Utf8Path;

    /// Creates or resets the local branch `branch` at the current commit and
    /// checks it out.
    async fn checkout_new_branch(&mut self, branch: &BranchName) -> WorkingCopyResult<()>;

    /// Returns `true` when no tracked or untracked file differs from `HEAD`.
    async fn is_clean(&self) -> WorkingCopyResult<bool>;

    /// Stages everything and commits with `identity` as author and
    /// committer.
    async fn commit_all(
        &mut self,
        message: &str,
        identity: &CommitIdentity,
    ) -> WorkingCopyResult<()>;

    /// Force-pushes the branch created by [`Self::checkout_new_branch`] to
    /// its remote namesake. No other remote ref is touched.
    async fn push_branch(&mut self) -> WorkingCopyResult<()>;
}

/// Errors returned by working-copy adapters.
#[derive(Debug, Clone, Error)]
pub enum WorkingCopyError {
    /// A version-control command exited unsuccessfully.
    #[error("{operation} failed: {output}")]
    CommandFailed {
        /// Operation that failed (e.g. `clone`, `push`).
        operation: &'static str,
        /// Captured, credential-free diagnostic output.
        output: String,
    },

    /// Push requested before any branch was checked out.
    #[error("no branch checked out to push")]
    NoBranch,

    /// Filesystem failure while preparing or inspecting the working copy.
    #[error("working copy I/O error: {0}")]
    Io(Arc<dyn std::error::Error + Send + Sync>),
}

impl WorkingCopyError {
    /// Wraps an I/O error.
    pub fn io(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Io(Arc::new(err))
    }
}

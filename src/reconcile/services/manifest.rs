//! Manifest sessions: obsolete-proposal retirement and the change protocol.

use crate::reconcile::{
    domain::{
        BranchName, BranchPrefix, CommitIdentity, CommitSha, InstallationId, NewPullRequest,
        OpenPullRequest, PullRequestIntent, PullRequestNumber, RepositoryFullName,
        RetirementFailure, RetirementReport, RetirementStep,
    },
    ports::{
        AuthError, HostingClient, HostingError, HostingResult, InstallationAuth,
        ManifestMutation, MutationError, RemoteSpec, WorkingCopy, WorkingCopyError,
        WorkingCopyProvider,
    },
};
use futures::future::join_all;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::OnceCell;

/// Where proposals land and who authors them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestCoordinates {
    repository: RepositoryFullName,
    base_branch: BranchName,
    committer: CommitIdentity,
}

impl ManifestCoordinates {
    /// Creates manifest coordinates.
    #[must_use]
    pub const fn new(
        repository: RepositoryFullName,
        base_branch: BranchName,
        committer: CommitIdentity,
    ) -> Self {
        Self {
            repository,
            base_branch,
            committer,
        }
    }

    /// Returns the manifest repository.
    #[must_use]
    pub const fn repository(&self) -> &RepositoryFullName {
        &self.repository
    }

    /// Returns the branch proposals are based on and merged into.
    #[must_use]
    pub const fn base_branch(&self) -> &BranchName {
        &self.base_branch
    }

    /// Returns the default commit identity.
    #[must_use]
    pub const fn committer(&self) -> &CommitIdentity {
        &self.committer
    }
}

/// Errors returned by the change protocol, one variant per step.
#[derive(Debug, Clone, Error)]
pub enum ManifestChangeError {
    /// The base branch tip could not be resolved.
    #[error("failed to resolve base branch tip: {0}")]
    BaseTip(#[source] HostingError),

    /// The proposal branch could not be created.
    #[error("failed to create branch: {0}")]
    CreateBranch(#[source] HostingError),

    /// The working copy could not be cloned.
    #[error("failed to clone manifest repository for {branch}: {source}")]
    Clone {
        /// Proposal branch already created remotely.
        branch: BranchName,
        /// Underlying failure.
        source: WorkingCopyError,
    },

    /// The local branch could not be checked out.
    #[error("failed to check out {branch}: {source}")]
    Checkout {
        /// Proposal branch already created remotely.
        branch: BranchName,
        /// Underlying failure.
        source: WorkingCopyError,
    },

    /// The mutation failed.
    #[error("failed to mutate manifests for {branch}: {source}")]
    Mutation {
        /// Proposal branch already created remotely.
        branch: BranchName,
        /// Underlying failure.
        source: MutationError,
    },

    /// The working-copy status could not be read.
    #[error("failed to inspect working copy for {branch}: {source}")]
    Status {
        /// Proposal branch already created remotely.
        branch: BranchName,
        /// Underlying failure.
        source: WorkingCopyError,
    },

    /// The commit failed.
    #[error("failed to commit {branch}: {source}")]
    Commit {
        /// Proposal branch already created remotely.
        branch: BranchName,
        /// Underlying failure.
        source: WorkingCopyError,
    },

    /// The push failed.
    #[error("failed to push {branch}: {source}")]
    Push {
        /// Proposal branch already created remotely.
        branch: BranchName,
        /// Underlying failure.
        source: WorkingCopyError,
    },

    /// The pull request could not be opened.
    #[error("failed to open pull request for {branch}: {source}")]
    OpenPullRequest {
        /// Proposal branch already pushed.
        branch: BranchName,
        /// Underlying failure.
        source: HostingError,
    },
}

impl ManifestChangeError {
    /// Returns `true` when the proposal branch exists remotely without a
    /// pull request.
    ///
    /// Nothing is rolled back; the stranded branch stays until removed by hand.
    #[must_use]
    pub const fn is_partial(&self) -> bool {
        self.stranded_branch().is_some()
    }

    /// Returns the branch left behind by a partial change.
    #[must_use]
    pub const fn stranded_branch(&self) -> Option<&BranchName> {
        match self {
            Self::BaseTip(_) | Self::CreateBranch(_) => None,
            Self::Clone { branch, .. }
            | Self::Checkout { branch, .. }
            | Self::Mutation { branch, .. }
            | Self::Status { branch, .. }
            | Self::Commit { branch, .. }
            | Self::Push { branch, .. }
            | Self::OpenPullRequest { branch, .. } => Some(branch),
        }
    }

    /// Returns `true` when the branch already existed, typically because a
    /// concurrent or earlier run proposed the same head.
    #[must_use]
    pub const fn is_ref_conflict(&self) -> bool {
        matches!(
            self,
            Self::CreateBranch(HostingError::RefAlreadyExists { .. })
        )
    }
}

/// Result of the change protocol when no step failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeOutcome {
    /// The mutation left the working copy clean; nothing was committed,
    /// pushed or proposed.
    Unchanged {
        /// Branch created for the attempt.
        branch: BranchName,
    },
    /// A pull request was opened.
    Proposed {
        /// Proposal branch.
        branch: BranchName,
        /// Opened pull request.
        pull_request: PullRequestNumber,
    },
}

/// A mutated, dirty working copy waiting to be proposed.
///
/// Dropping it discards the working copy without pushing.
pub struct PreparedChange {
    branch: BranchName,
    working_copy: Box<dyn WorkingCopy>,
}

impl PreparedChange {
    /// Returns the proposal branch.
    #[must_use]
    pub const fn branch(&self) -> &BranchName {
        &self.branch
    }
}

impl std::fmt::Debug for PreparedChange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreparedChange")
            .field("branch", &self.branch)
            .field("root", &self.working_copy.root())
            .finish()
    }
}

/// One reconciliation attempt against the manifest repository.
///
/// Holds a token acquired for this attempt only and caches the base branch
/// tip so that the proposal branch and the pull-request base refer to the
/// same commit.
pub struct ManifestSession {
    coordinates: ManifestCoordinates,
    installation: InstallationId,
    remote: RemoteSpec,
    client: Arc<dyn HostingClient>,
    provider: Arc<dyn WorkingCopyProvider>,
    base_tip: OnceCell<CommitSha>,
}

impl std::fmt::Debug for ManifestSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManifestSession")
            .field("repository", &self.coordinates.repository)
            .field("installation", &self.installation)
            .field("base_tip", &self.base_tip.get())
            .finish_non_exhaustive()
    }
}

impl ManifestSession {
    /// Opens a session: discovers the manifest repository's installation and
    /// acquires a fresh token and client for it.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError`] when no installation covers the manifest
    /// repository or the token request fails.
    pub async fn open(
        auth: &dyn InstallationAuth,
        provider: Arc<dyn WorkingCopyProvider>,
        coordinates: ManifestCoordinates,
    ) -> Result<Self, AuthError> {
        let installation = auth.installation_for(&coordinates.repository).await?;
        let token = auth.token_for(installation).await?;
        let client = auth.client_for(installation).await?;
        tracing::debug!(
            repository = %coordinates.repository,
            installation = %installation,
            "opened manifest session"
        );
        Ok(Self {
            remote: RemoteSpec {
                repository: coordinates.repository.clone(),
                token,
            },
            coordinates,
            installation,
            client,
            provider,
            base_tip: OnceCell::new(),
        })
    }

    /// Returns the coordinates the session writes to.
    #[must_use]
    pub const fn coordinates(&self) -> &ManifestCoordinates {
        &self.coordinates
    }

    /// Returns the installation the session is scoped to.
    #[must_use]
    pub const fn installation(&self) -> InstallationId {
        self.installation
    }

    /// Returns the base branch tip, fetching it on first use.
    ///
    /// # Errors
    ///
    /// Returns the hosting error when the lookup fails; a failed lookup is
    /// not cached.
    pub async fn base_tip(&self) -> HostingResult<&CommitSha> {
        self.base_tip
            .get_or_try_init(|| async {
                self.client
                    .branch_tip(&self.coordinates.repository, &self.coordinates.base_branch)
                    .await
            })
            .await
    }

    /// Closes every open pull request whose head branch starts with `prefix`
    /// and deletes its branch, except the one headed by `keep`.
    ///
    /// Retirements run concurrently and independently: a failed close does
    /// not prevent the branch deletion, and one pull request's failure never
    /// affects another. Failures are logged and recorded in the report.
    ///
    /// # Errors
    ///
    /// Returns the hosting error only when open pull requests cannot be
    /// listed.
    pub async fn retire_obsolete(
        &self,
        prefix: &BranchPrefix,
        keep: Option<&BranchName>,
    ) -> HostingResult<RetirementReport> {
        let open = self
            .client
            .list_open_pull_requests(&self.coordinates.repository)
            .await?;

        let mut report = RetirementReport::new();
        let mut obsolete = Vec::new();
        for pull_request in open {
            if !prefix.marks(&pull_request.head_ref) {
                report.record_untouched();
                continue;
            }
            if keep.is_some_and(|branch| branch.as_str() == pull_request.head_ref) {
                tracing::debug!(
                    pull_request = %pull_request.number,
                    branch = %pull_request.head_ref,
                    "keeping current proposal"
                );
                continue;
            }
            obsolete.push(pull_request);
        }

        let attempts = join_all(obsolete.iter().map(|pull_request| self.retire(pull_request))).await;
        for (pull_request, failures) in obsolete.iter().zip(attempts) {
            report.record_attempt(pull_request.number, failures);
        }

        tracing::debug!(
            attempted = report.attempted().len(),
            retired = report.retired().len(),
            untouched = report.untouched(),
            "retired obsolete proposals"
        );
        Ok(report)
    }

    async fn retire(&self, pull_request: &OpenPullRequest) -> Vec<RetirementFailure> {
        let repository = &self.coordinates.repository;
        let mut failures = Vec::new();

        if let Err(err) = self
            .client
            .close_pull_request(repository, pull_request.number)
            .await
        {
            failures.push(retirement_failure(pull_request, RetirementStep::Close, &err));
        }
        if let Err(err) = self
            .client
            .delete_branch(repository, &pull_request.head_ref)
            .await
        {
            failures.push(retirement_failure(
                pull_request,
                RetirementStep::DeleteBranch,
                &err,
            ));
        }
        failures
    }

    /// Runs the whole change protocol: [`Self::prepare_change`] followed by
    /// [`Self::propose`] when the mutation changed anything.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestChangeError`] naming the failed step.
    pub async fn create_change(
        &self,
        intent: &PullRequestIntent,
        mutation: &dyn ManifestMutation,
        committer: &CommitIdentity,
    ) -> Result<ChangeOutcome, ManifestChangeError> {
        let Some(prepared) = self.prepare_change(intent, mutation).await? else {
            return Ok(ChangeOutcome::Unchanged {
                branch: intent.branch().clone(),
            });
        };
        let branch = prepared.branch().clone();
        let pull_request = self.propose(prepared, intent, committer).await?;
        Ok(ChangeOutcome::Proposed {
            branch,
            pull_request,
        })
    }

    /// Creates the proposal branch at the base tip, clones a working copy,
    /// checks the branch out and applies `mutation`.
    ///
    /// Returns `None` when the working copy is still clean afterwards; the
    /// working copy is then discarded with no commit, push or pull request.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestChangeError`] naming the failed step. An existing
    /// branch fails with [`ManifestChangeError::CreateBranch`] wrapping
    /// [`HostingError::RefAlreadyExists`].
    pub async fn prepare_change(
        &self,
        intent: &PullRequestIntent,
        mutation: &dyn ManifestMutation,
    ) -> Result<Option<PreparedChange>, ManifestChangeError> {
        let repository = &self.coordinates.repository;
        let branch = intent.branch();

        let base_tip = self.base_tip().await.map_err(ManifestChangeError::BaseTip)?;
        self.client
            .create_branch(repository, branch, base_tip)
            .await
            .map_err(ManifestChangeError::CreateBranch)?;
        tracing::debug!(branch = %branch, base = %base_tip, "created proposal branch");

        let mut working_copy = self
            .provider
            .clone_branch(&self.remote, &self.coordinates.base_branch)
            .await
            .map_err(|source| ManifestChangeError::Clone {
                branch: branch.clone(),
                source,
            })?;
        working_copy
            .checkout_new_branch(branch)
            .await
            .map_err(|source| ManifestChangeError::Checkout {
                branch: branch.clone(),
                source,
            })?;
        mutation
            .apply(working_copy.root())
            .await
            .map_err(|source| ManifestChangeError::Mutation {
                branch: branch.clone(),
                source,
            })?;

        let clean = working_copy
            .is_clean()
            .await
            .map_err(|source| ManifestChangeError::Status {
                branch: branch.clone(),
                source,
            })?;
        if clean {
            tracing::debug!(branch = %branch, "mutation left manifests unchanged");
            return Ok(None);
        }

        Ok(Some(PreparedChange {
            branch: branch.clone(),
            working_copy,
        }))
    }

    /// Commits the prepared change as `committer`, force-pushes it and opens
    /// a maintainer-editable pull request titled with the commit message.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestChangeError`] naming the failed step; every variant
    /// is partial because the branch already exists remotely.
    pub async fn propose(
        &self,
        prepared: PreparedChange,
        intent: &PullRequestIntent,
        committer: &CommitIdentity,
    ) -> Result<PullRequestNumber, ManifestChangeError> {
        let PreparedChange {
            branch,
            mut working_copy,
        } = prepared;

        if let Err(source) = working_copy
            .commit_all(intent.commit_message(), committer)
            .await
        {
            return Err(ManifestChangeError::Commit { branch, source });
        }
        if let Err(source) = working_copy.push_branch().await {
            return Err(ManifestChangeError::Push { branch, source });
        }
        drop(working_copy);

        let request = NewPullRequest::new(
            intent.commit_message(),
            branch.clone(),
            self.coordinates.base_branch.clone(),
        );
        match self
            .client
            .create_pull_request(&self.coordinates.repository, &request)
            .await
        {
            Ok(number) => {
                tracing::debug!(branch = %branch, pull_request = %number, "opened pull request");
                Ok(number)
            }
            Err(source) => Err(ManifestChangeError::OpenPullRequest { branch, source }),
        }
    }
}

fn retirement_failure(
    pull_request: &OpenPullRequest,
    step: RetirementStep,
    err: &HostingError,
) -> RetirementFailure {
    tracing::warn!(
        pull_request = %pull_request.number,
        branch = %pull_request.head_ref,
        step = %step,
        error = %err,
        "failed to retire obsolete proposal"
    );
    RetirementFailure {
        number: pull_request.number,
        step,
        message: err.to_string(),
    }
}

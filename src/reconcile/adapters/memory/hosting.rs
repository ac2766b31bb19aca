//! In-memory hosting platform for reconciliation tests and dry runs.

use crate::reconcile::{
    domain::{
        BranchName, CheckReport, CommitSha, NewPullRequest, OpenPullRequest, PullRequestNumber,
        RepositoryFullName,
    },
    ports::{HostingClient, HostingError, HostingResult},
};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock, RwLockWriteGuard};

/// Hosting operations that can be observed or made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostingOperation {
    /// [`HostingClient::list_check_runs`].
    ListCheckRuns,
    /// [`HostingClient::list_check_suites`].
    ListCheckSuites,
    /// [`HostingClient::branch_tip`].
    BranchTip,
    /// [`HostingClient::create_branch`].
    CreateBranch,
    /// [`HostingClient::delete_branch`].
    DeleteBranch,
    /// [`HostingClient::list_open_pull_requests`].
    ListPullRequests,
    /// [`HostingClient::close_pull_request`].
    ClosePullRequest,
    /// [`HostingClient::create_pull_request`].
    CreatePullRequest,
}

/// One recorded call against the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostingCall {
    /// Operation invoked.
    pub operation: HostingOperation,
    /// Repository addressed.
    pub repository: RepositoryFullName,
    /// Branch name or pull-request number the call addressed, if any.
    pub subject: Option<String>,
}

/// Stored pull request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestRecord {
    /// Pull-request number.
    pub number: PullRequestNumber,
    /// Source branch.
    pub head: String,
    /// Destination branch.
    pub base: String,
    /// Title.
    pub title: String,
    /// Whether the pull request is still open.
    pub open: bool,
    /// Whether maintainers may edit the head branch.
    pub maintainer_can_modify: bool,
}

/// Deterministic in-process stand-in for the hosting platform.
///
/// Branches, pull requests and check reports live in memory; every call is
/// recorded, and failures can be injected per operation and subject.
#[derive(Debug, Clone, Default)]
pub struct InMemoryHostingPlatform {
    state: Arc<RwLock<PlatformState>>,
}

#[derive(Debug, Default)]
struct PlatformState {
    repositories: HashMap<RepositoryFullName, RepositoryState>,
    failures: Vec<(HostingOperation, Option<String>)>,
    calls: Vec<HostingCall>,
}

#[derive(Debug, Default)]
struct RepositoryState {
    branches: BTreeMap<String, CommitSha>,
    pull_requests: BTreeMap<u64, PullRequestRecord>,
    check_runs: HashMap<String, Vec<CheckReport>>,
    check_suites: HashMap<String, Vec<CheckReport>>,
    last_pull_request: u64,
}

impl RepositoryState {
    fn next_pull_request_number(&mut self) -> HostingResult<PullRequestNumber> {
        self.last_pull_request += 1;
        PullRequestNumber::new(self.last_pull_request)
            .map_err(|err| HostingError::Decode(err.to_string()))
    }
}

impl PlatformState {
    fn record(
        &mut self,
        operation: HostingOperation,
        repository: &RepositoryFullName,
        subject: Option<String>,
    ) -> HostingResult<()> {
        let injected = self.failures.iter().any(|(failing_operation, failing_subject)| {
            *failing_operation == operation
                && (failing_subject.is_none() || *failing_subject == subject)
        });
        self.calls.push(HostingCall {
            operation,
            repository: repository.clone(),
            subject,
        });
        if injected {
            return Err(HostingError::Rejected {
                status: 500,
                message: "injected failure".to_owned(),
            });
        }
        Ok(())
    }

    fn repository(&mut self, repository: &RepositoryFullName) -> &mut RepositoryState {
        self.repositories.entry(repository.clone()).or_default()
    }
}

impl InMemoryHostingPlatform {
    /// Creates an empty platform.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn write(&self) -> HostingResult<RwLockWriteGuard<'_, PlatformState>> {
        self.state
            .write()
            .map_err(|err| HostingError::transport(std::io::Error::other(err.to_string())))
    }

    /// Points `branch` at `sha`, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns a transport error when lock acquisition fails.
    pub fn set_branch(
        &self,
        repository: &RepositoryFullName,
        branch: &BranchName,
        sha: CommitSha,
    ) -> HostingResult<()> {
        let mut state = self.write()?;
        state
            .repository(repository)
            .branches
            .insert(branch.as_str().to_owned(), sha);
        Ok(())
    }

    /// Replaces the check runs reported for `branch`.
    ///
    /// # Errors
    ///
    /// Returns a transport error when lock acquisition fails.
    pub fn set_check_runs(
        &self,
        repository: &RepositoryFullName,
        branch: &BranchName,
        reports: Vec<CheckReport>,
    ) -> HostingResult<()> {
        let mut state = self.write()?;
        state
            .repository(repository)
            .check_runs
            .insert(branch.as_str().to_owned(), reports);
        Ok(())
    }

    /// Replaces the check suites reported for `branch`.
    ///
    /// # Errors
    ///
    /// Returns a transport error when lock acquisition fails.
    pub fn set_check_suites(
        &self,
        repository: &RepositoryFullName,
        branch: &BranchName,
        reports: Vec<CheckReport>,
    ) -> HostingResult<()> {
        let mut state = self.write()?;
        state
            .repository(repository)
            .check_suites
            .insert(branch.as_str().to_owned(), reports);
        Ok(())
    }

    /// Seeds an open pull request (and its head branch) opened by some actor.
    ///
    /// # Errors
    ///
    /// Returns a transport error when lock acquisition fails.
    pub fn seed_pull_request(
        &self,
        repository: &RepositoryFullName,
        head: &str,
        base: &BranchName,
        head_sha: CommitSha,
    ) -> HostingResult<PullRequestNumber> {
        let mut state = self.write()?;
        let repo = state.repository(repository);
        repo.branches.insert(head.to_owned(), head_sha);
        let number = repo.next_pull_request_number()?;
        repo.pull_requests.insert(
            number.value(),
            PullRequestRecord {
                number,
                head: head.to_owned(),
                base: base.as_str().to_owned(),
                title: format!("Seeded change from {head}"),
                open: true,
                maintainer_can_modify: false,
            },
        );
        Ok(number)
    }

    /// Makes every call of `operation` fail, or only calls addressing
    /// `subject` (a branch name or pull-request number) when given.
    ///
    /// # Errors
    ///
    /// Returns a transport error when lock acquisition fails.
    pub fn fail(&self, operation: HostingOperation, subject: Option<&str>) -> HostingResult<()> {
        let mut state = self.write()?;
        state.failures.push((operation, subject.map(str::to_owned)));
        Ok(())
    }

    /// Returns every call recorded so far, in order.
    ///
    /// # Errors
    ///
    /// Returns a transport error when lock acquisition fails.
    pub fn calls(&self) -> HostingResult<Vec<HostingCall>> {
        Ok(self.write()?.calls.clone())
    }

    /// Returns how many calls of `operation` were recorded.
    ///
    /// # Errors
    ///
    /// Returns a transport error when lock acquisition fails.
    pub fn call_count(&self, operation: HostingOperation) -> HostingResult<usize> {
        Ok(self
            .write()?
            .calls
            .iter()
            .filter(|call| call.operation == operation)
            .count())
    }

    /// Returns every pull request of `repository`, ordered by number.
    ///
    /// # Errors
    ///
    /// Returns a transport error when lock acquisition fails.
    pub fn pull_requests(
        &self,
        repository: &RepositoryFullName,
    ) -> HostingResult<Vec<PullRequestRecord>> {
        let mut state = self.write()?;
        Ok(state
            .repository(repository)
            .pull_requests
            .values()
            .cloned()
            .collect())
    }

    /// Returns the commit `branch` points at, if it exists.
    ///
    /// # Errors
    ///
    /// Returns a transport error when lock acquisition fails.
    pub fn branch(
        &self,
        repository: &RepositoryFullName,
        branch: &str,
    ) -> HostingResult<Option<CommitSha>> {
        let mut state = self.write()?;
        Ok(state.repository(repository).branches.get(branch).cloned())
    }
}

#[async_trait]
impl HostingClient for InMemoryHostingPlatform {
    async fn list_check_runs(
        &self,
        repository: &RepositoryFullName,
        branch: &BranchName,
    ) -> HostingResult<Vec<CheckReport>> {
        let mut state = self.write()?;
        state.record(
            HostingOperation::ListCheckRuns,
            repository,
            Some(branch.as_str().to_owned()),
        )?;
        Ok(state
            .repository(repository)
            .check_runs
            .get(branch.as_str())
            .cloned()
            .unwrap_or_default())
    }

    async fn list_check_suites(
        &self,
        repository: &RepositoryFullName,
        branch: &BranchName,
    ) -> HostingResult<Vec<CheckReport>> {
        let mut state = self.write()?;
        state.record(
            HostingOperation::ListCheckSuites,
            repository,
            Some(branch.as_str().to_owned()),
        )?;
        Ok(state
            .repository(repository)
            .check_suites
            .get(branch.as_str())
            .cloned()
            .unwrap_or_default())
    }

    async fn branch_tip(
        &self,
        repository: &RepositoryFullName,
        branch: &BranchName,
    ) -> HostingResult<CommitSha> {
        let mut state = self.write()?;
        state.record(
            HostingOperation::BranchTip,
            repository,
            Some(branch.as_str().to_owned()),
        )?;
        state
            .repository(repository)
            .branches
            .get(branch.as_str())
            .cloned()
            .ok_or_else(|| HostingError::NotFound(format!("{repository}@{branch}")))
    }

    async fn create_branch(
        &self,
        repository: &RepositoryFullName,
        branch: &BranchName,
        sha: &CommitSha,
    ) -> HostingResult<()> {
        let mut state = self.write()?;
        state.record(
            HostingOperation::CreateBranch,
            repository,
            Some(branch.as_str().to_owned()),
        )?;
        let repo = state.repository(repository);
        if repo.branches.contains_key(branch.as_str()) {
            return Err(HostingError::RefAlreadyExists {
                repository: repository.clone(),
                branch: branch.as_str().to_owned(),
            });
        }
        repo.branches.insert(branch.as_str().to_owned(), sha.clone());
        Ok(())
    }

    async fn delete_branch(
        &self,
        repository: &RepositoryFullName,
        branch: &str,
    ) -> HostingResult<()> {
        let mut state = self.write()?;
        state.record(
            HostingOperation::DeleteBranch,
            repository,
            Some(branch.to_owned()),
        )?;
        state
            .repository(repository)
            .branches
            .remove(branch)
            .map(|_| ())
            .ok_or_else(|| HostingError::NotFound(format!("{repository}@{branch}")))
    }

    async fn list_open_pull_requests(
        &self,
        repository: &RepositoryFullName,
    ) -> HostingResult<Vec<OpenPullRequest>> {
        let mut state = self.write()?;
        state.record(HostingOperation::ListPullRequests, repository, None)?;
        Ok(state
            .repository(repository)
            .pull_requests
            .values()
            .filter(|pull_request| pull_request.open)
            .map(|pull_request| OpenPullRequest::new(pull_request.number, pull_request.head.clone()))
            .collect())
    }

    async fn close_pull_request(
        &self,
        repository: &RepositoryFullName,
        number: PullRequestNumber,
    ) -> HostingResult<()> {
        let mut state = self.write()?;
        state.record(
            HostingOperation::ClosePullRequest,
            repository,
            Some(number.value().to_string()),
        )?;
        let record = state
            .repository(repository)
            .pull_requests
            .get_mut(&number.value())
            .ok_or_else(|| HostingError::NotFound(format!("{repository}{number}")))?;
        record.open = false;
        Ok(())
    }

    async fn create_pull_request(
        &self,
        repository: &RepositoryFullName,
        request: &NewPullRequest,
    ) -> HostingResult<PullRequestNumber> {
        let mut state = self.write()?;
        state.record(
            HostingOperation::CreatePullRequest,
            repository,
            Some(request.head.as_str().to_owned()),
        )?;
        let repo = state.repository(repository);
        if !repo.branches.contains_key(request.head.as_str()) {
            return Err(HostingError::Rejected {
                status: 422,
                message: format!("head branch {} does not exist", request.head),
            });
        }
        let duplicate = repo
            .pull_requests
            .values()
            .any(|pull_request| pull_request.open && pull_request.head == request.head.as_str());
        if duplicate {
            return Err(HostingError::Rejected {
                status: 422,
                message: format!("a pull request already exists for {}", request.head),
            });
        }
        let number = repo.next_pull_request_number()?;
        repo.pull_requests.insert(
            number.value(),
            PullRequestRecord {
                number,
                head: request.head.as_str().to_owned(),
                base: request.base.as_str().to_owned(),
                title: request.title.clone(),
                open: true,
                maintainer_can_modify: request.maintainer_can_modify,
            },
        );
        Ok(number)
    }
}

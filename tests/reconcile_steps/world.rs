//! Shared world state for reconciliation BDD scenarios.

use std::sync::Arc;

use eyre::WrapErr;
use manifest_reconciler::reconcile::{
    adapters::memory::{
        InMemoryHostingPlatform, InMemoryInstallationAuth, InlineImageEditor,
        SeededWorkingCopyProvider,
    },
    domain::{
        BranchName, CommitIdentity, CommitSha, InstallationId, ManagedTarget, RepositoryFullName,
        WebhookEvent,
    },
    services::{
        DEFAULT_MAX_CONCURRENT_RUNS, DispatchOutcome, EventDispatcher, ManifestCoordinates,
        PolicyContext, TargetRegistry,
    },
};
use mockable::DefaultClock;
use rstest::fixture;

/// Branch proposals are based on.
pub const BASE_BRANCH: &str = "master";

/// Commit the manifest base branch points at.
pub const BASE_TIP: &str = "1111111222222233333334444444555555566666";

/// Scenario world for reconciliation behaviour tests.
pub struct ReconcileWorld {
    /// Hosting platform shared by every repository.
    pub platform: InMemoryHostingPlatform,
    /// Installation auth backed by the platform.
    pub auth: InMemoryInstallationAuth,
    /// Working-copy provider holding the manifest files.
    pub provider: SeededWorkingCopyProvider,
    /// Manifest repository, once declared.
    pub manifest: Option<RepositoryFullName>,
    /// Targets registered when an event is dispatched.
    pub targets: Vec<ManagedTarget>,
    /// Outcomes of the last dispatch.
    pub outcomes: Vec<DispatchOutcome>,
    next_installation: u64,
}

impl ReconcileWorld {
    /// Creates a world with an empty platform.
    #[must_use]
    pub fn new() -> Self {
        let platform = InMemoryHostingPlatform::new();
        Self {
            auth: InMemoryInstallationAuth::new(platform.clone()),
            platform,
            provider: SeededWorkingCopyProvider::new(),
            manifest: None,
            targets: Vec::new(),
            outcomes: Vec::new(),
            next_installation: 1,
        }
    }

    /// Grants the next free installation access to `repository`.
    pub fn install(&mut self, repository: &RepositoryFullName) -> Result<(), eyre::Report> {
        let installation = InstallationId::new(self.next_installation)?;
        self.next_installation += 1;
        self.auth
            .grant(repository.clone(), installation)
            .wrap_err("grant installation")?;
        Ok(())
    }

    /// Returns the declared manifest repository.
    pub fn manifest(&self) -> Result<&RepositoryFullName, eyre::Report> {
        self.manifest
            .as_ref()
            .ok_or_else(|| eyre::eyre!("no manifest repository in scenario world"))
    }

    /// Registers every declared target and runs `event` through the
    /// dispatcher.
    pub fn dispatch(&mut self, event: WebhookEvent) -> Result<(), eyre::Report> {
        let coordinates = ManifestCoordinates::new(
            self.manifest()?.clone(),
            BranchName::new(BASE_BRANCH)?,
            CommitIdentity::app_bot("mischan-bot", 41_898_282)?,
        );
        let context = Arc::new(PolicyContext::new(
            Arc::new(self.auth.clone()),
            Arc::new(self.provider.clone()),
            Arc::new(InlineImageEditor::new()),
            coordinates,
        ));
        let registry = TargetRegistry::with_policies(
            self.targets.clone(),
            &context,
            &Arc::new(DefaultClock),
        )
        .wrap_err("register targets")?;
        let dispatcher = EventDispatcher::new(Arc::new(registry), DEFAULT_MAX_CONCURRENT_RUNS);

        run_async(dispatcher.submit(event));
        self.outcomes = run_async(dispatcher.drain());
        Ok(())
    }

    /// Returns the single outcome of the last dispatch.
    pub fn outcome(&self) -> Result<&DispatchOutcome, eyre::Report> {
        match self.outcomes.as_slice() {
            [outcome] => Ok(outcome),
            other => Err(eyre::eyre!("expected one outcome, got {other:?}")),
        }
    }
}

impl Default for ReconcileWorld {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixture that creates a new scenario world.
#[fixture]
pub fn world() -> ReconcileWorld {
    ReconcileWorld::default()
}

/// Runs an async operation within sync step definitions.
pub fn run_async<T>(future: impl std::future::Future<Output = T>) -> T {
    tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(future))
}

/// Parses a commit hash from step text.
pub fn commit(value: &str) -> Result<CommitSha, eyre::Report> {
    CommitSha::new(value).wrap_err("parse commit sha")
}

/// Renders a deployment manifest pinning `image_ref`.
#[must_use]
pub fn deployment(image_ref: &str) -> String {
    format!(
        concat!(
            "apiVersion: apps/v1\n",
            "kind: Deployment\n",
            "spec:\n",
            "  template:\n",
            "    spec:\n",
            "      containers:\n",
            "        - name: app\n",
            "          image: {}\n",
        ),
        image_ref
    )
}

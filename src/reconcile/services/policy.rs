//! Per-target reconciliation policy and its run state machine.

use super::{
    CheckStatusAggregator, ImageTagMutation, ManifestChangeError, ManifestCoordinates,
    ManifestSession, NamingError, build_intent,
};
use crate::reconcile::{
    domain::{
        BranchCreatedEvent, CheckSuiteCompletedEvent, EventKind, ManagedTarget, PhaseLog,
        PushEvent, ReconcileDomainError, RetirementReport, RunId, RunOutcome, RunPhase, RunReport,
        RunTrigger, SkipReason,
    },
    ports::{AuthError, HostingError, InstallationAuth, ManifestEditor, WorkingCopyProvider},
};
use async_trait::async_trait;
use mockable::Clock;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::Instrument;

/// Budget covering every remote call of one run.
pub const DEFAULT_RUN_TIMEOUT: Duration = Duration::from_secs(60);

/// Errors that fail a reconciliation run.
#[derive(Debug, Clone, Error)]
pub enum ReconcileError {
    /// A domain invariant was violated while driving the run.
    #[error(transparent)]
    Domain(#[from] ReconcileDomainError),

    /// The target repository's installation could not be used.
    #[error("installation access for target failed: {0}")]
    Installation(#[source] AuthError),

    /// Checks could not be queried.
    #[error("failed to query checks: {0}")]
    Checks(#[source] HostingError),

    /// The manifest session could not be opened.
    #[error("failed to open manifest session: {0}")]
    ManifestAccess(#[source] AuthError),

    /// A proposal name could not be rendered.
    #[error(transparent)]
    Naming(#[from] NamingError),

    /// A step of the change protocol failed.
    #[error(transparent)]
    Change(#[from] ManifestChangeError),

    /// The run exceeded its time budget.
    #[error("run timed out after {}s during {phase}", .after.as_secs())]
    TimedOut {
        /// Budget that elapsed.
        after: Duration,
        /// Phase the run was in when cancelled.
        phase: RunPhase,
    },
}

impl ReconcileError {
    /// Returns `true` when remote state may have been left half-applied: a
    /// proposal branch without its pull request.
    #[must_use]
    pub const fn is_partial(&self) -> bool {
        match self {
            Self::Change(err) => err.is_partial(),
            Self::TimedOut { phase, .. } => {
                matches!(phase, RunPhase::Mutating | RunPhase::Proposing)
            }
            _ => false,
        }
    }
}

/// Result type for reconciliation runs.
pub type ReconcileResult<T> = Result<T, ReconcileError>;

/// Collaborators shared by every target policy.
#[derive(Clone)]
pub struct PolicyContext {
    auth: Arc<dyn InstallationAuth>,
    provider: Arc<dyn WorkingCopyProvider>,
    editor: Arc<dyn ManifestEditor>,
    manifest: ManifestCoordinates,
    run_timeout: Duration,
}

impl PolicyContext {
    /// Creates a context with the default run timeout.
    #[must_use]
    pub fn new(
        auth: Arc<dyn InstallationAuth>,
        provider: Arc<dyn WorkingCopyProvider>,
        editor: Arc<dyn ManifestEditor>,
        manifest: ManifestCoordinates,
    ) -> Self {
        Self {
            auth,
            provider,
            editor,
            manifest,
            run_timeout: DEFAULT_RUN_TIMEOUT,
        }
    }

    /// Overrides the run timeout.
    #[must_use]
    pub const fn with_run_timeout(mut self, run_timeout: Duration) -> Self {
        self.run_timeout = run_timeout;
        self
    }

    /// Returns the manifest coordinates.
    #[must_use]
    pub const fn manifest(&self) -> &ManifestCoordinates {
        &self.manifest
    }

    /// Returns the run timeout.
    #[must_use]
    pub const fn run_timeout(&self) -> Duration {
        self.run_timeout
    }
}

/// Per-target handlers the registry dispatches to.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TargetReconciler: Send + Sync {
    /// Returns the managed target.
    fn target(&self) -> &ManagedTarget;

    /// Handles a push to any branch of the target repository.
    async fn on_push(&self, event: &PushEvent) -> ReconcileResult<RunReport>;

    /// Handles a completed check suite of the target repository.
    async fn on_check_suite(&self, event: &CheckSuiteCompletedEvent)
    -> ReconcileResult<RunReport>;

    /// Handles a ref creation in the target repository.
    async fn on_branch_created(&self, event: &BranchCreatedEvent) -> ReconcileResult<RunReport>;
}

/// Reconciliation policy for one managed target.
///
/// Each accepted trigger starts a fresh, time-boxed run that walks
/// `Idle → Evaluating → Cleaning → Mutating → Proposing → Done`, or stops in
/// `Skipped` or `Failed`. Runs for the same target are not serialized;
/// deterministic branch naming turns a duplicate run into a ref conflict.
pub struct TargetPolicy<C>
where
    C: Clock + Send + Sync,
{
    target: ManagedTarget,
    context: Arc<PolicyContext>,
    clock: Arc<C>,
}

impl<C> TargetPolicy<C>
where
    C: Clock + Send + Sync,
{
    /// Creates a policy for `target`.
    #[must_use]
    pub const fn new(target: ManagedTarget, context: Arc<PolicyContext>, clock: Arc<C>) -> Self {
        Self {
            target,
            context,
            clock,
        }
    }

    /// Runs reconciliation for an accepted trigger.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError`] when any step fails or the run exceeds its
    /// timeout. Cancellation drops every in-flight remote call and the
    /// working copy with it.
    pub async fn run(&self, trigger: RunTrigger) -> ReconcileResult<RunReport> {
        let run_id = RunId::new();
        let span = tracing::info_span!(
            "reconcile",
            run_id = %run_id,
            target = %self.target.repository(),
            trigger = %trigger.kind(),
        );
        self.run_in_span(run_id, trigger).instrument(span).await
    }

    async fn run_in_span(&self, run_id: RunId, trigger: RunTrigger) -> ReconcileResult<RunReport> {
        let started_at = self.clock.utc();
        let mut phases = PhaseLog::new();
        let budget = self.context.run_timeout;

        let timed = tokio::time::timeout(budget, self.execute(&trigger, &mut phases)).await;
        let result = match timed {
            Ok(outcome) => outcome,
            Err(_) => Err(ReconcileError::TimedOut {
                after: budget,
                phase: phases.current(),
            }),
        };

        match result {
            Ok(outcome) => {
                log_outcome(&outcome);
                Ok(RunReport {
                    run_id,
                    target: self.target.repository().clone(),
                    trigger: trigger.kind(),
                    phases: phases.into_phases(),
                    outcome,
                    started_at,
                    finished_at: self.clock.utc(),
                })
            }
            Err(err) => {
                tracing::error!(
                    phase = %phases.current(),
                    partial = err.is_partial(),
                    error = %err,
                    "reconciliation failed"
                );
                Err(err)
            }
        }
    }

    async fn execute(
        &self,
        trigger: &RunTrigger,
        phases: &mut PhaseLog,
    ) -> ReconcileResult<RunOutcome> {
        let context = &*self.context;
        let repository = self.target.repository();
        enter(phases, RunPhase::Evaluating)?;

        let installation = match trigger.installation() {
            Some(installation) => installation,
            None => context
                .auth
                .installation_for(repository)
                .await
                .map_err(ReconcileError::Installation)?,
        };
        let client = context
            .auth
            .client_for(installation)
            .await
            .map_err(ReconcileError::Installation)?;
        let aggregate = CheckStatusAggregator::new(client)
            .evaluate(
                repository,
                self.target.target_branch(),
                self.target.check_source(),
            )
            .await
            .map_err(ReconcileError::Checks)?;

        let Some(head) = aggregate.accepted_head(trigger.expected_head()).cloned() else {
            let reason = match (aggregate.head_sha(), trigger.expected_head()) {
                (Some(actual), Some(expected)) if aggregate.is_ready() => SkipReason::StaleHead {
                    expected: expected.clone(),
                    actual: actual.clone(),
                },
                _ => SkipReason::ChecksNotReady,
            };
            enter(phases, RunPhase::Skipped)?;
            return Ok(RunOutcome::Skipped(reason));
        };
        let intent = build_intent(&self.target, &head)?;

        enter(phases, RunPhase::Cleaning)?;
        let session = ManifestSession::open(
            context.auth.as_ref(),
            Arc::clone(&context.provider),
            context.manifest.clone(),
        )
        .await
        .map_err(ReconcileError::ManifestAccess)?;
        let retirement = session
            .retire_obsolete(self.target.branch_prefix(), Some(intent.branch()))
            .await
            .unwrap_or_else(|err| {
                tracing::warn!(error = %err, "failed to list proposals for retirement");
                RetirementReport::new()
            });

        enter(phases, RunPhase::Mutating)?;
        let mutation = ImageTagMutation::new(Arc::clone(&context.editor), intent.edits().to_vec());
        let Some(prepared) = session.prepare_change(&intent, &mutation).await? else {
            enter(phases, RunPhase::Done)?;
            return Ok(RunOutcome::NoChange {
                branch: intent.branch().clone(),
                retirement,
            });
        };

        enter(phases, RunPhase::Proposing)?;
        let committer = self
            .target
            .committer()
            .unwrap_or_else(|| context.manifest.committer());
        let pull_request = session.propose(prepared, &intent, committer).await?;

        enter(phases, RunPhase::Done)?;
        Ok(RunOutcome::Proposed {
            branch: intent.branch().clone(),
            pull_request,
            retirement,
        })
    }

    fn ignored(&self, kind: EventKind) -> RunReport {
        let now = self.clock.utc();
        tracing::debug!(
            repository = %self.target.repository(),
            trigger = %kind,
            "event does not concern target branch"
        );
        RunReport {
            run_id: RunId::new(),
            target: self.target.repository().clone(),
            trigger: kind,
            phases: PhaseLog::new().into_phases(),
            outcome: RunOutcome::Ignored,
            started_at: now,
            finished_at: now,
        }
    }
}

#[async_trait]
impl<C> TargetReconciler for TargetPolicy<C>
where
    C: Clock + Send + Sync,
{
    fn target(&self) -> &ManagedTarget {
        &self.target
    }

    async fn on_push(&self, event: &PushEvent) -> ReconcileResult<RunReport> {
        match event.trigger_for(self.target.target_branch()) {
            Some(trigger) => self.run(trigger).await,
            None => Ok(self.ignored(EventKind::Push)),
        }
    }

    async fn on_check_suite(
        &self,
        event: &CheckSuiteCompletedEvent,
    ) -> ReconcileResult<RunReport> {
        match event.trigger_for(self.target.target_branch()) {
            Some(trigger) => self.run(trigger).await,
            None => Ok(self.ignored(EventKind::CheckSuite)),
        }
    }

    async fn on_branch_created(&self, event: &BranchCreatedEvent) -> ReconcileResult<RunReport> {
        match event.trigger_for(self.target.target_branch()) {
            Some(trigger) => self.run(trigger).await,
            None => Ok(self.ignored(EventKind::BranchCreated)),
        }
    }
}

fn enter(phases: &mut PhaseLog, next: RunPhase) -> ReconcileResult<()> {
    phases.advance(next)?;
    tracing::debug!(phase = %next, "entered phase");
    Ok(())
}

fn log_outcome(outcome: &RunOutcome) {
    match outcome {
        RunOutcome::Proposed {
            branch,
            pull_request,
            retirement,
        } => tracing::info!(
            outcome = outcome.label(),
            branch = %branch,
            pull_request = %pull_request,
            retired = retirement.retired().len(),
            "proposed manifest update"
        ),
        RunOutcome::NoChange { branch, retirement } => tracing::info!(
            outcome = outcome.label(),
            branch = %branch,
            retired = retirement.retired().len(),
            "manifests already up to date"
        ),
        RunOutcome::Skipped(reason) => tracing::debug!(
            outcome = outcome.label(),
            reason = %reason,
            "skipped reconciliation"
        ),
        RunOutcome::Ignored => tracing::debug!(outcome = outcome.label(), "ignored event"),
    }
}

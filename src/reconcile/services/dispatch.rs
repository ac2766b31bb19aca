//! Dispatch facade: detached, bounded execution of webhook events.

use super::{DispatchError, TargetRegistry};
use crate::reconcile::domain::{EventKind, RepositoryFullName, RunReport, WebhookEvent};
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;

/// Default number of runs executing at once.
pub const DEFAULT_MAX_CONCURRENT_RUNS: usize = 4;

/// Final state of one dispatched event.
#[derive(Debug)]
pub enum DispatchOutcome {
    /// No target is configured for the repository; nothing ran.
    Unrouted {
        /// Repository the event came from.
        repository: RepositoryFullName,
    },
    /// The run completed (proposed, unchanged, skipped or ignored).
    Completed(RunReport),
    /// The run failed; the failure has already been logged.
    Failed {
        /// Repository the event came from.
        repository: RepositoryFullName,
        /// Event kind that started the run.
        trigger: EventKind,
        /// Failure cause.
        error: DispatchError,
    },
}

impl DispatchOutcome {
    /// Returns the run report of a completed run.
    #[must_use]
    pub const fn report(&self) -> Option<&RunReport> {
        match self {
            Self::Completed(report) => Some(report),
            Self::Unrouted { .. } | Self::Failed { .. } => None,
        }
    }

    /// Returns `true` when the run failed.
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Runs events against the registry on background tasks.
///
/// At most `max_concurrent_runs` runs execute at once; later submissions
/// wait for a permit. [`Self::drain`] is the join point that waits for
/// every outstanding run.
pub struct EventDispatcher {
    registry: Arc<TargetRegistry>,
    permits: Arc<Semaphore>,
    runs: Mutex<JoinSet<DispatchOutcome>>,
}

impl EventDispatcher {
    /// Creates a dispatcher allowing `max_concurrent_runs` runs at once.
    ///
    /// A limit of zero is raised to one.
    #[must_use]
    pub fn new(registry: Arc<TargetRegistry>, max_concurrent_runs: usize) -> Self {
        Self {
            registry,
            permits: Arc::new(Semaphore::new(max_concurrent_runs.max(1))),
            runs: Mutex::new(JoinSet::new()),
        }
    }

    /// Handles one event inline and converts every result into an outcome.
    pub async fn handle(&self, event: WebhookEvent) -> DispatchOutcome {
        handle_event(&self.registry, event).await
    }

    /// Spawns a run for `event` and returns without waiting for it.
    pub async fn submit(&self, event: WebhookEvent) {
        let registry = Arc::clone(&self.registry);
        let permits = Arc::clone(&self.permits);
        self.runs.lock().await.spawn(async move {
            let _permit = permits.acquire_owned().await;
            handle_event(&registry, event).await
        });
    }

    /// Waits for every submitted run and returns their outcomes in
    /// completion order.
    ///
    /// A run that panicked is logged and omitted.
    pub async fn drain(&self) -> Vec<DispatchOutcome> {
        let mut runs = std::mem::take(&mut *self.runs.lock().await);
        let mut outcomes = Vec::with_capacity(runs.len());
        while let Some(joined) = runs.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(err) => tracing::error!(error = %err, "reconciliation task aborted"),
            }
        }
        outcomes
    }
}

async fn handle_event(registry: &TargetRegistry, event: WebhookEvent) -> DispatchOutcome {
    match registry.dispatch(&event).await {
        Ok(report) => DispatchOutcome::Completed(report),
        Err(DispatchError::UnknownRepository(repository)) => {
            tracing::trace!(repository = %repository, "no target configured");
            DispatchOutcome::Unrouted { repository }
        }
        Err(error) => {
            if let DispatchError::Registry(ref registry_error) = error {
                tracing::error!(error = %registry_error, "failed to route event");
            }
            DispatchOutcome::Failed {
                repository: event.repository().clone(),
                trigger: event.kind(),
                error,
            }
        }
    }
}

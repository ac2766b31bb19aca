//! Target registry keyed by repository full name.

use super::{PolicyContext, ReconcileError, TargetPolicy, TargetReconciler};
use crate::reconcile::domain::{ManagedTarget, RepositoryFullName, RunReport, WebhookEvent};
use mockable::Clock;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;

/// Errors returned by registry operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// A target for the repository is already registered.
    #[error("target {0} is already registered")]
    DuplicateTarget(RepositoryFullName),

    /// Registration was attempted after the registry was sealed.
    #[error("registry is sealed; cannot register {0}")]
    Sealed(RepositoryFullName),

    /// The registry lock was poisoned by a panicking writer.
    #[error("registry lock poisoned: {0}")]
    Poisoned(String),
}

/// Errors returned when dispatching an event.
#[derive(Debug, Clone, Error)]
pub enum DispatchError {
    /// No target is configured for the event's repository.
    #[error("no target configured for {0}")]
    UnknownRepository(RepositoryFullName),

    /// The registry could not be read.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// The run failed.
    #[error(transparent)]
    Reconcile(Box<ReconcileError>),
}

impl From<ReconcileError> for DispatchError {
    fn from(err: ReconcileError) -> Self {
        Self::Reconcile(Box::new(err))
    }
}

/// Write-once, read-many map from repository to its reconciler.
///
/// Targets are registered during startup, then the registry is sealed and
/// only serves concurrent lookups.
#[derive(Default)]
pub struct TargetRegistry {
    state: RwLock<RegistryState>,
}

#[derive(Default)]
struct RegistryState {
    targets: HashMap<RepositoryFullName, Arc<dyn TargetReconciler>>,
    sealed: bool,
}

impl TargetRegistry {
    /// Creates an empty, unsealed registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, RegistryState>, RegistryError> {
        self.state
            .read()
            .map_err(|err| RegistryError::Poisoned(err.to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, RegistryState>, RegistryError> {
        self.state
            .write()
            .map_err(|err| RegistryError::Poisoned(err.to_string()))
    }

    /// Builds a sealed registry holding one [`TargetPolicy`] per target.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateTarget`] when two targets share a
    /// repository.
    pub fn with_policies<C>(
        targets: impl IntoIterator<Item = ManagedTarget>,
        context: &Arc<PolicyContext>,
        clock: &Arc<C>,
    ) -> Result<Self, RegistryError>
    where
        C: Clock + Send + Sync + 'static,
    {
        let registry = Self::new();
        for target in targets {
            registry.register(Arc::new(TargetPolicy::new(
                target,
                Arc::clone(context),
                Arc::clone(clock),
            )))?;
        }
        registry.seal()?;
        Ok(registry)
    }

    /// Registers a reconciler under its target repository.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateTarget`] when the repository is
    /// already registered and [`RegistryError::Sealed`] after [`Self::seal`].
    pub fn register(&self, reconciler: Arc<dyn TargetReconciler>) -> Result<(), RegistryError> {
        let repository = reconciler.target().repository().clone();
        let mut state = self.write()?;
        if state.sealed {
            return Err(RegistryError::Sealed(repository));
        }
        if state.targets.contains_key(&repository) {
            return Err(RegistryError::DuplicateTarget(repository));
        }
        tracing::debug!(repository = %repository, "registered target");
        state.targets.insert(repository, reconciler);
        Ok(())
    }

    /// Rejects every later registration.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Poisoned`] when lock acquisition fails.
    pub fn seal(&self) -> Result<(), RegistryError> {
        self.write()?.sealed = true;
        Ok(())
    }

    /// Looks up the reconciler for `repository` by exact name.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Poisoned`] when lock acquisition fails.
    pub fn resolve(
        &self,
        repository: &RepositoryFullName,
    ) -> Result<Option<Arc<dyn TargetReconciler>>, RegistryError> {
        Ok(self.read()?.targets.get(repository).cloned())
    }

    /// Routes `event` to the handler of its repository's reconciler.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::UnknownRepository`] without any downstream
    /// call when no target matches, and [`DispatchError::Reconcile`] when the
    /// run fails.
    pub async fn dispatch(&self, event: &WebhookEvent) -> Result<RunReport, DispatchError> {
        let repository = event.repository();
        let reconciler = self
            .resolve(repository)?
            .ok_or_else(|| DispatchError::UnknownRepository(repository.clone()))?;

        let report = match event {
            WebhookEvent::Push(push) => reconciler.on_push(push).await?,
            WebhookEvent::CheckSuite(suite) => reconciler.on_check_suite(suite).await?,
            WebhookEvent::BranchCreated(created) => reconciler.on_branch_created(created).await?,
        };
        Ok(report)
    }

    /// Returns the number of registered targets.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Poisoned`] when lock acquisition fails.
    pub fn len(&self) -> Result<usize, RegistryError> {
        Ok(self.read()?.targets.len())
    }

    /// Returns `true` when no target is registered.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Poisoned`] when lock acquisition fails.
    pub fn is_empty(&self) -> Result<bool, RegistryError> {
        Ok(self.read()?.targets.is_empty())
    }

    /// Returns the registered repositories in name order.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Poisoned`] when lock acquisition fails.
    pub fn repositories(&self) -> Result<Vec<RepositoryFullName>, RegistryError> {
        let mut repositories: Vec<_> = self.read()?.targets.keys().cloned().collect();
        repositories.sort();
        Ok(repositories)
    }
}

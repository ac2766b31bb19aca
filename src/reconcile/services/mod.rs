//! Application services orchestrating reconciliation runs.

mod checks;
mod dispatch;
mod manifest;
mod mutation;
mod naming;
mod policy;
mod registry;

pub use checks::CheckStatusAggregator;
pub use dispatch::{DEFAULT_MAX_CONCURRENT_RUNS, DispatchOutcome, EventDispatcher};
pub use manifest::{
    ChangeOutcome, ManifestChangeError, ManifestCoordinates, ManifestSession, PreparedChange,
};
pub use mutation::ImageTagMutation;
pub use naming::{NamingError, build_intent, render_name, validate_template};
pub use policy::{
    DEFAULT_RUN_TIMEOUT, PolicyContext, ReconcileError, ReconcileResult, TargetPolicy,
    TargetReconciler,
};
pub use registry::{DispatchError, RegistryError, TargetRegistry};

#[cfg(test)]
pub(crate) use policy::MockTargetReconciler;

//! Adapter implementations for reconciliation ports.

mod auth;
mod git;
pub mod github;
mod kustomize;
pub mod memory;

pub use auth::StaticTokenAuth;
pub use git::{DEFAULT_GIT_BINARY, GitCliWorkingCopyProvider};
pub use kustomize::{DEFAULT_KUSTOMIZE_BINARY, KustomizeEditor};

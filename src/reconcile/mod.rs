//! GitOps reconciliation of deployment manifests.
//!
//! When the checks on a target repository's release branch pass, the
//! reconciler opens a pull request against the manifest repository pointing
//! the target's images at the new build, after retiring the proposals it
//! opened earlier for the same target. The module follows hexagonal
//! architecture:
//!
//! - Domain types in [`domain`]
//! - Port contracts in [`ports`]
//! - Adapter implementations in [`adapters`]
//! - Orchestration services in [`services`]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;

#[cfg(test)]
mod tests;

//! Manifest reconciler: GitOps promotion of verified builds.
//!
//! This crate watches target repositories for successful CI runs and
//! proposes manifest changes that point their deployment images at the new
//! build. Each proposal is a pull request against a shared manifest
//! repository; proposals superseded by a newer build are retired.
//!
//! # Architecture
//!
//! The reconciler follows hexagonal architecture principles:
//!
//! - **Domain**: Validated identifiers, check aggregation, and run records
//! - **Ports**: Trait contracts for hosting, auth, working copies, and edits
//! - **Adapters**: GitHub REST, git and kustomize CLIs, and in-memory fakes
//!
//! # Modules
//!
//! - [`reconcile`]: Event routing, target policies, and manifest sessions
//! - [`config`]: JSON configuration of the manifest repository and targets
//! - [`telemetry`]: Tracing subscriber setup

pub mod config;
pub mod reconcile;
pub mod telemetry;

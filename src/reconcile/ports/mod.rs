//! Port contracts for manifest reconciliation.
//!
//! Ports define the external collaborators the reconciliation services
//! depend on: the hosting platform, installation authentication, working
//! copies and the manifest editing tool.

mod auth;
mod hosting;
mod mutation;
mod working_copy;

pub use auth::{AuthError, AuthResult, InstallationAuth, InstallationToken};
pub use hosting::{HostingClient, HostingError, HostingResult};
pub use mutation::{ManifestEditor, ManifestMutation, MutationError, MutationResult};
pub use working_copy::{
    RemoteSpec, WorkingCopy, WorkingCopyError, WorkingCopyProvider, WorkingCopyResult,
};

#[cfg(test)]
pub(crate) use auth::MockInstallationAuth;
#[cfg(test)]
pub(crate) use hosting::MockHostingClient;
#[cfg(test)]
pub(crate) use mutation::{MockManifestEditor, MockManifestMutation};

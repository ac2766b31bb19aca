//! Installation auth for a single pre-issued token.

use super::github::GitHubRestClient;
use crate::reconcile::{
    domain::{InstallationId, RepositoryFullName},
    ports::{AuthError, AuthResult, HostingClient, InstallationAuth, InstallationToken},
};
use async_trait::async_trait;
use std::sync::Arc;

/// Installation auth that hands out one configured token.
///
/// Suits deployments where the token is minted outside the process (for
/// example by a CI job or a sidecar) and covers every managed repository.
/// Every repository resolves to the configured installation, and the same
/// token is issued whichever installation an event reports.
#[derive(Debug, Clone)]
pub struct StaticTokenAuth {
    token: InstallationToken,
    api_base: String,
    installation: InstallationId,
}

impl StaticTokenAuth {
    /// Creates auth issuing `token` for `installation` against `api_base`.
    #[must_use]
    pub fn new(
        token: InstallationToken,
        api_base: impl Into<String>,
        installation: InstallationId,
    ) -> Self {
        Self {
            token,
            api_base: api_base.into(),
            installation,
        }
    }

    /// Returns the installation every repository resolves to.
    #[must_use]
    pub const fn installation(&self) -> InstallationId {
        self.installation
    }
}

#[async_trait]
impl InstallationAuth for StaticTokenAuth {
    async fn installation_for(
        &self,
        _repository: &RepositoryFullName,
    ) -> AuthResult<InstallationId> {
        Ok(self.installation)
    }

    async fn token_for(&self, installation: InstallationId) -> AuthResult<InstallationToken> {
        tracing::trace!(installation = %installation, "issuing static token");
        Ok(self.token.clone())
    }

    async fn client_for(
        &self,
        _installation: InstallationId,
    ) -> AuthResult<Arc<dyn HostingClient>> {
        let client =
            GitHubRestClient::new(&self.api_base, &self.token).map_err(AuthError::transport)?;
        Ok(Arc::new(client))
    }
}

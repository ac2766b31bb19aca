//! In-memory installation authentication.

use super::InMemoryHostingPlatform;
use crate::reconcile::{
    domain::{InstallationId, RepositoryFullName},
    ports::{AuthError, AuthResult, HostingClient, InstallationAuth, InstallationToken},
};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock, RwLockWriteGuard};

/// Installation auth backed by an [`InMemoryHostingPlatform`].
///
/// Every installation shares the same platform; tokens are counted so tests
/// can assert per-run acquisition.
#[derive(Debug, Clone)]
pub struct InMemoryInstallationAuth {
    platform: InMemoryHostingPlatform,
    state: Arc<RwLock<AuthState>>,
}

#[derive(Debug, Default)]
struct AuthState {
    installations: HashMap<RepositoryFullName, InstallationId>,
    denied: HashSet<InstallationId>,
    issued: Vec<InstallationId>,
}

impl InMemoryInstallationAuth {
    /// Creates auth that hands out clients for `platform`.
    #[must_use]
    pub fn new(platform: InMemoryHostingPlatform) -> Self {
        Self {
            platform,
            state: Arc::new(RwLock::new(AuthState::default())),
        }
    }

    fn write(&self) -> AuthResult<RwLockWriteGuard<'_, AuthState>> {
        self.state
            .write()
            .map_err(|err| AuthError::transport(std::io::Error::other(err.to_string())))
    }

    /// Grants `installation` access to `repository`.
    ///
    /// # Errors
    ///
    /// Returns a transport error when lock acquisition fails.
    pub fn grant(
        &self,
        repository: RepositoryFullName,
        installation: InstallationId,
    ) -> AuthResult<()> {
        self.write()?.installations.insert(repository, installation);
        Ok(())
    }

    /// Makes token requests for `installation` fail.
    ///
    /// # Errors
    ///
    /// Returns a transport error when lock acquisition fails.
    pub fn deny(&self, installation: InstallationId) -> AuthResult<()> {
        self.write()?.denied.insert(installation);
        Ok(())
    }

    /// Returns the installations tokens were issued for, in order.
    ///
    /// # Errors
    ///
    /// Returns a transport error when lock acquisition fails.
    pub fn issued_tokens(&self) -> AuthResult<Vec<InstallationId>> {
        Ok(self.write()?.issued.clone())
    }
}

#[async_trait]
impl InstallationAuth for InMemoryInstallationAuth {
    async fn installation_for(
        &self,
        repository: &RepositoryFullName,
    ) -> AuthResult<InstallationId> {
        self.write()?
            .installations
            .get(repository)
            .copied()
            .ok_or_else(|| AuthError::NoInstallation(repository.clone()))
    }

    async fn token_for(&self, installation: InstallationId) -> AuthResult<InstallationToken> {
        let mut state = self.write()?;
        if state.denied.contains(&installation) {
            return Err(AuthError::Denied {
                installation,
                reason: "installation suspended".to_owned(),
            });
        }
        state.issued.push(installation);
        Ok(InstallationToken::new(format!(
            "ghs_memory_{installation}_{}",
            state.issued.len()
        )))
    }

    async fn client_for(
        &self,
        installation: InstallationId,
    ) -> AuthResult<Arc<dyn HostingClient>> {
        if self.write()?.denied.contains(&installation) {
            return Err(AuthError::Denied {
                installation,
                reason: "installation suspended".to_owned(),
            });
        }
        Ok(Arc::new(self.platform.clone()))
    }
}

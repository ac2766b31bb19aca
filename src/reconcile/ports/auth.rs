//! Installation authentication port.

use super::HostingClient;
use crate::reconcile::domain::{InstallationId, RepositoryFullName};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Result type for installation authentication.
pub type AuthResult<T> = Result<T, AuthError>;

/// Short-lived installation-scoped access token.
///
/// `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct InstallationToken(String);

impl InstallationToken {
    /// Wraps a token secret.
    #[must_use]
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// Returns the secret for use in credentials.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Replaces every occurrence of the secret in `text`.
    #[must_use]
    pub fn redact(&self, text: &str) -> String {
        if self.0.is_empty() {
            return text.to_owned();
        }
        text.replace(&self.0, "***")
    }
}

impl fmt::Debug for InstallationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("InstallationToken(***)")
    }
}

/// Exchanges the application identity for installation-scoped access.
///
/// Tokens are short-lived; callers acquire a fresh one per run.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait InstallationAuth: Send + Sync {
    /// Finds the installation with access to `repository`.
    async fn installation_for(&self, repository: &RepositoryFullName)
    -> AuthResult<InstallationId>;

    /// Issues a token for `installation`.
    async fn token_for(&self, installation: InstallationId) -> AuthResult<InstallationToken>;

    /// Builds a hosting client authenticated as `installation`.
    async fn client_for(&self, installation: InstallationId)
    -> AuthResult<Arc<dyn HostingClient>>;
}

/// Errors returned by installation authentication adapters.
#[derive(Debug, Clone, Error)]
pub enum AuthError {
    /// No installation covers the repository.
    #[error("no installation has access to {0}")]
    NoInstallation(RepositoryFullName),

    /// The platform refused to issue a token.
    #[error("token request for installation {installation} denied: {reason}")]
    Denied {
        /// Installation the token was requested for.
        installation: InstallationId,
        /// Reason reported by the platform.
        reason: String,
    },

    /// Network or transport failure.
    #[error("authentication transport error: {0}")]
    Transport(Arc<dyn std::error::Error + Send + Sync>),
}

impl AuthError {
    /// Wraps a transport error.
    pub fn transport(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Transport(Arc::new(err))
    }
}

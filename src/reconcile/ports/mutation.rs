//! Manifest mutation ports.

use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Result type for manifest mutation.
pub type MutationResult<T> = Result<T, MutationError>;

/// External tool that rewrites image references in a manifest overlay.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ManifestEditor: Send + Sync {
    /// Points the overlay at `image_ref` (`name:tag`).
    async fn set_image(&self, overlay_dir: &Utf8Path, image_ref: &str) -> MutationResult<()>;
}

/// One run's edit of a working copy.
///
/// A mutation that converges leaves the working copy byte-identical when
/// reapplied to already-updated content.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ManifestMutation: Send + Sync {
    /// Applies the edit below `root`.
    async fn apply(&self, root: &Utf8Path) -> MutationResult<()>;
}

/// Errors returned while mutating manifests.
#[derive(Debug, Clone, Error)]
pub enum MutationError {
    /// The overlay directory does not exist in the working copy.
    #[error("overlay directory {0} does not exist")]
    MissingOverlay(Utf8PathBuf),

    /// The editing tool exited unsuccessfully.
    #[error("{program} exited with {status}: {output}")]
    ToolFailed {
        /// Program that was invoked.
        program: String,
        /// Exit status description.
        status: String,
        /// Captured standard output and error.
        output: String,
    },

    /// The editing tool could not be started or the files could not be
    /// accessed.
    #[error("manifest mutation I/O error: {0}")]
    Io(Arc<dyn std::error::Error + Send + Sync>),
}

impl MutationError {
    /// Wraps an I/O error.
    pub fn io(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Io(Arc::new(err))
    }
}

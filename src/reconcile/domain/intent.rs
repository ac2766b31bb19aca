//! The change a run proposes against the manifest repository.

use super::{BranchName, ShortSha};
use camino::{Utf8Path, Utf8PathBuf};

/// One rendered image reference to write into one overlay directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageEdit {
    overlay: Utf8PathBuf,
    image_ref: String,
}

impl ImageEdit {
    /// Creates an image edit.
    #[must_use]
    pub fn new(overlay: impl Into<Utf8PathBuf>, image_ref: impl Into<String>) -> Self {
        Self {
            overlay: overlay.into(),
            image_ref: image_ref.into(),
        }
    }

    /// Returns the overlay directory relative to the working-copy root.
    #[must_use]
    pub fn overlay(&self) -> &Utf8Path {
        &self.overlay
    }

    /// Returns the full image reference (`name:tag`).
    #[must_use]
    pub fn image_ref(&self) -> &str {
        &self.image_ref
    }
}

/// Proposed manifest change: a deterministic branch, its commit message, and
/// the edits to apply.
///
/// The branch name is a pure function of the target prefix and short commit
/// id, so retrying with the same head always names the same branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestIntent {
    branch: BranchName,
    short_sha: ShortSha,
    commit_message: String,
    edits: Vec<ImageEdit>,
}

impl PullRequestIntent {
    /// Creates an intent with no edits.
    #[must_use]
    pub fn new(branch: BranchName, short_sha: ShortSha, commit_message: impl Into<String>) -> Self {
        Self {
            branch,
            short_sha,
            commit_message: commit_message.into(),
            edits: Vec::new(),
        }
    }

    /// Appends an image edit.
    #[must_use]
    pub fn with_edit(mut self, edit: ImageEdit) -> Self {
        self.edits.push(edit);
        self
    }

    /// Returns the proposal branch.
    #[must_use]
    pub const fn branch(&self) -> &BranchName {
        &self.branch
    }

    /// Returns the short commit id the intent was built for.
    #[must_use]
    pub const fn short_sha(&self) -> &ShortSha {
        &self.short_sha
    }

    /// Returns the commit message, also used as the pull-request title.
    #[must_use]
    pub fn commit_message(&self) -> &str {
        &self.commit_message
    }

    /// Returns the image edits in application order.
    #[must_use]
    pub fn edits(&self) -> &[ImageEdit] {
        &self.edits
    }
}

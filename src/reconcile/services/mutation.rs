//! Image-tag mutation applied to a manifest working copy.

use crate::reconcile::{
    domain::ImageEdit,
    ports::{ManifestEditor, ManifestMutation, MutationResult},
};
use async_trait::async_trait;
use camino::Utf8Path;
use std::sync::Arc;

/// Points every overlay of an intent at its rendered image reference.
///
/// Edits run in order; the first failure aborts the rest.
#[derive(Clone)]
pub struct ImageTagMutation {
    editor: Arc<dyn ManifestEditor>,
    edits: Vec<ImageEdit>,
}

impl ImageTagMutation {
    /// Creates a mutation applying `edits` through `editor`.
    #[must_use]
    pub fn new(editor: Arc<dyn ManifestEditor>, edits: Vec<ImageEdit>) -> Self {
        Self { editor, edits }
    }

    /// Returns the edits in application order.
    #[must_use]
    pub fn edits(&self) -> &[ImageEdit] {
        &self.edits
    }
}

#[async_trait]
impl ManifestMutation for ImageTagMutation {
    async fn apply(&self, root: &Utf8Path) -> MutationResult<()> {
        for edit in &self.edits {
            let overlay_dir = root.join(edit.overlay());
            self.editor.set_image(&overlay_dir, edit.image_ref()).await?;
            tracing::debug!(overlay = %edit.overlay(), image = edit.image_ref(), "image updated");
        }
        Ok(())
    }
}

//! Manifest editor invoking `kustomize edit set image`.

use crate::reconcile::ports::{ManifestEditor, MutationError, MutationResult};
use async_trait::async_trait;
use camino::Utf8Path;
use tokio::process::Command;

/// Default program name resolved from `PATH`.
pub const DEFAULT_KUSTOMIZE_BINARY: &str = "kustomize";

/// Runs `kustomize edit set image <ref>` rooted at the overlay directory.
#[derive(Debug, Clone)]
pub struct KustomizeEditor {
    program: String,
}

impl KustomizeEditor {
    /// Creates an editor running `program`.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Returns the program that will be invoked.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }
}

impl Default for KustomizeEditor {
    fn default() -> Self {
        Self::new(DEFAULT_KUSTOMIZE_BINARY)
    }
}

#[async_trait]
impl ManifestEditor for KustomizeEditor {
    async fn set_image(&self, overlay_dir: &Utf8Path, image_ref: &str) -> MutationResult<()> {
        if !overlay_dir.is_dir() {
            return Err(MutationError::MissingOverlay(overlay_dir.to_owned()));
        }

        let output = Command::new(&self.program)
            .args(["edit", "set", "image", image_ref])
            .current_dir(overlay_dir)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(MutationError::io)?;

        if !output.status.success() {
            let mut captured = String::from_utf8_lossy(&output.stdout).into_owned();
            captured.push_str(&String::from_utf8_lossy(&output.stderr));
            return Err(MutationError::ToolFailed {
                program: self.program.clone(),
                status: output.status.to_string(),
                output: captured.trim().to_owned(),
            });
        }

        tracing::debug!(overlay = %overlay_dir, image = image_ref, "kustomize set image");
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    //! `sh` stands in for the tool: invoked as `sh edit set image <ref>`, it
    //! runs the `edit` script from the overlay directory.

    use super::*;
    use camino::Utf8PathBuf;
    use rstest::rstest;

    fn temp_root() -> (tempfile::TempDir, Utf8PathBuf) {
        let dir = tempfile::tempdir().expect("temp dir");
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 temp dir");
        (dir, root)
    }

    #[rstest]
    #[tokio::test(flavor = "multi_thread")]
    async fn passes_image_reference_and_runs_in_overlay() {
        let (_guard, root) = temp_root();
        let overlay = root.join("bases/portal");
        std::fs::create_dir_all(&overlay).expect("overlay dir");
        std::fs::write(overlay.join("edit"), "echo \"$@\" > invocation.log\n")
            .expect("write script");

        KustomizeEditor::new("sh")
            .set_image(&overlay, "ghcr.io/misw/portal:sha-abc1234")
            .await
            .expect("editor succeeds");

        let log = std::fs::read_to_string(overlay.join("invocation.log")).expect("log written");
        assert_eq!(log.trim(), "set image ghcr.io/misw/portal:sha-abc1234");
    }

    #[rstest]
    #[tokio::test(flavor = "multi_thread")]
    async fn captures_output_on_failure() {
        let (_guard, root) = temp_root();
        std::fs::write(root.join("edit"), "echo 'no kustomization file' >&2\nexit 3\n")
            .expect("write script");

        let err = KustomizeEditor::new("sh")
            .set_image(&root, "ghcr.io/misw/portal:sha-abc1234")
            .await
            .expect_err("non-zero exit fails");

        match err {
            MutationError::ToolFailed { output, .. } => {
                assert_eq!(output, "no kustomization file");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[rstest]
    #[tokio::test(flavor = "multi_thread")]
    async fn rejects_missing_overlay() {
        let (_guard, root) = temp_root();
        let missing = root.join("bases/absent");

        let err = KustomizeEditor::default()
            .set_image(&missing, "ghcr.io/misw/portal:sha-abc1234")
            .await
            .expect_err("missing overlay fails");

        assert!(matches!(err, MutationError::MissingOverlay(path) if path == missing));
    }
}

//! In-process manifest editor rewriting `image:` lines.

use crate::reconcile::ports::{ManifestEditor, MutationError, MutationResult};
use async_trait::async_trait;
use camino::Utf8Path;
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;

const IMAGE_KEY: &str = "image:";

/// Editor that rewrites `image: <name>[:tag]` lines in the YAML files of an
/// overlay directory.
///
/// Rewriting to the reference already present leaves files byte-identical.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineImageEditor;

impl InlineImageEditor {
    /// Creates the editor.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ManifestEditor for InlineImageEditor {
    async fn set_image(&self, overlay_dir: &Utf8Path, image_ref: &str) -> MutationResult<()> {
        let dir = Dir::open_ambient_dir(overlay_dir, ambient_authority())
            .map_err(|_| MutationError::MissingOverlay(overlay_dir.to_owned()))?;
        let name = image_name(image_ref);

        for entry_result in dir.entries().map_err(MutationError::io)? {
            let entry = entry_result.map_err(MutationError::io)?;
            let file_name = entry.file_name().map_err(MutationError::io)?;
            let is_yaml = file_name.ends_with(".yaml") || file_name.ends_with(".yml");
            if !is_yaml || !entry.file_type().map_err(MutationError::io)?.is_file() {
                continue;
            }

            let original = dir.read_to_string(&file_name).map_err(MutationError::io)?;
            let rewritten = rewrite(&original, name, image_ref);
            if rewritten != original {
                dir.write(&file_name, rewritten).map_err(MutationError::io)?;
            }
        }
        Ok(())
    }
}

/// Strips the tag or digest from a full image reference.
fn image_name(image_ref: &str) -> &str {
    let without_digest = image_ref.split('@').next().unwrap_or(image_ref);
    match without_digest.rsplit_once(':') {
        Some((name, tag)) if !tag.contains('/') => name,
        _ => without_digest,
    }
}

fn rewrite(content: &str, name: &str, image_ref: &str) -> String {
    let mut output = String::with_capacity(content.len());
    for segment in content.split_inclusive('\n') {
        let (line, ending) = segment
            .strip_suffix('\n')
            .map_or((segment, ""), |line| (line, "\n"));
        match rewrite_line(line, name, image_ref) {
            Some(replaced) => output.push_str(&replaced),
            None => output.push_str(line),
        }
        output.push_str(ending);
    }
    output
}

fn rewrite_line(line: &str, name: &str, image_ref: &str) -> Option<String> {
    let index = line.find(IMAGE_KEY)?;
    let head = line.get(..index)?;
    if !head.chars().all(|c| c == ' ' || c == '-') {
        return None;
    }
    let value = line.get(index + IMAGE_KEY.len()..)?.trim().trim_matches('"');
    let matches = value == name
        || value
            .strip_prefix(name)
            .is_some_and(|rest| rest.starts_with(':') || rest.starts_with('@'));
    matches.then(|| format!("{head}{IMAGE_KEY} {image_ref}"))
}

//! Rendering of proposal names from target templates.
//!
//! Templates see `repository`, `owner`, `name`, `sha` and `short_sha`.
//! Rendering is strict: an unknown variable is an error rather than an empty
//! string, so a typo in configuration cannot produce an empty image tag.

use crate::reconcile::domain::{
    CommitSha, ImageEdit, ManagedTarget, PullRequestIntent, ReconcileDomainError,
    RepositoryFullName,
};
use minijinja::{Environment, UndefinedBehavior};
use serde_json::{Map, Value};
use thiserror::Error;

const SAMPLE_SHA: &str = "0123456789abcdef0123456789abcdef01234567";

/// Errors returned while naming a proposal.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NamingError {
    /// A template failed to render.
    #[error("failed to render template '{template}': {reason}")]
    Render {
        /// Template source.
        template: String,
        /// Renderer diagnostic.
        reason: String,
    },

    /// A rendered name is not a valid domain value.
    #[error(transparent)]
    Domain(#[from] ReconcileDomainError),
}

/// Renders `template` for `repository` at `sha`.
///
/// # Errors
///
/// Returns [`NamingError::Render`] when the template is malformed, refers to
/// an unknown variable, or renders to an empty string.
pub fn render_name(
    template: &str,
    repository: &RepositoryFullName,
    sha: &CommitSha,
) -> Result<String, NamingError> {
    let mut environment = Environment::new();
    environment.set_undefined_behavior(UndefinedBehavior::Strict);
    let rendered = environment
        .render_str(template, naming_context(repository, sha))
        .map_err(|error| NamingError::Render {
            template: template.to_owned(),
            reason: error.to_string(),
        })?;
    let trimmed = rendered.trim();
    if trimmed.is_empty() {
        return Err(NamingError::Render {
            template: template.to_owned(),
            reason: "rendered to an empty string".to_owned(),
        });
    }
    Ok(trimmed.to_owned())
}

/// Checks that `template` renders for a sample commit of `repository`.
///
/// # Errors
///
/// Returns [`NamingError`] under the same conditions as [`render_name`].
pub fn validate_template(
    template: &str,
    repository: &RepositoryFullName,
) -> Result<(), NamingError> {
    let sample = CommitSha::new(SAMPLE_SHA)?;
    render_name(template, repository, &sample).map(|_| ())
}

/// Builds the proposal for `target` at the accepted `head`.
///
/// The branch is `prefix + short_sha`; the commit message and every image
/// tag come from the target templates, so the whole intent is a pure
/// function of the target and the head commit.
///
/// # Errors
///
/// Returns [`NamingError`] when a template fails or the branch name is
/// invalid.
pub fn build_intent(
    target: &ManagedTarget,
    head: &CommitSha,
) -> Result<PullRequestIntent, NamingError> {
    let repository = target.repository();
    let short_sha = head.short();
    let branch = target.branch_prefix().branch_for(&short_sha)?;
    let commit_message = render_name(target.commit_message_template(), repository, head)?;
    let tag = render_name(target.tag_template(), repository, head)?;

    let intent = target.images().iter().fold(
        PullRequestIntent::new(branch, short_sha, commit_message),
        |intent, update| {
            intent.with_edit(ImageEdit::new(update.overlay(), update.image().tagged(&tag)))
        },
    );
    Ok(intent)
}

fn naming_context(repository: &RepositoryFullName, sha: &CommitSha) -> Map<String, Value> {
    let mut context = Map::new();
    context.insert(
        "repository".to_owned(),
        Value::String(repository.as_str().to_owned()),
    );
    context.insert(
        "owner".to_owned(),
        Value::String(repository.owner().to_owned()),
    );
    context.insert("name".to_owned(), Value::String(repository.name().to_owned()));
    context.insert("sha".to_owned(), Value::String(sha.as_str().to_owned()));
    context.insert(
        "short_sha".to_owned(),
        Value::String(sha.short().as_str().to_owned()),
    );
    context
}

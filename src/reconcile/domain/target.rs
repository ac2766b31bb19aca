//! Managed target definitions.

use super::{BranchName, BranchPrefix, CheckSource, ReconcileDomainError, RepositoryFullName};
use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default template for the image tag written into the manifests.
pub const DEFAULT_TAG_TEMPLATE: &str = "sha-{{ short_sha }}";

/// Default template for the commit message and pull-request title.
pub const DEFAULT_COMMIT_MESSAGE_TEMPLATE: &str = "Update {{ repository }} to {{ short_sha }}";

/// Container image repository reference without tag or digest.
///
/// A registry host may carry a port (`registry.local:5000/app`); only a colon
/// after the final path segment counts as a tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ImageName(String);

impl ImageName {
    /// Creates a validated image name.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileDomainError::InvalidImageName`] when the value is
    /// empty, contains whitespace, or already carries a tag or digest.
    pub fn new(value: impl Into<String>) -> Result<Self, ReconcileDomainError> {
        let raw = value.into();
        let normalized = raw.trim();
        let last_segment = normalized.rsplit('/').next().unwrap_or_default();
        let is_valid = !normalized.is_empty()
            && !last_segment.is_empty()
            && !last_segment.contains(':')
            && !normalized.contains('@')
            && !normalized.chars().any(char::is_whitespace);

        if !is_valid {
            return Err(ReconcileDomainError::InvalidImageName(raw));
        }
        Ok(Self(normalized.to_owned()))
    }

    /// Returns the full image reference for `tag`.
    #[must_use]
    pub fn tagged(&self, tag: &str) -> String {
        format!("{}:{tag}", self.0)
    }

    /// Returns the image name as `str`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ImageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ImageName {
    type Error = ReconcileDomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ImageName> for String {
    fn from(value: ImageName) -> Self {
        value.0
    }
}

/// One image reference rewritten in one overlay directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ImageUpdateFields")]
pub struct ImageUpdate {
    image: ImageName,
    overlay: Utf8PathBuf,
}

#[derive(Deserialize)]
struct ImageUpdateFields {
    image: ImageName,
    overlay: Utf8PathBuf,
}

impl TryFrom<ImageUpdateFields> for ImageUpdate {
    type Error = ReconcileDomainError;

    fn try_from(fields: ImageUpdateFields) -> Result<Self, Self::Error> {
        Self::new(fields.image, fields.overlay)
    }
}

impl ImageUpdate {
    /// Creates an image update.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileDomainError::InvalidOverlayPath`] when the overlay
    /// is absolute, empty, or climbs out of the repository root.
    pub fn new(image: ImageName, overlay: impl Into<Utf8PathBuf>) -> Result<Self, ReconcileDomainError> {
        let path = overlay.into();
        if !is_contained(&path) {
            return Err(ReconcileDomainError::InvalidOverlayPath(path.into_string()));
        }
        Ok(Self {
            image,
            overlay: path,
        })
    }

    /// Returns the image to rewrite.
    #[must_use]
    pub const fn image(&self) -> &ImageName {
        &self.image
    }

    /// Returns the overlay directory relative to the manifest repository root.
    #[must_use]
    pub fn overlay(&self) -> &Utf8Path {
        &self.overlay
    }
}

fn is_contained(path: &Utf8Path) -> bool {
    let mut has_normal = false;
    for component in path.components() {
        match component {
            Utf8Component::Normal(_) => has_normal = true,
            Utf8Component::CurDir => {}
            Utf8Component::ParentDir | Utf8Component::RootDir | Utf8Component::Prefix(_) => {
                return false;
            }
        }
    }
    has_normal
}

/// Author and committer identity used for automated commits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitIdentity {
    name: String,
    email: String,
}

impl CommitIdentity {
    /// Creates a commit identity.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileDomainError::InvalidCommitIdentity`] when either
    /// field is empty after trimming.
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Result<Self, ReconcileDomainError> {
        let name_value = name.into().trim().to_owned();
        let email_value = email.into().trim().to_owned();
        if name_value.is_empty() || email_value.is_empty() {
            return Err(ReconcileDomainError::InvalidCommitIdentity);
        }
        Ok(Self {
            name: name_value,
            email: email_value,
        })
    }

    /// Builds the identity the hosting platform attributes to an app's bot
    /// user.
    ///
    /// # Examples
    ///
    ///     use manifest_reconciler::reconcile::domain::CommitIdentity;
    ///
    ///     let bot = CommitIdentity::app_bot("mischan-bot", 41898282).expect("valid");
    ///     assert_eq!(bot.name(), "mischan-bot[bot]");
    ///     assert_eq!(bot.email(), "41898282+mischan-bot[bot]@users.noreply.github.com");
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileDomainError::InvalidCommitIdentity`] when the slug
    /// is empty.
    pub fn app_bot(slug: &str, user_id: u64) -> Result<Self, ReconcileDomainError> {
        let trimmed = slug.trim();
        if trimmed.is_empty() {
            return Err(ReconcileDomainError::InvalidCommitIdentity);
        }
        Self::new(
            format!("{trimmed}[bot]"),
            format!("{user_id}+{trimmed}[bot]@users.noreply.github.com"),
        )
    }

    /// Returns the display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the email address.
    #[must_use]
    pub fn email(&self) -> &str {
        &self.email
    }
}

/// One application repository under reconciliation.
///
/// Built once from static configuration and immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedTarget {
    repository: RepositoryFullName,
    target_branch: BranchName,
    branch_prefix: BranchPrefix,
    check_source: CheckSource,
    images: Vec<ImageUpdate>,
    tag_template: String,
    commit_message_template: String,
    committer: Option<CommitIdentity>,
}

impl ManagedTarget {
    /// Creates a target with default templates and check source.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileDomainError::NoImageUpdates`] when `images` is
    /// empty.
    pub fn new(
        repository: RepositoryFullName,
        target_branch: BranchName,
        branch_prefix: BranchPrefix,
        images: Vec<ImageUpdate>,
    ) -> Result<Self, ReconcileDomainError> {
        if images.is_empty() {
            return Err(ReconcileDomainError::NoImageUpdates(repository.into()));
        }
        Ok(Self {
            repository,
            target_branch,
            branch_prefix,
            check_source: CheckSource::default(),
            images,
            tag_template: DEFAULT_TAG_TEMPLATE.to_owned(),
            commit_message_template: DEFAULT_COMMIT_MESSAGE_TEMPLATE.to_owned(),
            committer: None,
        })
    }

    /// Selects which hosting query gates readiness.
    #[must_use]
    pub const fn with_check_source(mut self, check_source: CheckSource) -> Self {
        self.check_source = check_source;
        self
    }

    /// Overrides the image tag template.
    #[must_use]
    pub fn with_tag_template(mut self, template: impl Into<String>) -> Self {
        self.tag_template = template.into();
        self
    }

    /// Overrides the commit message and pull-request title template.
    #[must_use]
    pub fn with_commit_message_template(mut self, template: impl Into<String>) -> Self {
        self.commit_message_template = template.into();
        self
    }

    /// Overrides the manifest-wide committer for this target.
    #[must_use]
    pub fn with_committer(mut self, committer: CommitIdentity) -> Self {
        self.committer = Some(committer);
        self
    }

    /// Returns the repository full name used as the registry key.
    #[must_use]
    pub const fn repository(&self) -> &RepositoryFullName {
        &self.repository
    }

    /// Returns the release branch whose checks gate reconciliation.
    #[must_use]
    pub const fn target_branch(&self) -> &BranchName {
        &self.target_branch
    }

    /// Returns the prefix marking this target's proposal branches.
    #[must_use]
    pub const fn branch_prefix(&self) -> &BranchPrefix {
        &self.branch_prefix
    }

    /// Returns the check source gating readiness.
    #[must_use]
    pub const fn check_source(&self) -> CheckSource {
        self.check_source
    }

    /// Returns the image updates applied per run.
    #[must_use]
    pub fn images(&self) -> &[ImageUpdate] {
        &self.images
    }

    /// Returns the image tag template.
    #[must_use]
    pub fn tag_template(&self) -> &str {
        &self.tag_template
    }

    /// Returns the commit message template.
    #[must_use]
    pub fn commit_message_template(&self) -> &str {
        &self.commit_message_template
    }

    /// Returns the committer override, if any.
    #[must_use]
    pub const fn committer(&self) -> Option<&CommitIdentity> {
        self.committer.as_ref()
    }
}

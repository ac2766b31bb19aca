//! Static configuration: manifest coordinates, hosting endpoints and
//! managed targets.
//!
//! The file is JSON. Every value is validated into domain types when the
//! file is loaded, so a process never starts with a target it cannot name
//! proposals for.

use crate::reconcile::{
    adapters::{DEFAULT_GIT_BINARY, DEFAULT_KUSTOMIZE_BINARY, github::DEFAULT_API_BASE},
    domain::{
        BranchName, BranchPrefix, CheckSource, CommitIdentity, ImageName, ImageUpdate,
        InstallationId, ManagedTarget, ReconcileDomainError, RepositoryFullName,
    },
    services::{
        DEFAULT_MAX_CONCURRENT_RUNS, DEFAULT_RUN_TIMEOUT, ManifestCoordinates, NamingError,
        validate_template,
    },
};
use camino::Utf8Path;
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;
use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;
use thiserror::Error;

/// Public GitHub web endpoint used for cloning.
pub const DEFAULT_GIT_BASE: &str = "https://github.com";

const DEFAULT_BASE_BRANCH: &str = "master";
const DEFAULT_INSTALLATION_ID: u64 = 1;

/// Errors returned while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read configuration {path}: {source}")]
    Read {
        /// Path that was read.
        path: String,
        /// I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The document is not valid configuration JSON.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    /// A value failed domain validation.
    #[error("invalid {field}: {source}")]
    Invalid {
        /// Dotted path of the offending value.
        field: String,
        /// Validation error.
        #[source]
        source: ReconcileDomainError,
    },

    /// A target template does not render.
    #[error("invalid {field}: {source}")]
    Template {
        /// Dotted path of the offending template.
        field: String,
        /// Rendering error.
        #[source]
        source: NamingError,
    },

    /// Two targets share a repository.
    #[error("target {0} is configured more than once")]
    DuplicateTarget(String),

    /// A limit is zero.
    #[error("{0} must be greater than zero")]
    ZeroLimit(&'static str),
}

/// Top-level configuration document.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Manifest repository proposals are opened against.
    pub manifest: ManifestConfig,
    /// Hosting platform endpoints.
    #[serde(default)]
    pub github: GitHubConfig,
    /// Budget for one reconciliation run, in seconds.
    #[serde(default = "default_run_timeout_secs")]
    pub run_timeout_secs: u64,
    /// Runs executing at once.
    #[serde(default = "default_max_concurrent_runs")]
    pub max_concurrent_runs: usize,
    /// Manifest editing program.
    #[serde(default = "default_kustomize_binary")]
    pub kustomize_binary: String,
    /// Version-control program.
    #[serde(default = "default_git_binary")]
    pub git_binary: String,
    /// Managed targets.
    #[serde(default)]
    pub targets: Vec<TargetConfig>,
}

/// Manifest repository section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ManifestConfig {
    /// Repository as `owner/name`.
    pub repository: String,
    /// Branch proposals are based on.
    #[serde(default = "default_base_branch")]
    pub base_branch: String,
    /// Default commit identity.
    pub committer: CommitterConfig,
}

/// Commit identity, either explicit or derived from an app's bot user.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum CommitterConfig {
    /// Explicit name and email.
    Explicit {
        /// Display name.
        name: String,
        /// Email address.
        email: String,
    },
    /// The bot user of an installed app.
    AppBot {
        /// App slug.
        app_slug: String,
        /// Numeric id of the app's bot user.
        user_id: u64,
    },
}

impl CommitterConfig {
    /// Validates the identity.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileDomainError::InvalidCommitIdentity`] when a field
    /// is empty.
    pub fn identity(&self) -> Result<CommitIdentity, ReconcileDomainError> {
        match self {
            Self::Explicit { name, email } => CommitIdentity::new(name.as_str(), email.as_str()),
            Self::AppBot { app_slug, user_id } => CommitIdentity::app_bot(app_slug, *user_id),
        }
    }
}

/// Hosting platform section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GitHubConfig {
    /// REST API base URL.
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Base URL repositories are cloned from.
    #[serde(default = "default_git_base")]
    pub git_base: String,
    /// Installation reported for repositories when events carry none.
    #[serde(default)]
    pub installation_id: Option<u64>,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            git_base: default_git_base(),
            installation_id: None,
        }
    }
}

/// One managed target.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetConfig {
    /// Repository as `owner/name`.
    pub repository: String,
    /// Release branch whose checks gate reconciliation.
    pub target_branch: String,
    /// Prefix of proposal branches.
    pub branch_prefix: String,
    /// Which checks gate readiness.
    #[serde(default)]
    pub check_source: CheckSource,
    /// Images rewritten per run.
    pub images: Vec<ImageConfig>,
    /// Image tag template.
    #[serde(default)]
    pub tag_template: Option<String>,
    /// Commit message and pull-request title template.
    #[serde(default)]
    pub commit_message: Option<String>,
    /// Committer override.
    #[serde(default)]
    pub committer: Option<CommitterConfig>,
}

/// One image rewritten in one overlay.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImageConfig {
    /// Image repository without tag.
    pub name: String,
    /// Overlay directory relative to the manifest repository root.
    pub overlay: String,
}

impl TryFrom<&TargetConfig> for ManagedTarget {
    type Error = ConfigError;

    fn try_from(config: &TargetConfig) -> Result<Self, Self::Error> {
        let field = |name: &str| format!("targets[{}].{name}", config.repository);
        let repository = RepositoryFullName::new(config.repository.as_str())
            .map_err(invalid("targets[].repository".to_owned()))?;
        let target_branch = BranchName::new(config.target_branch.as_str())
            .map_err(invalid(field("target_branch")))?;
        let branch_prefix = BranchPrefix::new(config.branch_prefix.as_str())
            .map_err(invalid(field("branch_prefix")))?;

        let mut images = Vec::with_capacity(config.images.len());
        for image in &config.images {
            let name = ImageName::new(image.name.as_str()).map_err(invalid(field("images.name")))?;
            let update = ImageUpdate::new(name, image.overlay.as_str())
                .map_err(invalid(field("images.overlay")))?;
            images.push(update);
        }

        let mut target = Self::new(repository, target_branch, branch_prefix, images)
            .map_err(invalid(field("images")))?
            .with_check_source(config.check_source);
        if let Some(template) = &config.tag_template {
            validate_template(template, target.repository())
                .map_err(template_error(field("tag_template")))?;
            target = target.with_tag_template(template.as_str());
        }
        if let Some(template) = &config.commit_message {
            validate_template(template, target.repository())
                .map_err(template_error(field("commit_message")))?;
            target = target.with_commit_message_template(template.as_str());
        }
        if let Some(committer) = &config.committer {
            let identity = committer
                .identity()
                .map_err(invalid(field("committer")))?;
            target = target.with_committer(identity);
        }
        Ok(target)
    }
}

impl AppConfig {
    /// Reads and validates the configuration file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file cannot be read, parsed or
    /// validated.
    pub fn load(path: &Utf8Path) -> Result<Self, ConfigError> {
        let read_error = |source| ConfigError::Read {
            path: path.to_string(),
            source,
        };
        let parent = path
            .parent()
            .filter(|dir| !dir.as_str().is_empty())
            .unwrap_or_else(|| Utf8Path::new("."));
        let file_name = path.file_name().ok_or_else(|| {
            read_error(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "path has no file name",
            ))
        })?;

        let dir = Dir::open_ambient_dir(parent, ambient_authority()).map_err(read_error)?;
        let text = dir.read_to_string(file_name).map_err(read_error)?;
        Self::from_json(&text)
    }

    /// Parses and validates a configuration document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the document is malformed or any value
    /// is invalid.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.run_timeout_secs == 0 {
            return Err(ConfigError::ZeroLimit("run_timeout_secs"));
        }
        if self.max_concurrent_runs == 0 {
            return Err(ConfigError::ZeroLimit("max_concurrent_runs"));
        }
        self.manifest_coordinates()?;
        self.installation_id()?;
        self.managed_targets()?;
        Ok(())
    }

    /// Returns the validated manifest coordinates.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when a manifest value is invalid.
    pub fn manifest_coordinates(&self) -> Result<ManifestCoordinates, ConfigError> {
        let repository = RepositoryFullName::new(self.manifest.repository.as_str())
            .map_err(invalid("manifest.repository".to_owned()))?;
        let base_branch = BranchName::new(self.manifest.base_branch.as_str())
            .map_err(invalid("manifest.base_branch".to_owned()))?;
        let committer = self
            .manifest
            .committer
            .identity()
            .map_err(invalid("manifest.committer".to_owned()))?;
        Ok(ManifestCoordinates::new(repository, base_branch, committer))
    }

    /// Returns the validated targets in file order.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a target is invalid or a repository is
    /// configured twice.
    pub fn managed_targets(&self) -> Result<Vec<ManagedTarget>, ConfigError> {
        let mut seen = HashSet::new();
        let mut targets = Vec::with_capacity(self.targets.len());
        for config in &self.targets {
            let target = ManagedTarget::try_from(config)?;
            if !seen.insert(target.repository().clone()) {
                return Err(ConfigError::DuplicateTarget(config.repository.clone()));
            }
            targets.push(target);
        }
        Ok(targets)
    }

    /// Returns the installation reported for repositories.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the configured id is zero.
    pub fn installation_id(&self) -> Result<InstallationId, ConfigError> {
        InstallationId::new(self.github.installation_id.unwrap_or(DEFAULT_INSTALLATION_ID))
            .map_err(invalid("github.installation_id".to_owned()))
    }

    /// Returns the run budget.
    #[must_use]
    pub const fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout_secs)
    }
}

fn invalid(field: String) -> impl FnOnce(ReconcileDomainError) -> ConfigError {
    move |source| ConfigError::Invalid { field, source }
}

fn template_error(field: String) -> impl FnOnce(NamingError) -> ConfigError {
    move |source| ConfigError::Template { field, source }
}

fn default_base_branch() -> String {
    DEFAULT_BASE_BRANCH.to_owned()
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_owned()
}

fn default_git_base() -> String {
    DEFAULT_GIT_BASE.to_owned()
}

const fn default_run_timeout_secs() -> u64 {
    DEFAULT_RUN_TIMEOUT.as_secs()
}

const fn default_max_concurrent_runs() -> usize {
    DEFAULT_MAX_CONCURRENT_RUNS
}

fn default_kustomize_binary() -> String {
    DEFAULT_KUSTOMIZE_BINARY.to_owned()
}

fn default_git_binary() -> String {
    DEFAULT_GIT_BINARY.to_owned()
}

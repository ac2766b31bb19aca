//! Error types for reconciliation domain validation and parsing.

use thiserror::Error;

/// Errors returned while constructing reconciliation domain values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReconcileDomainError {
    /// The repository name does not follow `owner/repo` format.
    #[error("invalid repository name '{0}', expected owner/repo")]
    InvalidRepository(String),

    /// The installation identifier is zero.
    #[error("invalid installation id {0}, expected a positive integer")]
    InvalidInstallationId(u64),

    /// The commit hash is too short or contains non-hex characters.
    #[error("invalid commit sha '{0}', expected at least 7 hexadecimal characters")]
    InvalidCommitSha(String),

    /// The branch name violates Git ref-name rules.
    #[error("invalid branch name '{0}'")]
    InvalidBranchName(String),

    /// The branch prefix is empty, lacks a trailing `/`, or violates Git
    /// ref-name rules.
    #[error("invalid branch prefix '{0}'")]
    InvalidBranchPrefix(String),

    /// The pull request number is zero.
    #[error("invalid pull request number {0}, expected a positive integer")]
    InvalidPullRequestNumber(u64),

    /// The image name is empty or carries a tag or digest.
    #[error("invalid image name '{0}', expected a repository reference without tag")]
    InvalidImageName(String),

    /// The overlay directory escapes the working copy.
    #[error("invalid overlay path '{0}', expected a relative path inside the manifest repository")]
    InvalidOverlayPath(String),

    /// A target declares no image updates.
    #[error("target {0} declares no image updates")]
    NoImageUpdates(String),

    /// A committer name or email is empty after trimming.
    #[error("commit identity requires a non-empty name and email")]
    InvalidCommitIdentity,

    /// Transitioning between two run phases is invalid.
    #[error("invalid run phase transition: {from} -> {to}")]
    InvalidPhaseTransition {
        /// Current run phase.
        from: String,
        /// Requested run phase.
        to: String,
    },
}

/// Error returned while parsing check status or conclusion strings.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown check state: {0}")]
pub struct ParseCheckStateError(pub String);

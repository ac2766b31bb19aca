//! Identifier and validated scalar types for the reconciliation domain.

use super::ReconcileDomainError;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Number of leading hash characters used for deterministic naming.
pub const SHORT_SHA_LEN: usize = 7;

/// Longest accepted commit hash (SHA-256 object format).
const MAX_SHA_LEN: usize = 64;

/// Unique identifier for one reconciliation run, used for log correlation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(Uuid);

impl RunId {
    /// Creates a new random run identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the wrapped UUID.
    #[must_use]
    pub const fn into_inner(self) -> Uuid {
        self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Normalized repository identifier in `owner/repo` format.
///
/// # Examples
///
///     use manifest_reconciler::reconcile::domain::RepositoryFullName;
///
///     let repo = RepositoryFullName::new("MISW/Portal").expect("valid");
///     assert_eq!(repo.owner(), "MISW");
///     assert_eq!(repo.name(), "Portal");
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RepositoryFullName(String);

impl RepositoryFullName {
    /// Creates a validated repository name.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileDomainError::InvalidRepository`] if the value does
    /// not contain exactly one slash-delimited owner and repository segment.
    pub fn new(value: impl Into<String>) -> Result<Self, ReconcileDomainError> {
        let raw = value.into();
        let normalized = raw.trim();
        let mut segments = normalized.split('/');
        let owner = segments.next().unwrap_or_default();
        let repo = segments.next().unwrap_or_default();
        let has_more_segments = segments.next().is_some();
        let is_valid = !owner.is_empty()
            && !repo.is_empty()
            && !has_more_segments
            && !normalized.chars().any(char::is_whitespace);

        if !is_valid {
            return Err(ReconcileDomainError::InvalidRepository(raw));
        }

        Ok(Self(normalized.to_owned()))
    }

    /// Returns the owning namespace.
    #[must_use]
    pub fn owner(&self) -> &str {
        self.0.split_once('/').map_or("", |(owner, _)| owner)
    }

    /// Returns the repository name without its namespace.
    #[must_use]
    pub fn name(&self) -> &str {
        self.0.split_once('/').map_or("", |(_, name)| name)
    }

    /// Returns the repository name as `str`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for RepositoryFullName {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for RepositoryFullName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for RepositoryFullName {
    type Error = ReconcileDomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<RepositoryFullName> for String {
    fn from(value: RepositoryFullName) -> Self {
        value.0
    }
}

/// Hosting-platform installation scope granting access to repositories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstallationId(u64);

impl InstallationId {
    /// Creates a validated installation identifier.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileDomainError::InvalidInstallationId`] when the value
    /// is zero.
    pub const fn new(value: u64) -> Result<Self, ReconcileDomainError> {
        if value == 0 {
            return Err(ReconcileDomainError::InvalidInstallationId(value));
        }
        Ok(Self(value))
    }

    /// Returns the underlying numeric value.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for InstallationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Full commit hash, lowercased.
///
/// # Examples
///
///     use manifest_reconciler::reconcile::domain::CommitSha;
///
///     let sha = CommitSha::new("ABC1234DEF5678ABC1234DEF5678ABC1234DEF56").expect("valid");
///     assert_eq!(sha.short().as_str(), "abc1234");
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CommitSha(String);

impl CommitSha {
    /// Creates a validated commit hash.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileDomainError::InvalidCommitSha`] when the value is
    /// shorter than seven characters, longer than 64, or not hexadecimal.
    pub fn new(value: impl Into<String>) -> Result<Self, ReconcileDomainError> {
        let raw = value.into();
        let normalized = raw.trim().to_ascii_lowercase();
        let has_valid_length = (SHORT_SHA_LEN..=MAX_SHA_LEN).contains(&normalized.len());
        let is_hex = normalized.chars().all(|c| c.is_ascii_hexdigit());

        if !has_valid_length || !is_hex {
            return Err(ReconcileDomainError::InvalidCommitSha(raw));
        }

        Ok(Self(normalized))
    }

    /// Returns the first seven characters of the hash.
    #[must_use]
    pub fn short(&self) -> ShortSha {
        ShortSha(self.0.chars().take(SHORT_SHA_LEN).collect())
    }

    /// Returns the hash as `str`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CommitSha {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for CommitSha {
    type Error = ReconcileDomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<CommitSha> for String {
    fn from(value: CommitSha) -> Self {
        value.0
    }
}

/// Seven-character commit prefix used in branch names and titles.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShortSha(String);

impl ShortSha {
    /// Returns the short hash as `str`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ShortSha {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Positive pull request number on the hosting platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PullRequestNumber(u64);

impl PullRequestNumber {
    /// Creates a validated pull request number.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileDomainError::InvalidPullRequestNumber`] when the
    /// value is zero.
    pub const fn new(value: u64) -> Result<Self, ReconcileDomainError> {
        if value == 0 {
            return Err(ReconcileDomainError::InvalidPullRequestNumber(value));
        }
        Ok(Self(value))
    }

    /// Returns the underlying numeric value.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for PullRequestNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

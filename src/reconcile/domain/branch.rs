//! Branch-name value objects and deterministic proposal naming.

use super::{ReconcileDomainError, ShortSha};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum length for a validated branch name.
const MAX_BRANCH_NAME_LENGTH: usize = 200;

/// Characters Git forbids anywhere in a ref name.
const FORBIDDEN_REF_CHARS: [char; 7] = ['~', '^', ':', '?', '*', '[', '\\'];

/// Validated Git branch name (without the `refs/heads/` prefix).
///
/// # Examples
///
///     use manifest_reconciler::reconcile::domain::BranchName;
///
///     let name = BranchName::new("reconciler/misw/portal/abc1234").expect("valid");
///     assert_eq!(name.as_str(), "reconciler/misw/portal/abc1234");
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BranchName(String);

impl BranchName {
    /// Creates a validated branch name.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileDomainError::InvalidBranchName`] when the value
    /// is empty, exceeds the length limit, or breaks Git ref-name rules.
    pub fn new(value: impl Into<String>) -> Result<Self, ReconcileDomainError> {
        let raw = value.into();
        let normalized = raw.trim();

        if normalized.len() > MAX_BRANCH_NAME_LENGTH || !is_valid_ref_fragment(normalized) {
            return Err(ReconcileDomainError::InvalidBranchName(raw));
        }
        if normalized.ends_with('/') || normalized.ends_with('.') {
            return Err(ReconcileDomainError::InvalidBranchName(raw));
        }

        Ok(Self(normalized.to_owned()))
    }

    /// Extracts a branch name from a fully qualified `refs/heads/...` ref.
    ///
    /// Returns `None` for tags and other ref namespaces.
    #[must_use]
    pub fn from_qualified_ref(git_ref: &str) -> Option<Self> {
        git_ref
            .strip_prefix("refs/heads/")
            .and_then(|name| Self::new(name).ok())
    }

    /// Returns the fully qualified ref (`refs/heads/<name>`).
    #[must_use]
    pub fn qualified(&self) -> String {
        format!("refs/heads/{}", self.0)
    }

    /// Returns the branch name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for BranchName {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for BranchName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for BranchName {
    type Error = ReconcileDomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<BranchName> for String {
    fn from(value: BranchName) -> Self {
        value.0
    }
}

/// Branch-name prefix marking pull requests opened for one target.
///
/// Every proposal branch is `prefix + short_sha`, so repeated runs against
/// the same head always name the same branch, and retirement can find all
/// earlier proposals with a plain prefix match.
///
/// # Examples
///
///     use manifest_reconciler::reconcile::domain::{BranchPrefix, CommitSha};
///
///     let prefix = BranchPrefix::new("reconciler/misw/portal/").expect("valid");
///     let sha = CommitSha::new("abc1234def5678abc1234def5678abc1234def56").expect("valid");
///     let branch = prefix.branch_for(&sha.short()).expect("valid branch");
///     assert_eq!(branch.as_str(), "reconciler/misw/portal/abc1234");
///     assert!(prefix.marks(branch.as_str()));
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BranchPrefix(String);

impl BranchPrefix {
    /// Creates a validated branch prefix.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileDomainError::InvalidBranchPrefix`] when the value is
    /// empty, does not end in `/`, or contains characters Git forbids in ref
    /// names. The trailing `/` keeps `bot/portal/` from marking branches
    /// under `bot/portal-x/`.
    pub fn new(value: impl Into<String>) -> Result<Self, ReconcileDomainError> {
        let raw = value.into();
        let normalized = raw.trim();

        if normalized.len() >= MAX_BRANCH_NAME_LENGTH
            || !normalized.ends_with('/')
            || !is_valid_ref_fragment(normalized)
        {
            return Err(ReconcileDomainError::InvalidBranchPrefix(raw));
        }

        Ok(Self(normalized.to_owned()))
    }

    /// Builds the proposal branch for a short commit identifier.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileDomainError::InvalidBranchName`] when the combined
    /// name breaks Git ref-name rules.
    pub fn branch_for(&self, short_sha: &ShortSha) -> Result<BranchName, ReconcileDomainError> {
        BranchName::new(format!("{}{}", self.0, short_sha))
    }

    /// Returns `true` when a head branch was created under this prefix.
    #[must_use]
    pub fn marks(&self, head_branch: &str) -> bool {
        head_branch.starts_with(&self.0)
    }

    /// Returns the prefix as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BranchPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for BranchPrefix {
    type Error = ReconcileDomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<BranchPrefix> for String {
    fn from(value: BranchPrefix) -> Self {
        value.0
    }
}

/// Checks the subset of `git check-ref-format` rules shared by names and
/// prefixes.
fn is_valid_ref_fragment(value: &str) -> bool {
    let has_forbidden_char = value
        .chars()
        .any(|c| c.is_whitespace() || c.is_control() || FORBIDDEN_REF_CHARS.contains(&c));

    !value.is_empty()
        && !has_forbidden_char
        && !value.starts_with('/')
        && !value.starts_with('-')
        && !value.contains("..")
        && !value.contains("//")
        && !value.contains("@{")
        && !value.ends_with(".lock")
}

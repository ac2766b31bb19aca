//! Working copies seeded from in-memory file sets.

use crate::reconcile::{
    domain::{BranchName, CommitIdentity, RepositoryFullName},
    ports::{RemoteSpec, WorkingCopy, WorkingCopyError, WorkingCopyProvider, WorkingCopyResult},
};
use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use tempfile::TempDir;

/// File contents keyed by `/`-separated path relative to the root.
pub type FileSet = BTreeMap<String, Vec<u8>>;

/// A branch pushed from a seeded working copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushRecord {
    /// Repository pushed to.
    pub repository: RepositoryFullName,
    /// Branch checked out at push time, if any.
    pub branch: Option<BranchName>,
    /// Message of the most recent commit.
    pub commit_message: Option<String>,
    /// Author of the most recent commit.
    pub author: Option<CommitIdentity>,
    /// Committed file contents.
    pub files: FileSet,
}

/// Provider materializing seeded files into temporary directories.
///
/// Each clone gets a fresh directory that disappears when the working copy is
/// dropped; the provider tracks how many copies are alive so tests can assert
/// cleanup on every exit path.
#[derive(Debug, Clone, Default)]
pub struct SeededWorkingCopyProvider {
    state: Arc<Mutex<ProviderState>>,
}

#[derive(Debug, Default)]
struct ProviderState {
    seeds: HashMap<RepositoryFullName, FileSet>,
    pushes: Vec<PushRecord>,
    clones: usize,
    live: usize,
    fail_push: bool,
}

fn lock(state: &Mutex<ProviderState>) -> WorkingCopyResult<MutexGuard<'_, ProviderState>> {
    state
        .lock()
        .map_err(|err| WorkingCopyError::io(std::io::Error::other(err.to_string())))
}

impl SeededWorkingCopyProvider {
    /// Creates a provider with no seeded repositories.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds `path` with `contents` in every future clone of `repository`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error when lock acquisition fails.
    pub fn seed_file(
        &self,
        repository: &RepositoryFullName,
        path: &str,
        contents: impl Into<Vec<u8>>,
    ) -> WorkingCopyResult<()> {
        lock(&self.state)?
            .seeds
            .entry(repository.clone())
            .or_default()
            .insert(path.to_owned(), contents.into());
        Ok(())
    }

    /// Makes every subsequent push fail.
    ///
    /// # Errors
    ///
    /// Returns an I/O error when lock acquisition fails.
    pub fn fail_pushes(&self) -> WorkingCopyResult<()> {
        lock(&self.state)?.fail_push = true;
        Ok(())
    }

    /// Returns every push recorded so far.
    ///
    /// # Errors
    ///
    /// Returns an I/O error when lock acquisition fails.
    pub fn pushes(&self) -> WorkingCopyResult<Vec<PushRecord>> {
        Ok(lock(&self.state)?.pushes.clone())
    }

    /// Returns how many clones were made.
    ///
    /// # Errors
    ///
    /// Returns an I/O error when lock acquisition fails.
    pub fn clone_count(&self) -> WorkingCopyResult<usize> {
        Ok(lock(&self.state)?.clones)
    }

    /// Returns how many working copies have not been dropped yet.
    ///
    /// # Errors
    ///
    /// Returns an I/O error when lock acquisition fails.
    pub fn live_copies(&self) -> WorkingCopyResult<usize> {
        Ok(lock(&self.state)?.live)
    }
}

#[async_trait]
impl WorkingCopyProvider for SeededWorkingCopyProvider {
    async fn clone_branch(
        &self,
        remote: &RemoteSpec,
        _base: &BranchName,
    ) -> WorkingCopyResult<Box<dyn WorkingCopy>> {
        let seeded = lock(&self.state)?
            .seeds
            .get(&remote.repository)
            .cloned()
            .unwrap_or_default();

        let dir = tempfile::Builder::new()
            .prefix("manifest-")
            .tempdir()
            .map_err(WorkingCopyError::io)?;
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).map_err(|path| {
            WorkingCopyError::io(std::io::Error::other(format!(
                "non UTF-8 temporary path {}",
                path.display()
            )))
        })?;
        write_files(&root, &seeded).map_err(WorkingCopyError::io)?;

        {
            let mut state = lock(&self.state)?;
            state.clones += 1;
            state.live += 1;
        }

        Ok(Box::new(SeededWorkingCopy {
            _dir: dir,
            root,
            repository: remote.repository.clone(),
            head: seeded,
            branch: None,
            last_commit: None,
            state: Arc::clone(&self.state),
        }))
    }
}

struct SeededWorkingCopy {
    _dir: TempDir,
    root: Utf8PathBuf,
    repository: RepositoryFullName,
    head: FileSet,
    branch: Option<BranchName>,
    last_commit: Option<(String, CommitIdentity)>,
    state: Arc<Mutex<ProviderState>>,
}

impl Drop for SeededWorkingCopy {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.lock() {
            state.live = state.live.saturating_sub(1);
        }
    }
}

#[async_trait]
impl WorkingCopy for SeededWorkingCopy {
    fn root(&self) -> &Utf8Path {
        &self.root
    }

    async fn checkout_new_branch(&mut self, branch: &BranchName) -> WorkingCopyResult<()> {
        self.branch = Some(branch.clone());
        Ok(())
    }

    async fn is_clean(&self) -> WorkingCopyResult<bool> {
        let current = read_files(&self.root).map_err(WorkingCopyError::io)?;
        Ok(current == self.head)
    }

    async fn commit_all(
        &mut self,
        message: &str,
        identity: &CommitIdentity,
    ) -> WorkingCopyResult<()> {
        self.head = read_files(&self.root).map_err(WorkingCopyError::io)?;
        self.last_commit = Some((message.to_owned(), identity.clone()));
        Ok(())
    }

    async fn push_branch(&mut self) -> WorkingCopyResult<()> {
        let branch = self.branch.clone().ok_or(WorkingCopyError::NoBranch)?;
        let mut state = lock(&self.state)?;
        if state.fail_push {
            return Err(WorkingCopyError::CommandFailed {
                operation: "push",
                output: "remote rejected push".to_owned(),
            });
        }
        let (commit_message, author) = self
            .last_commit
            .clone()
            .map_or((None, None), |(message, identity)| {
                (Some(message), Some(identity))
            });
        state.pushes.push(PushRecord {
            repository: self.repository.clone(),
            branch: Some(branch),
            commit_message,
            author,
            files: self.head.clone(),
        });
        Ok(())
    }
}

fn write_files(root: &Utf8Path, files: &FileSet) -> std::io::Result<()> {
    let dir = Dir::open_ambient_dir(root, ambient_authority())?;
    for (path, contents) in files {
        let parent = Utf8Path::new(path).parent().unwrap_or(Utf8Path::new(""));
        if !parent.as_str().is_empty() {
            dir.create_dir_all(parent)?;
        }
        dir.write(path, contents)?;
    }
    Ok(())
}

/// Reads every regular file below `root`.
fn read_files(root: &Utf8Path) -> std::io::Result<FileSet> {
    let dir = Dir::open_ambient_dir(root, ambient_authority())?;
    let mut files = FileSet::new();
    collect_files(&dir, "", &mut files)?;
    Ok(files)
}

fn collect_files(dir: &Dir, prefix: &str, files: &mut FileSet) -> std::io::Result<()> {
    for entry_result in dir.entries()? {
        let entry = entry_result?;
        let name = entry.file_name()?;
        let path = if prefix.is_empty() {
            name.clone()
        } else {
            format!("{prefix}/{name}")
        };
        if entry.file_type()?.is_dir() {
            collect_files(&entry.open_dir()?, &path, files)?;
        } else {
            files.insert(path, dir.read(&name)?);
        }
    }
    Ok(())
}

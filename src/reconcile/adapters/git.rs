//! Working copies backed by the `git` command-line client.

use crate::reconcile::{
    domain::{BranchName, CommitIdentity},
    ports::{
        InstallationToken, RemoteSpec, WorkingCopy, WorkingCopyError, WorkingCopyProvider,
        WorkingCopyResult,
    },
};
use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use tempfile::TempDir;
use tokio::process::Command;

/// Default program name resolved from `PATH`.
pub const DEFAULT_GIT_BINARY: &str = "git";

/// Clones over HTTPS with the installation token embedded in the remote URL.
///
/// A base without an `http(s)://` scheme is treated as a local directory of
/// bare repositories, which is how the tests drive this adapter.
#[derive(Debug, Clone)]
pub struct GitCliWorkingCopyProvider {
    program: String,
    remote_base: String,
}

impl GitCliWorkingCopyProvider {
    /// Creates a provider running `program` against `remote_base`
    /// (e.g. `https://github.com`).
    #[must_use]
    pub fn new(program: impl Into<String>, remote_base: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            remote_base: remote_base.into().trim_end_matches('/').to_owned(),
        }
    }

    fn remote_url(&self, remote: &RemoteSpec) -> String {
        match self.remote_base.split_once("://") {
            Some((scheme, host)) if scheme == "https" || scheme == "http" => format!(
                "{scheme}://x-access-token:{}@{host}/{}.git",
                remote.token.expose(),
                remote.repository
            ),
            _ => format!("{}/{}.git", self.remote_base, remote.repository),
        }
    }
}

#[async_trait]
impl WorkingCopyProvider for GitCliWorkingCopyProvider {
    async fn clone_branch(
        &self,
        remote: &RemoteSpec,
        base: &BranchName,
    ) -> WorkingCopyResult<Box<dyn WorkingCopy>> {
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

        let url = self.remote_url(remote);
        run_git(
            &GitInvocation {
                program: &self.program,
                cwd: &root,
                token: &remote.token,
                operation: "clone",
            },
            &[
                "clone",
                "--quiet",
                "--single-branch",
                "--branch",
                base.as_str(),
                &url,
                ".",
            ],
        )
        .await?;
        tracing::debug!(repository = %remote.repository, base = %base, root = %root, "cloned manifest repository");

        Ok(Box::new(GitCliWorkingCopy {
            _dir: dir,
            root,
            program: self.program.clone(),
            token: remote.token.clone(),
            branch: None,
        }))
    }
}

struct GitCliWorkingCopy {
    _dir: TempDir,
    root: Utf8PathBuf,
    program: String,
    token: InstallationToken,
    branch: Option<BranchName>,
}

impl GitCliWorkingCopy {
    async fn git(&self, operation: &'static str, args: &[&str]) -> WorkingCopyResult<String> {
        run_git(
            &GitInvocation {
                program: &self.program,
                cwd: &self.root,
                token: &self.token,
                operation,
            },
            args,
        )
        .await
    }
}

#[async_trait]
impl WorkingCopy for GitCliWorkingCopy {
    fn root(&self) -> &Utf8Path {
        &self.root
    }

    async fn checkout_new_branch(&mut self, branch: &BranchName) -> WorkingCopyResult<()> {
        self.git("checkout", &["checkout", "--quiet", "--force", "-B", branch.as_str()])
            .await?;
        self.branch = Some(branch.clone());
        Ok(())
    }

    async fn is_clean(&self) -> WorkingCopyResult<bool> {
        let status = self.git("status", &["status", "--porcelain"]).await?;
        Ok(status.trim().is_empty())
    }

    async fn commit_all(
        &mut self,
        message: &str,
        identity: &CommitIdentity,
    ) -> WorkingCopyResult<()> {
        self.git("add", &["add", "--all"]).await?;
        let name = format!("user.name={}", identity.name());
        let email = format!("user.email={}", identity.email());
        self.git(
            "commit",
            &["-c", &name, "-c", &email, "commit", "--quiet", "-m", message],
        )
        .await
        .map(|_| ())
    }

    async fn push_branch(&mut self) -> WorkingCopyResult<()> {
        let branch = self.branch.as_ref().ok_or(WorkingCopyError::NoBranch)?;
        let refspec = format!("+refs/heads/{branch}:refs/heads/{branch}");
        self.git("push", &["push", "--quiet", "origin", &refspec])
            .await
            .map(|_| ())
    }
}

struct GitInvocation<'a> {
    program: &'a str,
    cwd: &'a Utf8Path,
    token: &'a InstallationToken,
    operation: &'static str,
}

async fn run_git(invocation: &GitInvocation<'_>, args: &[&str]) -> WorkingCopyResult<String> {
    let output = Command::new(invocation.program)
        .args(args)
        .current_dir(invocation.cwd)
        .env("GIT_TERMINAL_PROMPT", "0")
        .kill_on_drop(true)
        .output()
        .await
        .map_err(WorkingCopyError::io)?;

    if !output.status.success() {
        let mut captured = String::from_utf8_lossy(&output.stderr).into_owned();
        captured.push_str(&String::from_utf8_lossy(&output.stdout));
        return Err(WorkingCopyError::CommandFailed {
            operation: invocation.operation,
            output: invocation.token.redact(captured.trim()),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

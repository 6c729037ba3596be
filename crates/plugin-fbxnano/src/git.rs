use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::{error::CommandFailure, process::run_in};

/// The version-control queries the deployment workflow relies on.
#[async_trait]
pub trait Vcs: Send + Sync {
    /// Short name of the checked-out branch; fails when HEAD is detached.
    async fn current_branch(&self, dir: &Path) -> Result<String, CommandFailure>;
    /// Tag pointing exactly at HEAD.
    async fn exact_tag(&self, dir: &Path) -> Result<String, CommandFailure>;
    /// Every local tag, oldest first.
    async fn tags(&self, dir: &Path) -> Result<Vec<String>, CommandFailure>;
    async fn fetch_all(&self, dir: &Path) -> Result<(), CommandFailure>;
    async fn force_checkout(&self, dir: &Path, tag: &str) -> Result<(), CommandFailure>;
}

/// [`Vcs`] backed by the `git` executable.
#[derive(Debug, Clone)]
pub struct GitCli {
    program: PathBuf,
}

impl Default for GitCli {
    fn default() -> Self {
        Self::new("git")
    }
}

impl GitCli {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    async fn git(&self, dir: &Path, args: &[&str]) -> Result<String, CommandFailure> {
        run_in(dir, self.program.as_os_str(), args).await
    }
}

#[async_trait]
impl Vcs for GitCli {
    async fn current_branch(&self, dir: &Path) -> Result<String, CommandFailure> {
        self.git(dir, &["symbolic-ref", "--short", "-q", "HEAD"]).await
    }

    async fn exact_tag(&self, dir: &Path) -> Result<String, CommandFailure> {
        self.git(dir, &["describe", "--tags", "--exact-match", "HEAD"])
            .await
    }

    /// Sorted by creator date. Lightweight tags take their commit's date, so
    /// tags on one commit (or on commits from the same second) tie and are
    /// then ordered by refname.
    async fn tags(&self, dir: &Path) -> Result<Vec<String>, CommandFailure> {
        let out = self
            .git(dir, &["tag", "--list", "--sort=creatordate"])
            .await?;
        Ok(out
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(ToOwned::to_owned)
            .collect())
    }

    async fn fetch_all(&self, dir: &Path) -> Result<(), CommandFailure> {
        self.git(dir, &["fetch", "--all", "--tags"]).await.map(drop)
    }

    async fn force_checkout(&self, dir: &Path, tag: &str) -> Result<(), CommandFailure> {
        self.git(dir, &["checkout", "--force", tag]).await.map(drop)
    }
}

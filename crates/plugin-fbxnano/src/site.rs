//! Reports and switches the checked-out version of the site.

use core::fmt;

use tracing::{info, warn};

use crate::{
    config::FbxNanoConfig,
    error::SiteError,
    git::{GitCli, Vcs},
    maintenance::{MaintenanceAction, MaintenanceSwitch, SiteScript},
};

pub const DEFAULT_TAG_COUNT: usize = 5;
/// A deploy target must be among this many most recent tags.
pub const CHECKOUT_WINDOW: usize = 25;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployOutcome {
    AlreadyDeployed { version: String },
    Deployed { tag: String, version: Option<String> },
}

impl fmt::Display for DeployOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyDeployed { version } => {
                write!(f, "Site is already on version {version}.")
            }
            Self::Deployed {
                tag,
                version: Some(version),
            } => write!(f, "Deployed {tag}. Site is now on version {version}."),
            Self::Deployed { tag, version: None } => write!(
                f,
                "Deployed {tag}, but the current version could not be read back."
            ),
        }
    }
}

/// Parses the optional count argument of `site_tags`.
pub fn parse_count(raw: &str) -> Result<usize, SiteError> {
    let raw = raw.trim();
    raw.parse::<usize>()
        .map_err(|_| SiteError::InputFormat(format!("not a tag count: {raw:?}")))
}

#[derive(Debug, Default)]
pub struct SiteController<V = GitCli, M = SiteScript> {
    vcs: V,
    maintenance: M,
}

impl<V: Vcs, M: MaintenanceSwitch> SiteController<V, M> {
    pub const fn new(vcs: V, maintenance: M) -> Self {
        Self { vcs, maintenance }
    }

    /// Branch name if one is checked out, otherwise the tag on HEAD.
    pub async fn current_version(&self, config: &FbxNanoConfig) -> Result<String, SiteError> {
        let site = config.require_site()?;
        match self.vcs.current_branch(site).await {
            Ok(branch) if !branch.is_empty() => return Ok(branch),
            Ok(_) => {}
            Err(e) => info!(error = %e, "No branch checked out; looking for a tag on HEAD"),
        }
        match self.vcs.exact_tag(site).await {
            Ok(tag) if !tag.is_empty() => Ok(tag),
            Ok(_) => Err(SiteError::VersionUnavailable),
            Err(e) => {
                warn!(error = %e, site = %site.display(), "HEAD carries no tag");
                Err(SiteError::VersionUnavailable)
            }
        }
    }

    /// The `count` most recent tags, newest first.
    pub async fn recent_tags(
        &self,
        config: &FbxNanoConfig,
        count: usize,
    ) -> Result<Vec<String>, SiteError> {
        let site = config.require_site()?;
        let tags = self
            .vcs
            .tags(site)
            .await
            .map_err(SiteError::VersionControlFailure)?;
        Ok(tags.into_iter().rev().take(count).collect())
    }

    pub async fn deploy(
        &self,
        config: &FbxNanoConfig,
        target: &str,
    ) -> Result<DeployOutcome, SiteError> {
        let site = config.require_site()?;
        let target = target.trim();
        if target.is_empty() {
            return Err(SiteError::InputFormat(
                "usage: deploy_site <tag>".to_owned(),
            ));
        }
        let prefixed = format!("v{target}");

        match self.current_version(config).await {
            Ok(current) if current == target || current == prefixed => {
                return Ok(DeployOutcome::AlreadyDeployed { version: current });
            }
            Ok(current) => info!(%current, %target, "Switching site version"),
            Err(e) => warn!(error = %e, %target, "Deploying without a known current version"),
        }

        self.vcs
            .fetch_all(site)
            .await
            .map_err(SiteError::VersionControlFailure)?;

        let window = self.recent_tags(config, CHECKOUT_WINDOW).await?;
        let tag = [target, prefixed.as_str()]
            .into_iter()
            .find(|candidate| window.iter().any(|t| t == candidate))
            .ok_or_else(|| SiteError::TagNotFound(target.to_owned()))?
            .to_owned();

        self.vcs
            .force_checkout(site, &tag)
            .await
            .map_err(SiteError::VersionControlFailure)?;
        info!(%tag, site = %site.display(), "Checked out site tag");

        let version = self.current_version(config).await.ok();
        Ok(DeployOutcome::Deployed { tag, version })
    }

    pub async fn maintenance_mode(
        &self,
        config: &FbxNanoConfig,
        action: MaintenanceAction,
    ) -> Result<String, SiteError> {
        let site = config.require_site()?;
        let out = self
            .maintenance
            .invoke(site, action)
            .await
            .map_err(SiteError::MaintenanceFailure)?;
        info!(action = action.as_arg(), "Ran maintenance_mode");
        Ok(match action {
            MaintenanceAction::Start => "Maintenance mode started.".to_owned(),
            MaintenanceAction::Stop => "Maintenance mode stopped.".to_owned(),
            MaintenanceAction::Status if out.is_empty() => {
                "maintenance_mode reported no status.".to_owned()
            }
            MaintenanceAction::Status => out,
        })
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use std::{
        path::Path,
        sync::{Mutex, MutexGuard},
    };

    use async_trait::async_trait;

    use crate::{
        error::CommandFailure,
        git::Vcs,
        maintenance::{MaintenanceAction, MaintenanceSwitch},
    };

    #[derive(Debug, Default)]
    pub struct Repo {
        pub branch: Option<String>,
        pub head_tag: Option<String>,
        pub tags: Vec<String>,
        pub fetches: usize,
        pub checkouts: Vec<String>,
        pub fail_fetch: bool,
        pub fail_checkout: bool,
    }

    #[derive(Debug, Default)]
    pub struct FakeVcs(pub Mutex<Repo>);

    impl FakeVcs {
        pub fn on_branch(branch: &str, tags: &[&str]) -> Self {
            Self(Mutex::new(Repo {
                branch: Some(branch.to_owned()),
                tags: tags.iter().map(|t| (*t).to_owned()).collect(),
                ..Repo::default()
            }))
        }

        pub fn repo(&self) -> MutexGuard<'_, Repo> {
            self.0.lock().unwrap()
        }
    }

    fn failure(command: &str) -> CommandFailure {
        CommandFailure {
            command: command.to_owned(),
            detail: "exited with exit status: 128".to_owned(),
        }
    }

    #[async_trait]
    impl Vcs for FakeVcs {
        async fn current_branch(&self, _dir: &Path) -> Result<String, CommandFailure> {
            self.repo()
                .branch
                .clone()
                .ok_or_else(|| failure("git symbolic-ref --short -q HEAD"))
        }

        async fn exact_tag(&self, _dir: &Path) -> Result<String, CommandFailure> {
            self.repo()
                .head_tag
                .clone()
                .ok_or_else(|| failure("git describe --tags --exact-match HEAD"))
        }

        async fn tags(&self, _dir: &Path) -> Result<Vec<String>, CommandFailure> {
            Ok(self.repo().tags.clone())
        }

        async fn fetch_all(&self, _dir: &Path) -> Result<(), CommandFailure> {
            let mut repo = self.repo();
            if repo.fail_fetch {
                return Err(failure("git fetch --all --tags"));
            }
            repo.fetches += 1;
            Ok(())
        }

        async fn force_checkout(&self, _dir: &Path, tag: &str) -> Result<(), CommandFailure> {
            let mut repo = self.repo();
            if repo.fail_checkout || !repo.tags.iter().any(|t| t == tag) {
                return Err(failure(&format!("git checkout --force {tag}")));
            }
            repo.branch = None;
            repo.head_tag = Some(tag.to_owned());
            repo.checkouts.push(tag.to_owned());
            Ok(())
        }
    }

    #[derive(Debug, Default)]
    pub struct FakeSwitch {
        pub calls: Mutex<Vec<MaintenanceAction>>,
    }

    #[async_trait]
    impl MaintenanceSwitch for FakeSwitch {
        async fn invoke(
            &self,
            _site: &Path,
            action: MaintenanceAction,
        ) -> Result<String, CommandFailure> {
            self.calls.lock().unwrap().push(action);
            Ok(match action {
                MaintenanceAction::Status => "maintenance: off".to_owned(),
                MaintenanceAction::Start | MaintenanceAction::Stop => String::new(),
            })
        }
    }
}

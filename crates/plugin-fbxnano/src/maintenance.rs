use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::{error::CommandFailure, process::run_in};

/// File name of the helper executable at the root of the site.
pub const MAINTENANCE_EXECUTABLE: &str = "maintenance_mode";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaintenanceAction {
    Start,
    Stop,
    Status,
}

impl MaintenanceAction {
    /// Anything other than `start` or `stop` is a status query.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.eq_ignore_ascii_case("start") {
            Self::Start
        } else if raw.eq_ignore_ascii_case("stop") {
            Self::Stop
        } else {
            Self::Status
        }
    }

    #[must_use]
    pub const fn as_arg(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Status => "status",
        }
    }
}

#[async_trait]
pub trait MaintenanceSwitch: Send + Sync {
    /// Runs the switch for `site` and returns whatever it printed.
    async fn invoke(&self, site: &Path, action: MaintenanceAction) -> Result<String, CommandFailure>;
}

/// Runs the site's own `maintenance_mode` executable.
#[derive(Debug, Clone)]
pub struct SiteScript {
    name: PathBuf,
}

impl Default for SiteScript {
    fn default() -> Self {
        Self {
            name: PathBuf::from(MAINTENANCE_EXECUTABLE),
        }
    }
}

#[async_trait]
impl MaintenanceSwitch for SiteScript {
    async fn invoke(&self, site: &Path, action: MaintenanceAction) -> Result<String, CommandFailure> {
        // The program path must not be relative: it would be resolved
        // again from inside the child's working directory.
        let site = std::path::absolute(site).map_err(|e| CommandFailure {
            command: format!("{} {}", self.name.display(), action.as_arg()),
            detail: format!("cannot resolve {}: {e}", site.display()),
        })?;
        let exe = site.join(&self.name);
        run_in(&site, exe.as_os_str(), &[action.as_arg()]).await
    }
}

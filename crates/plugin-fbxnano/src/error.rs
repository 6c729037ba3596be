use thiserror::Error;

use crate::site::CHECKOUT_WINDOW;

/// An external command that could not be run or exited unsuccessfully.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("`{command}` failed: {detail}")]
pub struct CommandFailure {
    /// Rendered command line, e.g. `git fetch --all --tags`.
    pub command: String,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SiteError {
    #[error("site_path is not configured; set it in the fbxnano plugin config first")]
    ConfigurationMissing,

    #[error("git error: {0}")]
    VersionControlFailure(CommandFailure),

    #[error("maintenance_mode error: {0}")]
    MaintenanceFailure(CommandFailure),

    #[error("unable to determine the current site version (no branch and no tag on HEAD)")]
    VersionUnavailable,

    #[error("tag {0} not found among the {window} most recent tags", window = CHECKOUT_WINDOW)]
    TagNotFound(String),

    #[error("{0}")]
    InputFormat(String),
}

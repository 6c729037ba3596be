use std::path::Path;

use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};

use crate::error::SiteError;

pub const ROOM_ADDRESS: &str = "room_address";
pub const SITE_PATH: &str = "site_path";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct FbxNanoConfig {
    /// Room id (`!id:server`) or alias (`#alias:server`) used by `invite_me`.
    #[serde(default)]
    pub room_address: String,
    /// Working copy of the deployed site; empty means unconfigured.
    #[serde(default)]
    pub site_path: String,
}

impl FbxNanoConfig {
    /// The config template: every recognized key with its empty default.
    #[must_use]
    pub fn template() -> serde_yaml::Value {
        let mut map = serde_yaml::Mapping::new();
        map.insert(ROOM_ADDRESS.into(), String::new().into());
        map.insert(SITE_PATH.into(), String::new().into());
        serde_yaml::Value::Mapping(map)
    }

    pub fn from_value(value: &serde_yaml::Value) -> Result<Self> {
        if value.is_null() {
            return Ok(Self::default());
        }
        serde_yaml::from_value(value.clone()).context("parsing fbxnano config")
    }

    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.room().is_some() || self.site().is_some()
    }

    #[must_use]
    pub fn room(&self) -> Option<&str> {
        Some(self.room_address.trim()).filter(|s| !s.is_empty())
    }

    #[must_use]
    pub fn site(&self) -> Option<&Path> {
        Some(self.site_path.trim())
            .filter(|s| !s.is_empty())
            .map(Path::new)
    }

    pub fn require_site(&self) -> Result<&Path, SiteError> {
        self.site().ok_or(SiteError::ConfigurationMissing)
    }
}

pub mod factory;

use std::{collections::HashMap, sync::Arc};

use anyhow::Result;
use async_trait::async_trait;
use matrix_sdk::{
    Client,
    room::Room,
    ruma::{OwnedUserId, events::room::message::RoomMessageEventContent},
};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// Everything a plugin needs to answer one command invocation.
#[derive(Clone, Debug)]
pub struct PluginContext {
    pub client: Client,
    pub room: Room,
    pub sender: OwnedUserId,
    /// Normalized command token that triggered this run, e.g. `!site_tags`.
    pub command: String,
}

#[async_trait]
pub trait Plugin: Send + Sync {
    fn id(&self) -> &'static str;
    fn help(&self) -> &'static str;

    /// Whether `command` may only be run by configured bot admins.
    fn admin_only(&self, _command: &str) -> bool {
        false
    }

    /// Called once before registration. Returning an error keeps the plugin
    /// out of the registry.
    fn activate(&self, _spec: &PluginSpec) -> Result<()> {
        Ok(())
    }

    async fn run(&self, ctx: &PluginContext, args: &str, spec: &PluginSpec) -> Result<()>;
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct PluginTriggers {
    #[serde(default)]
    pub commands: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PluginSpec {
    pub id: String,
    #[serde(default = "enabled_true")]
    pub enabled: bool,
    /// Overrides [`Plugin::admin_only`] for every command of this plugin.
    #[serde(default)]
    pub admin_only: Option<bool>,
    #[serde(default)]
    pub triggers: PluginTriggers,
    #[serde(default)]
    pub config: serde_yaml::Value,
}

const fn enabled_true() -> bool {
    true
}

#[derive(Clone)]
pub struct PluginEntry {
    pub spec: PluginSpec,
    pub plugin: Arc<dyn Plugin>,
}

impl core::fmt::Debug for PluginEntry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PluginEntry")
            .field("spec", &self.spec)
            .field("plugin", &self.plugin.id())
            .finish()
    }
}

impl PluginEntry {
    /// Admin gating for one command, honoring the spec override.
    #[must_use]
    pub fn requires_admin(&self, command: &str) -> bool {
        self.spec
            .admin_only
            .unwrap_or_else(|| self.plugin.admin_only(command))
    }
}

#[derive(Default, Debug)]
struct RegistryInner {
    by_id: HashMap<String, PluginEntry>,
    by_command: HashMap<String, String>,
}

#[derive(Clone, Default, Debug)]
pub struct PluginRegistry {
    inner: Arc<RwLock<RegistryInner>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, spec: PluginSpec, plugin: Arc<dyn Plugin>) -> Option<PluginEntry> {
        let mut inner = self.inner.write().await;
        let id = spec.id.clone();
        let previous = inner.by_id.insert(
            id.clone(),
            PluginEntry {
                spec: spec.clone(),
                plugin,
            },
        );
        inner.by_command.retain(|_, existing| *existing != id);
        for cmd in &spec.triggers.commands {
            inner.by_command.insert(normalize_cmd(cmd), id.clone());
        }
        previous
    }

    pub async fn entry_by_command(&self, token: &str) -> Option<PluginEntry> {
        let inner = self.inner.read().await;
        inner
            .by_command
            .get(token)
            .and_then(|id| inner.by_id.get(id))
            .cloned()
    }

    pub async fn entries(&self) -> Vec<(String, PluginEntry)> {
        let inner = self.inner.read().await;
        inner
            .by_id
            .iter()
            .map(|(id, entry)| (id.clone(), entry.clone()))
            .collect()
    }
}

#[must_use]
pub fn normalize_cmd(s: &str) -> String {
    let raw = if s.starts_with('!') {
        s.to_owned()
    } else {
        format!("!{s}")
    };
    raw.to_lowercase()
}

#[must_use]
pub fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

pub async fn send_text(ctx: &PluginContext, text: impl Into<String>) -> Result<()> {
    let content = RoomMessageEventContent::text_plain(text.into());
    ctx.room.send(content).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;

    #[async_trait]
    impl Plugin for Noop {
        fn id(&self) -> &'static str {
            "noop"
        }
        fn help(&self) -> &'static str {
            ""
        }
        fn admin_only(&self, command: &str) -> bool {
            command != "!open"
        }
        async fn run(&self, _ctx: &PluginContext, _args: &str, _spec: &PluginSpec) -> Result<()> {
            Ok(())
        }
    }

    fn spec(commands: &[&str]) -> PluginSpec {
        PluginSpec {
            id: "noop".to_owned(),
            enabled: true,
            admin_only: None,
            triggers: PluginTriggers {
                commands: commands.iter().map(|c| (*c).to_owned()).collect(),
            },
            config: serde_yaml::Value::Null,
        }
    }

    #[test]
    fn commands_normalize_to_bang_lowercase() {
        assert_eq!(normalize_cmd("Site_Tags"), "!site_tags");
        assert_eq!(normalize_cmd("!deploy_site"), "!deploy_site");
    }

    #[tokio::test]
    async fn reregistering_replaces_command_triggers() {
        let registry = PluginRegistry::new();
        registry.register(spec(&["a", "b"]), Arc::new(Noop)).await;
        let previous = registry.register(spec(&["c"]), Arc::new(Noop)).await;

        assert!(previous.is_some());
        assert!(registry.entry_by_command("!a").await.is_none());
        assert!(registry.entry_by_command("!c").await.is_some());
        assert_eq!(registry.entries().await.len(), 1);
    }

    #[tokio::test]
    async fn spec_override_wins_over_plugin_admin_policy() {
        let registry = PluginRegistry::new();
        registry.register(spec(&["open", "closed"]), Arc::new(Noop)).await;
        let entry = registry.entry_by_command("!open").await.unwrap();
        assert!(!entry.requires_admin("!open"));
        assert!(entry.requires_admin("!closed"));

        let mut locked = spec(&["open"]);
        locked.admin_only = Some(true);
        registry.register(locked, Arc::new(Noop)).await;
        let entry = registry.entry_by_command("!open").await.unwrap();
        assert!(entry.requires_admin("!open"));
    }
}

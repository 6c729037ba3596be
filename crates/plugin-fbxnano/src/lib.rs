//! FbxNano: invites people to the team room and manages the deployed
//! version of the static site.

mod config;
mod error;
mod git;
mod maintenance;
mod process;
mod site;

pub use config::FbxNanoConfig;
pub use error::{CommandFailure, SiteError};
pub use git::{GitCli, Vcs};
pub use maintenance::{MAINTENANCE_EXECUTABLE, MaintenanceAction, MaintenanceSwitch, SiteScript};
pub use site::{CHECKOUT_WINDOW, DEFAULT_TAG_COUNT, DeployOutcome, SiteController, parse_count};

use std::{path::Path, sync::Arc};

use anyhow::{Context as _, Result, anyhow};
use async_trait::async_trait;
use matrix_sdk::{
    Client,
    room::Room,
    ruma::{RoomAliasId, RoomId},
};
use tracing::{debug, info, warn};

use plugin_core::factory::PluginFactory;
use plugin_core::{Plugin, PluginContext, PluginSpec, PluginTriggers, send_text};

pub const PLUGIN_ID: &str = "fbxnano";

pub const INVITE_ME: &str = "!invite_me";
pub const DEPLOY_SITE: &str = "!deploy_site";
pub const SITE_VERSION: &str = "!site_version";
pub const SITE_TAGS: &str = "!site_tags";
pub const MAINTENANCE_MODE: &str = "!maintenance_mode";
pub const CHECK_CONFIG: &str = "!check_config";

const COMMANDS: [&str; 6] = [
    INVITE_ME,
    DEPLOY_SITE,
    SITE_VERSION,
    SITE_TAGS,
    MAINTENANCE_MODE,
    CHECK_CONFIG,
];

#[derive(Debug)]
pub struct FbxNanoPlugin;

impl PluginFactory for FbxNanoPlugin {
    fn register_defaults(&self, specs: &mut Vec<PluginSpec>) {
        if !specs.iter().any(|s| s.id == PLUGIN_ID) {
            specs.push(PluginSpec {
                id: PLUGIN_ID.to_owned(),
                enabled: true,
                admin_only: None,
                triggers: PluginTriggers {
                    commands: COMMANDS.iter().map(|c| (*c).to_owned()).collect(),
                },
                config: FbxNanoConfig::template(),
            });
        }
    }

    fn build(&self) -> Arc<dyn Plugin> {
        Arc::new(FbxNano::default())
    }
}

#[derive(Debug)]
pub struct FbxNano<V = GitCli, M = SiteScript> {
    site: SiteController<V, M>,
}

impl Default for FbxNano {
    fn default() -> Self {
        Self::new(SiteController::new(GitCli::default(), SiteScript::default()))
    }
}

impl<V: Vcs, M: MaintenanceSwitch> FbxNano<V, M> {
    pub const fn new(site: SiteController<V, M>) -> Self {
        Self { site }
    }

    /// Answers every command that only needs the config and the site.
    /// Returns `None` for commands this plugin does not own.
    pub async fn site_reply(
        &self,
        command: &str,
        args: &str,
        config: &FbxNanoConfig,
    ) -> Option<String> {
        let reply = match command {
            DEPLOY_SITE => self.site.deploy(config, args).await.map(|o| o.to_string()),
            SITE_VERSION => self
                .site
                .current_version(config)
                .await
                .map(|v| format!("Site is on version {v}.")),
            SITE_TAGS => {
                let count = if args.trim().is_empty() {
                    DEFAULT_TAG_COUNT
                } else {
                    parse_count(args).unwrap_or_else(|e| {
                        debug!(error = %e, "Using default tag count");
                        DEFAULT_TAG_COUNT
                    })
                };
                self.site
                    .recent_tags(config, count)
                    .await
                    .map(|tags| render_tags(&tags))
            }
            MAINTENANCE_MODE => {
                self.site
                    .maintenance_mode(config, MaintenanceAction::parse(args))
                    .await
            }
            CHECK_CONFIG => Ok(describe_config(config)),
            _ => return None,
        };
        Some(reply.unwrap_or_else(|e| {
            warn!(error = %e, command, "Site command failed");
            e.to_string()
        }))
    }
}

#[async_trait]
impl<V: Vcs + 'static, M: MaintenanceSwitch + 'static> Plugin for FbxNano<V, M> {
    fn id(&self) -> &'static str {
        PLUGIN_ID
    }

    fn help(&self) -> &'static str {
        "!invite_me | !deploy_site <tag> | !site_version | !site_tags [count] | !maintenance_mode [start|stop] | !check_config"
    }

    fn admin_only(&self, command: &str) -> bool {
        command != INVITE_ME
    }

    fn activate(&self, spec: &PluginSpec) -> Result<()> {
        let config = FbxNanoConfig::from_value(&spec.config)?;
        if !config.is_configured() {
            return Err(anyhow!(
                "fbxnano is not configured; set room_address and/or site_path"
            ));
        }
        info!(room = ?config.room(), site = ?config.site(), "fbxnano activated");
        Ok(())
    }

    async fn run(&self, ctx: &PluginContext, args: &str, spec: &PluginSpec) -> Result<()> {
        let config = FbxNanoConfig::from_value(&spec.config)?;
        let reply = if ctx.command == INVITE_ME {
            match invite(ctx, &config).await {
                Ok(()) => "You've been invited to the party!".to_owned(),
                Err(e) => {
                    warn!(error = %e, sender = %ctx.sender, "Invite failed");
                    format!("Could not invite you: {e}")
                }
            }
        } else if let Some(reply) = self.site_reply(&ctx.command, args, &config).await {
            reply
        } else {
            return Err(anyhow!("fbxnano does not handle {}", ctx.command));
        };
        send_text(ctx, reply).await
    }
}

async fn invite(ctx: &PluginContext, config: &FbxNanoConfig) -> Result<()> {
    let address = config
        .room()
        .ok_or_else(|| anyhow!("room_address is not configured"))?;
    let room = resolve_room(&ctx.client, address).await?;
    room.invite_user_by_id(&ctx.sender)
        .await
        .with_context(|| format!("inviting {} to {address}", ctx.sender))?;
    info!(room = %address, user = %ctx.sender, "Invited user");
    Ok(())
}

async fn resolve_room(client: &Client, address: &str) -> Result<Room> {
    let room_id = if let Ok(id) = RoomId::parse(address) {
        id
    } else if address.starts_with('#') {
        let alias = RoomAliasId::parse(address)
            .map_err(|e| anyhow!("invalid room alias {address}: {e}"))?;
        client
            .resolve_room_alias(&alias)
            .await
            .with_context(|| format!("resolving room alias {address}"))?
            .room_id
    } else {
        return Err(anyhow!(
            "invalid room_address {address} (expect !room_id or #alias)"
        ));
    };
    client
        .get_room(&room_id)
        .ok_or_else(|| anyhow!("the bot is not in room {address}"))
}

fn render_tags(tags: &[String]) -> String {
    if tags.is_empty() {
        "No tags found.".to_owned()
    } else {
        tags.join("\n")
    }
}

fn describe_config(config: &FbxNanoConfig) -> String {
    let room = config.room().unwrap_or("(not set)");
    let site = match config.site() {
        None => "(not set)".to_owned(),
        Some(path) => format!("{} [{}]", path.display(), site_state(path)),
    };
    format!("room_address: {room}\nsite_path: {site}")
}

fn site_state(path: &Path) -> &'static str {
    if !path.is_dir() {
        "missing"
    } else if path.join(".git").exists() {
        "git working copy"
    } else {
        "not a git working copy"
    }
}

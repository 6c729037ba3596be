mod dispatch;
mod logging;
mod plugins;
mod session;
mod verification;

use core::time::Duration;
use std::{
    collections::BTreeSet,
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context as _, Result, anyhow};
use clap::Parser;
use matrix_sdk::{
    Client,
    config::SyncSettings,
    room::Room,
    ruma::events::room::{
        member::{MembershipState, StrippedRoomMemberEvent},
        message::OriginalSyncRoomMessageEvent,
    },
};
use serde::Deserialize;
use tracing::{info, warn};

use crate::{dispatch::Dispatcher, logging::init_tracing};
use plugin_core::{PluginSpec, normalize_cmd};

#[derive(Parser, Debug)]
#[command(
    name = "fbxnano-bot",
    version,
    about = "Matrix bot that invites people to the team room and deploys tagged site versions"
)]
pub struct Args {
    /// Homeserver base URL, e.g. `https://matrix-client.matrix.org`.
    #[arg(long, env = "MATRIX_HOMESERVER")]
    homeserver: String,

    /// Username (localpart or full user ID)
    #[arg(long, env = "MATRIX_USERNAME")]
    username: String,

    /// Password (if omitted, will prompt if needed)
    #[arg(long, env = "MATRIX_PASSWORD")]
    password: Option<String>,

    /// Directory for persistent state (encryption keys, sync cache)
    #[arg(long, env = "MATRIX_STORE", default_value = "./bot-store")]
    store: PathBuf,

    /// JSON session file for access token/device info
    #[arg(long, env = "MATRIX_SESSION_FILE", default_value = "./session.json")]
    session_file: PathBuf,

    #[arg(long, env = "MATRIX_DEVICE_NAME", default_value = "fbxnano-bot")]
    device_name: String,

    /// YAML config with admins and plugin specs
    #[arg(long, env = "MATRIX_CONFIG", default_value = "./config.yaml")]
    config: PathBuf,

    /// Directory holding `<plugin id>/config.yaml` overrides
    #[arg(long, env = "PLUGINS_DIR", default_value = "./plugins")]
    plugins_dir: PathBuf,

    /// Disable auto-joining rooms when invited
    #[arg(long)]
    no_autojoin: bool,

    /// Auto-accept and confirm SAS verifications (insecure for production)
    #[arg(long, env = "MATRIX_AUTO_VERIFY", default_value_t = true)]
    auto_verify: bool,

    /// Sync timeout in milliseconds
    #[arg(long, env = "MATRIX_SYNC_TIMEOUT_MS", default_value_t = 30000)]
    sync_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct BotConfig {
    /// Full user ids allowed to run admin-only commands.
    #[serde(default)]
    pub admins: Vec<String>,
    #[serde(default)]
    pub plugins: Option<Vec<PluginSpec>>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    // Load .env if present so clap can pick up env vars.
    let _ = dotenvy::dotenv();
    let args = Args::parse();

    fs::create_dir_all(&args.store)
        .with_context(|| format!("creating store directory at {}", args.store.display()))?;

    let client = Client::builder()
        .homeserver_url(&args.homeserver)
        .handle_refresh_tokens()
        .sqlite_store(&args.store, None)
        .build()
        .await
        .context("building matrix client")?;

    session::restore_or_login(&client, &args).await?;

    let config = load_config(&args.config)?;
    if config.admins.is_empty() {
        warn!("No admins configured; admin-only commands will be refused for everyone");
    }
    let registry = plugins::build_registry(&config, &args.plugins_dir).await;

    let commands: BTreeSet<String> = registry
        .entries()
        .await
        .into_iter()
        .flat_map(|(_, entry)| entry.spec.triggers.commands)
        .map(|cmd| normalize_cmd(&cmd))
        .collect();
    info!(commands = ?commands, admins = ?config.admins, "Registered plugin commands");

    if !args.no_autojoin {
        client.add_event_handler(
            |ev: StrippedRoomMemberEvent, room: Room, client: Client| async move {
                if ev.content.membership != MembershipState::Invite {
                    return;
                }
                let Some(own_id) = client.user_id() else {
                    return;
                };
                if ev.state_key != own_id.as_str() {
                    return;
                }
                info!(room_id = %room.room_id(), "Auto-joining invited room");
                if let Err(e) = room.join().await {
                    warn!(error = %e, "Failed to accept invite");
                }
            },
        );
    }

    let dispatcher = Arc::new(Dispatcher::new(registry, &config.admins));
    client.add_event_handler(
        move |ev: OriginalSyncRoomMessageEvent, room: Room, client: Client| {
            let dispatcher = Arc::clone(&dispatcher);
            async move { dispatcher.handle(ev, room, client).await }
        },
    );

    verification::register_handlers(&client, args.auto_verify);

    info!(
        timeout_ms = args.sync_timeout_ms,
        "Starting sync… Press Ctrl+C to stop."
    );
    let settings = SyncSettings::new().timeout(Duration::from_millis(args.sync_timeout_ms));
    client
        .sync(settings)
        .await
        .map_err(|e| anyhow!("sync terminated: {e}"))
}

fn load_config(path: &Path) -> Result<BotConfig> {
    if !path.exists() {
        return Err(anyhow!(
            "config file not found at {}. Create one or set --config",
            path.display()
        ));
    }
    let yaml = fs::read_to_string(path)
        .with_context(|| format!("reading config file at {}", path.display()))?;
    let cfg: BotConfig = serde_yaml::from_str(&yaml).context("parsing YAML config")?;
    Ok(cfg)
}

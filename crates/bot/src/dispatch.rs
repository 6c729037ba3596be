use std::{collections::HashSet, sync::Arc};

use matrix_sdk::{
    Client,
    room::Room,
    ruma::{
        UserId,
        events::room::message::{MessageType, OriginalSyncRoomMessageEvent, RoomMessageEventContent},
    },
};
use tracing::{debug, info, warn};

use plugin_core::{PluginContext, PluginEntry, PluginRegistry, normalize_cmd, truncate};

pub const HELP: &str = "!help";

/// A `!command args` message, command normalized to lowercase.
#[derive(Debug, PartialEq, Eq)]
pub struct Invocation<'a> {
    pub command: String,
    pub args: &'a str,
}

#[must_use]
pub fn parse_invocation(body: &str) -> Option<Invocation<'_>> {
    let body = body.trim();
    if !body.starts_with('!') || body.len() == 1 {
        return None;
    }
    let (cmd, args) = body.split_once(char::is_whitespace).unwrap_or((body, ""));
    Some(Invocation {
        command: normalize_cmd(cmd),
        args: args.trim(),
    })
}

/// One `id: help` line per enabled plugin, sorted by id.
#[must_use]
pub fn render_help(entries: &[(String, PluginEntry)]) -> String {
    let mut lines: Vec<String> = entries
        .iter()
        .filter(|(_, entry)| entry.spec.enabled)
        .map(|(id, entry)| format!("{id}: {}", entry.plugin.help()))
        .collect();
    if lines.is_empty() {
        return "No plugins are active.".to_owned();
    }
    lines.sort();
    lines.join("\n")
}

/// Routes room messages to the plugin owning the command.
#[derive(Debug)]
pub struct Dispatcher {
    registry: Arc<PluginRegistry>,
    admins: HashSet<String>,
}

impl Dispatcher {
    pub fn new(registry: Arc<PluginRegistry>, admins: &[String]) -> Self {
        Self {
            registry,
            admins: admins.iter().map(|a| a.trim().to_owned()).collect(),
        }
    }

    #[must_use]
    pub fn is_admin(&self, user: &UserId) -> bool {
        self.admins.contains(user.as_str())
    }

    pub async fn handle(&self, ev: OriginalSyncRoomMessageEvent, room: Room, client: Client) {
        let Some(own_id) = client.user_id() else {
            return;
        };
        if ev.sender == own_id {
            return;
        }
        let body = match &ev.content.msgtype {
            MessageType::Text(t) => t.body.as_str(),
            MessageType::Notice(n) => n.body.as_str(),
            _ => return,
        };
        let Some(invocation) = parse_invocation(body) else {
            return;
        };
        info!(
            room_id = %room.room_id(),
            sender = %ev.sender,
            command = %invocation.command,
            args = %truncate(invocation.args, 200),
            "Parsed command"
        );

        if invocation.command == HELP {
            let text = render_help(&self.registry.entries().await);
            if let Err(e) = room.send(RoomMessageEventContent::text_plain(text)).await {
                warn!(error = %e, "Failed to send help");
            }
            return;
        }

        let Some(entry) = self.registry.entry_by_command(&invocation.command).await else {
            debug!(command = %invocation.command, "No plugin for command");
            return;
        };
        let plugin_id = entry.spec.id.clone();
        if !entry.spec.enabled {
            info!(plugin = %plugin_id, "Plugin disabled");
            return;
        }
        if entry.requires_admin(&invocation.command) && !self.is_admin(&ev.sender) {
            info!(plugin = %plugin_id, sender = %ev.sender, "Refusing admin-only command");
            let refusal = format!("You're not allowed to run {}.", invocation.command);
            if let Err(e) = room
                .send(RoomMessageEventContent::text_plain(refusal))
                .await
            {
                warn!(error = %e, "Failed to send refusal");
            }
            return;
        }

        let ctx = PluginContext {
            client: client.clone(),
            room,
            sender: ev.sender.clone(),
            command: invocation.command,
        };
        if let Err(e) = entry.plugin.run(&ctx, invocation.args, &entry.spec).await {
            warn!(error = %e, plugin = %plugin_id, "Plugin failed");
        }
    }
}

use std::{fs, io::IsTerminal as _, path::Path};

use anyhow::{Context as _, Result, anyhow};
use matrix_sdk::{
    Client, SessionMeta,
    authentication::{SessionTokens, matrix::MatrixSession},
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::Args;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SavedSession {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub user_id: String,
    pub device_id: String,
}

/// Restores the stored session, or logs in and stores a new one.
pub async fn restore_or_login(client: &Client, args: &Args) -> Result<()> {
    if let Some(session) = load_session(&args.session_file)? {
        info!("Restoring session for {}", session.user_id);
        let matrix_session = MatrixSession {
            meta: SessionMeta {
                user_id: session.user_id.parse().context("invalid stored user_id")?,
                device_id: session.device_id.into(),
            },
            tokens: SessionTokens {
                access_token: session.access_token,
                refresh_token: session.refresh_token,
            },
        };
        return client
            .restore_session(matrix_session)
            .await
            .context("restoring session");
    }

    let password = password(args)?;
    info!("Logging in as {}", args.username);
    let response = client
        .matrix_auth()
        .login_username(&args.username, &password)
        .initial_device_display_name(&args.device_name)
        .request_refresh_token()
        .send()
        .await
        .context("login failed")?;

    let session = SavedSession {
        access_token: response.access_token.clone(),
        refresh_token: response.refresh_token.clone(),
        user_id: response.user_id.to_string(),
        device_id: response.device_id.to_string(),
    };
    save_session(&args.session_file, &session)?;
    info!(user = %session.user_id, device = %session.device_id, "Logged in");
    Ok(())
}

/// Empty values count as missing; prompting only happens on a terminal.
fn password(args: &Args) -> Result<String> {
    if let Some(p) = args
        .password
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        return Ok(p.to_owned());
    }
    if !std::io::stdin().is_terminal() {
        return Err(anyhow!(
            "No MATRIX_PASSWORD provided and no stored session at {}",
            args.session_file.display()
        ));
    }
    warn!("No password provided via --password or MATRIX_PASSWORD. Prompting...");
    prompt_password()
}

#[cfg(feature = "rpassword")]
fn prompt_password() -> Result<String> {
    rpassword::prompt_password("Matrix password:").map_err(|e| anyhow!("Failed to read password: {e}"))
}

#[cfg(not(feature = "rpassword"))]
fn prompt_password() -> Result<String> {
    Err(anyhow!(
        "rpassword feature is not enabled. Cannot prompt for password."
    ))
}

pub fn load_session(path: &Path) -> Result<Option<SavedSession>> {
    if !path.exists() {
        return Ok(None);
    }
    let data = fs::read_to_string(path)
        .with_context(|| format!("reading session file at {}", path.display()))?;
    let session: SavedSession = serde_json::from_str(&data).context("parsing session JSON")?;
    Ok(Some(session))
}

pub fn save_session(path: &Path, session: &SavedSession) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let data = serde_json::to_string_pretty(session)?;
    fs::write(path, data).with_context(|| format!("writing session file at {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_survives_a_save_load_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("session.json");
        assert!(load_session(&path).unwrap().is_none());

        let session = SavedSession {
            access_token: "tok".to_owned(),
            refresh_token: None,
            user_id: "@fbxnano:example.org".to_owned(),
            device_id: "DEVICE".to_owned(),
        };
        save_session(&path, &session).unwrap();
        assert_eq!(load_session(&path).unwrap(), Some(session));
    }

    #[test]
    fn corrupt_session_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        fs::write(&path, "{not json").unwrap();
        assert!(load_session(&path).is_err());
    }
}

use std::{ffi::OsStr, path::Path, process::Stdio};

use tokio::process::Command;
use tracing::debug;

use crate::error::CommandFailure;

/// Variables that would let the bot's own environment pick the repository
/// instead of the working directory.
const GIT_ENV_OVERRIDES: [&str; 4] = [
    "GIT_DIR",
    "GIT_WORK_TREE",
    "GIT_INDEX_FILE",
    "GIT_COMMON_DIR",
];

/// Runs `program args` inside `dir` and returns its trimmed stdout.
///
/// `dir` is handed to the child as its working directory; the bot process
/// itself never changes directory.
pub async fn run_in(dir: &Path, program: &OsStr, args: &[&str]) -> Result<String, CommandFailure> {
    let rendered = render(program, args);
    let mut cmd = Command::new(program);
    cmd.args(args).current_dir(dir).stdin(Stdio::null());
    for key in GIT_ENV_OVERRIDES {
        cmd.env_remove(key);
    }

    debug!(dir = %dir.display(), command = %rendered, "Running external command");
    let output = cmd.output().await.map_err(|e| CommandFailure {
        command: rendered.clone(),
        detail: e.to_string(),
    })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let detail = match stderr.trim() {
            "" => format!("exited with {}", output.status),
            msg => msg.to_owned(),
        };
        debug!(command = %rendered, %detail, "External command failed");
        return Err(CommandFailure {
            command: rendered,
            detail,
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_owned())
}

fn render(program: &OsStr, args: &[&str]) -> String {
    let program = Path::new(program)
        .file_name()
        .unwrap_or(program)
        .to_string_lossy();
    if args.is_empty() {
        program.into_owned()
    } else {
        format!("{program} {}", args.join(" "))
    }
}

//! Predeploy lifecycle hook execution.
//!
//! `firebase.json` may declare shell commands to run before discovery.
//! They execute through the spawn policy so their output lands on the
//! error stream, never on the structured response channel.

use crate::error::{Error, Result};
use crate::spawn::{self, StdioPolicy};
use std::path::Path;
use tokio::process::Command;
use tracing::info;

/// Runs every predeploy command in order; the first failure aborts.
///
/// `$RESOURCE_DIR` / `%RESOURCE_DIR%` expand to the functions source
/// directory when it is known at hook time.
pub async fn run_predeploy(
    commands: &[String],
    project_id: &str,
    project_dir: &Path,
    resource_dir: Option<&Path>,
    policy: StdioPolicy,
) -> Result<()> {
    for raw in commands {
        let command_line = substitute_resource_dir(raw, resource_dir);
        info!("Running predeploy hook: {command_line}");

        let mut command = shell_command(&command_line);
        command
            .current_dir(project_dir)
            .env("GCLOUD_PROJECT", project_id);
        let status = spawn::run(command, policy)
            .await
            .map_err(|e| Error::Hook(format!("failed to spawn {raw:?}: {e}")))?;
        if !status.success() {
            return Err(Error::Hook(format!("{raw:?} exited with {status}")));
        }
    }
    Ok(())
}

fn substitute_resource_dir(command: &str, resource_dir: Option<&Path>) -> String {
    match resource_dir {
        Some(dir) => {
            let dir = dir.display().to_string();
            command
                .replace("$RESOURCE_DIR", &dir)
                .replace("%RESOURCE_DIR%", &dir)
        }
        None => command.to_string(),
    }
}

#[cfg(unix)]
fn shell_command(command_line: &str) -> Command {
    let mut command = Command::new("sh");
    command.args(["-c", command_line]);
    command
}

#[cfg(windows)]
fn shell_command(command_line: &str) -> Command {
    let mut command = Command::new("cmd");
    command.args(["/C", command_line]);
    command
}

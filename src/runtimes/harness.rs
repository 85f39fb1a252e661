//! Shared discovery manifest protocol.
//!
//! A static `functions.yaml` in the source directory is authoritative
//! when present. Otherwise the delegate spawns the runtime entrypoint
//! with the discovery environment set; the harness process writes the
//! manifest JSON to the path named in `FUNCTIONS_MANIFEST_PATH` and the
//! parent parses it. Harness stdio goes through the spawn policy, so the
//! structured stdout channel is never used for manifest transport.

use crate::backend::BackendSpec;
use crate::env::EnvMap;
use crate::error::{Error, Result};
use crate::spawn::{self, StdioPolicy};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

pub(crate) const DISCOVERY_MODE_ENV: &str = "FUNCTIONS_DISCOVERY_MODE";
pub(crate) const MANIFEST_PATH_ENV: &str = "FUNCTIONS_MANIFEST_PATH";
pub(crate) const RUNTIME_CONFIG_ENV: &str = "CLOUD_RUNTIME_CONFIG";
pub(crate) const STATIC_MANIFEST: &str = "functions.yaml";

const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(60);

static MANIFEST_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Reads `functions.yaml` when present; `Ok(None)` means no static
/// manifest and the harness must run.
pub(crate) async fn static_manifest(source_dir: &Path) -> Result<Option<BackendSpec>> {
    let path = source_dir.join(STATIC_MANIFEST);
    match tokio::fs::read_to_string(&path).await {
        Ok(raw) => {
            debug!(path = %path.display(), "using static discovery manifest");
            BackendSpec::from_manifest_yaml(&raw).map(Some)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::io(path, e)),
    }
}

fn manifest_path() -> PathBuf {
    std::env::temp_dir().join(format!(
        "firespec-manifest-{}-{}.json",
        std::process::id(),
        MANIFEST_COUNTER.fetch_add(1, Ordering::Relaxed)
    ))
}

/// Spawns a discovery harness and parses the manifest it writes.
pub(crate) async fn discover(
    program: &str,
    args: &[String],
    source_dir: &Path,
    runtime_config: &Value,
    env: &EnvMap,
    policy: StdioPolicy,
) -> Result<BackendSpec> {
    let manifest = manifest_path();

    let mut command = Command::new(program);
    command
        .args(args)
        .current_dir(source_dir)
        .envs(env)
        .env(DISCOVERY_MODE_ENV, "manifest")
        .env(MANIFEST_PATH_ENV, &manifest);
    if !runtime_config.is_null() {
        command.env(RUNTIME_CONFIG_ENV, serde_json::to_string(runtime_config)?);
    }

    debug!(program, ?args, manifest = %manifest.display(), "spawning discovery harness");
    let status = tokio::time::timeout(DISCOVERY_TIMEOUT, spawn::run(command, policy))
        .await
        .map_err(|_| {
            Error::Discovery(format!(
                "discovery harness timed out after {}s",
                DISCOVERY_TIMEOUT.as_secs()
            ))
        })?
        .map_err(|e| Error::Discovery(format!("failed to spawn {program}: {e}")))?;

    if !status.success() {
        let _ = tokio::fs::remove_file(&manifest).await;
        return Err(Error::Discovery(format!(
            "discovery harness {program} exited with {status}"
        )));
    }

    let raw = tokio::fs::read(&manifest).await.map_err(|e| {
        Error::Discovery(format!(
            "harness wrote no manifest at {}: {e}",
            manifest.display()
        ))
    })?;
    let _ = tokio::fs::remove_file(&manifest).await;
    BackendSpec::from_manifest_json(&raw)
}

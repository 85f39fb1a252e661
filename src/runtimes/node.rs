//! Node.js runtime delegate.

use super::harness;
use super::{DelegateContext, RuntimeDelegate};
use crate::backend::BackendSpec;
use crate::env::EnvMap;
use crate::error::{Error, Result};
use crate::spawn::{self, StdioPolicy};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio::process::Command;
use tracing::debug;

pub const SUPPORTED_RUNTIMES: &[&str] = &["nodejs18", "nodejs20", "nodejs22"];

const DEFAULT_ENTRYPOINT: &str = "index.js";

#[derive(Debug, Default, Deserialize)]
struct PackageJson {
    main: Option<String>,
    #[serde(default)]
    scripts: BTreeMap<String, String>,
}

#[derive(Debug)]
pub struct NodeDelegate {
    source_dir: PathBuf,
    policy: StdioPolicy,
}

impl NodeDelegate {
    pub fn new(context: &DelegateContext, policy: StdioPolicy) -> Self {
        NodeDelegate {
            source_dir: context.source_dir.clone(),
            policy,
        }
    }

    fn read_package_json(&self) -> Result<PackageJson> {
        let path = self.source_dir.join("package.json");
        let raw = std::fs::read_to_string(&path).map_err(|_| Error::Validation {
            runtime: "nodejs".to_string(),
            message: format!("no package.json found in {}", self.source_dir.display()),
        })?;
        serde_json::from_str(&raw).map_err(|e| Error::Validation {
            runtime: "nodejs".to_string(),
            message: format!("invalid package.json: {e}"),
        })
    }

    fn entrypoint(package: &PackageJson) -> String {
        package
            .main
            .clone()
            .unwrap_or_else(|| DEFAULT_ENTRYPOINT.to_string())
    }
}

#[async_trait]
impl RuntimeDelegate for NodeDelegate {
    fn name(&self) -> &'static str {
        "nodejs"
    }

    async fn validate(&self) -> Result<()> {
        let package = self.read_package_json()?;
        let entrypoint = Self::entrypoint(&package);
        if !self.source_dir.join(&entrypoint).is_file() {
            return Err(Error::Validation {
                runtime: "nodejs".to_string(),
                message: format!("entrypoint {entrypoint} does not exist"),
            });
        }
        Ok(())
    }

    async fn build(&self) -> Result<()> {
        let package = self.read_package_json().map_err(|e| Error::Build {
            runtime: "nodejs".to_string(),
            message: e.to_string(),
        })?;
        if !package.scripts.contains_key("build") {
            debug!("no build script declared, skipping build");
            return Ok(());
        }

        let mut command = Command::new("npm");
        command.args(["run", "build"]).current_dir(&self.source_dir);
        let status = spawn::run(command, self.policy)
            .await
            .map_err(|e| Error::Build {
                runtime: "nodejs".to_string(),
                message: format!("failed to spawn npm: {e}"),
            })?;
        if !status.success() {
            return Err(Error::Build {
                runtime: "nodejs".to_string(),
                message: format!("npm run build exited with {status}"),
            });
        }
        Ok(())
    }

    async fn discover_spec(&self, runtime_config: &Value, env: &EnvMap) -> Result<BackendSpec> {
        if let Some(spec) = harness::static_manifest(&self.source_dir).await? {
            return Ok(spec);
        }
        let entrypoint = Self::entrypoint(&self.read_package_json().map_err(|e| {
            Error::Discovery(format!("cannot determine entrypoint: {e}"))
        })?);
        harness::discover(
            "node",
            &[entrypoint],
            &self.source_dir,
            runtime_config,
            env,
            self.policy,
        )
        .await
    }
}

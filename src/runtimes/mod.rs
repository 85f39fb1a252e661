//! Runtime delegates.
//!
//! A delegate implements the discovery protocol for one runtime family:
//! validate the source layout, build it, and discover the backend spec.
//! New runtimes register here; the orchestrator never changes.

mod harness;
pub mod node;
pub mod python;

pub use node::NodeDelegate;
pub use python::PythonDelegate;

use crate::backend::BackendSpec;
use crate::env::EnvMap;
use crate::error::{Error, Result};
use crate::spawn::StdioPolicy;
use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;

/// Per-invocation context shared with every delegate. `runtime` is the
/// declared runtime id; an empty string means auto-detect.
#[derive(Debug, Clone)]
pub struct DelegateContext {
    pub project_id: String,
    pub source_dir: PathBuf,
    pub project_dir: PathBuf,
    pub runtime: String,
}

/// Capability set implementing one runtime's discovery protocol.
#[async_trait]
pub trait RuntimeDelegate: Send + Sync + std::fmt::Debug {
    /// Short runtime family name used in progress messages.
    fn name(&self) -> &'static str;

    /// Fails when the source layout is invalid for this runtime.
    async fn validate(&self) -> Result<()>;

    /// Produces built artifacts, or fails. Not retried.
    async fn build(&self) -> Result<()>;

    /// Discovers the backend spec from the built source.
    async fn discover_spec(&self, runtime_config: &Value, env: &EnvMap) -> Result<BackendSpec>;
}

/// Selects the delegate for the context's declared runtime, probing the
/// source tree when no runtime is declared.
///
/// The caller has already validated that `source_dir` is configured and
/// exists; resolution only decides which runtime family owns the tree.
pub async fn resolve(
    context: &DelegateContext,
    policy: StdioPolicy,
) -> Result<Box<dyn RuntimeDelegate>> {
    let declared = context.runtime.as_str();
    if declared.is_empty() {
        return detect(context, policy).await;
    }
    if declared.starts_with("nodejs") {
        if !node::SUPPORTED_RUNTIMES.contains(&declared) {
            return Err(Error::UnsupportedRuntime(format!(
                "{declared} is not a supported Node.js runtime (supported: {})",
                node::SUPPORTED_RUNTIMES.join(", ")
            )));
        }
        return Ok(Box::new(NodeDelegate::new(context, policy)));
    }
    if declared.starts_with("python") {
        if !python::SUPPORTED_RUNTIMES.contains(&declared) {
            return Err(Error::UnsupportedRuntime(format!(
                "{declared} is not a supported Python runtime (supported: {})",
                python::SUPPORTED_RUNTIMES.join(", ")
            )));
        }
        return Ok(Box::new(PythonDelegate::new(context, policy)));
    }
    Err(Error::UnsupportedRuntime(format!(
        "{declared} does not match any registered runtime"
    )))
}

/// Filesystem probe for undeclared runtimes. A tree carrying both a
/// `package.json` and Python manifests resolves to Node.js.
async fn detect(
    context: &DelegateContext,
    policy: StdioPolicy,
) -> Result<Box<dyn RuntimeDelegate>> {
    if exists(context, "package.json").await {
        return Ok(Box::new(NodeDelegate::new(context, policy)));
    }
    if exists(context, "requirements.txt").await || exists(context, "pyproject.toml").await {
        return Ok(Box::new(PythonDelegate::new(context, policy)));
    }
    Err(Error::UnsupportedRuntime(format!(
        "unable to detect a runtime in {}; declare functions.runtime in firebase.json",
        context.source_dir.display()
    )))
}

async fn exists(context: &DelegateContext, file: &str) -> bool {
    tokio::fs::try_exists(context.source_dir.join(file))
        .await
        .unwrap_or(false)
}

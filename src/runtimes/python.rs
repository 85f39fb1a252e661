//! Python runtime delegate.

use super::harness;
use super::{DelegateContext, RuntimeDelegate};
use crate::backend::BackendSpec;
use crate::env::EnvMap;
use crate::error::{Error, Result};
use crate::spawn::StdioPolicy;
use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;
use tracing::debug;

pub const SUPPORTED_RUNTIMES: &[&str] = &["python310", "python311", "python312", "python313"];

const ENTRYPOINT: &str = "main.py";

#[derive(Debug)]
pub struct PythonDelegate {
    source_dir: PathBuf,
    policy: StdioPolicy,
}

impl PythonDelegate {
    pub fn new(context: &DelegateContext, policy: StdioPolicy) -> Self {
        PythonDelegate {
            source_dir: context.source_dir.clone(),
            policy,
        }
    }

    /// Prefers the project venv interpreter when one exists.
    fn interpreter(&self) -> String {
        let venv = self.source_dir.join("venv/bin/python");
        if venv.is_file() {
            return venv.display().to_string();
        }
        "python3".to_string()
    }
}

#[async_trait]
impl RuntimeDelegate for PythonDelegate {
    fn name(&self) -> &'static str {
        "python"
    }

    async fn validate(&self) -> Result<()> {
        if !self.source_dir.join(ENTRYPOINT).is_file() {
            return Err(Error::Validation {
                runtime: "python".to_string(),
                message: format!("no {ENTRYPOINT} found in {}", self.source_dir.display()),
            });
        }
        if !self.source_dir.join("requirements.txt").is_file() {
            return Err(Error::Validation {
                runtime: "python".to_string(),
                message: "no requirements.txt found next to main.py".to_string(),
            });
        }
        Ok(())
    }

    async fn build(&self) -> Result<()> {
        // Python sources deploy as-is; dependencies install server-side.
        debug!("python source needs no build step");
        Ok(())
    }

    async fn discover_spec(&self, runtime_config: &Value, env: &EnvMap) -> Result<BackendSpec> {
        if let Some(spec) = harness::static_manifest(&self.source_dir).await? {
            return Ok(spec);
        }
        harness::discover(
            &self.interpreter(),
            &[ENTRYPOINT.to_string()],
            &self.source_dir,
            runtime_config,
            env,
            self.policy,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn delegate(dir: &TempDir) -> PythonDelegate {
        PythonDelegate {
            source_dir: dir.path().to_path_buf(),
            policy: StdioPolicy::RedirectStdoutToStderr,
        }
    }

    #[tokio::test]
    async fn validate_requires_main_py() {
        let dir = TempDir::new().unwrap();
        let err = delegate(&dir).validate().await.unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
        assert!(err.to_string().contains("main.py"));
    }

    #[tokio::test]
    async fn validate_requires_requirements() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("main.py"), "").unwrap();
        let err = delegate(&dir).validate().await.unwrap_err();
        assert!(err.to_string().contains("requirements.txt"));
    }

    #[tokio::test]
    async fn validate_accepts_complete_layout() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("main.py"), "").unwrap();
        fs::write(dir.path().join("requirements.txt"), "firebase-functions\n").unwrap();
        delegate(&dir).validate().await.unwrap();
    }

    #[test]
    fn interpreter_prefers_venv() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("venv/bin")).unwrap();
        fs::write(dir.path().join("venv/bin/python"), "").unwrap();
        let interpreter = delegate(&dir).interpreter();
        assert!(interpreter.ends_with("venv/bin/python"));
    }

    #[test]
    fn interpreter_falls_back_to_system_python() {
        let dir = TempDir::new().unwrap();
        assert_eq!(delegate(&dir).interpreter(), "python3");
    }
}

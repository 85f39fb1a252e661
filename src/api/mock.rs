//! In-memory [`CloudApi`] for tests.

use super::{CloudApi, FirebaseProjectConfig, ACT_AS_PERMISSION};
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::RwLock;

/// Mock collaborator set with canned responses and a call journal, so
/// tests can assert which operations the pipeline invoked.
pub struct MockCloudApi {
    firebase_config: FirebaseProjectConfig,
    runtime_config: Value,
    runtime_config_enabled: bool,
    denied_permissions: HashSet<String>,
    enabled_apis: RwLock<HashSet<String>>,
    calls: RwLock<Vec<String>>,
}

impl MockCloudApi {
    pub fn new(project_id: &str) -> Self {
        MockCloudApi {
            firebase_config: FirebaseProjectConfig {
                project_id: project_id.to_string(),
                database_url: Some(format!("https://{project_id}.firebaseio.com")),
                storage_bucket: Some(format!("{project_id}.appspot.com")),
                location_id: None,
            },
            runtime_config: Value::Object(serde_json::Map::new()),
            runtime_config_enabled: true,
            denied_permissions: HashSet::new(),
            enabled_apis: RwLock::new(HashSet::new()),
            calls: RwLock::new(Vec::new()),
        }
    }

    pub fn with_runtime_config(mut self, config: Value) -> Self {
        self.runtime_config = config;
        self
    }

    pub fn with_runtime_config_disabled(mut self) -> Self {
        self.runtime_config_enabled = false;
        self
    }

    pub fn with_firebase_config(mut self, config: FirebaseProjectConfig) -> Self {
        self.firebase_config = config;
        self
    }

    pub fn deny_permission(mut self, permission: &str) -> Self {
        self.denied_permissions.insert(permission.to_string());
        self
    }

    /// Names of the operations invoked, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.read().unwrap().clone()
    }

    /// APIs the pipeline asked to enable.
    pub fn enabled_apis(&self) -> Vec<String> {
        let mut apis: Vec<String> = self.enabled_apis.read().unwrap().iter().cloned().collect();
        apis.sort();
        apis
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.write().unwrap().push(call.into());
    }
}

#[async_trait]
impl CloudApi for MockCloudApi {
    async fn ensure_api_enabled(&self, _project_id: &str, api: &str) -> Result<()> {
        self.record(format!("ensure_api_enabled:{api}"));
        self.enabled_apis.write().unwrap().insert(api.to_string());
        Ok(())
    }

    async fn check_api_enabled(&self, _project_id: &str, api: &str) -> Result<bool> {
        self.record(format!("check_api_enabled:{api}"));
        Ok(self.runtime_config_enabled)
    }

    async fn get_firebase_config(&self, _project_id: &str) -> Result<FirebaseProjectConfig> {
        self.record("get_firebase_config");
        Ok(self.firebase_config.clone())
    }

    async fn get_runtime_config(&self, _project_id: &str) -> Result<Value> {
        self.record("get_runtime_config");
        Ok(self.runtime_config.clone())
    }

    async fn test_permissions(
        &self,
        _project_id: &str,
        permissions: &[&str],
    ) -> Result<Vec<String>> {
        self.record("test_permissions");
        Ok(permissions
            .iter()
            .filter(|p| self.denied_permissions.contains(**p))
            .map(|p| p.to_string())
            .collect())
    }

    async fn check_service_account_iam(&self, _project_id: &str) -> Result<()> {
        self.record("check_service_account_iam");
        if self.denied_permissions.contains(ACT_AS_PERMISSION) {
            return Err(Error::Permission(vec![ACT_AS_PERMISSION.to_string()]));
        }
        Ok(())
    }
}

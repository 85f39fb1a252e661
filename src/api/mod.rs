//! Google API collaborators behind one trait for testable pipelines.
//!
//! Every remote interaction the pipeline needs — API enablement probes,
//! the Firebase project configuration, runtime config materialization,
//! permission and IAM checks — goes through [`CloudApi`]. The production
//! implementation talks HTTP; tests drive the pipeline against
//! [`MockCloudApi`].

mod http;
mod mock;

pub use http::HttpCloudApi;
pub use mock::MockCloudApi;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// API consumed by deployed functions.
pub const CLOUD_FUNCTIONS_API: &str = "cloudfunctions.googleapis.com";

/// Feature-gated API backing runtime configuration.
pub const RUNTIME_CONFIG_API: &str = "runtimeconfig.googleapis.com";

/// Permission required to read runtime configuration.
pub const CONFIG_GET_PERMISSION: &str = "cloudconfig.configs.get";

/// Permission required on the project's default service account.
pub const ACT_AS_PERMISSION: &str = "iam.serviceAccounts.actAs";

/// Remote Firebase project configuration (admin SDK config).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FirebaseProjectConfig {
    pub project_id: String,
    #[serde(rename = "databaseURL", skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_bucket: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location_id: Option<String>,
}

/// Remote collaborator operations the pipeline consumes.
///
/// Any error from these is fatal for the whole run; the pipeline never
/// retries or downgrades a collaborator failure.
#[async_trait]
pub trait CloudApi: Send + Sync {
    /// Checks the API's enablement state and enables it when disabled.
    async fn ensure_api_enabled(&self, project_id: &str, api: &str) -> Result<()>;

    /// Probe only: reports whether the API is enabled for the project.
    async fn check_api_enabled(&self, project_id: &str, api: &str) -> Result<bool>;

    /// Fetches the project's admin SDK configuration. Required input;
    /// failure aborts the pipeline.
    async fn get_firebase_config(&self, project_id: &str) -> Result<FirebaseProjectConfig>;

    /// Materializes every runtime-config varset into one nested object.
    async fn get_runtime_config(&self, project_id: &str) -> Result<Value>;

    /// Returns the subset of `permissions` the caller does NOT hold.
    async fn test_permissions(
        &self,
        project_id: &str,
        permissions: &[&str],
    ) -> Result<Vec<String>>;

    /// Verifies the caller may act as the project's App Engine default
    /// service account.
    async fn check_service_account_iam(&self, project_id: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_config_uses_firebase_field_names() {
        let config = FirebaseProjectConfig {
            project_id: "p".to_string(),
            database_url: Some("https://p.firebaseio.com".to_string()),
            storage_bucket: Some("p.appspot.com".to_string()),
            location_id: Some("us-central".to_string()),
        };
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["projectId"], "p");
        assert_eq!(json["databaseURL"], "https://p.firebaseio.com");
        assert_eq!(json["storageBucket"], "p.appspot.com");
        assert_eq!(json["locationId"], "us-central");
    }

    #[test]
    fn absent_optionals_are_omitted() {
        let config = FirebaseProjectConfig {
            project_id: "p".to_string(),
            ..Default::default()
        };
        let json = serde_json::to_value(&config).unwrap();
        assert!(json.get("databaseURL").is_none());
        assert!(json.get("storageBucket").is_none());
    }
}

//! HTTP implementation of the [`CloudApi`] collaborators.

use super::{CloudApi, FirebaseProjectConfig, ACT_AS_PERMISSION};
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, info};

const SERVICE_USAGE_ORIGIN: &str = "https://serviceusage.googleapis.com";
const FIREBASE_ORIGIN: &str = "https://firebase.googleapis.com";
const RUNTIME_CONFIG_ORIGIN: &str = "https://runtimeconfig.googleapis.com";
const RESOURCE_MANAGER_ORIGIN: &str = "https://cloudresourcemanager.googleapis.com";
const IAM_ORIGIN: &str = "https://iam.googleapis.com";

/// Production [`CloudApi`] talking to the Google endpoints with a bearer
/// token taken from the environment.
pub struct HttpCloudApi {
    client: reqwest::Client,
    token: String,
}

impl HttpCloudApi {
    /// Builds a client from `FIREBASE_TOKEN` or
    /// `GOOGLE_OAUTH_ACCESS_TOKEN`.
    pub fn from_env() -> Result<Self> {
        let token = std::env::var("FIREBASE_TOKEN")
            .or_else(|_| std::env::var("GOOGLE_OAUTH_ACCESS_TOKEN"))
            .map_err(|_| {
                Error::Api(
                    "no credentials: set FIREBASE_TOKEN or GOOGLE_OAUTH_ACCESS_TOKEN".to_string(),
                )
            })?;
        Ok(Self::with_token(token))
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        HttpCloudApi {
            client: reqwest::Client::new(),
            token: token.into(),
        }
    }

    async fn get_json(&self, url: &str) -> Result<Value> {
        debug!(url, "GET");
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await?;
        Self::into_json(url, response).await
    }

    async fn post_json(&self, url: &str, body: &Value) -> Result<Value> {
        debug!(url, "POST");
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await?;
        Self::into_json(url, response).await
    }

    async fn into_json(url: &str, response: reqwest::Response) -> Result<Value> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Api(format!("{status} from {url}: {body}")));
        }
        Ok(response.json().await?)
    }
}

#[derive(Debug, Deserialize)]
struct RuntimeConfigList {
    #[serde(default)]
    configs: Vec<RuntimeConfigEntry>,
}

#[derive(Debug, Deserialize)]
struct RuntimeConfigEntry {
    name: String,
}

#[derive(Debug, Deserialize)]
struct RuntimeVariableList {
    #[serde(default)]
    variables: Vec<RuntimeVariable>,
}

#[derive(Debug, Deserialize)]
struct RuntimeVariable {
    name: String,
    text: Option<String>,
    value: Option<String>,
}

/// Folds one varset's variables into a nested object keyed by the
/// segments of each variable path.
fn materialize_variables(config_id: &str, variables: &[RuntimeVariable], out: &mut Map<String, Value>) {
    let marker = "/variables/";
    for variable in variables {
        let path = match variable.name.find(marker) {
            Some(idx) => &variable.name[idx + marker.len()..],
            None => continue,
        };
        let value = variable
            .text
            .clone()
            .or_else(|| variable.value.clone())
            .unwrap_or_default();

        let entry = out
            .entry(config_id.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        let mut cursor = entry;
        let segments: Vec<&str> = path.split('/').collect();
        for (i, segment) in segments.iter().enumerate() {
            if i + 1 == segments.len() {
                if let Some(obj) = cursor.as_object_mut() {
                    obj.insert(segment.to_string(), Value::String(value.clone()));
                }
                break;
            }
            let obj = match cursor.as_object_mut() {
                Some(obj) => obj,
                None => break,
            };
            cursor = obj
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
        }
    }
}

#[async_trait]
impl CloudApi for HttpCloudApi {
    async fn ensure_api_enabled(&self, project_id: &str, api: &str) -> Result<()> {
        if self.check_api_enabled(project_id, api).await? {
            debug!(api, project_id, "API already enabled");
            return Ok(());
        }
        info!(api, project_id, "Enabling API");
        let url =
            format!("{SERVICE_USAGE_ORIGIN}/v1/projects/{project_id}/services/{api}:enable");
        self.post_json(&url, &json!({})).await?;
        Ok(())
    }

    async fn check_api_enabled(&self, project_id: &str, api: &str) -> Result<bool> {
        let url = format!("{SERVICE_USAGE_ORIGIN}/v1/projects/{project_id}/services/{api}");
        let service = self.get_json(&url).await?;
        Ok(service.get("state").and_then(Value::as_str) == Some("ENABLED"))
    }

    async fn get_firebase_config(&self, project_id: &str) -> Result<FirebaseProjectConfig> {
        let url = format!("{FIREBASE_ORIGIN}/v1beta1/projects/{project_id}/adminSdkConfig");
        let config = self.get_json(&url).await?;
        serde_json::from_value(config)
            .map_err(|e| Error::Api(format!("malformed adminSdkConfig response: {e}")))
    }

    async fn get_runtime_config(&self, project_id: &str) -> Result<Value> {
        let url = format!("{RUNTIME_CONFIG_ORIGIN}/v1beta1/projects/{project_id}/configs");
        let list: RuntimeConfigList = serde_json::from_value(self.get_json(&url).await?)
            .map_err(|e| Error::Api(format!("malformed configs response: {e}")))?;

        let mut materialized = Map::new();
        for config in &list.configs {
            let config_id = config.name.rsplit('/').next().unwrap_or(&config.name);
            let url = format!(
                "{RUNTIME_CONFIG_ORIGIN}/v1beta1/projects/{project_id}/configs/{config_id}/variables?returnValues=true"
            );
            let variables: RuntimeVariableList = serde_json::from_value(self.get_json(&url).await?)
                .map_err(|e| Error::Api(format!("malformed variables response: {e}")))?;
            materialize_variables(config_id, &variables.variables, &mut materialized);
        }
        Ok(Value::Object(materialized))
    }

    async fn test_permissions(
        &self,
        project_id: &str,
        permissions: &[&str],
    ) -> Result<Vec<String>> {
        let url = format!("{RESOURCE_MANAGER_ORIGIN}/v1/projects/{project_id}:testIamPermissions");
        let granted = self
            .post_json(&url, &json!({ "permissions": permissions }))
            .await?;
        let granted: Vec<String> = granted
            .get("permissions")
            .and_then(Value::as_array)
            .map(|perms| {
                perms
                    .iter()
                    .filter_map(Value::as_str)
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();
        Ok(permissions
            .iter()
            .filter(|p| !granted.iter().any(|g| g == *p))
            .map(|p| p.to_string())
            .collect())
    }

    async fn check_service_account_iam(&self, project_id: &str) -> Result<()> {
        let service_account = format!("{project_id}@appspot.gserviceaccount.com");
        let url = format!(
            "{IAM_ORIGIN}/v1/projects/{project_id}/serviceAccounts/{service_account}:testIamPermissions"
        );
        let granted = self
            .post_json(&url, &json!({ "permissions": [ACT_AS_PERMISSION] }))
            .await?;
        let allowed = granted
            .get("permissions")
            .and_then(Value::as_array)
            .map(|perms| perms.iter().any(|p| p.as_str() == Some(ACT_AS_PERMISSION)))
            .unwrap_or(false);
        if allowed {
            Ok(())
        } else {
            Err(Error::Permission(vec![ACT_AS_PERMISSION.to_string()]))
        }
    }
}

//! Discovered backend specification types.
//!
//! A runtime delegate produces a [`BackendSpec`]: the nested
//! group → region → endpoint structure plus the environment variables the
//! orchestrator attaches after discovery. Endpoints are opaque beyond
//! `id` and `region`; trigger details ride along untouched.

use crate::env::EnvMap;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// One deployable function trigger instance for one region.
///
/// The pipeline reads `id` and `region`; everything else (trigger type,
/// platform metadata) is carried opaquely in `details`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
    pub id: String,
    pub region: String,
    #[serde(flatten)]
    pub details: serde_json::Map<String, Value>,
}

/// The discovered set of endpoints plus merged environment variables.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendSpec {
    /// Function-group key → region key → endpoint.
    #[serde(default)]
    pub endpoints: BTreeMap<String, BTreeMap<String, Endpoint>>,
    /// Attached exactly once by the orchestrator after discovery.
    #[serde(default)]
    pub environment_variables: EnvMap,
}

impl BackendSpec {
    /// Parses a JSON discovery manifest written by a runtime harness.
    pub fn from_manifest_json(raw: &[u8]) -> Result<Self> {
        serde_json::from_slice(raw)
            .map_err(|e| Error::Discovery(format!("invalid discovery manifest: {e}")))
    }

    /// Parses a static `functions.yaml` manifest.
    pub fn from_manifest_yaml(raw: &str) -> Result<Self> {
        serde_yaml::from_str(raw)
            .map_err(|e| Error::Discovery(format!("invalid functions.yaml manifest: {e}")))
    }

    /// Total number of (function, region) leaves.
    pub fn endpoint_count(&self) -> usize {
        self.endpoints.values().map(|regions| regions.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"{
        "endpoints": {
            "foo": {
                "us-central1": {
                    "id": "foo",
                    "region": "us-central1",
                    "entryPoint": "foo",
                    "httpsTrigger": {}
                }
            }
        }
    }"#;

    #[test]
    fn parses_json_manifest() {
        let spec = BackendSpec::from_manifest_json(MANIFEST.as_bytes()).unwrap();
        assert_eq!(spec.endpoint_count(), 1);
        let endpoint = &spec.endpoints["foo"]["us-central1"];
        assert_eq!(endpoint.id, "foo");
        assert_eq!(endpoint.region, "us-central1");
        assert!(endpoint.details.contains_key("httpsTrigger"));
        assert!(spec.environment_variables.is_empty());
    }

    #[test]
    fn parses_yaml_manifest() {
        let spec = BackendSpec::from_manifest_yaml(
            r#"
endpoints:
  bar:
    europe-west1:
      id: bar
      region: europe-west1
      eventTrigger:
        eventType: google.pubsub.topic.publish
"#,
        )
        .unwrap();
        let endpoint = &spec.endpoints["bar"]["europe-west1"];
        assert_eq!(endpoint.id, "bar");
        assert_eq!(
            endpoint.details["eventTrigger"]["eventType"],
            "google.pubsub.topic.publish"
        );
    }

    #[test]
    fn endpoint_requires_id_and_region() {
        let err = BackendSpec::from_manifest_json(
            br#"{"endpoints":{"foo":{"us-central1":{"id":"foo"}}}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Discovery(_)));
    }

    #[test]
    fn counts_multi_region_endpoints() {
        let spec = BackendSpec::from_manifest_json(
            br#"{"endpoints":{
                "foo": {
                    "us-central1": {"id":"foo","region":"us-central1"},
                    "europe-west1": {"id":"foo","region":"europe-west1"}
                },
                "bar": {"us-central1": {"id":"bar","region":"us-central1"}}
            }}"#,
        )
        .unwrap();
        assert_eq!(spec.endpoint_count(), 3);
    }
}

//! Trigger flattening and response encoding.
//!
//! The discovered group → region → endpoint structure flattens into one
//! uniquely keyed trigger mapping, which the envelope serializes in one
//! of two encodings.

use crate::backend::BackendSpec;
use crate::env::EnvMap;
use crate::error::{Error, Result};
use crate::pipeline::DiscoveryOutcome;
use crate::request::OutputEncoding;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Ignore patterns assumed when the project declares none.
pub const DEFAULT_IGNORE: &[&str] = &["node_modules", ".git"];

/// Packaging patterns always appended to the ignore list.
pub const PACKAGING_IGNORE: &[&str] = &[
    "firebase-debug.log",
    "firebase-debug.*.log",
    ".runtimeconfig.json",
];

/// One flattened trigger: the endpoint's fields plus a copy of the
/// spec's merged environment variables.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerRecord {
    pub id: String,
    pub region: String,
    #[serde(flatten)]
    pub details: serde_json::Map<String, Value>,
    pub environment_variables: EnvMap,
}

/// Flattens every (group, region) leaf into a `{id}-{region}` keyed map.
///
/// Two endpoints resolving to the same key is a discovery conflict and
/// surfaces as an error; entries are never silently overwritten.
pub fn flatten(spec: &BackendSpec) -> Result<BTreeMap<String, TriggerRecord>> {
    let mut triggers = BTreeMap::new();
    for endpoint in spec.endpoints.values().flat_map(|regions| regions.values()) {
        let key = format!("{}-{}", endpoint.id, endpoint.region);
        let mut details = endpoint.details.clone();
        details.remove("environmentVariables");
        let record = TriggerRecord {
            id: endpoint.id.clone(),
            region: endpoint.region.clone(),
            details,
            environment_variables: spec.environment_variables.clone(),
        };
        if triggers.insert(key.clone(), record).is_some() {
            return Err(Error::Discovery(format!(
                "duplicate trigger key {key}; endpoint ids must be unique per region"
            )));
        }
    }
    Ok(triggers)
}

/// Final ignore list: project-declared patterns (or the default set)
/// with the packaging patterns appended, order preserved.
pub fn ignore_patterns(declared: Option<&[String]>) -> Vec<String> {
    let mut patterns: Vec<String> = match declared {
        Some(declared) => declared.to_vec(),
        None => DEFAULT_IGNORE.iter().map(|p| p.to_string()).collect(),
    };
    patterns.extend(PACKAGING_IGNORE.iter().map(|p| p.to_string()));
    patterns
}

/// The single response document.
#[derive(Debug)]
pub struct OutputEnvelope {
    pub project_id: String,
    pub source_dir: PathBuf,
    pub project_dir: PathBuf,
    pub ignore: Vec<String>,
    pub runtime_config: Value,
    pub triggers: BTreeMap<String, TriggerRecord>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NestedEnvelope<'a> {
    project_id: &'a str,
    source_dir: String,
    project_dir: String,
    ignore: &'a [String],
    runtime_config: &'a Value,
    triggers: &'a BTreeMap<String, TriggerRecord>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FlatEnvelope<'a> {
    project_id: &'a str,
    source_dir: String,
    project_dir: String,
    ignore: String,
    runtime_config: String,
    triggers: String,
}

impl OutputEnvelope {
    /// Assembles the envelope from a completed discovery run. The
    /// delegate context is echoed minus its resolved `runtime`.
    pub fn from_outcome(outcome: &DiscoveryOutcome) -> Result<Self> {
        Ok(OutputEnvelope {
            project_id: outcome.context.project_id.clone(),
            source_dir: outcome.context.source_dir.clone(),
            project_dir: outcome.context.project_dir.clone(),
            ignore: outcome.ignore.clone(),
            runtime_config: outcome.runtime_config.clone(),
            triggers: flatten(&outcome.backend)?,
        })
    }

    /// Serializes the envelope, pretty-printed.
    pub fn encode(&self, encoding: OutputEncoding) -> Result<String> {
        let source_dir = self.source_dir.display().to_string();
        let project_dir = self.project_dir.display().to_string();
        let doc = match encoding {
            OutputEncoding::Json => serde_json::to_string_pretty(&NestedEnvelope {
                project_id: &self.project_id,
                source_dir,
                project_dir,
                ignore: &self.ignore,
                runtime_config: &self.runtime_config,
                triggers: &self.triggers,
            })?,
            OutputEncoding::FlatJson => serde_json::to_string_pretty(&FlatEnvelope {
                project_id: &self.project_id,
                source_dir,
                project_dir,
                ignore: serde_json::to_string(&self.ignore)?,
                runtime_config: serde_json::to_string(&self.runtime_config)?,
                triggers: serde_json::to_string(&self.triggers)?,
            })?,
        };
        Ok(doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Endpoint;

    fn sample_spec() -> BackendSpec {
        BackendSpec::from_manifest_json(
            br#"{
                "endpoints": {
                    "foo": {
                        "us-central1": {
                            "id": "foo",
                            "region": "us-central1",
                            "httpsTrigger": {}
                        },
                        "europe-west1": {
                            "id": "foo",
                            "region": "europe-west1",
                            "httpsTrigger": {}
                        }
                    },
                    "bar": {
                        "us-central1": {"id": "bar", "region": "us-central1"}
                    }
                },
                "environmentVariables": {"GCLOUD_PROJECT": "my-project"}
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn one_entry_per_function_region_pair() {
        let triggers = flatten(&sample_spec()).unwrap();
        assert_eq!(triggers.len(), 3);
        assert!(triggers.contains_key("foo-us-central1"));
        assert!(triggers.contains_key("foo-europe-west1"));
        assert!(triggers.contains_key("bar-us-central1"));
    }

    #[test]
    fn triggers_carry_the_merged_environment() {
        let triggers = flatten(&sample_spec()).unwrap();
        let record = &triggers["foo-us-central1"];
        assert_eq!(record.environment_variables["GCLOUD_PROJECT"], "my-project");
        assert!(record.details.contains_key("httpsTrigger"));
    }

    #[test]
    fn per_endpoint_env_field_is_replaced_not_duplicated() {
        let mut spec = sample_spec();
        let endpoint = spec
            .endpoints
            .get_mut("bar")
            .unwrap()
            .get_mut("us-central1")
            .unwrap();
        endpoint.details.insert(
            "environmentVariables".to_string(),
            serde_json::json!({"STALE": "1"}),
        );
        let triggers = flatten(&spec).unwrap();
        let json = serde_json::to_value(&triggers["bar-us-central1"]).unwrap();
        assert_eq!(json["environmentVariables"]["GCLOUD_PROJECT"], "my-project");
        assert!(json["environmentVariables"].get("STALE").is_none());
    }

    #[test]
    fn duplicate_keys_surface_as_a_conflict() {
        let mut spec = sample_spec();
        // A second group whose endpoint collides with foo/us-central1.
        spec.endpoints.insert(
            "shadow".to_string(),
            [(
                "us-central1".to_string(),
                Endpoint {
                    id: "foo".to_string(),
                    region: "us-central1".to_string(),
                    details: serde_json::Map::new(),
                },
            )]
            .into_iter()
            .collect(),
        );
        let err = flatten(&spec).unwrap_err();
        assert!(matches!(err, Error::Discovery(_)));
        assert!(err.to_string().contains("foo-us-central1"));
    }

    #[test]
    fn default_ignore_list_matches_contract() {
        assert_eq!(
            ignore_patterns(None),
            vec![
                "node_modules",
                ".git",
                "firebase-debug.log",
                "firebase-debug.*.log",
                ".runtimeconfig.json"
            ]
        );
    }

    #[test]
    fn declared_ignore_patterns_come_first() {
        let declared = vec!["dist".to_string(), "*.tmp".to_string()];
        let patterns = ignore_patterns(Some(&declared));
        assert_eq!(
            patterns,
            vec![
                "dist",
                "*.tmp",
                "firebase-debug.log",
                "firebase-debug.*.log",
                ".runtimeconfig.json"
            ]
        );
    }
}

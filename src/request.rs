//! Discovery request parsing and validation.
//!
//! The request is a single JSON document read to completion from the
//! input channel before any processing begins. It is validated into an
//! immutable [`DiscoveryRequest`] at the boundary; malformed input never
//! reaches the pipeline.

use crate::error::{Error, Result};
use serde::Deserialize;
use serde_json::Value;
use std::io::Read;
use std::path::PathBuf;

/// Output encoding for the response envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputEncoding {
    /// Structured nested JSON (default).
    #[default]
    Json,
    /// Top-level structured fields serialized to JSON-encoded strings,
    /// for transport through systems that only carry flat string values.
    FlatJson,
}

#[derive(Debug, Deserialize)]
struct RawRequest {
    firebase_config: Option<String>,
    alias: Option<String>,
    formatting: Option<OutputEncoding>,
    runtime_config: Option<String>,
}

/// Validated discovery request. Immutable once constructed.
#[derive(Debug, Clone)]
pub struct DiscoveryRequest {
    /// Path to the project's `firebase.json`.
    pub firebase_config: PathBuf,
    /// Project alias or raw project id to resolve.
    pub alias: String,
    /// Response encoding.
    pub formatting: OutputEncoding,
    /// Caller-supplied runtime configuration. `Some` only when the field
    /// was present and decoded to a non-null value; a decoded `null` is
    /// treated exactly like an absent field.
    pub runtime_config: Option<Value>,
}

impl DiscoveryRequest {
    /// Reads one JSON request document to EOF and validates it.
    pub fn from_reader(mut reader: impl Read) -> Result<Self> {
        let mut raw = String::new();
        reader
            .read_to_string(&mut raw)
            .map_err(|e| Error::Input(format!("failed to read request: {e}")))?;
        Self::from_str(&raw)
    }

    /// Parses and validates a request from a JSON string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(raw: &str) -> Result<Self> {
        let raw: RawRequest = serde_json::from_str(raw)
            .map_err(|e| Error::Input(format!("request is not valid JSON: {e}")))?;

        let firebase_config = match raw.firebase_config {
            Some(p) if !p.trim().is_empty() => PathBuf::from(p),
            _ => {
                return Err(Error::Input(
                    "missing required field \"firebase_config\"".to_string(),
                ))
            }
        };
        let alias = match raw.alias {
            Some(a) if !a.trim().is_empty() => a,
            _ => return Err(Error::Input("missing required field \"alias\"".to_string())),
        };

        let runtime_config = match raw.runtime_config {
            None => None,
            Some(encoded) => {
                let value: Value = serde_json::from_str(&encoded).map_err(|e| {
                    Error::Input(format!("\"runtime_config\" is not valid JSON: {e}"))
                })?;
                // Only present-and-non-null counts as an override.
                if value.is_null() {
                    None
                } else {
                    Some(value)
                }
            }
        };

        Ok(DiscoveryRequest {
            firebase_config,
            alias,
            formatting: raw.formatting.unwrap_or_default(),
            runtime_config,
        })
    }
}

//! Error types for the discovery pipeline.
//!
//! Every failure in the pipeline is fatal: there is no retry or degraded
//! output. Errors carry their originating cause so the binary can print
//! the full chain before exiting non-zero.

use std::path::PathBuf;
use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the discovery pipeline.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed request document on the input channel.
    #[error("invalid request: {0}")]
    Input(String),

    /// Missing or invalid project configuration the user must fix.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// No runtime delegate matches the declared or detected runtime.
    #[error("unsupported runtime: {0}")]
    UnsupportedRuntime(String),

    /// Source code is invalid for the target runtime.
    #[error("{runtime} source validation failed: {message}")]
    Validation { runtime: String, message: String },

    /// Build step failed; build tool failures are not retried.
    #[error("{runtime} build failed: {message}")]
    Build { runtime: String, message: String },

    /// Caller lacks required access scopes.
    #[error("missing required permissions: {}", .0.join(", "))]
    Permission(Vec<String>),

    /// Delegate-level failure interpreting the built artifacts.
    #[error("backend discovery failed: {0}")]
    Discovery(String),

    /// A predeploy lifecycle hook exited unsuccessfully.
    #[error("lifecycle hook failed: {0}")]
    Hook(String),

    /// A Google API call returned an error response.
    #[error("API error: {0}")]
    Api(String),

    /// HTTP transport failure talking to a Google API.
    #[error("HTTP transport error")]
    Transport(#[from] reqwest::Error),

    /// JSON serialization failure while assembling the response.
    #[error("JSON error")]
    Json(#[from] serde_json::Error),

    /// Filesystem access failure.
    #[error("I/O error on {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    /// Process exit code for this error kind. Input errors exit with 2 so
    /// callers can distinguish a bad request from a failed pipeline.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Input(_) => 2,
            _ => 1,
        }
    }
}

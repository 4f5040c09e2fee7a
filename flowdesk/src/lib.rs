//! Flowdesk - client controller for the three-step text workflow builder
//!
//! This crate provides:
//! - The fixed action catalog and template handling
//! - A selection coordinator keeping the three step choices mutually exclusive
//! - A credential gate that validates and remembers the session key
//! - A streaming interpreter that renders per-step results as NDJSON arrives
//! - A reqwest-backed client for the workflow backend

pub mod api;
pub mod board;
pub mod catalog;
pub mod controller;
pub mod gate;
pub mod selection;
pub mod stream;
pub mod template;


pub use api::{ApiError, HttpWorkflowApi, WorkflowApi};
pub use board::{RunBoard, StepStatus};
pub use controller::{Controller, RunError, RunOutcome};
pub use gate::{CredentialGate, SessionKey, SessionStore};
pub use selection::{Selections, Step};
pub use stream::{StreamEvent, StreamInterpreter};

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors loading client configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Configuration for talking to the workflow backend
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the backend
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Timeout for request/response calls (seconds). Streaming runs only
    /// use the connect timeout.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Connect timeout (seconds)
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Name given to workflow definitions created by this client
    #[serde(default = "default_workflow_name")]
    pub workflow_name: String,

    /// Header carrying the session key on streaming runs
    #[serde(default = "default_api_key_header")]
    pub api_key_header: String,

    /// File backing the session key store, written owner-only
    #[serde(default = "default_session_file")]
    pub session_file: PathBuf,
}

fn default_base_url() -> String { "http://localhost:8000".to_string() }
fn default_request_timeout() -> u64 { 30 }
fn default_connect_timeout() -> u64 { 10 }
fn default_workflow_name() -> String { "Frontend Workflow".to_string() }
fn default_api_key_header() -> String { "x-groq-api-key".to_string() }

/// Per-user runtime dir (cleared at logout), else the user cache dir
fn default_session_file() -> PathBuf {
    dirs::runtime_dir()
        .or_else(dirs::cache_dir)
        .map(|dir| dir.join("flowdesk").join("session.json"))
        .unwrap_or_else(|| std::env::temp_dir().join("flowdesk-session.json"))
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            workflow_name: default_workflow_name(),
            api_key_header: default_api_key_header(),
            session_file: default_session_file(),
        }
    }
}

impl ClientConfig {
    /// Parse a TOML document; missing fields take their defaults
    pub fn from_toml(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    /// Load from an optional file, then apply environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                let contents =
                    std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                        path: path.to_path_buf(),
                        source,
                    })?;
                Self::from_toml(&contents).map_err(|source| ConfigError::Parse {
                    path: path.to_path_buf(),
                    source,
                })?
            }
            None => Self::default(),
        };
        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Override fields from `FLOWDESK_*` variables
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("FLOWDESK_BASE_URL") {
            self.base_url = url;
        }
        if let Some(file) = lookup("FLOWDESK_SESSION_FILE") {
            self.session_file = PathBuf::from(file);
        }
        self.base_url = self.base_url.trim_end_matches('/').to_string();
    }
}

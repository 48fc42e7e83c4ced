//! Error taxonomy shared by every stage of the tool.
//!
//! Configuration and lifecycle errors abort a command. `ApiError` is the only
//! one the seeder recovers from, one entity at a time.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Missing or malformed settings, reported before any network call.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required environment variables: {}", .0.join(", "))]
    Missing(Vec<&'static str>),

    #[error("Invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Container start/stop failures and health-check timeouts.
#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("Compose file not found at {0}")]
    ComposeFileMissing(PathBuf),

    #[error("`{command}` failed: {stderr}")]
    Command { command: String, stderr: String },

    #[error("Formbricks did not become healthy within {}s", .waited.as_secs())]
    HealthTimeout { waited: Duration },
}

/// Malformed or incomplete model output for one section of the dataset.
#[derive(Error, Debug)]
#[error("Invalid {section} from model: {reason}")]
pub struct GenerationError {
    pub section: &'static str,
    pub reason: String,
}

impl GenerationError {
    pub fn new(section: &'static str, reason: impl Into<String>) -> Self {
        Self {
            section,
            reason: reason.into(),
        }
    }
}

/// A single failed call against the Management or Client API.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Non-2xx answer. The body is kept exactly as the platform sent it.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Response did not contain an id: {0}")]
    MissingId(String),
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            ApiError::Transport(err) => err.status().map(|s| s.as_u16()),
            ApiError::MissingId(_) => None,
        }
    }
}

/// Reading or writing the dataset file.
#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("Dataset not found at {0}")]
    NotFound(PathBuf),

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed dataset {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Conditions under which seeding cannot start at all.
#[derive(Error, Debug)]
pub enum SeedError {
    #[error("Cannot reach Formbricks. Is it running?")]
    Unreachable,

    #[error("Authentication failed: {0}")]
    Unauthorized(#[source] ApiError),
}

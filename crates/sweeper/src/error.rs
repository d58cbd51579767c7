//! Error types for the sweeper library.

use thiserror::Error;

/// Main error type for sync operations.
#[derive(Error, Debug)]
pub enum SweepError {
    /// Configuration error (invalid YAML, unknown job, unknown adapter, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP transport error (connection refused, TLS, body read, etc.)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Remote endpoint answered with a non-success status
    #[error("Unexpected status {status} from {url}")]
    Status { url: String, status: u16 },

    /// Ledger storage error
    #[error("Ledger error: {0}")]
    Ledger(String),

    /// PostgreSQL ledger query error
    #[error("Ledger database error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    /// PostgreSQL ledger pool error
    #[error("Ledger pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    /// Push to a destination failed
    #[error("Push to {destination} failed: {message}")]
    Push { destination: String, message: String },

    /// One part of a chunked upload was rejected
    #[error("Chunked upload failed at part {part}: {message}")]
    Upload { part: u64, message: String },

    /// Remote shell command exited unsuccessfully
    #[error("Remote command failed on {host}: {message}")]
    Remote { host: String, message: String },

    /// Resource name unusable as a file name
    #[error("Invalid resource name: {0}")]
    InvalidName(String),

    /// Object storage error
    #[error("S3 error: {0}")]
    S3(String),

    /// IO error (staging files, local destinations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Job run was cancelled (SIGINT, etc.)
    #[error("Cancelled by user")]
    Cancelled,
}

impl SweepError {
    /// Create a Push error for a named destination
    pub fn push(destination: impl Into<String>, message: impl Into<String>) -> Self {
        SweepError::Push {
            destination: destination.into(),
            message: message.into(),
        }
    }

    /// Create an Upload error for a given part index
    pub fn upload(part: u64, message: impl Into<String>) -> Self {
        SweepError::Upload {
            part,
            message: message.into(),
        }
    }

    /// Create a Remote error
    pub fn remote(host: impl Into<String>, message: impl Into<String>) -> Self {
        SweepError::Remote {
            host: host.into(),
            message: message.into(),
        }
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            SweepError::Config(_) => 2,
            SweepError::Cancelled => 130,
            _ => 1,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for sync operations.
pub type Result<T> = std::result::Result<T, SweepError>;

//! Resource value object: one unit of content moved through a pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A transferable item and its fingerprint.
///
/// Built in memory by a source gateway (on fetch) or by the pipeline (on
/// error), persisted exactly once through the ledger and never mutated
/// afterwards. `staged_path` is transient and is never serialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    /// Stable identifier within a job (usually a file name).
    pub name: String,

    /// Hex digest of the full content.
    #[serde(default)]
    pub content_hash: Option<String>,

    /// Content length in bytes.
    #[serde(default)]
    pub size: Option<u64>,

    /// Failure message; presence marks this instance as an error record.
    #[serde(default)]
    pub error: Option<String>,

    /// Set by the ledger writer at record time.
    pub created_at: DateTime<Utc>,

    /// Local copy of the bytes inside the staging area.
    #[serde(skip)]
    pub staged_path: Option<PathBuf>,

    /// Job run that produced this record.
    #[serde(default)]
    pub run_id: Option<i64>,
}

impl Resource {
    /// Create a bare resource with only a name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content_hash: None,
            size: None,
            error: None,
            created_at: Utc::now(),
            staged_path: None,
            run_id: None,
        }
    }

    /// Create an error record for `name`.
    pub fn failed(name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::new(name)
        }
    }

    pub fn with_hash(mut self, hash: impl Into<String>) -> Self {
        self.content_hash = Some(hash.into());
        self
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    pub fn with_staged_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.staged_path = Some(path.into());
        self
    }

    /// Whether this instance records a failure.
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// A successful instance carries both hash and size and no error.
    pub fn is_complete(&self) -> bool {
        self.error.is_none() && self.content_hash.is_some() && self.size.is_some()
    }
}

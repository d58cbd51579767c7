//! Source adapters: enumerate the candidate resources of a job.

mod http_json;
mod static_list;

pub use http_json::{HttpJsonOptions, HttpJsonSource};
pub use static_list::{StaticOptions, StaticSource};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// One candidate resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceItem {
    /// Where the bytes are fetched from.
    #[serde(alias = "url")]
    pub locator: String,

    /// Resource name (stable within the job).
    pub name: String,
}

impl SourceItem {
    pub fn new(locator: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            locator: locator.into(),
            name: name.into(),
        }
    }
}

/// Lists the resources a job sweeps over.
///
/// Called once per run; the returned order is the processing order. An
/// error here is fatal for the run.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn name(&self) -> &str;

    async fn list(&self) -> Result<Vec<SourceItem>>;
}

use async_trait::async_trait;
use serde::Deserialize;

use super::{SourceAdapter, SourceItem};
use crate::error::Result;

#[derive(Debug, Clone, Deserialize)]
pub struct StaticOptions {
    #[serde(default)]
    pub items: Vec<SourceItem>,
}

/// Item list given directly in the job configuration.
pub struct StaticSource {
    items: Vec<SourceItem>,
}

impl StaticSource {
    pub fn new(options: StaticOptions) -> Self {
        Self {
            items: options.items,
        }
    }
}

#[async_trait]
impl SourceAdapter for StaticSource {
    fn name(&self) -> &str {
        "static"
    }

    async fn list(&self) -> Result<Vec<SourceItem>> {
        Ok(self.items.clone())
    }
}

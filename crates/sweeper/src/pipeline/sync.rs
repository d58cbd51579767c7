//! The standard pipeline: list, detect, fetch, push, record.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use super::context::PipelineContext;
use super::template::Pipeline;
use crate::error::{Result, SweepError};
use crate::fingerprint::HashAlgorithm;
use crate::gateway::{Destination, HttpDownloadGateway, PushRequest};
use crate::resource::Resource;
use crate::source::{SourceAdapter, SourceItem};

/// Sweeps a source into one or more destinations.
pub struct SyncPipeline {
    ctx: PipelineContext,
    source: Arc<dyn SourceAdapter>,
    downloader: HttpDownloadGateway,
    destinations: Vec<Arc<dyn Destination>>,
    mapping: BTreeMap<String, String>,
    hash: HashAlgorithm,
}

impl SyncPipeline {
    pub fn new(
        ctx: PipelineContext,
        source: Arc<dyn SourceAdapter>,
        downloader: HttpDownloadGateway,
        destinations: Vec<Arc<dyn Destination>>,
    ) -> Self {
        Self {
            ctx,
            source,
            downloader,
            destinations,
            mapping: BTreeMap::new(),
            hash: HashAlgorithm::default(),
        }
    }

    /// Only items present in a non-empty mapping are processed.
    pub fn with_mapping(mut self, mapping: BTreeMap<String, String>) -> Self {
        self.mapping = mapping;
        self
    }

    /// Algorithm the downloader hashes with, forwarded to destinations.
    pub fn with_hash(mut self, hash: HashAlgorithm) -> Self {
        self.hash = hash;
        self
    }

    async fn process(&mut self, item: &SourceItem) -> Result<()> {
        let fetched = self.downloader.fetch(&item.locator, &item.name).await?;
        if !fetched.changed {
            info!("{} has not changed.", item.name);
            self.ctx.stats_mut().unchanged += 1;
            return Ok(());
        }

        let resource = fetched.resource;
        self.push(&resource).await?;

        let size = resource.size.unwrap_or(0);
        self.ctx.register_file(resource).await?;
        let stats = self.ctx.stats_mut();
        stats.transferred += 1;
        stats.bytes += size;
        Ok(())
    }

    async fn push(&self, resource: &Resource) -> Result<()> {
        let path = resource.staged_path.as_deref().ok_or_else(|| {
            SweepError::push("pipeline", format!("{} was not staged", resource.name))
        })?;
        let request = PushRequest {
            resource,
            path,
            remote_id: self.mapping.get(&resource.name).map(String::as_str),
            checksum_type: self.hash,
        };

        for destination in &self.destinations {
            let receipt = destination.push(&request).await?;
            debug!(
                "{} pushed to {}: {}",
                resource.name, receipt.destination, receipt.descriptor
            );
        }
        Ok(())
    }
}

#[async_trait]
impl Pipeline for SyncPipeline {
    fn context(&self) -> &PipelineContext {
        &self.ctx
    }

    fn context_mut(&mut self) -> &mut PipelineContext {
        &mut self.ctx
    }

    async fn run(&mut self) -> Result<()> {
        let items = self.source.list().await?;
        info!(
            "{}: {} listed {} item(s)",
            self.ctx.job(),
            self.source.name(),
            items.len()
        );
        self.ctx.stats_mut().listed = items.len();

        for item in items {
            if !self.mapping.is_empty() && !self.mapping.contains_key(&item.name) {
                info!("{} not found in mapping", item.name);
                self.ctx.stats_mut().skipped += 1;
                continue;
            }

            if let Err(e) = self.process(&item).await {
                self.ctx
                    .register_error(Resource::failed(&item.name, e.to_string()))
                    .await?;
            }
        }
        Ok(())
    }
}

//! Per-run state shared by every pipeline implementation.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, error};

use crate::detect::{ChangeCheck, LedgerChangeDetector};
use crate::error::{Result, SweepError};
use crate::fingerprint::Fingerprint;
use crate::ledger::LedgerStore;
use crate::resource::Resource;
use crate::staging::StagingArea;

/// Counters for one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepStats {
    /// Items returned by the source.
    pub listed: usize,
    /// Items pushed and recorded.
    pub transferred: usize,
    /// Items the change detector reported unchanged.
    pub unchanged: usize,
    /// Items not in the job mapping.
    pub skipped: usize,
    /// Items recorded as errors.
    pub failed: usize,
    /// Bytes pushed (counted once per resource).
    pub bytes: u64,
}

/// Ledger handle, staging area and error list of one job run.
pub struct PipelineContext {
    job: String,
    run_id: Option<i64>,
    ledger: Arc<dyn LedgerStore>,
    detector: Arc<LedgerChangeDetector>,
    staging: StagingArea,
    errors: Vec<Resource>,
    stats: SweepStats,
}

impl PipelineContext {
    pub fn new(job: impl Into<String>, ledger: Arc<dyn LedgerStore>, staging: StagingArea) -> Self {
        let job = job.into();
        let detector = Arc::new(LedgerChangeDetector::new(ledger.clone(), job.clone()));
        Self {
            job,
            run_id: None,
            ledger,
            detector,
            staging,
            errors: Vec::new(),
            stats: SweepStats::default(),
        }
    }

    pub fn job(&self) -> &str {
        &self.job
    }

    pub fn run_id(&self) -> Option<i64> {
        self.run_id
    }

    /// Rows registered from now on reference this run.
    pub fn set_run_id(&mut self, run_id: i64) {
        self.run_id = Some(run_id);
    }

    pub fn staging(&self) -> &StagingArea {
        &self.staging
    }

    /// Change detector bound to this job, for gateways.
    pub fn detector(&self) -> Arc<dyn ChangeCheck> {
        self.detector.clone()
    }

    pub fn errors(&self) -> &[Resource] {
        &self.errors
    }

    pub fn stats(&self) -> &SweepStats {
        &self.stats
    }

    pub fn stats_mut(&mut self) -> &mut SweepStats {
        &mut self.stats
    }

    pub async fn file_has_changed(&self, name: &str, fingerprint: &Fingerprint) -> Result<bool> {
        self.detector.has_changed(name, fingerprint).await
    }

    /// Record a successfully handled resource.
    pub async fn register_file(&mut self, mut resource: Resource) -> Result<i64> {
        resource.run_id = self.run_id;
        resource.created_at = Utc::now();
        resource.staged_path = None;

        let id = self.ledger.insert_resource(&self.job, &resource).await?;
        debug!("Registered {} (row {})", resource.name, id);
        Ok(id)
    }

    /// Record a per-resource failure. The error is kept in memory before
    /// the ledger write, so it still counts if persisting fails.
    pub async fn register_error(&mut self, mut resource: Resource) -> Result<i64> {
        let Some(message) = resource.error.as_deref() else {
            return Err(SweepError::Ledger(format!(
                "error record for {} carries no error",
                resource.name
            )));
        };
        error!("{}: {}", resource.name, message);

        resource.run_id = self.run_id;
        resource.created_at = Utc::now();
        resource.staged_path = None;

        self.errors.push(resource.clone());
        self.stats.failed += 1;
        self.ledger.insert_resource(&self.job, &resource).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::MemoryLedger;
    use tempfile::tempdir;

    async fn context() -> (PipelineContext, Arc<MemoryLedger>, tempfile::TempDir) {
        let root = tempdir().unwrap();
        let ledger = Arc::new(MemoryLedger::new());
        let staging = StagingArea::create(root.path(), "sync").await.unwrap();
        (PipelineContext::new("sync", ledger.clone(), staging), ledger, root)
    }

    #[tokio::test]
    async fn test_register_file_stamps_run() {
        let (mut ctx, ledger, _root) = context().await;
        ctx.set_run_id(7);

        ctx.register_file(
            Resource::new("a.zip")
                .with_hash("h")
                .with_size(10)
                .with_staged_path("/tmp/x"),
        )
        .await
        .unwrap();

        let rows = ledger.resources("sync").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].run_id, Some(7));
        assert!(rows[0].staged_path.is_none());
        assert!(ctx.errors().is_empty());
        assert!(!ctx
            .file_has_changed("a.zip", &Fingerprint::hash("h"))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_register_error_appends_and_persists() {
        let (mut ctx, ledger, _root) = context().await;

        ctx.register_error(Resource::failed("b.zip", "connection reset"))
            .await
            .unwrap();

        assert_eq!(ctx.errors().len(), 1);
        assert_eq!(ctx.stats().failed, 1);
        let rows = ledger.resources("sync").await.unwrap();
        assert_eq!(rows[0].error.as_deref(), Some("connection reset"));
    }

    #[tokio::test]
    async fn test_register_error_requires_error() {
        let (mut ctx, _ledger, _root) = context().await;
        assert!(ctx.register_error(Resource::new("c.zip")).await.is_err());
        assert!(ctx.errors().is_empty());
    }
}

//! Process-local ledger.
//!
//! History only lives as long as the handle, so change detection sees every
//! resource as new on the next process start.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use super::{JobRun, LedgerStore, LedgerTables, RunEnd};
use crate::error::Result;
use crate::resource::Resource;

/// In-memory ledger backend.
#[derive(Default)]
pub struct MemoryLedger {
    tables: Mutex<LedgerTables>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedger {
    async fn init(&self) -> Result<()> {
        Ok(())
    }

    async fn insert_resource(&self, job: &str, resource: &Resource) -> Result<i64> {
        Ok(self.tables.lock().await.insert_resource(job, resource))
    }

    async fn latest_resource(
        &self,
        job: &str,
        name: &str,
        exclude_errored: bool,
    ) -> Result<Option<Resource>> {
        Ok(self
            .tables
            .lock()
            .await
            .latest_resource(job, name, exclude_errored))
    }

    async fn resources(&self, job: &str) -> Result<Vec<Resource>> {
        Ok(self.tables.lock().await.resources(job))
    }

    async fn start_run(&self, job: &str, started_at: DateTime<Utc>) -> Result<i64> {
        Ok(self.tables.lock().await.start_run(job, started_at))
    }

    async fn end_run(&self, run_id: i64, end: &RunEnd) -> Result<()> {
        self.tables.lock().await.end_run(run_id, end)
    }

    async fn runs(&self, job: &str, limit: usize) -> Result<Vec<JobRun>> {
        Ok(self.tables.lock().await.runs(job, limit))
    }

    fn backend_type(&self) -> &'static str {
        "memory"
    }
}

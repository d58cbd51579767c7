//! Run ledger: durable history of resource records and job runs.
//!
//! The [`LedgerStore`] trait defines the storage contract used by change
//! detection, the pipeline and the run recorder. Implementations:
//!
//! - **Memory**: [`MemoryLedger`], process-local (tests, experiments)
//! - **File**: [`FileLedger`], one JSON document written atomically
//! - **PostgreSQL**: [`PgLedger`], `_sweeper` schema
//!
//! A ledger handle is opened explicitly per job run and closed when the run
//! is over; nothing in the crate keeps a process-wide connection.

mod db;
mod file;
mod memory;
mod tables;

pub use db::PgLedger;
pub use file::FileLedger;
pub use memory::MemoryLedger;
pub use tables::LedgerTables;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::{LedgerBackend, LedgerConfig};
use crate::error::{Result, SweepError};
use crate::resource::Resource;

/// One execution of a named job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRun {
    /// Identifier assigned by the ledger at start.
    pub id: i64,

    /// Job name.
    pub job: String,

    pub started_at: DateTime<Utc>,

    /// Set exactly once when the run is closed.
    pub ended_at: Option<DateTime<Utc>>,

    /// Fatal error (pipeline failure or cancellation).
    pub error: Option<String>,

    /// True when at least one per-resource error was recorded.
    #[serde(default)]
    pub has_partial_errors: bool,
}

/// Fields written when a run is closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunEnd {
    pub ended_at: DateTime<Utc>,
    pub error: Option<String>,
    pub has_partial_errors: bool,
}

/// Trait for ledger persistence backends.
///
/// Implementations must provide read-your-writes consistency within one
/// process. Ids are assigned by the store and grow monotonically.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Create tables/files if needed. Idempotent.
    async fn init(&self) -> Result<()>;

    /// Append a resource row to the job's table and return its id.
    async fn insert_resource(&self, job: &str, resource: &Resource) -> Result<i64>;

    /// Most recent resource row for `name` (by `created_at`, then id).
    ///
    /// With `exclude_errored`, rows carrying an error are ignored.
    async fn latest_resource(
        &self,
        job: &str,
        name: &str,
        exclude_errored: bool,
    ) -> Result<Option<Resource>>;

    /// All resource rows of a job in insertion order.
    async fn resources(&self, job: &str) -> Result<Vec<Resource>>;

    /// Insert a new run row with `ended_at = NULL` and return its id.
    async fn start_run(&self, job: &str, started_at: DateTime<Utc>) -> Result<i64>;

    /// Close a run row.
    async fn end_run(&self, run_id: i64, end: &RunEnd) -> Result<()>;

    /// Most recent runs of a job, newest first.
    async fn runs(&self, job: &str, limit: usize) -> Result<Vec<JobRun>>;

    /// Release the handle (flush, return connections).
    async fn close(&self) -> Result<()> {
        Ok(())
    }

    /// Backend type name for logging.
    fn backend_type(&self) -> &'static str;
}

/// Open the configured ledger backend and initialize its schema.
pub async fn open(config: &LedgerConfig) -> Result<Arc<dyn LedgerStore>> {
    let ledger: Arc<dyn LedgerStore> = match config.backend {
        LedgerBackend::Memory => Arc::new(MemoryLedger::new()),
        LedgerBackend::File => {
            let path = config.path.clone().ok_or_else(|| {
                SweepError::Config("main.ledger.path is required for the file backend".into())
            })?;
            Arc::new(FileLedger::open(path).await?)
        }
        LedgerBackend::Postgres => {
            let url = config.url.as_deref().ok_or_else(|| {
                SweepError::Config("main.ledger.url is required for the postgres backend".into())
            })?;
            Arc::new(PgLedger::connect(url, config.max_connections)?)
        }
    };

    ledger.init().await?;
    info!("Opened {} ledger", ledger.backend_type());
    Ok(ledger)
}

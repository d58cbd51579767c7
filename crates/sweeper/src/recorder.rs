//! Job run bookkeeping.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::ledger::{LedgerStore, RunEnd};
use crate::resource::Resource;

/// Opens and closes job run rows.
#[derive(Clone)]
pub struct RunRecorder {
    ledger: Arc<dyn LedgerStore>,
}

impl RunRecorder {
    pub fn new(ledger: Arc<dyn LedgerStore>) -> Self {
        Self { ledger }
    }

    /// Insert a run row stamped now and return its id.
    pub async fn start(&self, job: &str) -> Result<i64> {
        let id = self.ledger.start_run(job, Utc::now()).await?;
        info!("Job {} started (run {})", job, id);
        Ok(id)
    }

    /// Close a run. `fatal` is the message of the error that ended it, if
    /// any; `errors` are the per-resource errors collected during the sweep.
    pub async fn end(&self, run_id: i64, fatal: Option<&str>, errors: &[Resource]) -> Result<()> {
        let end = RunEnd {
            ended_at: Utc::now(),
            error: fatal.map(str::to_string),
            has_partial_errors: !errors.is_empty(),
        };
        self.ledger.end_run(run_id, &end).await?;

        match (fatal, errors.len()) {
            (Some(error), _) => warn!("Run {} ended with error: {}", run_id, error),
            (None, 0) => info!("Run {} ended", run_id),
            (None, n) => warn!("Run {} ended with {} resource error(s)", run_id, n),
        }
        debug!("Run {} closed at {}", run_id, end.ended_at);
        Ok(())
    }
}

//! Template Method pattern for job pipelines.
//!
//! [`Pipeline`] defines the steps of a job; [`execute`] drives them in a
//! fixed order and guarantees the closing steps:
//!
//! 1. `pre_run`
//! 2. `run`, raced against cancellation
//! 3. `post_run` (always)
//! 4. job run closed through the recorder (always)
//! 5. `teardown` (always)

use async_trait::async_trait;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::context::{PipelineContext, SweepStats};
use crate::error::{Result, SweepError};
use crate::recorder::RunRecorder;
use crate::resource::Resource;

/// Steps of a job. Only `run` is required.
#[async_trait]
pub trait Pipeline: Send + Sync {
    fn context(&self) -> &PipelineContext;

    fn context_mut(&mut self) -> &mut PipelineContext;

    /// Before the sweep. An error here is fatal and skips `run`.
    async fn pre_run(&mut self) -> Result<()> {
        Ok(())
    }

    /// The sweep. Per-resource failures should be registered through
    /// [`PipelineContext::register_error`]; an error returned here is fatal.
    async fn run(&mut self) -> Result<()>;

    /// After the sweep, whatever its outcome.
    async fn post_run(&mut self) -> Result<()> {
        Ok(())
    }

    /// Release everything the run holds. Default: remove the staging area.
    async fn teardown(&mut self) -> Result<()> {
        self.context().staging().remove().await
    }
}

/// What a finished (non-fatal) run produced.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: i64,
    pub cancelled: bool,
    pub errors: Vec<Resource>,
    pub stats: SweepStats,
}

/// Drive `pipeline` through its lifecycle for an already started run.
///
/// Cancellation ends the run with "Cancelled by user" and returns `Ok`.
/// Any other fatal error is recorded on the run and then returned.
pub async fn execute(
    pipeline: &mut dyn Pipeline,
    recorder: &RunRecorder,
    run_id: i64,
    cancel: &CancellationToken,
) -> Result<RunReport> {
    pipeline.context_mut().set_run_id(run_id);
    let job = pipeline.context().job().to_string();

    let mut outcome = pipeline.pre_run().await;
    if outcome.is_ok() {
        outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(SweepError::Cancelled),
            result = pipeline.run() => result,
        };
    }

    match pipeline.post_run().await {
        Ok(()) => {}
        Err(e) if outcome.is_ok() => outcome = Err(e),
        Err(e) => warn!("{}: post_run failed after an earlier error: {}", job, e),
    }

    let fatal = outcome.as_ref().err().map(|e| e.to_string());
    let errors = pipeline.context().errors().to_vec();
    let recorded = recorder.end(run_id, fatal.as_deref(), &errors).await;

    if let Err(e) = pipeline.teardown().await {
        warn!("{}: teardown failed: {}", job, e);
    }

    match outcome {
        Ok(()) => {
            recorded?;
            info!("{}: {}", job, summary(pipeline.context().stats()));
            Ok(RunReport {
                run_id,
                cancelled: false,
                errors,
                stats: pipeline.context().stats().clone(),
            })
        }
        Err(SweepError::Cancelled) => {
            recorded?;
            warn!("{}: cancelled by user", job);
            Ok(RunReport {
                run_id,
                cancelled: true,
                errors,
                stats: pipeline.context().stats().clone(),
            })
        }
        Err(e) => {
            if let Err(ledger_error) = recorded {
                error!("{}: could not close run {}: {}", job, run_id, ledger_error);
            }
            Err(e)
        }
    }
}

fn summary(stats: &SweepStats) -> String {
    format!(
        "{} listed, {} transferred ({} bytes), {} unchanged, {} skipped, {} failed",
        stats.listed, stats.transferred, stats.bytes, stats.unchanged, stats.skipped, stats.failed
    )
}

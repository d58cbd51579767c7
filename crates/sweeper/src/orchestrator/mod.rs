//! Job orchestrator - main entry point for running a configured job.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::catalog::{AdapterCatalog, ResolvedJob};
use crate::config::Config;
use crate::error::{Result, SweepError};
use crate::gateway::HttpDownloadGateway;
use crate::ledger::{self, JobRun, LedgerStore};
use crate::pipeline::{execute, PipelineContext, RunReport, SweepStats, SyncPipeline};
use crate::recorder::RunRecorder;
use crate::resource::Resource;
use crate::staging::StagingArea;

/// Job orchestrator.
pub struct Orchestrator {
    config: Config,
    jobs: BTreeMap<String, ResolvedJob>,
}

/// Final status of a run that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepStatus {
    Completed,
    CompletedWithErrors,
    Cancelled,
}

impl fmt::Display for SweepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SweepStatus::Completed => "completed",
            SweepStatus::CompletedWithErrors => "completed_with_errors",
            SweepStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// A per-resource failure, as reported to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct ResourceError {
    pub name: String,
    pub error: String,
}

/// Result of a job run.
#[derive(Debug, Clone, Serialize)]
pub struct SweepResult {
    /// Job run id assigned by the ledger.
    pub run_id: i64,

    pub job: String,

    pub status: SweepStatus,

    /// When the run started.
    pub started_at: DateTime<Utc>,

    /// When the run completed.
    pub completed_at: DateTime<Utc>,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    #[serde(flatten)]
    pub stats: SweepStats,

    /// Resources that failed during the sweep.
    pub errors: Vec<ResourceError>,
}

impl SweepResult {
    fn from_report(
        job: &str,
        report: RunReport,
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
    ) -> Self {
        let status = if report.cancelled {
            SweepStatus::Cancelled
        } else if report.errors.is_empty() {
            SweepStatus::Completed
        } else {
            SweepStatus::CompletedWithErrors
        };

        Self {
            run_id: report.run_id,
            job: job.to_string(),
            status,
            started_at,
            completed_at,
            duration_seconds: (completed_at - started_at).num_milliseconds() as f64 / 1000.0,
            stats: report.stats,
            errors: report
                .errors
                .into_iter()
                .map(|r| ResourceError {
                    error: r.error.unwrap_or_default(),
                    name: r.name,
                })
                .collect(),
        }
    }

    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Recent runs and latest resource rows of a job.
#[derive(Debug, Clone, Serialize)]
pub struct JobHistory {
    pub job: String,
    pub runs: Vec<JobRun>,
    pub resources: Vec<Resource>,
}

impl JobHistory {
    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl Orchestrator {
    /// Create an orchestrator with the built-in adapters.
    pub fn new(config: Config) -> Result<Self> {
        Self::with_catalog(config, &AdapterCatalog::with_builtins())
    }

    /// Create an orchestrator resolving adapters through `catalog`.
    ///
    /// Every job is resolved up front, so unknown adapter types, malformed
    /// options and missing secrets are reported here.
    pub fn with_catalog(config: Config, catalog: &AdapterCatalog) -> Result<Self> {
        config.validate()?;

        let client = reqwest::Client::builder()
            .user_agent(concat!("sweeper/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SweepError::Config(format!("HTTP client: {}", e)))?;

        let mut jobs = BTreeMap::new();
        for (name, job) in &config.jobs {
            jobs.insert(name.clone(), catalog.resolve_job(name, job, &client)?);
        }

        Ok(Self { config, jobs })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Names of the configured jobs.
    pub fn job_names(&self) -> impl Iterator<Item = &str> {
        self.jobs.keys().map(String::as_str)
    }

    fn resolved(&self, name: &str) -> Result<&ResolvedJob> {
        self.config.job(name)?;
        self.jobs
            .get(name)
            .ok_or_else(|| SweepError::Config(format!("Job '{}' is not resolved", name)))
    }

    /// Open the configured ledger. The caller closes it.
    pub async fn open_ledger(&self) -> Result<Arc<dyn LedgerStore>> {
        ledger::open(&self.config.main.ledger).await
    }

    /// Run one job to completion.
    ///
    /// Cancellation through `cancel` ends the run gracefully and returns a
    /// result with status `cancelled`. A fatal error is recorded on the job
    /// run and then returned.
    pub async fn run_job(&self, name: &str, cancel: CancellationToken) -> Result<SweepResult> {
        let job = self.resolved(name)?;
        let started_at = Utc::now();

        let ledger = self.open_ledger().await?;
        let result = self.run_with_ledger(job, ledger.clone(), &cancel).await;
        if let Err(e) = ledger.close().await {
            warn!("Failed to close ledger: {}", e);
        }

        let report = result?;
        let result = SweepResult::from_report(name, report, started_at, Utc::now());
        info!(
            "Job {} {} in {:.1}s",
            name, result.status, result.duration_seconds
        );
        Ok(result)
    }

    async fn run_with_ledger(
        &self,
        job: &ResolvedJob,
        ledger: Arc<dyn LedgerStore>,
        cancel: &CancellationToken,
    ) -> Result<RunReport> {
        let recorder = RunRecorder::new(ledger.clone());
        let run_id = recorder.start(&job.name).await?;

        let staging = match StagingArea::create(&self.config.main.staging_dir, &job.name).await {
            Ok(staging) => staging,
            Err(e) => {
                if let Err(ledger_error) = recorder.end(run_id, Some(&e.to_string()), &[]).await {
                    error!("Could not close run {}: {}", run_id, ledger_error);
                }
                return Err(e);
            }
        };

        let ctx = PipelineContext::new(&job.name, ledger, staging.clone());
        let downloader = HttpDownloadGateway::new(job.client.clone(), ctx.detector(), staging)
            .with_hash(job.config.hash)
            .with_chunk_size(job.config.download_chunk_size)
            .with_basic_auth(job.basic_auth());

        let mut pipeline = SyncPipeline::new(
            ctx,
            job.source.clone(),
            downloader,
            job.destinations.clone(),
        )
        .with_mapping(job.config.mapping.clone())
        .with_hash(job.config.hash);

        execute(&mut pipeline, &recorder, run_id, cancel).await
    }

    /// Recent runs (newest first) and the latest row of every resource.
    pub async fn history(&self, name: &str, limit: usize) -> Result<JobHistory> {
        self.resolved(name)?;
        let ledger = self.open_ledger().await?;
        let result = Self::read_history(ledger.as_ref(), name, limit).await;
        if let Err(e) = ledger.close().await {
            warn!("Failed to close ledger: {}", e);
        }
        result
    }

    async fn read_history(ledger: &dyn LedgerStore, name: &str, limit: usize) -> Result<JobHistory> {
        let runs = ledger.runs(name, limit).await?;

        let names: BTreeSet<String> = ledger
            .resources(name)
            .await?
            .into_iter()
            .map(|r| r.name)
            .collect();
        let mut resources = Vec::with_capacity(names.len());
        for resource_name in &names {
            if let Some(latest) = ledger.latest_resource(name, resource_name, false).await? {
                resources.push(latest);
            }
        }

        Ok(JobHistory {
            job: name.to_string(),
            runs,
            resources,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serialization() {
        assert_eq!(
            serde_json::to_string(&SweepStatus::CompletedWithErrors).unwrap(),
            "\"completed_with_errors\""
        );
        assert_eq!(SweepStatus::Cancelled.to_string(), "cancelled");
    }

    #[test]
    fn test_result_from_report() {
        let started = Utc::now();
        let report = RunReport {
            run_id: 3,
            cancelled: false,
            errors: vec![Resource::failed("b.zip", "timeout")],
            stats: SweepStats {
                listed: 2,
                transferred: 1,
                failed: 1,
                bytes: 10,
                ..Default::default()
            },
        };
        let result = SweepResult::from_report(
            "sync",
            report,
            started,
            started + chrono::Duration::milliseconds(1500),
        );

        assert_eq!(result.status, SweepStatus::CompletedWithErrors);
        assert_eq!(result.duration_seconds, 1.5);

        let json: serde_json::Value = serde_json::from_str(&result.to_json().unwrap()).unwrap();
        assert_eq!(json["run_id"], 3);
        assert_eq!(json["status"], "completed_with_errors");
        assert_eq!(json["transferred"], 1);
        assert_eq!(json["errors"][0]["name"], "b.zip");
        assert_eq!(json["errors"][0]["error"], "timeout");
    }

    #[test]
    fn test_unknown_job() {
        let config = Config::from_yaml(
            r#"
main:
  ledger:
    backend: memory
jobs:
  sync:
    source:
      type: static
      items: []
    destinations:
      - type: local
        dir: /tmp/sweeper-out
"#,
        )
        .unwrap();
        let orchestrator = Orchestrator::new(config).unwrap();
        assert_eq!(orchestrator.job_names().collect::<Vec<_>>(), vec!["sync"]);

        let err = orchestrator.resolved("nope").err().unwrap();
        assert_eq!(err.exit_code(), 2);
    }
}

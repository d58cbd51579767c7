//! In-process ledger tables shared by the memory and file backends.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{JobRun, RunEnd};
use crate::error::{Result, SweepError};
use crate::resource::Resource;

/// A persisted resource row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceRow {
    pub id: i64,
    #[serde(flatten)]
    pub resource: Resource,
}

/// Per-job resource tables plus the shared run table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerTables {
    #[serde(default)]
    next_resource_id: i64,

    #[serde(default)]
    next_run_id: i64,

    /// Resource rows keyed by job name.
    #[serde(default)]
    pub resources: BTreeMap<String, Vec<ResourceRow>>,

    /// Job run rows, in creation order.
    #[serde(default)]
    pub runs: Vec<JobRun>,
}

impl LedgerTables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_resource(&mut self, job: &str, resource: &Resource) -> i64 {
        self.next_resource_id += 1;
        let id = self.next_resource_id;

        let mut stored = resource.clone();
        stored.staged_path = None;

        self.resources
            .entry(job.to_string())
            .or_default()
            .push(ResourceRow {
                id,
                resource: stored,
            });
        id
    }

    pub fn latest_resource(&self, job: &str, name: &str, exclude_errored: bool) -> Option<Resource> {
        self.resources
            .get(job)?
            .iter()
            .filter(|row| row.resource.name == name)
            .filter(|row| !exclude_errored || row.resource.error.is_none())
            .max_by_key(|row| (row.resource.created_at, row.id))
            .map(|row| row.resource.clone())
    }

    pub fn resources(&self, job: &str) -> Vec<Resource> {
        self.resources
            .get(job)
            .map(|rows| rows.iter().map(|row| row.resource.clone()).collect())
            .unwrap_or_default()
    }

    pub fn start_run(&mut self, job: &str, started_at: DateTime<Utc>) -> i64 {
        self.next_run_id += 1;
        let id = self.next_run_id;
        self.runs.push(JobRun {
            id,
            job: job.to_string(),
            started_at,
            ended_at: None,
            error: None,
            has_partial_errors: false,
        });
        id
    }

    pub fn end_run(&mut self, run_id: i64, end: &RunEnd) -> Result<()> {
        let run = self
            .runs
            .iter_mut()
            .find(|r| r.id == run_id)
            .ok_or_else(|| SweepError::Ledger(format!("Unknown job run id: {}", run_id)))?;

        if run.ended_at.is_some() {
            return Err(SweepError::Ledger(format!(
                "Job run {} is already closed",
                run_id
            )));
        }

        run.ended_at = Some(end.ended_at);
        run.error = end.error.clone();
        run.has_partial_errors = end.has_partial_errors;
        Ok(())
    }

    pub fn runs(&self, job: &str, limit: usize) -> Vec<JobRun> {
        self.runs
            .iter()
            .rev()
            .filter(|r| r.job == job)
            .take(limit)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latest_prefers_newest_non_error() {
        let mut tables = LedgerTables::new();
        let t0 = Utc::now();

        let mut first = Resource::new("a.zip").with_hash("h1").with_size(1);
        first.created_at = t0;
        tables.insert_resource("sync", &first);

        let mut second = Resource::new("a.zip").with_hash("h2").with_size(2);
        second.created_at = t0 + chrono::Duration::seconds(1);
        tables.insert_resource("sync", &second);

        let mut failed = Resource::failed("a.zip", "boom");
        failed.created_at = t0 + chrono::Duration::seconds(2);
        tables.insert_resource("sync", &failed);

        let latest = tables.latest_resource("sync", "a.zip", true).unwrap();
        assert_eq!(latest.content_hash.as_deref(), Some("h2"));

        let latest_any = tables.latest_resource("sync", "a.zip", false).unwrap();
        assert_eq!(latest_any.error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_equal_timestamps_break_ties_by_id() {
        let mut tables = LedgerTables::new();
        let t0 = Utc::now();

        let mut first = Resource::new("a").with_hash("old");
        first.created_at = t0;
        let mut second = Resource::new("a").with_hash("new");
        second.created_at = t0;

        tables.insert_resource("job", &first);
        tables.insert_resource("job", &second);

        let latest = tables.latest_resource("job", "a", true).unwrap();
        assert_eq!(latest.content_hash.as_deref(), Some("new"));
    }

    #[test]
    fn test_tables_are_keyed_by_job() {
        let mut tables = LedgerTables::new();
        tables.insert_resource("one", &Resource::new("a.zip").with_size(1));

        assert!(tables.latest_resource("two", "a.zip", true).is_none());
        assert_eq!(tables.resources("one").len(), 1);
        assert!(tables.resources("two").is_empty());
    }

    #[test]
    fn test_run_closed_exactly_once() {
        let mut tables = LedgerTables::new();
        let id = tables.start_run("sync", Utc::now());
        let end = RunEnd {
            ended_at: Utc::now(),
            error: None,
            has_partial_errors: true,
        };

        tables.end_run(id, &end).unwrap();
        assert!(tables.end_run(id, &end).is_err());
        assert!(tables.end_run(id + 1, &end).is_err());

        let runs = tables.runs("sync", 10);
        assert_eq!(runs.len(), 1);
        assert!(runs[0].has_partial_errors);
        assert!(runs[0].ended_at.is_some());
    }

    #[test]
    fn test_runs_newest_first_with_limit() {
        let mut tables = LedgerTables::new();
        let first = tables.start_run("sync", Utc::now());
        tables.start_run("other", Utc::now());
        let third = tables.start_run("sync", Utc::now());

        let runs = tables.runs("sync", 1);
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].id, third);
        assert!(third > first);
    }
}

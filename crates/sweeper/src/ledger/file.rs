//! JSON file ledger.
//!
//! The whole ledger is one JSON document. Every write rewrites it through a
//! temp file followed by a rename, so a crash never leaves a torn file.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::debug;

use super::{JobRun, LedgerStore, LedgerTables, RunEnd};
use crate::error::Result;
use crate::resource::Resource;

/// File-backed ledger.
pub struct FileLedger {
    path: PathBuf,
    tables: Mutex<LedgerTables>,
}

impl FileLedger {
    /// Open a ledger file, starting empty if it does not exist yet.
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let tables = match tokio::fs::read_to_string(&path).await {
            Ok(content) => serde_json::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => LedgerTables::new(),
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path,
            tables: Mutex::new(tables),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn save(&self, tables: &LedgerTables) -> Result<()> {
        let content = serde_json::to_string_pretty(tables)?;

        let temp_path = self.path.with_extension("tmp");
        tokio::fs::write(&temp_path, &content).await?;
        tokio::fs::rename(&temp_path, &self.path).await?;

        debug!("Ledger saved to {:?}", self.path);
        Ok(())
    }

    /// Apply `change` to a copy of the tables and keep it only once saved.
    async fn commit<T, F>(&self, change: F) -> Result<T>
    where
        F: FnOnce(&mut LedgerTables) -> Result<T> + Send,
        T: Send,
    {
        let mut tables = self.tables.lock().await;
        let mut next = tables.clone();
        let value = change(&mut next)?;
        self.save(&next).await?;
        *tables = next;
        Ok(value)
    }
}

#[async_trait]
impl LedgerStore for FileLedger {
    async fn init(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        if tokio::fs::metadata(&self.path).await.is_err() {
            let tables = self.tables.lock().await;
            self.save(&tables).await?;
        }
        Ok(())
    }

    async fn insert_resource(&self, job: &str, resource: &Resource) -> Result<i64> {
        self.commit(|tables| Ok(tables.insert_resource(job, resource)))
            .await
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
        self.commit(|tables| Ok(tables.start_run(job, started_at)))
            .await
    }

    async fn end_run(&self, run_id: i64, end: &RunEnd) -> Result<()> {
        self.commit(|tables| tables.end_run(run_id, end)).await
    }

    async fn runs(&self, job: &str, limit: usize) -> Result<Vec<JobRun>> {
        Ok(self.tables.lock().await.runs(job, limit))
    }

    async fn close(&self) -> Result<()> {
        let tables = self.tables.lock().await;
        self.save(&tables).await
    }

    fn backend_type(&self) -> &'static str {
        "file"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_rows_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ledger.json");

        let ledger = FileLedger::open(&path).await.unwrap();
        ledger.init().await.unwrap();
        let run_id = ledger.start_run("sync", Utc::now()).await.unwrap();
        let mut resource = Resource::new("a.zip").with_hash("abc").with_size(10);
        resource.run_id = Some(run_id);
        ledger.insert_resource("sync", &resource).await.unwrap();
        ledger.close().await.unwrap();

        let reopened = FileLedger::open(&path).await.unwrap();
        let latest = reopened
            .latest_resource("sync", "a.zip", true)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.content_hash.as_deref(), Some("abc"));
        assert_eq!(latest.run_id, Some(run_id));

        let runs = reopened.runs("sync", 5).await.unwrap();
        assert_eq!(runs.len(), 1);
        assert!(runs[0].ended_at.is_none());
    }

    #[tokio::test]
    async fn test_ids_keep_growing_after_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ledger.json");

        let ledger = FileLedger::open(&path).await.unwrap();
        let first = ledger.start_run("sync", Utc::now()).await.unwrap();
        drop(ledger);

        let reopened = FileLedger::open(&path).await.unwrap();
        let second = reopened.start_run("sync", Utc::now()).await.unwrap();
        assert!(second > first);
    }

    #[tokio::test]
    async fn test_file_is_pretty_json_without_staged_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("ledger.json");

        let ledger = FileLedger::open(&path).await.unwrap();
        ledger.init().await.unwrap();
        let resource = Resource::new("a.zip")
            .with_hash("abc")
            .with_size(10)
            .with_staged_path("/tmp/staging/a.zip");
        ledger.insert_resource("sync", &resource).await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains('\n'), "ledger should be pretty-printed");
        assert!(content.contains("\"a.zip\""));
        assert!(!content.contains("staged_path"));
        assert!(!content.contains("/tmp/staging"));
    }

    #[tokio::test]
    async fn test_failed_save_leaves_no_trace() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ledger.json");
        let ledger = FileLedger::open(&path).await.unwrap();
        ledger.init().await.unwrap();

        // A directory in the way of the temp file makes every save fail
        let blocker = dir.path().join("ledger.tmp");
        std::fs::create_dir(&blocker).unwrap();

        let resource = Resource::new("a.zip").with_hash("h").with_size(3);
        assert!(ledger.insert_resource("sync", &resource).await.is_err());
        assert!(ledger.start_run("sync", Utc::now()).await.is_err());
        assert!(ledger
            .latest_resource("sync", "a.zip", true)
            .await
            .unwrap()
            .is_none());
        assert!(ledger.runs("sync", 5).await.unwrap().is_empty());

        std::fs::remove_dir(&blocker).unwrap();
        let failed = Resource::failed("a.zip", "ledger write failed");
        let id = ledger.insert_resource("sync", &failed).await.unwrap();

        let reopened = FileLedger::open(&path).await.unwrap();
        let rows = reopened.resources("sync").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].is_error());
        assert!(reopened
            .latest_resource("sync", "a.zip", true)
            .await
            .unwrap()
            .is_none());
        assert_eq!(id, 1);
    }

    #[tokio::test]
    async fn test_end_run_failure_keeps_run_open() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ledger.json");
        let ledger = FileLedger::open(&path).await.unwrap();
        let run_id = ledger.start_run("sync", Utc::now()).await.unwrap();

        std::fs::create_dir(dir.path().join("ledger.tmp")).unwrap();
        let end = RunEnd {
            ended_at: Utc::now(),
            error: None,
            has_partial_errors: false,
        };
        assert!(ledger.end_run(run_id, &end).await.is_err());
        assert!(ledger.runs("sync", 1).await.unwrap()[0].ended_at.is_none());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ledger.json");
        std::fs::write(&path, "not json").unwrap();

        assert!(FileLedger::open(&path).await.is_err());
    }
}

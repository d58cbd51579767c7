//! Database-backed ledger.
//!
//! Stores history in PostgreSQL tables within the `_sweeper` schema:
//! `job_runs` (one row per run) and `resources` (one row per registered
//! resource, keyed by job and name).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use tokio_postgres::{NoTls, Row};

use super::{JobRun, LedgerStore, RunEnd};
use crate::error::{Result, SweepError};
use crate::resource::Resource;

/// PostgreSQL ledger backend.
pub struct PgLedger {
    pool: Pool,
    schema: String,
}

impl PgLedger {
    /// Build a pool from a connection URL. No connection is made until the
    /// first query.
    pub fn connect(url: &str, max_connections: usize) -> Result<Self> {
        let pg_config: tokio_postgres::Config = url
            .parse()
            .map_err(|e| SweepError::Config(format!("Invalid ledger url: {}", e)))?;

        let manager = Manager::from_config(
            pg_config,
            NoTls,
            ManagerConfig {
                recycling_method: RecyclingMethod::Fast,
            },
        );
        let pool = Pool::builder(manager)
            .max_size(max_connections.max(1))
            .build()
            .map_err(|e| SweepError::Config(format!("Failed to build ledger pool: {}", e)))?;

        Ok(Self::new(pool))
    }

    /// Wrap an existing pool.
    pub fn new(pool: Pool) -> Self {
        Self {
            pool,
            schema: "_sweeper".to_string(),
        }
    }
}

fn size_to_db(size: Option<u64>) -> Result<Option<i64>> {
    size.map(|s| {
        i64::try_from(s).map_err(|_| SweepError::Ledger(format!("Size {} out of range", s)))
    })
    .transpose()
}

fn resource_from_row(row: &Row) -> Resource {
    let size: Option<i64> = row.get(2);
    Resource {
        name: row.get(0),
        content_hash: row.get(1),
        size: size.map(|s| s.max(0) as u64),
        error: row.get(3),
        created_at: row.get(4),
        staged_path: None,
        run_id: row.get(5),
    }
}

fn run_from_row(row: &Row) -> JobRun {
    JobRun {
        id: row.get(0),
        job: row.get(1),
        started_at: row.get(2),
        ended_at: row.get(3),
        error: row.get(4),
        has_partial_errors: row.get(5),
    }
}

#[async_trait]
impl LedgerStore for PgLedger {
    async fn init(&self) -> Result<()> {
        let conn = self.pool.get().await?;

        conn.execute(&format!("CREATE SCHEMA IF NOT EXISTS {}", self.schema), &[])
            .await?;

        conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {}.job_runs (
                    id BIGSERIAL PRIMARY KEY,
                    job TEXT NOT NULL,
                    started_at TIMESTAMPTZ NOT NULL,
                    ended_at TIMESTAMPTZ,
                    error TEXT,
                    has_partial_errors BOOLEAN NOT NULL DEFAULT FALSE
                )",
                self.schema
            ),
            &[],
        )
        .await?;

        conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {}.resources (
                    id BIGSERIAL PRIMARY KEY,
                    job TEXT NOT NULL,
                    name TEXT NOT NULL,
                    content_hash TEXT,
                    size BIGINT CHECK (size >= 0),
                    error TEXT,
                    created_at TIMESTAMPTZ NOT NULL,
                    run_id BIGINT REFERENCES {}.job_runs(id)
                )",
                self.schema, self.schema
            ),
            &[],
        )
        .await?;

        // Change detection reads the newest row per (job, name)
        conn.execute(
            &format!(
                "CREATE INDEX IF NOT EXISTS idx_resources_latest
                    ON {}.resources(job, name, created_at DESC, id DESC)",
                self.schema
            ),
            &[],
        )
        .await?;

        conn.execute(
            &format!(
                "CREATE INDEX IF NOT EXISTS idx_job_runs_job
                    ON {}.job_runs(job, id DESC)",
                self.schema
            ),
            &[],
        )
        .await?;

        Ok(())
    }

    async fn insert_resource(&self, job: &str, resource: &Resource) -> Result<i64> {
        let conn = self.pool.get().await?;
        let size = size_to_db(resource.size)?;

        let row = conn
            .query_one(
                &format!(
                    "INSERT INTO {}.resources
                     (job, name, content_hash, size, error, created_at, run_id)
                     VALUES ($1, $2, $3, $4, $5, $6, $7)
                     RETURNING id",
                    self.schema
                ),
                &[
                    &job,
                    &resource.name,
                    &resource.content_hash,
                    &size,
                    &resource.error,
                    &resource.created_at,
                    &resource.run_id,
                ],
            )
            .await?;

        Ok(row.get(0))
    }

    async fn latest_resource(
        &self,
        job: &str,
        name: &str,
        exclude_errored: bool,
    ) -> Result<Option<Resource>> {
        let conn = self.pool.get().await?;

        let row = conn
            .query_opt(
                &format!(
                    "SELECT name, content_hash, size, error, created_at, run_id
                     FROM {}.resources
                     WHERE job = $1 AND name = $2
                       AND (NOT $3 OR error IS NULL)
                     ORDER BY created_at DESC, id DESC
                     LIMIT 1",
                    self.schema
                ),
                &[&job, &name, &exclude_errored],
            )
            .await?;

        Ok(row.as_ref().map(resource_from_row))
    }

    async fn resources(&self, job: &str) -> Result<Vec<Resource>> {
        let conn = self.pool.get().await?;

        let rows = conn
            .query(
                &format!(
                    "SELECT name, content_hash, size, error, created_at, run_id
                     FROM {}.resources
                     WHERE job = $1
                     ORDER BY id",
                    self.schema
                ),
                &[&job],
            )
            .await?;

        Ok(rows.iter().map(resource_from_row).collect())
    }

    async fn start_run(&self, job: &str, started_at: DateTime<Utc>) -> Result<i64> {
        let conn = self.pool.get().await?;

        let row = conn
            .query_one(
                &format!(
                    "INSERT INTO {}.job_runs (job, started_at) VALUES ($1, $2) RETURNING id",
                    self.schema
                ),
                &[&job, &started_at],
            )
            .await?;

        Ok(row.get(0))
    }

    async fn end_run(&self, run_id: i64, end: &RunEnd) -> Result<()> {
        let conn = self.pool.get().await?;

        let updated = conn
            .execute(
                &format!(
                    "UPDATE {}.job_runs
                     SET ended_at = $2, error = $3, has_partial_errors = $4
                     WHERE id = $1 AND ended_at IS NULL",
                    self.schema
                ),
                &[&run_id, &end.ended_at, &end.error, &end.has_partial_errors],
            )
            .await?;

        if updated == 0 {
            return Err(SweepError::Ledger(format!(
                "Job run {} is unknown or already closed",
                run_id
            )));
        }
        Ok(())
    }

    async fn runs(&self, job: &str, limit: usize) -> Result<Vec<JobRun>> {
        let conn = self.pool.get().await?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        let rows = conn
            .query(
                &format!(
                    "SELECT id, job, started_at, ended_at, error, has_partial_errors
                     FROM {}.job_runs
                     WHERE job = $1
                     ORDER BY id DESC
                     LIMIT $2",
                    self.schema
                ),
                &[&job, &limit],
            )
            .await?;

        Ok(rows.iter().map(run_from_row).collect())
    }

    async fn close(&self) -> Result<()> {
        self.pool.close();
        Ok(())
    }

    fn backend_type(&self) -> &'static str {
        "postgres"
    }
}

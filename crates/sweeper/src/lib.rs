//! # sweeper
//!
//! Dataset synchronization library.
//!
//! Mirrors remote files into one or more destination stores while skipping
//! unchanged content, and keeps an auditable history of every run and every
//! resource handled:
//!
//! - **Change detection** from declared size and content hash against the
//!   last recorded instance
//! - **Streaming fetch** into a private staging area with incremental hashing
//! - **Destinations**: local directory, ssh file server, S3, data catalogue
//!   (with chunked uploads for large artifacts)
//! - **Sweep semantics**: one failing resource never aborts the job
//! - **Run ledger** in memory, a JSON file or PostgreSQL
//!
//! ## Example
//!
//! ```rust,no_run
//! use sweeper::{Config, Orchestrator};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> sweeper::Result<()> {
//!     let config = Config::load("jobs.yaml")?;
//!     let orchestrator = Orchestrator::new(config)?;
//!     let result = orchestrator.run_job("sirene", CancellationToken::new()).await?;
//!     println!("Transferred {} resources", result.stats.transferred);
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod config;
pub mod detect;
pub mod error;
pub mod fingerprint;
pub mod gateway;
pub mod ledger;
pub mod orchestrator;
pub mod pipeline;
pub mod progress;
pub mod recorder;
pub mod resource;
pub mod source;
pub mod staging;

// Re-exports for convenient access
pub use catalog::AdapterCatalog;
pub use config::{Config, JobConfig, LedgerBackend, LedgerConfig};
pub use error::{Result, SweepError};
pub use orchestrator::{JobHistory, Orchestrator, SweepResult, SweepStatus};
pub use pipeline::{Pipeline, PipelineContext, SyncPipeline};
pub use resource::Resource;

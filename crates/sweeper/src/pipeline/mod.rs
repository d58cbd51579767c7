//! Job pipelines using the Template Method pattern.
//!
//! - [`Pipeline`]: trait defining the steps of a job (`pre_run`, `run`,
//!   `post_run`, `teardown`)
//! - [`execute`]: drives a pipeline through those steps and closes the job
//!   run whatever happens
//! - [`PipelineContext`]: ledger handle, staging area and error list of one
//!   run, with `register_file` / `register_error` / `file_has_changed`
//! - [`SyncPipeline`]: list → detect → fetch → push → record, with
//!   per-resource error capture

mod context;
mod sync;
mod template;

pub use context::{PipelineContext, SweepStats};
pub use sync::SyncPipeline;
pub use template::{execute, Pipeline, RunReport};

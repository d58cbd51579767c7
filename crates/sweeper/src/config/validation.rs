//! Configuration validation.

use super::{Config, JobConfig, LedgerBackend};
use crate::error::{Result, SweepError};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    if config.jobs.is_empty() {
        return Err(SweepError::Config("at least one job is required".into()));
    }

    if config.main.staging_dir.as_os_str().is_empty() {
        return Err(SweepError::Config("main.staging_dir must not be empty".into()));
    }

    // Ledger validation
    let ledger = &config.main.ledger;
    match ledger.backend {
        LedgerBackend::File if ledger.path.is_none() => {
            return Err(SweepError::Config(
                "main.ledger.path is required for the file backend".into(),
            ));
        }
        LedgerBackend::Postgres => {
            if ledger.url.as_deref().map_or(true, str::is_empty) {
                return Err(SweepError::Config(
                    "main.ledger.url is required for the postgres backend".into(),
                ));
            }
            if ledger.max_connections == 0 {
                return Err(SweepError::Config(
                    "main.ledger.max_connections must be at least 1".into(),
                ));
            }
        }
        _ => {}
    }

    for (name, job) in &config.jobs {
        validate_job(name, job)?;
    }

    Ok(())
}

fn validate_job(name: &str, job: &JobConfig) -> Result<()> {
    // Job names become staging directory names
    if name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\'])
        || name.chars().any(char::is_control)
    {
        return Err(SweepError::Config(format!(
            "job name '{}' cannot be used as a directory name",
            name
        )));
    }

    if job.source.r#type.is_empty() {
        return Err(SweepError::Config(format!(
            "jobs.{}.source.type is required",
            name
        )));
    }
    if job.destinations.is_empty() {
        return Err(SweepError::Config(format!(
            "jobs.{} needs at least one destination",
            name
        )));
    }
    if let Some(pos) = job.destinations.iter().position(|d| d.r#type.is_empty()) {
        return Err(SweepError::Config(format!(
            "jobs.{}.destinations[{}].type is required",
            name, pos
        )));
    }

    if job.chunk_threshold_bytes == 0 {
        return Err(SweepError::Config(format!(
            "jobs.{}.chunk_threshold_bytes must be at least 1",
            name
        )));
    }
    if let Some(0) = job.upload_chunk_size {
        return Err(SweepError::Config(format!(
            "jobs.{}.upload_chunk_size must be at least 1",
            name
        )));
    }
    if job.download_chunk_size == 0 {
        return Err(SweepError::Config(format!(
            "jobs.{}.download_chunk_size must be at least 1",
            name
        )));
    }

    if let Some(auth) = &job.fetch.auth {
        for key in [&auth.user_secret, &auth.password_secret] {
            if !job.secrets.contains_key(key) {
                return Err(SweepError::Config(format!(
                    "jobs.{}.fetch.auth references undeclared secret '{}'",
                    name, key
                )));
            }
        }
    }

    Ok(())
}

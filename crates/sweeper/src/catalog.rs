//! Adapter catalog for explicit adapter resolution.
//!
//! The [`AdapterCatalog`] maps the `type` of a source or destination entry
//! to a constructor function. Jobs are resolved against it when the
//! configuration is checked, so an unknown type or malformed options fail
//! before any run starts.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::{AdapterConfig, JobConfig, Secrets};
use crate::error::{Result, SweepError};
use crate::gateway::{
    CatalogueGateway, CatalogueOptions, Destination, LocalDirGateway, LocalOptions, S3Gateway,
    S3Options, SshGateway, SshOptions,
};
use crate::source::{HttpJsonOptions, HttpJsonSource, SourceAdapter, StaticOptions, StaticSource};

/// What a constructor gets to build one adapter.
pub struct AdapterContext<'a> {
    pub adapter: &'a AdapterConfig,
    pub job: &'a JobConfig,
    pub secrets: &'a Secrets,
    pub client: &'a reqwest::Client,
}

impl AdapterContext<'_> {
    /// Basic auth credentials from `fetch.auth`, if configured and set.
    pub fn basic_auth(&self) -> Option<(String, Option<String>)> {
        self.job
            .fetch
            .auth
            .as_ref()
            .and_then(|auth| auth.resolve(self.secrets))
    }
}

pub type SourceFactory = fn(&AdapterContext<'_>) -> Result<Arc<dyn SourceAdapter>>;
pub type DestinationFactory = fn(&AdapterContext<'_>) -> Result<Arc<dyn Destination>>;

/// A job with all of its adapters built.
pub struct ResolvedJob {
    pub name: String,
    pub config: JobConfig,
    pub secrets: Secrets,
    pub client: reqwest::Client,
    pub source: Arc<dyn SourceAdapter>,
    pub destinations: Vec<Arc<dyn Destination>>,
}

impl ResolvedJob {
    pub fn basic_auth(&self) -> Option<(String, Option<String>)> {
        self.config
            .fetch
            .auth
            .as_ref()
            .and_then(|auth| auth.resolve(&self.secrets))
    }
}

/// Registry of source and destination constructors.
#[derive(Default)]
pub struct AdapterCatalog {
    sources: HashMap<String, SourceFactory>,
    destinations: HashMap<String, DestinationFactory>,
}

impl AdapterCatalog {
    /// Create a new empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a catalog with the built-in adapters registered.
    pub fn with_builtins() -> Self {
        let mut catalog = Self::new();

        catalog.register_source("static", build_static);
        catalog.register_source("http_json", build_http_json);

        catalog.register_destination("local", build_local);
        catalog.register_destination("sftp", build_sftp);
        catalog.register_destination("s3", build_s3);
        catalog.register_destination("catalogue", build_catalogue);

        catalog
    }

    pub fn register_source(&mut self, kind: &str, factory: SourceFactory) {
        self.sources.insert(kind.to_string(), factory);
    }

    pub fn register_destination(&mut self, kind: &str, factory: DestinationFactory) {
        self.destinations.insert(kind.to_string(), factory);
    }

    /// Registered source types, sorted.
    pub fn source_types(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.sources.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }

    /// Registered destination types, sorted.
    pub fn destination_types(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.destinations.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }

    /// Build every adapter of a job. Secrets are read from the environment.
    pub fn resolve_job(
        &self,
        name: &str,
        job: &JobConfig,
        client: &reqwest::Client,
    ) -> Result<ResolvedJob> {
        let secrets = job.resolve_secrets();

        let source = {
            let factory = self.sources.get(&job.source.r#type).ok_or_else(|| {
                SweepError::Config(format!(
                    "jobs.{}: unknown source type '{}' (known: {})",
                    name,
                    job.source.r#type,
                    self.source_types().join(", ")
                ))
            })?;
            factory(&AdapterContext {
                adapter: &job.source,
                job,
                secrets: &secrets,
                client,
            })?
        };

        let mut destinations = Vec::with_capacity(job.destinations.len());
        for adapter in &job.destinations {
            let factory = self.destinations.get(&adapter.r#type).ok_or_else(|| {
                SweepError::Config(format!(
                    "jobs.{}: unknown destination type '{}' (known: {})",
                    name,
                    adapter.r#type,
                    self.destination_types().join(", ")
                ))
            })?;
            destinations.push(factory(&AdapterContext {
                adapter,
                job,
                secrets: &secrets,
                client,
            })?);
        }

        Ok(ResolvedJob {
            name: name.to_string(),
            config: job.clone(),
            secrets,
            client: client.clone(),
            source,
            destinations,
        })
    }
}

fn build_static(ctx: &AdapterContext<'_>) -> Result<Arc<dyn SourceAdapter>> {
    let options: StaticOptions = ctx.adapter.options()?;
    Ok(Arc::new(StaticSource::new(options)))
}

fn build_http_json(ctx: &AdapterContext<'_>) -> Result<Arc<dyn SourceAdapter>> {
    let options: HttpJsonOptions = ctx.adapter.options()?;
    Ok(Arc::new(HttpJsonSource::new(
        ctx.client.clone(),
        options,
        ctx.basic_auth(),
    )))
}

fn build_local(ctx: &AdapterContext<'_>) -> Result<Arc<dyn Destination>> {
    let options: LocalOptions = ctx.adapter.options()?;
    Ok(Arc::new(LocalDirGateway::new(options)))
}

fn build_sftp(ctx: &AdapterContext<'_>) -> Result<Arc<dyn Destination>> {
    let options: SshOptions = ctx.adapter.options()?;
    Ok(Arc::new(SshGateway::new(options)))
}

fn build_s3(ctx: &AdapterContext<'_>) -> Result<Arc<dyn Destination>> {
    let options: S3Options = ctx.adapter.options()?;
    Ok(Arc::new(S3Gateway::new(options, ctx.secrets)?))
}

fn build_catalogue(ctx: &AdapterContext<'_>) -> Result<Arc<dyn Destination>> {
    let options: CatalogueOptions = ctx.adapter.options()?;
    Ok(Arc::new(CatalogueGateway::new(
        ctx.client.clone(),
        options,
        ctx.secrets,
        ctx.job.chunk_threshold_bytes,
        ctx.job.get_upload_chunk_size(),
    )?))
}

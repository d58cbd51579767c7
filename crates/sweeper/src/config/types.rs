//! Configuration type definitions.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use crate::error::{Result, SweepError};
use crate::fingerprint::HashAlgorithm;

/// Size above which catalogue uploads switch to the chunked protocol.
pub const DEFAULT_CHUNK_THRESHOLD_BYTES: u64 = 2_000_000;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Settings shared by all jobs.
    #[serde(default)]
    pub main: MainConfig,

    /// Jobs by name.
    pub jobs: BTreeMap<String, JobConfig>,
}

/// Settings shared by all jobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MainConfig {
    /// Root directory for per-job staging areas (default: /tmp/sweeper).
    #[serde(default = "default_staging_dir")]
    pub staging_dir: PathBuf,

    /// Ledger storage.
    #[serde(default)]
    pub ledger: LedgerConfig,
}

impl Default for MainConfig {
    fn default() -> Self {
        Self {
            staging_dir: default_staging_dir(),
            ledger: LedgerConfig::default(),
        }
    }
}

/// Ledger backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerBackend {
    Memory,
    #[default]
    File,
    Postgres,
}

/// Ledger storage configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Backend type (default: file).
    #[serde(default)]
    pub backend: LedgerBackend,

    /// JSON document path for the file backend.
    #[serde(default = "default_ledger_path")]
    pub path: Option<PathBuf>,

    /// Connection URL for the postgres backend.
    #[serde(default)]
    pub url: Option<String>,

    /// Pool size for the postgres backend (default: 4).
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            backend: LedgerBackend::default(),
            path: default_ledger_path(),
            url: None,
            max_connections: default_max_connections(),
        }
    }
}

impl fmt::Debug for LedgerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LedgerConfig")
            .field("backend", &self.backend)
            .field("path", &self.path)
            .field("url", &self.url.as_ref().map(|_| "[REDACTED]"))
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

/// One job: a source, its destinations and transfer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    /// Where candidate resources come from.
    pub source: AdapterConfig,

    /// Where changed resources are pushed, in order.
    #[serde(default)]
    pub destinations: Vec<AdapterConfig>,

    /// Source item name -> destination resource identifier. When non-empty,
    /// items missing from the mapping are skipped.
    #[serde(default)]
    pub mapping: BTreeMap<String, String>,

    /// Secret key -> environment variable name.
    #[serde(default)]
    pub secrets: BTreeMap<String, String>,

    /// Download settings.
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Download chunk size: bytes hashed, written and reported per step
    /// (default: 8192).
    #[serde(default = "default_download_chunk_size")]
    pub download_chunk_size: usize,

    /// Fingerprint algorithm (default: sha1).
    #[serde(default)]
    pub hash: HashAlgorithm,

    /// Artifacts larger than this use chunked uploads (default: 2,000,000).
    #[serde(default = "default_chunk_threshold")]
    pub chunk_threshold_bytes: u64,

    /// Bytes per chunked-upload part. Defaults to the threshold if not set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_chunk_size: Option<u64>,
}

impl JobConfig {
    pub fn get_upload_chunk_size(&self) -> u64 {
        self.upload_chunk_size.unwrap_or(self.chunk_threshold_bytes)
    }

    /// Resolve secret environment variables. Missing variables resolve to `None`.
    pub fn resolve_secrets(&self) -> Secrets {
        Secrets::from_env(&self.secrets)
    }
}

/// Download settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FetchConfig {
    /// HTTP basic auth, referencing secret keys.
    #[serde(default)]
    pub auth: Option<BasicAuthConfig>,
}

/// HTTP basic auth credentials given as secret keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BasicAuthConfig {
    pub user_secret: String,
    pub password_secret: String,
}

impl BasicAuthConfig {
    /// Look the credentials up. Returns `None` when the user secret is unset.
    pub fn resolve(&self, secrets: &Secrets) -> Option<(String, Option<String>)> {
        let user = secrets.get(&self.user_secret)?;
        let password = secrets.get(&self.password_secret).map(str::to_string);
        Some((user.to_string(), password))
    }
}

/// Adapter declaration: a registered `type` plus adapter-specific options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterConfig {
    pub r#type: String,

    #[serde(flatten)]
    pub options: BTreeMap<String, serde_yaml::Value>,
}

impl AdapterConfig {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            r#type: kind.into(),
            options: BTreeMap::new(),
        }
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<serde_yaml::Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Deserialize the options into the adapter's own settings type.
    pub fn options<T: DeserializeOwned>(&self) -> Result<T> {
        let mapping: serde_yaml::Mapping = self
            .options
            .iter()
            .map(|(k, v)| (serde_yaml::Value::String(k.clone()), v.clone()))
            .collect();
        serde_yaml::from_value(serde_yaml::Value::Mapping(mapping)).map_err(|e| {
            SweepError::Config(format!("Invalid options for '{}' adapter: {}", self.r#type, e))
        })
    }
}

/// Resolved secret values. Debug output never shows the values.
#[derive(Clone, Default)]
pub struct Secrets {
    values: BTreeMap<String, Option<String>>,
}

impl Secrets {
    pub fn from_env(names: &BTreeMap<String, String>) -> Self {
        let values = names
            .iter()
            .map(|(key, var)| (key.clone(), std::env::var(var).ok()))
            .collect();
        Self { values }
    }

    pub fn from_values<I, K, V>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: values
                .into_iter()
                .map(|(k, v)| (k.into(), Some(v.into())))
                .collect(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(|v| v.as_deref())
    }

    pub fn require(&self, key: &str) -> Result<&str> {
        self.get(key)
            .ok_or_else(|| SweepError::Config(format!("Secret '{}' is not set", key)))
    }
}

impl fmt::Debug for Secrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(
                self.values
                    .iter()
                    .map(|(k, v)| (k, if v.is_some() { "[REDACTED]" } else { "<unset>" })),
            )
            .finish()
    }
}

// Default value functions for serde
fn default_staging_dir() -> PathBuf {
    PathBuf::from("/tmp/sweeper")
}

fn default_ledger_path() -> Option<PathBuf> {
    Some(PathBuf::from("sweeper-ledger.json"))
}

fn default_max_connections() -> usize {
    4
}

fn default_chunk_threshold() -> u64 {
    DEFAULT_CHUNK_THRESHOLD_BYTES
}

fn default_download_chunk_size() -> usize {
    8192
}

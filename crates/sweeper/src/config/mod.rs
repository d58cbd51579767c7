//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;

use crate::error::{Result, SweepError};
use std::path::Path;

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            SweepError::Config(format!("Cannot read config file {:?}: {}", path, e))
        })?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)
            .map_err(|e| SweepError::Config(format!("Invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }

    /// Look up a job by name.
    pub fn job(&self, name: &str) -> Result<&JobConfig> {
        self.jobs.get(name).ok_or_else(|| {
            let known: Vec<&str> = self.jobs.keys().map(String::as_str).collect();
            SweepError::Config(format!(
                "Unknown job '{}' (configured: {})",
                name,
                known.join(", ")
            ))
        })
    }
}

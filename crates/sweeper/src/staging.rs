//! Per-run staging directory.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Result, SweepError};

/// Private directory holding fetched bytes for one job run.
///
/// Scoped by job name under the configured staging root and removed as a
/// whole at teardown.
#[derive(Debug, Clone)]
pub struct StagingArea {
    dir: PathBuf,
}

impl StagingArea {
    /// Create `<root>/<job>`. Leftovers from an interrupted run are reused.
    pub async fn create(root: &Path, job: &str) -> Result<Self> {
        let dir = root.join(job);
        tokio::fs::create_dir_all(&dir).await?;
        debug!("Staging area ready at {:?}", dir);
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Path for a resource's staged bytes. Rejects names that would escape
    /// the staging directory.
    pub fn path_for(&self, name: &str) -> Result<PathBuf> {
        validate_name(name)?;
        Ok(self.dir.join(name))
    }

    /// Delete the directory and everything in it. Missing is fine.
    pub async fn remove(&self) -> Result<()> {
        match tokio::fs::remove_dir_all(&self.dir).await {
            Ok(()) => {
                debug!("Removed staging area {:?}", self.dir);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Resource names are used as file names at every destination.
pub fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() || name == "." || name == ".." {
        return Err(SweepError::InvalidName(format!("'{}'", name)));
    }
    if name.contains(['/', '\\', '\0']) {
        return Err(SweepError::InvalidName(format!(
            "'{}' contains a path separator",
            name
        )));
    }
    Ok(())
}

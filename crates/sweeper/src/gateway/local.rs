//! Local directory destination (e.g. a mounted file server export).

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{info, warn};

use super::{dated_name, Destination, PushReceipt, PushRequest};
use crate::error::{Result, SweepError};
use crate::progress::{ProgressSink, TransferProgress};

#[derive(Debug, Clone, Deserialize)]
pub struct LocalOptions {
    pub dir: PathBuf,

    /// Also keep a `<date>-<name>` copy.
    #[serde(default)]
    pub dated_copy: bool,
}

pub struct LocalDirGateway {
    options: LocalOptions,
}

impl LocalDirGateway {
    pub fn new(options: LocalOptions) -> Self {
        Self { options }
    }

    async fn copy(&self, from: &Path, to: &Path, total: u64) -> Result<u64> {
        let mut reader = tokio::fs::File::open(from).await?;
        let mut temp = to.as_os_str().to_owned();
        temp.push(".partial");
        let mut partial = PartialFile::create(PathBuf::from(temp)).await?;

        let progress = TransferProgress::new(format!("copy {}", to.display()));
        let copied = Self::stream(&mut reader, &mut partial.file, &progress, total).await;
        progress.finish();
        let sent = copied?;

        partial.commit(to).await?;
        Ok(sent)
    }

    async fn stream(
        reader: &mut tokio::fs::File,
        writer: &mut tokio::fs::File,
        progress: &dyn ProgressSink,
        total: u64,
    ) -> Result<u64> {
        let mut buf = vec![0u8; 64 * 1024];
        let mut sent: u64 = 0;
        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            writer.write_all(&buf[..n]).await?;
            sent += n as u64;
            progress.update(sent, Some(total));
        }
        writer.flush().await?;
        Ok(sent)
    }
}

/// A `.partial` file that is deleted when dropped uncommitted, including when
/// the push future is dropped mid-copy.
struct PartialFile {
    path: PathBuf,
    file: tokio::fs::File,
    committed: bool,
}

impl PartialFile {
    async fn create(path: PathBuf) -> Result<Self> {
        let file = tokio::fs::File::create(&path).await?;
        Ok(Self {
            path,
            file,
            committed: false,
        })
    }

    async fn commit(&mut self, to: &Path) -> Result<()> {
        self.file.sync_all().await?;
        tokio::fs::rename(&self.path, to).await?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Could not remove {:?}: {}", self.path, e);
            }
        }
    }
}

#[async_trait]
impl Destination for LocalDirGateway {
    fn name(&self) -> &str {
        "local"
    }

    async fn push(&self, request: &PushRequest<'_>) -> Result<PushReceipt> {
        let name = &request.resource.name;
        tokio::fs::create_dir_all(&self.options.dir)
            .await
            .map_err(|e| SweepError::push("local", format!("{:?}: {}", self.options.dir, e)))?;

        let target = self.options.dir.join(name);
        info!("Copying {} to {:?}...", name, target);
        let bytes = self.copy(request.path, &target, request.size()).await?;

        let mut descriptor = json!({ "path": target, "bytes": bytes });
        if self.options.dated_copy {
            let dated = self
                .options
                .dir
                .join(dated_name(name, chrono::Local::now().date_naive()));
            tokio::fs::copy(&target, &dated).await?;
            descriptor["dated_path"] = json!(dated);
        }

        Ok(PushReceipt {
            destination: self.name().to_string(),
            descriptor,
        })
    }
}

//! Remote file server destination over the system `ssh` client.
//!
//! The staged file is piped into `cat > <path>` on the remote host, so any
//! host reachable with key-based auth works without an SFTP library.

use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tracing::info;

use super::{dated_name, Destination, PushReceipt, PushRequest};
use crate::error::{Result, SweepError};
use crate::progress::{ProgressSink, TransferProgress};

#[derive(Debug, Clone, Deserialize)]
pub struct SshOptions {
    pub host: String,

    #[serde(default = "default_user")]
    pub user: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Remote directory, created if missing.
    pub dir: String,

    /// Also upload a `<date>-<name>` copy.
    #[serde(default)]
    pub dated_copy: bool,

    /// Client binary (default: ssh).
    #[serde(default = "default_program")]
    pub program: String,
}

fn default_user() -> String {
    "root".to_string()
}

fn default_port() -> u16 {
    22
}

fn default_program() -> String {
    "ssh".to_string()
}

pub struct SshGateway {
    options: SshOptions,
}

impl SshGateway {
    pub fn new(options: SshOptions) -> Self {
        Self { options }
    }

    fn destination(&self) -> String {
        format!("{}@{}", self.options.user, self.options.host)
    }

    fn remote_path(&self, file_name: &str) -> String {
        format!("{}/{}", self.options.dir.trim_end_matches('/'), file_name)
    }

    /// Stream `local` into `remote` on the host.
    async fn upload(&self, local: &std::path::Path, remote: &str, total: u64) -> Result<()> {
        info!("Uploading {:?} to {}:{}...", local, self.options.host, remote);

        let command = format!(
            "mkdir -p {} && cat > {}",
            shell_quote(&self.options.dir),
            shell_quote(remote)
        );
        let mut child = Command::new(&self.options.program)
            .args([
                "-p",
                &self.options.port.to_string(),
                "-o",
                "BatchMode=yes",
                &self.destination(),
                &command,
            ])
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| SweepError::remote(&self.options.host, "stdin not captured"))?;

        let progress = TransferProgress::new(format!("ssh {}", remote));
        let mut reader = tokio::fs::File::open(local).await?;
        let mut buf = vec![0u8; 64 * 1024];
        let mut sent: u64 = 0;
        let write_result: std::io::Result<()> = async {
            loop {
                let n = reader.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                stdin.write_all(&buf[..n]).await?;
                sent += n as u64;
                progress.update(sent, Some(total));
            }
            stdin.shutdown().await
        }
        .await;
        drop(stdin);
        progress.finish();

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            return Err(SweepError::remote(
                &self.options.host,
                format!(
                    "exit code {}: {}",
                    output.status.code().unwrap_or(-1),
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            ));
        }
        // A broken pipe with a zero exit status still means a short write
        write_result.map_err(|e| SweepError::remote(&self.options.host, e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl Destination for SshGateway {
    fn name(&self) -> &str {
        "sftp"
    }

    async fn push(&self, request: &PushRequest<'_>) -> Result<PushReceipt> {
        let name = &request.resource.name;
        let remote = self.remote_path(name);
        self.upload(request.path, &remote, request.size()).await?;

        let mut descriptor = json!({ "host": self.options.host, "path": remote });
        if self.options.dated_copy {
            let dated = self.remote_path(&dated_name(name, chrono::Local::now().date_naive()));
            self.upload(request.path, &dated, request.size()).await?;
            descriptor["dated_path"] = json!(dated);
        }

        Ok(PushReceipt {
            destination: self.name().to_string(),
            descriptor,
        })
    }
}

/// Single-quote a string for a POSIX shell.
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

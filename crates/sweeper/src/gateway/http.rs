//! HTTP source gateway: streams a remote file into the staging area while
//! hashing it, with a size probe that can skip the download entirely.

use std::path::Path;
use std::sync::Arc;

use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::detect::ChangeCheck;
use crate::error::{Result, SweepError};
use crate::fingerprint::{Fingerprint, HashAlgorithm};
use crate::progress::{ProgressSink, TransferProgress};
use crate::resource::Resource;
use crate::staging::StagingArea;

/// Outcome of a fetch.
#[derive(Debug, Clone)]
pub struct Fetched {
    /// Whether the content differs from the last recorded instance.
    pub changed: bool,

    /// Size-only when the probe short-circuited, otherwise hash, size and
    /// staged path.
    pub resource: Resource,
}

/// Downloads source locators into a staging area.
pub struct HttpDownloadGateway {
    client: reqwest::Client,
    detector: Arc<dyn ChangeCheck>,
    staging: StagingArea,
    hash: HashAlgorithm,
    chunk_size: usize,
    auth: Option<(String, Option<String>)>,
}

impl HttpDownloadGateway {
    pub fn new(
        client: reqwest::Client,
        detector: Arc<dyn ChangeCheck>,
        staging: StagingArea,
    ) -> Self {
        Self {
            client,
            detector,
            staging,
            hash: HashAlgorithm::default(),
            chunk_size: 8192,
            auth: None,
        }
    }

    pub fn with_hash(mut self, hash: HashAlgorithm) -> Self {
        self.hash = hash;
        self
    }

    /// Bytes hashed, written and reported per step (the last one may be
    /// shorter).
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn with_basic_auth(mut self, auth: Option<(String, Option<String>)>) -> Self {
        self.auth = auth;
        self
    }

    /// Fetch `locator` as `name`.
    ///
    /// Transport errors and non-2xx statuses propagate. A partially written
    /// staging file is left in place for teardown.
    pub async fn fetch(&self, locator: &str, name: &str) -> Result<Fetched> {
        let path = self.staging.path_for(name)?;

        let mut request = self.client.get(locator);
        if let Some((user, password)) = &self.auth {
            request = request.basic_auth(user, password.as_ref());
        }
        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SweepError::Status {
                url: locator.to_string(),
                status: status.as_u16(),
            });
        }

        let declared = response.content_length();
        if let Some(size) = declared {
            if !self.detector.has_changed(name, &Fingerprint::size(size)).await? {
                debug!("{}: declared size {} unchanged, skipping download", name, size);
                return Ok(Fetched {
                    changed: false,
                    resource: Resource::new(name).with_size(size),
                });
            }
        }

        info!("Downloading {}...", name);
        let progress = TransferProgress::new(format!("fetch {}", name));
        let streamed = self.stream_to(response, &path, declared, &progress).await;
        progress.finish();
        let (hash, written) = streamed?;

        let changed = self
            .detector
            .has_changed(name, &Fingerprint::hash(hash.clone()))
            .await?;
        debug!("{}: {} bytes, {} {}", name, written, self.hash.as_str(), hash);

        Ok(Fetched {
            changed,
            resource: Resource::new(name)
                .with_hash(hash)
                .with_size(written)
                .with_staged_path(path),
        })
    }

    /// Write the body to `path` in `chunk_size` pieces, hashing each one.
    /// Returns the hex digest and the number of bytes written.
    async fn stream_to(
        &self,
        response: reqwest::Response,
        path: &Path,
        declared: Option<u64>,
        progress: &dyn ProgressSink,
    ) -> Result<(String, u64)> {
        let mut file = tokio::fs::File::create(path).await?;
        let mut hasher = self.hash.hasher();
        let mut chunks = FixedChunks::new(self.chunk_size);
        let mut written: u64 = 0;

        let mut stream = response.bytes_stream();
        while let Some(frame) = stream.next().await {
            let frame = frame?;
            let mut rest: &[u8] = &frame;
            while let Some(chunk) = chunks.fill(&mut rest) {
                hasher.update(chunk);
                file.write_all(chunk).await?;
                written += chunk.len() as u64;
                progress.update(written, declared);
            }
        }
        if let Some(tail) = chunks.remainder() {
            hasher.update(tail);
            file.write_all(tail).await?;
            written += tail.len() as u64;
            progress.update(written, declared);
        }
        file.flush().await?;

        Ok((hasher.finalize_hex(), written))
    }
}

/// Regroups arbitrarily sized frames into chunks of exactly `size` bytes.
struct FixedChunks {
    size: usize,
    buf: Vec<u8>,
}

impl FixedChunks {
    fn new(size: usize) -> Self {
        Self {
            size,
            buf: Vec::with_capacity(size),
        }
    }

    /// Consume from `data` until a full chunk is ready. Returns `None` once
    /// `data` is exhausted without completing one.
    fn fill(&mut self, data: &mut &[u8]) -> Option<&[u8]> {
        if self.buf.len() == self.size {
            self.buf.clear();
        }
        let take = (self.size - self.buf.len()).min(data.len());
        self.buf.extend_from_slice(&data[..take]);
        *data = &data[take..];
        (self.buf.len() == self.size).then_some(&self.buf[..])
    }

    /// The last, shorter chunk, if any.
    fn remainder(&self) -> Option<&[u8]> {
        (!self.buf.is_empty() && self.buf.len() < self.size).then_some(&self.buf[..])
    }
}

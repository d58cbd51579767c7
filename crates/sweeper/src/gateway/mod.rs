//! Transfer gateways.
//!
//! The source side is [`HttpDownloadGateway`]. Destinations implement
//! [`Destination`]:
//!
//! - [`LocalDirGateway`]: copy into a directory (mounted file server)
//! - [`SshGateway`]: stream over the system `ssh` client
//! - [`S3Gateway`]: object storage
//! - [`CatalogueGateway`]: data-catalogue resource upload / metadata update

mod catalogue;
mod http;
mod local;
mod s3;
mod ssh;

pub use catalogue::{CatalogueGateway, CatalogueMode, CatalogueOptions};
pub use http::{Fetched, HttpDownloadGateway};
pub use local::{LocalDirGateway, LocalOptions};
pub use s3::{S3Gateway, S3Options};
pub use ssh::{SshGateway, SshOptions};

use std::path::Path;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Serialize;

use crate::error::Result;
use crate::fingerprint::HashAlgorithm;
use crate::resource::Resource;

/// Everything a destination needs to push one staged artifact.
#[derive(Debug, Clone, Copy)]
pub struct PushRequest<'a> {
    pub resource: &'a Resource,

    /// Staged bytes.
    pub path: &'a Path,

    /// Destination resource identifier from the job mapping, if any.
    pub remote_id: Option<&'a str>,

    /// Algorithm that produced `resource.content_hash`.
    pub checksum_type: HashAlgorithm,
}

impl PushRequest<'_> {
    pub fn size(&self) -> u64 {
        self.resource.size.unwrap_or(0)
    }
}

/// Destination-specific descriptor, kept for bookkeeping only.
#[derive(Debug, Clone, Serialize)]
pub struct PushReceipt {
    pub destination: String,
    pub descriptor: serde_json::Value,
}

/// Pushes a staged artifact to a remote store.
#[async_trait]
pub trait Destination: Send + Sync {
    /// Short identifier used in logs and errors.
    fn name(&self) -> &str;

    async fn push(&self, request: &PushRequest<'_>) -> Result<PushReceipt>;
}

/// `<YYYY-MM-DD>-<name>`, used for dated copies next to the latest file.
pub fn dated_name(name: &str, date: NaiveDate) -> String {
    format!("{}-{}", date.format("%Y-%m-%d"), name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dated_name() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 7).unwrap();
        assert_eq!(
            dated_name("StockEtablissement_utf8.zip", date),
            "2024-03-07-StockEtablissement_utf8.zip"
        );
    }
}

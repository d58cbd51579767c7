//! Change detection against the run ledger.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::error::Result;
use crate::fingerprint::Fingerprint;
use crate::ledger::LedgerStore;

/// Decides whether a candidate resource differs from its last recorded state.
#[async_trait]
pub trait ChangeCheck: Send + Sync {
    /// `true` when the resource must be transferred.
    async fn has_changed(&self, name: &str, fingerprint: &Fingerprint) -> Result<bool>;
}

/// Compares fingerprints with the newest non-error ledger row of a job.
pub struct LedgerChangeDetector {
    ledger: Arc<dyn LedgerStore>,
    job: String,
}

impl LedgerChangeDetector {
    pub fn new(ledger: Arc<dyn LedgerStore>, job: impl Into<String>) -> Self {
        Self {
            ledger,
            job: job.into(),
        }
    }
}

#[async_trait]
impl ChangeCheck for LedgerChangeDetector {
    async fn has_changed(&self, name: &str, fingerprint: &Fingerprint) -> Result<bool> {
        let Some(previous) = self.ledger.latest_resource(&self.job, name, true).await? else {
            debug!("{}: no previous record", name);
            return Ok(true);
        };

        if let Some(size) = fingerprint.size {
            if previous.size != Some(size) {
                debug!("{}: size {:?} -> {}", name, previous.size, size);
                return Ok(true);
            }
        }

        if let Some(hash) = &fingerprint.hash {
            if previous.content_hash.as_deref() != Some(hash.as_str()) {
                debug!("{}: hash changed", name);
                return Ok(true);
            }
        }

        // A bare name with a prior record is reported unchanged
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::MemoryLedger;
    use crate::resource::Resource;

    async fn detector_with(rows: &[Resource]) -> LedgerChangeDetector {
        let ledger = Arc::new(MemoryLedger::new());
        for row in rows {
            ledger.insert_resource("sync", row).await.unwrap();
        }
        LedgerChangeDetector::new(ledger, "sync")
    }

    #[tokio::test]
    async fn test_unseen_resource_always_changed() {
        let detector = detector_with(&[]).await;
        for fp in [
            Fingerprint::default(),
            Fingerprint::size(10),
            Fingerprint::hash("abc"),
        ] {
            assert!(detector.has_changed("a.zip", &fp).await.unwrap());
        }
    }

    #[tokio::test]
    async fn test_hash_equality_means_unchanged() {
        let detector =
            detector_with(&[Resource::new("a.zip").with_hash("h1").with_size(10)]).await;

        assert!(!detector.has_changed("a.zip", &Fingerprint::hash("h1")).await.unwrap());
        assert!(detector.has_changed("a.zip", &Fingerprint::hash("h2")).await.unwrap());
    }

    #[tokio::test]
    async fn test_size_probe() {
        let detector =
            detector_with(&[Resource::new("a.zip").with_hash("h1").with_size(10)]).await;

        assert!(!detector.has_changed("a.zip", &Fingerprint::size(10)).await.unwrap());
        assert!(detector.has_changed("a.zip", &Fingerprint::size(11)).await.unwrap());
    }

    #[tokio::test]
    async fn test_error_rows_are_ignored() {
        let detector = detector_with(&[
            Resource::new("a.zip").with_hash("h1").with_size(10),
            Resource::failed("a.zip", "timeout"),
        ])
        .await;

        assert!(!detector.has_changed("a.zip", &Fingerprint::hash("h1")).await.unwrap());

        let only_errors = detector_with(&[Resource::failed("b.zip", "timeout")]).await;
        assert!(only_errors
            .has_changed("b.zip", &Fingerprint::hash("h1"))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_size_against_row_without_size() {
        let detector = detector_with(&[Resource::new("a.zip").with_hash("h1")]).await;
        assert!(detector.has_changed("a.zip", &Fingerprint::size(10)).await.unwrap());
    }
}

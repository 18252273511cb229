use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rand::Rng;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn, Instrument};

use crate::resolver::{self, Resolve};
use crate::store::{ScanPatch, ScanStore, StoreError};
use crate::types::{ScanOptions, ScanRecord, SubdomainInfo};

const ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Why a background scan ended in `failed`. The display text is stored on the record.
#[derive(Debug, thiserror::Error)]
pub enum ScanFailure {
    #[error("scan cancelled")]
    Cancelled,

    #[error("scan exceeded deadline of {}s", .0.as_secs())]
    DeadlineExceeded(Duration),

    #[error("failed to store scan results")]
    Store(#[source] StoreError),
}

/// `scan_<epoch-ms>_<8 random base36 chars>`.
pub fn new_scan_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    let mut rng = rand::rng();
    let suffix: String = (0..8)
        .map(|_| ID_ALPHABET[rng.random_range(0..ID_ALPHABET.len())] as char)
        .collect();
    format!("scan_{millis}_{suffix}")
}

/// Owns the scan lifecycle: creates records, runs enumeration in tracked background
/// tasks and moves each record through `pending -> running -> completed | failed`.
#[derive(Clone)]
pub struct ScanService {
    store: Arc<ScanStore>,
    resolver: Arc<dyn Resolve>,
    deadline: Option<Duration>,
    tracker: TaskTracker,
    shutdown: CancellationToken,
}

impl std::fmt::Debug for ScanService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanService")
            .field("deadline", &self.deadline)
            .field("in_flight", &self.tracker.len())
            .field("shutting_down", &self.shutdown.is_cancelled())
            .finish()
    }
}

impl ScanService {
    pub fn new(store: Arc<ScanStore>, resolver: Arc<dyn Resolve>, deadline: Option<Duration>) -> Self {
        Self {
            store,
            resolver,
            deadline,
            tracker: TaskTracker::new(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Create a `pending` record and launch its background phase. Returns without
    /// waiting for the scan; callers observe progress through the store.
    pub async fn start(&self, domain: String, options: ScanOptions) -> Result<ScanRecord, StoreError> {
        let record = self
            .store
            .create(ScanRecord::pending(new_scan_id(), domain, options))
            .await?;
        info!(scan_id = %record.scan_id, domain = %record.domain, "scan queued");

        let job = ScanJob {
            store: self.store.clone(),
            resolver: self.resolver.clone(),
            deadline: self.deadline,
            cancel: self.shutdown.child_token(),
            scan_id: record.scan_id.clone(),
            domain: record.domain.clone(),
            options: record.scan_options.clone(),
        };
        let span = tracing::info_span!("scan", scan_id = %record.scan_id);
        self.tracker.spawn(job.run().instrument(span));

        Ok(record)
    }

    /// Number of background scans that have not finished yet.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Cancel outstanding scans and wait up to `grace` for them to record a final state.
    /// Returns `true` when every task finished in time.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        self.shutdown.cancel();
        self.tracker.close();
        let pending = self.tracker.len();
        if pending > 0 {
            info!(pending, "waiting for in-flight scans");
        }
        match tokio::time::timeout(grace, self.tracker.wait()).await {
            Ok(()) => true,
            Err(_) => {
                warn!(remaining = self.tracker.len(), "in-flight scans did not finish before shutdown");
                false
            }
        }
    }
}

struct ScanJob {
    store: Arc<ScanStore>,
    resolver: Arc<dyn Resolve>,
    deadline: Option<Duration>,
    cancel: CancellationToken,
    scan_id: String,
    domain: String,
    options: ScanOptions,
}

impl ScanJob {
    async fn run(self) {
        if let Err(e) = self.store.update(&self.scan_id, ScanPatch::running()).await {
            warn!(error = %e, "could not mark scan running");
            return;
        }

        let failure = match self.enumerate().await {
            Ok(subdomains) => {
                let found = subdomains.len();
                match self.store.update(&self.scan_id, ScanPatch::completed(subdomains)).await {
                    Ok(_) => {
                        self.store.add_history(&self.domain, &self.scan_id).await;
                        info!(domain = %self.domain, found, "scan completed");
                        return;
                    }
                    Err(e) => ScanFailure::Store(e),
                }
            }
            Err(failure) => failure,
        };

        error!(domain = %self.domain, error = %failure, "scan failed");
        if let Err(e) = self
            .store
            .update(&self.scan_id, ScanPatch::failed(failure.to_string()))
            .await
        {
            error!(error = %e, "could not record scan failure");
        }
    }

    async fn enumerate(&self) -> Result<Vec<SubdomainInfo>, ScanFailure> {
        let work = resolver::enumerate(self.resolver.as_ref(), &self.domain, &self.options);
        let bounded = async {
            match self.deadline {
                Some(limit) => tokio::time::timeout(limit, work)
                    .await
                    .map_err(|_| ScanFailure::DeadlineExceeded(limit)),
                None => Ok(work.await),
            }
        };

        tokio::select! {
            _ = self.cancel.cancelled() => Err(ScanFailure::Cancelled),
            res = bounded => res,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_ids_have_expected_shape() {
        let re = regex::Regex::new(r"^scan_\d{13,}_[0-9a-z]{8}$").unwrap();
        for _ in 0..50 {
            let id = new_scan_id();
            assert!(re.is_match(&id), "unexpected id {id}");
        }
        assert_ne!(new_scan_id(), new_scan_id());
    }

    #[test]
    fn failure_messages_are_short() {
        assert_eq!(ScanFailure::Cancelled.to_string(), "scan cancelled");
        assert_eq!(
            ScanFailure::DeadlineExceeded(Duration::from_secs(5)).to_string(),
            "scan exceeded deadline of 5s"
        );
        assert_eq!(
            ScanFailure::Store(StoreError::NotFound("x".into())).to_string(),
            "failed to store scan results"
        );
    }
}

//! In-memory scan records and completed-scan history.

use std::collections::HashMap;

use time::OffsetDateTime;
use tokio::sync::RwLock;

use crate::types::{
    HistoryEntry, Pagination, ScanPage, ScanRecord, ScanStatus, SubdomainInfo,
};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("scan {0} already exists")]
    Duplicate(String),

    #[error("scan {0} not found")]
    NotFound(String),

    #[error("scan {scan_id}: illegal status change {from} -> {to}")]
    InvalidTransition {
        scan_id: String,
        from: ScanStatus,
        to: ScanStatus,
    },
}

/// Partial update merged into an existing record. `None` fields are left untouched.
#[derive(Debug, Default, Clone)]
pub struct ScanPatch {
    pub status: Option<ScanStatus>,
    pub subdomains: Option<Vec<SubdomainInfo>>,
    pub completed_at: Option<OffsetDateTime>,
    pub error: Option<String>,
}

impl ScanPatch {
    pub fn running() -> Self {
        Self {
            status: Some(ScanStatus::Running),
            ..Default::default()
        }
    }

    pub fn completed(subdomains: Vec<SubdomainInfo>) -> Self {
        Self {
            status: Some(ScanStatus::Completed),
            subdomains: Some(subdomains),
            completed_at: Some(OffsetDateTime::now_utc()),
            error: None,
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            status: Some(ScanStatus::Failed),
            subdomains: None,
            completed_at: Some(OffsetDateTime::now_utc()),
            error: Some(reason.into()),
        }
    }
}

#[derive(Debug)]
struct Stored {
    seq: u64,
    record: ScanRecord,
}

#[derive(Debug, Default)]
struct Inner {
    next_seq: u64,
    scans: HashMap<String, Stored>,
    history: Vec<HistoryEntry>,
}

/// Keyed scan records with exact-match lookup. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct ScanStore {
    inner: RwLock<Inner>,
}

impl ScanStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create(&self, record: ScanRecord) -> Result<ScanRecord, StoreError> {
        let mut inner = self.inner.write().await;
        if inner.scans.contains_key(&record.scan_id) {
            return Err(StoreError::Duplicate(record.scan_id));
        }
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.scans.insert(
            record.scan_id.clone(),
            Stored {
                seq,
                record: record.clone(),
            },
        );
        Ok(record)
    }

    /// Merge `patch` into the record. Status changes must follow the scan lifecycle;
    /// `subdomain_count` always tracks the stored result list.
    pub async fn update(&self, scan_id: &str, patch: ScanPatch) -> Result<ScanRecord, StoreError> {
        let mut inner = self.inner.write().await;
        let stored = inner
            .scans
            .get_mut(scan_id)
            .ok_or_else(|| StoreError::NotFound(scan_id.to_string()))?;
        let rec = &mut stored.record;

        if let Some(next) = patch.status {
            if !rec.status.can_advance_to(next) {
                return Err(StoreError::InvalidTransition {
                    scan_id: scan_id.to_string(),
                    from: rec.status,
                    to: next,
                });
            }
            rec.status = next;
        }
        if let Some(subdomains) = patch.subdomains {
            rec.subdomain_count = subdomains.len();
            rec.subdomains = subdomains;
        }
        if let Some(at) = patch.completed_at {
            rec.completed_at = Some(at);
        }
        if let Some(err) = patch.error {
            rec.error = Some(err);
        }
        Ok(rec.clone())
    }

    pub async fn get(&self, scan_id: &str) -> Option<ScanRecord> {
        let inner = self.inner.read().await;
        inner.scans.get(scan_id).map(|s| s.record.clone())
    }

    pub async fn delete(&self, scan_id: &str) -> Result<ScanRecord, StoreError> {
        let mut inner = self.inner.write().await;
        inner
            .scans
            .remove(scan_id)
            .map(|s| s.record)
            .ok_or_else(|| StoreError::NotFound(scan_id.to_string()))
    }

    #[cfg(test)]
    pub async fn count(&self) -> usize {
        self.inner.read().await.scans.len()
    }

    /// One page of scans, newest first. `page` is 1-based.
    pub async fn list(&self, page: u32, limit: u32) -> ScanPage {
        let page = page.max(1);
        let limit = limit.max(1);

        let inner = self.inner.read().await;
        let mut rows: Vec<&Stored> = inner.scans.values().collect();
        rows.sort_by(|a, b| {
            b.record
                .created_at
                .cmp(&a.record.created_at)
                .then(b.seq.cmp(&a.seq))
        });

        let total = rows.len();
        let skip = (page as usize - 1).saturating_mul(limit as usize);
        let scans = rows
            .into_iter()
            .skip(skip)
            .take(limit as usize)
            .map(|s| s.record.summary())
            .collect();

        ScanPage {
            scans,
            pagination: Pagination {
                page,
                limit,
                total,
                pages: total.div_ceil(limit as usize),
            },
        }
    }

    pub async fn add_history(&self, domain: &str, scan_id: &str) -> HistoryEntry {
        let entry = HistoryEntry {
            domain: domain.to_string(),
            scan_id: scan_id.to_string(),
            created_at: OffsetDateTime::now_utc(),
        };
        self.inner.write().await.history.push(entry.clone());
        entry
    }

    /// Most recent history entries first.
    pub async fn history(&self, limit: usize) -> Vec<HistoryEntry> {
        let inner = self.inner.read().await;
        inner.history.iter().rev().take(limit).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ScanOptions;

    fn record(id: &str) -> ScanRecord {
        ScanRecord::pending(id, "example.com", ScanOptions::default())
    }

    fn info(name: &str) -> SubdomainInfo {
        SubdomainInfo {
            subdomain: name.into(),
            ip_addresses: vec!["10.0.0.1".into()],
            cname: None,
            ports: None,
            discovered_at: None,
        }
    }

    #[tokio::test]
    async fn create_rejects_duplicate_ids() {
        let store = ScanStore::new();
        store.create(record("a")).await.unwrap();
        assert_eq!(
            store.create(record("a")).await,
            Err(StoreError::Duplicate("a".into()))
        );
        assert_eq!(store.count().await, 1);
    }

    #[tokio::test]
    async fn update_merges_and_tracks_count() {
        let store = ScanStore::new();
        store.create(record("a")).await.unwrap();
        store.update("a", ScanPatch::running()).await.unwrap();
        let done = store
            .update("a", ScanPatch::completed(vec![info("www.example.com"), info("api.example.com")]))
            .await
            .unwrap();

        assert_eq!(done.status, ScanStatus::Completed);
        assert_eq!(done.subdomain_count, 2);
        assert_eq!(done.subdomains.len(), 2);
        assert!(done.completed_at.is_some());
        assert_eq!(done.domain, "example.com");
        assert_eq!(store.get("a").await, Some(done));
    }

    #[tokio::test]
    async fn illegal_transitions_are_refused() {
        let store = ScanStore::new();
        store.create(record("a")).await.unwrap();

        let err = store.update("a", ScanPatch::completed(vec![])).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { from: ScanStatus::Pending, .. }));

        store.update("a", ScanPatch::running()).await.unwrap();
        store.update("a", ScanPatch::failed("scan cancelled")).await.unwrap();
        let err = store.update("a", ScanPatch::completed(vec![])).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { from: ScanStatus::Failed, .. }));

        let rec = store.get("a").await.unwrap();
        assert_eq!(rec.status, ScanStatus::Failed);
        assert_eq!(rec.error.as_deref(), Some("scan cancelled"));
    }

    #[tokio::test]
    async fn missing_ids_are_not_found_without_side_effects() {
        let store = ScanStore::new();
        store.create(record("a")).await.unwrap();

        assert_eq!(store.get("nope").await, None);
        assert_eq!(store.delete("nope").await, Err(StoreError::NotFound("nope".into())));
        assert!(matches!(
            store.update("nope", ScanPatch::running()).await,
            Err(StoreError::NotFound(_))
        ));
        assert_eq!(store.count().await, 1);

        store.delete("a").await.unwrap();
        assert_eq!(store.count().await, 0);
    }

    #[tokio::test]
    async fn list_pages_newest_first() {
        let store = ScanStore::new();
        for i in 0..5 {
            store.create(record(&format!("scan-{i}"))).await.unwrap();
        }

        let first = store.list(1, 2).await;
        let ids: Vec<_> = first.scans.iter().map(|s| s.scan_id.as_str()).collect();
        assert_eq!(ids, vec!["scan-4", "scan-3"]);
        assert_eq!(
            first.pagination,
            Pagination {
                page: 1,
                limit: 2,
                total: 5,
                pages: 3
            }
        );

        let last = store.list(3, 2).await;
        assert_eq!(last.scans.len(), 1);
        assert_eq!(last.scans[0].scan_id, "scan-0");

        assert!(store.list(9, 2).await.scans.is_empty());
    }

    #[tokio::test]
    async fn history_is_newest_first() {
        let store = ScanStore::new();
        store.add_history("a.com", "scan-1").await;
        store.add_history("b.com", "scan-2").await;
        store.add_history("c.com", "scan-3").await;

        let recent = store.history(2).await;
        let domains: Vec<_> = recent.iter().map(|h| h.domain.as_str()).collect();
        assert_eq!(domains, vec!["c.com", "b.com"]);
    }
}

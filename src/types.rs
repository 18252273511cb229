use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Lifecycle state of a scan. Legal moves are `pending -> running -> completed | failed`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl ScanStatus {
    /// Whether a record in state `self` may be moved to `next`.
    pub fn can_advance_to(self, next: ScanStatus) -> bool {
        matches!(
            (self, next),
            (ScanStatus::Pending, ScanStatus::Running)
                | (ScanStatus::Running, ScanStatus::Completed)
                | (ScanStatus::Running, ScanStatus::Failed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ScanStatus::Pending => "pending",
            ScanStatus::Running => "running",
            ScanStatus::Completed => "completed",
            ScanStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One resolved subdomain. Produced once by the resolver and never mutated afterwards.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SubdomainInfo {
    pub subdomain: String,
    pub ip_addresses: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ports: Option<Vec<u16>>,
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub discovered_at: Option<OffsetDateTime>,
}

/// Validated scan options. Only `ports` influences results; the rest is carried along.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ScanOptions {
    pub engines: Vec<String>,
    pub ports: Vec<u16>,
    pub threads: u8,
    pub enable_bruteforce: bool,
    pub verbose: bool,
    pub save_full: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            engines: vec!["google".into(), "bing".into(), "yahoo".into()],
            ports: crate::ports::default_ports(),
            threads: 10,
            enable_bruteforce: false,
            verbose: false,
            save_full: false,
        }
    }
}

/// Stored state of a single scan, also the body of `GET /api/scan/{scanId}`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ScanRecord {
    pub scan_id: String,
    pub domain: String,
    pub status: ScanStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub completed_at: Option<OffsetDateTime>,
    pub subdomains: Vec<SubdomainInfo>,
    pub subdomain_count: usize,
    pub scan_options: ScanOptions,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ScanRecord {
    /// A fresh `pending` record with no results.
    pub fn pending(scan_id: impl Into<String>, domain: impl Into<String>, options: ScanOptions) -> Self {
        Self {
            scan_id: scan_id.into(),
            domain: domain.into(),
            status: ScanStatus::Pending,
            created_at: OffsetDateTime::now_utc(),
            completed_at: None,
            subdomains: Vec::new(),
            subdomain_count: 0,
            scan_options: options,
            error: None,
        }
    }

    pub fn summary(&self) -> ScanListItem {
        ScanListItem {
            scan_id: self.scan_id.clone(),
            domain: self.domain.clone(),
            status: self.status,
            created_at: self.created_at,
            completed_at: self.completed_at,
            subdomain_count: self.subdomain_count,
        }
    }
}

/// Row of `GET /api/scan`: a record without its result list.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ScanListItem {
    pub scan_id: String,
    pub domain: String,
    pub status: ScanStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub completed_at: Option<OffsetDateTime>,
    pub subdomain_count: usize,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: usize,
    pub pages: usize,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ScanPage {
    pub scans: Vec<ScanListItem>,
    pub pagination: Pagination,
}

/// Appended once per completed scan.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub domain: String,
    pub scan_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_forward_transitions_are_legal() {
        use ScanStatus::*;
        assert!(Pending.can_advance_to(Running));
        assert!(Running.can_advance_to(Completed));
        assert!(Running.can_advance_to(Failed));

        assert!(!Pending.can_advance_to(Completed));
        assert!(!Pending.can_advance_to(Failed));
        assert!(!Running.can_advance_to(Pending));
        assert!(!Completed.can_advance_to(Failed));
        assert!(!Failed.can_advance_to(Completed));
        assert!(!Completed.can_advance_to(Running));
    }

    #[test]
    fn record_serializes_camel_case_with_snake_case_rows() {
        let mut rec = ScanRecord::pending("scan_1_abcdefgh", "example.com", ScanOptions::default());
        rec.subdomains.push(SubdomainInfo {
            subdomain: "www.example.com".into(),
            ip_addresses: vec!["93.184.216.34".into()],
            cname: None,
            ports: Some(vec![80, 443]),
            discovered_at: None,
        });
        rec.subdomain_count = 1;

        let v = serde_json::to_value(&rec).unwrap();
        assert_eq!(v["scanId"], "scan_1_abcdefgh");
        assert_eq!(v["status"], "pending");
        assert_eq!(v["subdomainCount"], 1);
        assert_eq!(v["scanOptions"]["enableBruteforce"], false);
        assert_eq!(v["subdomains"][0]["ip_addresses"][0], "93.184.216.34");
        assert!(v["subdomains"][0].get("cname").is_none());
        assert!(v.get("error").is_none());
        assert!(v["completedAt"].is_null());
    }
}

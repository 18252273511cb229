use std::net::IpAddr;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::proto::rr::RData;
use hickory_resolver::TokioAsyncResolver;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::types::{ScanOptions, SubdomainInfo};

/// Labels tried against every target domain, in order.
pub const CANDIDATE_LABELS: [&str; 16] = [
    "www", "mail", "ftp", "smtp", "pop", "imap", "admin", "blog", "shop", "store", "api", "test",
    "dev", "staging", "secure", "portal",
];

/// Answer of a single forward lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolved {
    pub addresses: Vec<IpAddr>,
    pub cname: Option<String>,
}

/// Forward name resolution. Implementations perform one lookup per call, without retries.
#[async_trait]
pub trait Resolve: Send + Sync {
    async fn resolve(&self, host: &str) -> Result<Resolved>;
}

/// `Resolve` backed by hickory's tokio resolver.
#[derive(Debug)]
pub struct HickoryResolver {
    inner: TokioAsyncResolver,
}

impl HickoryResolver {
    /// Use the host's resolver configuration, falling back to hickory's default upstreams.
    pub fn from_system(timeout: Duration) -> Self {
        let (config, mut opts) = match hickory_resolver::system_conf::read_system_conf() {
            Ok(pair) => pair,
            Err(e) => {
                warn!(error = %e, "could not read system resolver config, using defaults");
                (ResolverConfig::default(), ResolverOpts::default())
            }
        };
        opts.timeout = timeout;
        opts.attempts = 1;
        debug!("DNS resolver options: {:?}", opts);
        Self {
            inner: TokioAsyncResolver::tokio(config, opts),
        }
    }
}

#[async_trait]
impl Resolve for HickoryResolver {
    async fn resolve(&self, host: &str) -> Result<Resolved> {
        let lookup = self.inner.lookup_ip(host).await?;
        let addresses: Vec<IpAddr> = lookup.iter().collect();
        if addresses.is_empty() {
            bail!("no addresses for {host}");
        }
        let cname = lookup
            .as_lookup()
            .record_iter()
            .find_map(|record| match record.data() {
                Some(RData::CNAME(name)) => {
                    Some(name.0.to_utf8().trim_end_matches('.').to_string())
                }
                _ => None,
            });
        Ok(Resolved { addresses, cname })
    }
}

/// Try every candidate label against `domain`, one lookup at a time.
///
/// Candidates that fail to resolve are skipped; the enumeration as a whole never fails.
/// Each hit records its first address and the ports requested in `options`.
pub async fn enumerate(
    resolver: &dyn Resolve,
    domain: &str,
    options: &ScanOptions,
) -> Vec<SubdomainInfo> {
    let mut results = Vec::new();

    for label in CANDIDATE_LABELS {
        let host = format!("{label}.{domain}");
        match resolver.resolve(&host).await {
            Ok(resolved) => {
                let Some(addr) = resolved.addresses.first() else {
                    debug!(host = %host, "lookup returned no addresses");
                    continue;
                };
                debug!(host = %host, address = %addr, "resolved");
                results.push(SubdomainInfo {
                    subdomain: host,
                    ip_addresses: vec![addr.to_string()],
                    cname: resolved.cname,
                    ports: Some(options.ports.clone()),
                    discovered_at: Some(OffsetDateTime::now_utc()),
                });
            }
            Err(e) => {
                debug!(host = %host, error = %e, "not resolved");
            }
        }
    }

    info!(domain, found = results.len(), "enumeration finished");
    results
}

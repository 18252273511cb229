//! Input normalisation and validation for scan requests.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use crate::error::ApiError;
use crate::types::ScanOptions;

/// Largest number of domains accepted by one batch request.
pub const MAX_BATCH_DOMAINS: usize = 50;

static DOMAIN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^([a-z0-9]([a-z0-9-]{0,61}[a-z0-9])?\.)+[a-z]{2,}$")
        .expect("domain pattern is valid")
});

static SCHEME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^https?://").expect("scheme pattern is valid")
});

/// Trim, lowercase, and strip a leading `http(s)://` plus any path.
pub fn sanitize_domain(raw: &str) -> String {
    let lowered = raw.trim().to_lowercase();
    let without_scheme = SCHEME_RE.replace(&lowered, "");
    match without_scheme.find('/') {
        Some(idx) => without_scheme[..idx].to_string(),
        None => without_scheme.into_owned(),
    }
}

/// Whether `domain` is a hostname with at least two labels and an alphabetic TLD.
pub fn validate_domain(domain: &str) -> bool {
    (3..=253).contains(&domain.len()) && DOMAIN_RE.is_match(domain)
}

/// Sanitise then validate. Returns the normalised domain.
pub fn normalize_domain(raw: &str) -> Result<String, ApiError> {
    let domain = sanitize_domain(raw);
    if validate_domain(&domain) {
        Ok(domain)
    } else {
        Err(ApiError::InvalidDomain)
    }
}

/// Scan options as they arrive on the wire. Numbers are wide on purpose so
/// out-of-range values reach validation instead of failing body decoding.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawScanOptions {
    pub engines: Option<Vec<String>>,
    pub ports: Option<Vec<i64>>,
    pub threads: Option<i64>,
    pub enable_bruteforce: Option<bool>,
    pub verbose: Option<bool>,
    pub save_full: Option<bool>,
}

/// Apply bounds and defaults.
pub fn validate_options(raw: RawScanOptions) -> Result<ScanOptions, ApiError> {
    let defaults = ScanOptions::default();

    let ports = match raw.ports {
        None => defaults.ports,
        Some(ports) => ports
            .into_iter()
            .map(|p| {
                u16::try_from(p)
                    .ok()
                    .filter(|p| *p >= 1)
                    .ok_or_else(|| ApiError::InvalidOptions(format!("port out of range: {p}")))
            })
            .collect::<Result<Vec<_>, _>>()?,
    };

    let threads = match raw.threads {
        None => defaults.threads,
        Some(t) if (1..=100).contains(&t) => t as u8,
        Some(t) => {
            return Err(ApiError::InvalidOptions(format!(
                "threads must be between 1 and 100, got {t}"
            )))
        }
    };

    Ok(ScanOptions {
        engines: raw.engines.unwrap_or(defaults.engines),
        ports,
        threads,
        enable_bruteforce: raw.enable_bruteforce.unwrap_or(defaults.enable_bruteforce),
        verbose: raw.verbose.unwrap_or(defaults.verbose),
        save_full: raw.save_full.unwrap_or(defaults.save_full),
    })
}

/// Normalise every domain of a batch. Any invalid entry rejects the whole batch.
pub fn validate_batch(domains: &[String]) -> Result<Vec<String>, ApiError> {
    if domains.len() > MAX_BATCH_DOMAINS {
        return Err(ApiError::InvalidOptions(format!(
            "at most {MAX_BATCH_DOMAINS} domains per batch, got {}",
            domains.len()
        )));
    }
    domains.iter().map(|d| normalize_domain(d)).collect()
}

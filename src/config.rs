use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

/// sublist-web-rs: subdomain enumeration service with a REST API and a tiny embedded web UI.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "sublist-web-rs",
    version,
    about = "Subdomain enumeration service with a REST API and a tiny embedded web UI.",
    long_about = None
)]
pub struct Settings {
    /// Address the HTTP server listens on.
    #[arg(long, env = "SUBLIST_BIND", default_value = "127.0.0.1:8080")]
    pub bind: String,

    /// Directory holding the static web UI.
    #[arg(long = "ui-dir", env = "SUBLIST_UI_DIR", default_value = "ui")]
    pub ui_dir: PathBuf,

    /// Scan starts allowed per client within one rate-limit window.
    #[arg(long = "rate-limit", env = "SUBLIST_RATE_LIMIT", default_value_t = 10)]
    pub rate_limit_max: u32,

    /// Length of the rate-limit window in milliseconds.
    #[arg(long = "rate-window-ms", env = "SUBLIST_RATE_WINDOW_MS", default_value_t = 60_000)]
    pub rate_limit_window_ms: u64,

    /// How long completed scan responses stay cached, in seconds.
    #[arg(long = "cache-ttl-secs", env = "SUBLIST_CACHE_TTL_SECS", default_value_t = 86_400)]
    pub cache_ttl_secs: u64,

    /// Deadline for one scan's background phase in seconds (0 = no deadline).
    #[arg(long = "scan-timeout-secs", env = "SUBLIST_SCAN_TIMEOUT_SECS", default_value_t = 300)]
    pub scan_timeout_secs: u64,

    /// Per-query DNS timeout in milliseconds.
    #[arg(long = "dns-timeout-ms", env = "SUBLIST_DNS_TIMEOUT_MS", default_value_t = 5_000)]
    pub dns_timeout_ms: u64,

    /// Time given to in-flight scans to record their final state on shutdown, in seconds.
    #[arg(long = "shutdown-grace-secs", env = "SUBLIST_SHUTDOWN_GRACE_SECS", default_value_t = 10)]
    pub shutdown_grace_secs: u64,

    /// Log filter used when RUST_LOG is not set.
    #[arg(long = "log-level", env = "SUBLIST_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Run a single scan for this domain, print the results and exit instead of serving.
    #[arg(long)]
    pub domain: Option<String>,

    /// Ports attached to each result in one-shot mode (e.g. `80,443,8000-8010`).
    #[arg(long)]
    pub ports: Option<String>,

    /// Write one-shot results as pretty JSON to this path.
    #[arg(long)]
    pub output: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings::parse_from(["sublist-web-rs"])
    }
}

impl Settings {
    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_millis(self.rate_limit_window_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn scan_deadline(&self) -> Option<Duration> {
        (self.scan_timeout_secs > 0).then(|| Duration::from_secs(self.scan_timeout_secs))
    }

    pub fn dns_timeout(&self) -> Duration {
        Duration::from_millis(self.dns_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

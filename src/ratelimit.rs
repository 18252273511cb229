use std::collections::HashMap;
use std::time::{Duration, Instant};

use axum::http::{HeaderName, HeaderValue};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use tokio::sync::Mutex;

/// Once this many keys are tracked, expired windows are dropped on the next new window.
const PRUNE_THRESHOLD: usize = 1024;

/// Outcome of one `consume` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    /// Quota left in the current window. Negative once the caller is over the limit.
    pub remaining: i64,
    pub ms_before_next: u64,
    pub reset_at: OffsetDateTime,
}

impl RateLimitDecision {
    pub fn is_allowed(&self) -> bool {
        self.remaining >= 0
    }

    /// Seconds a rejected client should wait, rounded up.
    pub fn retry_after_secs(&self) -> u64 {
        self.ms_before_next.div_ceil(1000)
    }

    /// `X-RateLimit-*` headers describing this decision.
    pub fn headers(&self, limit: u32) -> Vec<(HeaderName, HeaderValue)> {
        let reset = self
            .reset_at
            .format(&Rfc3339)
            .unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z"));
        let mut out = vec![
            (HeaderName::from_static("x-ratelimit-limit"), HeaderValue::from(limit)),
            (
                HeaderName::from_static("x-ratelimit-remaining"),
                HeaderValue::from(self.remaining.max(0)),
            ),
        ];
        if let Ok(v) = HeaderValue::from_str(&reset) {
            out.push((HeaderName::from_static("x-ratelimit-reset"), v));
        }
        out
    }
}

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    reset_at: Instant,
}

/// Fixed-window request counter keyed by client.
///
/// The first request in a window opens it; the counter resets entirely once the
/// window's end has passed. Single-process and in-memory only.
#[derive(Debug)]
pub struct FixedWindowLimiter {
    max_requests: u32,
    window: Duration,
    windows: Mutex<HashMap<String, Window>>,
}

impl FixedWindowLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    pub async fn consume(&self, key: &str) -> RateLimitDecision {
        self.consume_at(key, Instant::now()).await
    }

    /// `consume` against an explicit clock reading.
    pub async fn consume_at(&self, key: &str, now: Instant) -> RateLimitDecision {
        let mut windows = self.windows.lock().await;

        let current = windows.get(key).copied().filter(|w| now <= w.reset_at);
        let window = match current {
            Some(mut w) => {
                w.count = w.count.saturating_add(1);
                w
            }
            None => {
                if windows.len() >= PRUNE_THRESHOLD {
                    windows.retain(|_, w| now <= w.reset_at);
                }
                Window {
                    count: 1,
                    reset_at: now + self.window,
                }
            }
        };
        windows.insert(key.to_string(), window);

        let ms_before_next = window.reset_at.saturating_duration_since(now).as_millis() as u64;
        RateLimitDecision {
            remaining: i64::from(self.max_requests) - i64::from(window.count),
            ms_before_next,
            reset_at: OffsetDateTime::now_utc() + Duration::from_millis(ms_before_next),
        }
    }

    #[cfg(test)]
    async fn tracked_keys(&self) -> usize {
        self.windows.lock().await.len()
    }
}

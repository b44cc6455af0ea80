//! Per-host adaptive pacing: ramp / blackout / probe.
//!
//! Mirrors the pooling shape of a keep-alive HTTP client pool — one
//! [`HostLimitState`] per hostname, created lazily on first reference and
//! never torn down for the life of the process.

mod key;
mod state;
mod window;

pub use key::HostKey;
pub use state::{HostLimitState, SUCCESS_GAP_MS};

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use httpdate::parse_http_date;
use log::debug;
use tokio::sync::Mutex;
use tokio::time::Instant as TokioInstant;

use crate::clock::SharedClock;

/// Tunables for the host limiter, independent of any one host's learned
/// state.
#[derive(Debug, Clone)]
pub struct LimiterConfig {
    /// Lower bound of the jitter added to each scheduled request.
    pub jitter_min_ms: u64,
    /// Upper bound of the jitter added to each scheduled request.
    pub jitter_max_ms: u64,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            jitter_min_ms: 50,
            jitter_max_ms: 250,
        }
    }
}

/// Parses a `Retry-After` header value, which is either a delta in seconds
/// or an HTTP-date.
#[must_use]
pub fn parse_retry_after_ms(value: &str, now_ms: u64) -> Option<u64> {
    if let Ok(secs) = value.trim().parse::<u64>() {
        return Some(secs.saturating_mul(1000));
    }
    if let Ok(when) = parse_http_date(value.trim()) {
        let target_ms = when
            .duration_since(std::time::UNIX_EPOCH)
            .ok()?
            .as_millis() as u64;
        // `now_ms` is clock-relative, not wall-clock; callers that need an
        // HTTP-date Retry-After resolved against a `TestClock` should treat
        // this as best-effort and fall back to the base blackout.
        return Some(target_ms.saturating_sub(now_ms));
    }
    None
}

/// Per-process pool of [`HostLimitState`], one per host.
#[derive(Debug)]
pub struct HostLimiter {
    hosts: DashMap<HostKey, Arc<Mutex<HostLimitState>>>,
    config: LimiterConfig,
    clock: SharedClock,
}

impl HostLimiter {
    #[must_use]
    pub fn new(config: LimiterConfig, clock: SharedClock) -> Self {
        Self {
            hosts: DashMap::new(),
            config,
            clock,
        }
    }

    fn state_for(&self, host: &HostKey) -> Arc<Mutex<HostLimitState>> {
        self.hosts
            .entry(host.clone())
            .or_insert_with(|| {
                Arc::new(Mutex::new(HostLimitState::new(
                    self.clock.now_ms(),
                    self.config.jitter_min_ms,
                    self.config.jitter_max_ms,
                )))
            })
            .clone()
    }

    /// Block until `host` may send its next request, updating scheduling
    /// state as a side effect.
    pub async fn acquire(&self, host: &HostKey) {
        let state = self.state_for(host);
        loop {
            let wait_until = {
                let mut guard = state.lock().await;
                let now = self.clock.now_ms();
                guard.plan_acquire(now).wait_until
            };
            match wait_until {
                None => return,
                Some(until) => {
                    let now = self.clock.now_ms();
                    let delay_ms = until.saturating_sub(now);
                    if delay_ms == 0 {
                        continue;
                    }
                    debug!(
                        "host {host} rate-limited, sleeping {delay_ms}ms until it is eligible again"
                    );
                    tokio::time::sleep_until(
                        TokioInstant::now() + Duration::from_millis(delay_ms),
                    )
                    .await;
                }
            }
        }
    }

    /// Record a 429 for `host`, entering or deepening blackout.
    pub async fn note_429(&self, host: &HostKey, retry_after_ms: Option<u64>) {
        let state = self.state_for(host);
        let mut guard = state.lock().await;
        let now = self.clock.now_ms();
        guard.note_429(now, retry_after_ms);
        debug!(
            "host {host} entered blackout until +{}ms (streak={})",
            guard.backoff_until.saturating_sub(now),
            guard.err429_streak
        );
    }

    /// Record a success for `host`, possibly probing the rpm cap upward.
    pub async fn note_success(&self, host: &HostKey) {
        let state = self.state_for(host);
        let mut guard = state.lock().await;
        let now = self.clock.now_ms();
        guard.note_success(now);
    }

    /// Whether `host` is currently in blackout.
    pub async fn in_blackout(&self, host: &HostKey) -> bool {
        let state = self.state_for(host);
        let guard = state.lock().await;
        guard.in_blackout(self.clock.now_ms())
    }

    /// The absolute time (clock ms) `host`'s blackout ends, or `None` if the
    /// host is not currently blacked out.
    pub async fn backoff_until(&self, host: &HostKey) -> Option<u64> {
        let state = self.state_for(host);
        let guard = state.lock().await;
        let now = self.clock.now_ms();
        if guard.in_blackout(now) {
            Some(guard.backoff_until)
        } else {
            None
        }
    }

    /// Number of distinct hosts with limiter state.
    #[must_use]
    pub fn active_host_count(&self) -> usize {
        self.hosts.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::TestClock;

    fn limiter(clock: TestClock) -> HostLimiter {
        HostLimiter::new(LimiterConfig::default(), Arc::new(clock))
    }

    #[tokio::test]
    async fn first_acquire_on_unseen_host_does_not_block() {
        let clock = TestClock::new();
        let l = limiter(clock);
        let host = HostKey::from("example.com");
        l.acquire(&host).await;
        assert_eq!(l.active_host_count(), 1);
    }

    #[tokio::test]
    async fn note_429_enters_blackout() {
        let clock = TestClock::new();
        let l = limiter(clock.clone());
        let host = HostKey::from("example.com");
        l.note_429(&host, None).await;
        assert!(l.in_blackout(&host).await);
        let until = l.backoff_until(&host).await.unwrap();
        assert!(until >= 30_000);
    }

    #[test]
    fn retry_after_parses_delta_seconds() {
        assert_eq!(parse_retry_after_ms("120", 0), Some(120_000));
    }
}

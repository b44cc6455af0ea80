//! Aggregated, first-sample-retained problem counters, and the
//! connection-reset guard that watches them for one specific condition.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::limiter::HostKey;
use crate::outcome::ProblemSample;

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
struct ProblemKey {
    kind: String,
    scope: String,
    target: String,
}

struct ProblemRecord {
    count: u64,
}

/// Tracks `(kind, scope, target)` problem occurrences, retaining only the
/// first sample of each distinct key alongside its running count — the
/// "best-effort" accounting that replaces scattered
/// `try { … } catch { /* ignore */ }` with an explicit, counted failure
/// path.
#[derive(Default)]
pub struct ProblemTracker {
    records: Mutex<HashMap<ProblemKey, ProblemRecord>>,
    order: Mutex<Vec<ProblemKey>>,
}

impl ProblemTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, kind: &str, scope: &str, target: &str) {
        let key = ProblemKey {
            kind: kind.to_string(),
            scope: scope.to_string(),
            target: target.to_string(),
        };
        let mut records = self.records.lock().unwrap();
        match records.get_mut(&key) {
            Some(existing) => existing.count += 1,
            None => {
                self.order.lock().unwrap().push(key.clone());
                records.insert(key, ProblemRecord { count: 1 });
            }
        }
    }

    /// Samples ordered by `kind`, first-seen order within a kind.
    #[must_use]
    pub fn samples(&self) -> Vec<ProblemSample> {
        let records = self.records.lock().unwrap();
        let order = self.order.lock().unwrap();
        let mut samples: Vec<ProblemSample> = order
            .iter()
            .filter_map(|key| {
                records.get(key).map(|record| ProblemSample {
                    kind: key.kind.clone(),
                    scope: key.scope.clone(),
                    target: key.target.clone(),
                    count: record.count,
                })
            })
            .collect();
        samples.sort_by(|a, b| a.kind.cmp(&b.kind));
        samples
    }
}

/// Per-host sliding window of connection-reset timestamps. If a single
/// host produces `threshold` resets within `window_ms`, the caller should
/// record a `connection-reset` problem and request an abort.
pub struct ConnectionResetGuard {
    resets: Mutex<HashMap<HostKey, Vec<u64>>>,
    threshold: u32,
    window_ms: u64,
}

impl ConnectionResetGuard {
    #[must_use]
    pub fn new(threshold: u32, window_ms: u64) -> Self {
        Self {
            resets: Mutex::new(HashMap::new()),
            threshold,
            window_ms,
        }
    }

    /// Record a reset for `host` at `now`, returning `true` if the host has
    /// now crossed the threshold within the window.
    pub fn record_and_check(&self, host: &HostKey, now: u64) -> bool {
        let mut resets = self.resets.lock().unwrap();
        let entry = resets.entry(host.clone()).or_default();
        entry.retain(|t| now.saturating_sub(*t) <= self.window_ms);
        entry.push(now);
        entry.len() as u32 >= self.threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_sample_is_retained_and_counted() {
        let tracker = ProblemTracker::new();
        tracker.record("http", "host", "example.com");
        tracker.record("http", "host", "example.com");
        tracker.record("network", "host", "other.com");
        let samples = tracker.samples();
        assert_eq!(samples.len(), 2);
        let http_sample = samples.iter().find(|s| s.kind == "http").unwrap();
        assert_eq!(http_sample.count, 2);
    }

    #[test]
    fn connection_reset_guard_trips_after_threshold_within_window() {
        let guard = ConnectionResetGuard::new(3, 120_000);
        let host = HostKey::from("example.com");
        assert!(!guard.record_and_check(&host, 0));
        assert!(!guard.record_and_check(&host, 1_000));
        assert!(guard.record_and_check(&host, 2_000));
    }

    #[test]
    fn resets_outside_window_are_forgotten() {
        let guard = ConnectionResetGuard::new(2, 10_000);
        let host = HostKey::from("example.com");
        assert!(!guard.record_and_check(&host, 0));
        assert!(!guard.record_and_check(&host, 20_000));
    }
}

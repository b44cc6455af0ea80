//! Monotonic counters owned by the crawler instance.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Monotonically-incrementing counters tracked across a single crawl run.
///
/// All increments use relaxed ordering: the counters are telemetry, not a
/// synchronization mechanism, so cross-thread visibility ordering among them
/// doesn't matter.
#[derive(Debug, Default)]
pub struct Stats {
    pages_visited: AtomicU64,
    pages_downloaded: AtomicU64,
    bytes_downloaded: AtomicU64,
    articles_found: AtomicU64,
    articles_saved: AtomicU64,
    errors: AtomicU64,
    cache_rate_limited_served: AtomicU64,
    cache_rate_limited_deferred: AtomicU64,
}

/// An immutable point-in-time snapshot of [`Stats`], suitable for
/// serialization into a telemetry event or the final-milestone payload.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub pages_visited: u64,
    pub pages_downloaded: u64,
    pub bytes_downloaded: u64,
    pub articles_found: u64,
    pub articles_saved: u64,
    pub errors: u64,
    pub cache_rate_limited_served: u64,
    pub cache_rate_limited_deferred: u64,
}

macro_rules! counter_ops {
    ($field:ident, $inc:ident, $add:ident) => {
        pub fn $inc(&self) {
            self.$field.fetch_add(1, Ordering::Relaxed);
        }

        #[allow(dead_code)]
        pub fn $add(&self, n: u64) {
            self.$field.fetch_add(n, Ordering::Relaxed);
        }
    };
}

impl Stats {
    counter_ops!(pages_visited, inc_pages_visited, add_pages_visited);
    counter_ops!(pages_downloaded, inc_pages_downloaded, add_pages_downloaded);
    counter_ops!(bytes_downloaded, inc_bytes_downloaded, add_bytes_downloaded);
    counter_ops!(articles_found, inc_articles_found, add_articles_found);
    counter_ops!(articles_saved, inc_articles_saved, add_articles_saved);
    counter_ops!(errors, inc_errors, add_errors);
    counter_ops!(
        cache_rate_limited_served,
        inc_cache_rate_limited_served,
        add_cache_rate_limited_served
    );
    counter_ops!(
        cache_rate_limited_deferred,
        inc_cache_rate_limited_deferred,
        add_cache_rate_limited_deferred
    );

    #[must_use]
    pub fn pages_downloaded_count(&self) -> u64 {
        self.pages_downloaded.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn errors_count(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            pages_visited: self.pages_visited.load(Ordering::Relaxed),
            pages_downloaded: self.pages_downloaded.load(Ordering::Relaxed),
            bytes_downloaded: self.bytes_downloaded.load(Ordering::Relaxed),
            articles_found: self.articles_found.load(Ordering::Relaxed),
            articles_saved: self.articles_saved.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            cache_rate_limited_served: self.cache_rate_limited_served.load(Ordering::Relaxed),
            cache_rate_limited_deferred: self.cache_rate_limited_deferred.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn increments_are_visible_in_snapshot() {
        let stats = Stats::default();
        stats.inc_pages_visited();
        stats.inc_pages_visited();
        stats.add_bytes_downloaded(512);
        let snap = stats.snapshot();
        assert_eq!(snap.pages_visited, 2);
        assert_eq!(snap.bytes_downloaded, 512);
    }
}

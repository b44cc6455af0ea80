//! Fetch-vs-cache decision: freshness windows per URL class, and forced
//! cache service while a host is in blackout.

use serde::{Deserialize, Serialize};

/// Where a cached entry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CacheSource {
    Db,
    File,
}

/// A read-only cached copy of a page, as held by the external store.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub html: String,
    /// Clock-relative timestamp (ms) the entry was crawled.
    pub crawled_at: u64,
    pub source: CacheSource,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

/// The URL class a freshness window is chosen for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlClass {
    Article,
    Hub,
    Other,
}

/// Freshness windows, defaulting to a single `max_age_ms` unless a
/// per-class override is set.
#[derive(Debug, Clone)]
pub struct FreshnessPolicy {
    pub max_age_ms: u64,
    pub max_age_article_ms: Option<u64>,
    pub max_age_hub_ms: Option<u64>,
    pub prefer_cache: bool,
}

impl Default for FreshnessPolicy {
    fn default() -> Self {
        Self {
            max_age_ms: 24 * 60 * 60 * 1000,
            max_age_article_ms: None,
            max_age_hub_ms: None,
            prefer_cache: false,
        }
    }
}

impl FreshnessPolicy {
    #[must_use]
    pub fn max_age_for(&self, class: UrlClass) -> u64 {
        match class {
            UrlClass::Article => self.max_age_article_ms.unwrap_or(self.max_age_ms),
            UrlClass::Hub => self.max_age_hub_ms.unwrap_or(self.max_age_ms),
            UrlClass::Other => self.max_age_ms,
        }
    }
}

/// The outcome of [`should_use_cache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheDecision {
    pub use_cache: bool,
    /// Age of the entry in seconds, if an entry was supplied.
    pub age_seconds: Option<u64>,
    pub forced: bool,
}

/// Pure decision function: given the freshness policy, whether the host is
/// in blackout, and whether an entry exists, decide whether to serve the
/// cache instead of hitting the network.
///
/// Kept free of I/O and async so it is directly unit-testable, per the
/// "cache-and-skip logic interleaved with the fetch loop" re-architecture
/// note: extract to a pure function of `(preferCache, maxAgeMs, crawledAt,
/// hostBlackout)`.
#[must_use]
pub fn should_use_cache(
    policy: &FreshnessPolicy,
    class: UrlClass,
    now: u64,
    entry: Option<&CacheEntry>,
    host_in_blackout: bool,
) -> CacheDecision {
    let Some(entry) = entry else {
        return CacheDecision {
            use_cache: false,
            age_seconds: None,
            forced: false,
        };
    };

    let age_ms = now.saturating_sub(entry.crawled_at);
    let age_seconds = Some(age_ms / 1000);

    if host_in_blackout {
        return CacheDecision {
            use_cache: true,
            age_seconds,
            forced: true,
        };
    }

    let fresh = age_ms <= policy.max_age_for(class);
    if policy.prefer_cache && fresh {
        return CacheDecision {
            use_cache: true,
            age_seconds,
            forced: false,
        };
    }

    CacheDecision {
        use_cache: fresh,
        age_seconds,
        forced: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(crawled_at: u64) -> CacheEntry {
        CacheEntry {
            html: "<html></html>".into(),
            crawled_at,
            source: CacheSource::Db,
            etag: None,
            last_modified: None,
        }
    }

    #[test]
    fn stale_cache_under_freshness_window_falls_through_to_network() {
        let policy = FreshnessPolicy {
            max_age_ms: 1000,
            ..Default::default()
        };
        let now = 3_600_000;
        let e = entry(0);
        let decision = should_use_cache(&policy, UrlClass::Article, now, Some(&e), false);
        assert!(!decision.use_cache);
        assert!(!decision.forced);
    }

    #[test]
    fn blackout_forces_cache_even_if_stale() {
        let policy = FreshnessPolicy {
            max_age_ms: 1000,
            ..Default::default()
        };
        let e = entry(0);
        let decision = should_use_cache(&policy, UrlClass::Article, 120_000, Some(&e), true);
        assert!(decision.use_cache);
        assert!(decision.forced);
    }

    #[test]
    fn no_entry_never_uses_cache() {
        let policy = FreshnessPolicy::default();
        let decision = should_use_cache(&policy, UrlClass::Article, 0, None, true);
        assert!(!decision.use_cache);
        assert_eq!(decision.age_seconds, None);
    }

    #[test]
    fn prefer_cache_serves_fresh_entry() {
        let policy = FreshnessPolicy {
            max_age_ms: 10_000,
            prefer_cache: true,
            ..Default::default()
        };
        let e = entry(0);
        let decision = should_use_cache(&policy, UrlClass::Article, 5_000, Some(&e), false);
        assert!(decision.use_cache);
        assert!(!decision.forced);
    }

    #[test]
    fn per_class_max_age_overrides_default() {
        let policy = FreshnessPolicy {
            max_age_ms: 1_000,
            max_age_hub_ms: Some(100_000),
            prefer_cache: true,
            ..Default::default()
        };
        let e = entry(0);
        let decision = should_use_cache(&policy, UrlClass::Hub, 50_000, Some(&e), false);
        assert!(decision.use_cache);
    }
}

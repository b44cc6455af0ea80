use std::cmp::Ordering;

use url::Url;

/// The kind of work a [`WorkItem`] represents, driving its base priority
/// weight and (for `discover-structure` crawls) whether it is admitted at
/// all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum WorkKind {
    Article,
    #[strum(serialize = "hub-seed")]
    HubSeed,
    Nav,
    History,
    Refresh,
}

impl WorkKind {
    /// Base priority weight; lower sorts earlier.
    #[must_use]
    pub fn type_weight(self) -> f64 {
        match self {
            WorkKind::Article => 0.0,
            WorkKind::HubSeed => 4.0,
            WorkKind::History => 6.0,
            WorkKind::Nav => 10.0,
            WorkKind::Refresh => 25.0,
        }
    }
}

/// Extra context attached to an item by the frontier when it is served from
/// cache because its host is in blackout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkContext {
    pub force_cache: bool,
    pub cached_page: bool,
    pub rate_limited_host: bool,
}

/// A single unit of crawl work: a URL, its provenance, and its scheduling
/// state within the frontier.
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub url: Url,
    pub depth: u32,
    pub kind: WorkKind,
    /// Clock-relative timestamp (ms) this item was discovered.
    pub discovered_at: u64,
    pub retries: u32,
    /// Absolute clock time (ms) before which this item may not be popped.
    pub next_eligible_at: u64,
    pub priority_bias: f64,
    /// Set when a host is in blackout and no cache entry is available; the
    /// item remains in the heap and is re-checked at wake time.
    pub deferred_until: Option<u64>,
    pub context: Option<WorkContext>,
}

impl WorkItem {
    #[must_use]
    pub fn new(url: Url, depth: u32, kind: WorkKind, discovered_at: u64) -> Self {
        Self {
            url,
            depth,
            kind,
            discovered_at,
            retries: 0,
            next_eligible_at: 0,
            priority_bias: 0.0,
            deferred_until: None,
            context: None,
        }
    }

    /// `priority = typeWeight(kind) + depth + priorityBias +
    /// discoveredAt * 1e-9`. Smaller sorts earlier; the `discoveredAt`
    /// fraction is a stable tie-breaker favouring older items.
    #[must_use]
    pub fn priority(&self) -> f64 {
        self.kind.type_weight()
            + f64::from(self.depth)
            + self.priority_bias
            + (self.discovered_at as f64) * 1e-9
    }
}

impl PartialEq for WorkItem {
    fn eq(&self, other: &Self) -> bool {
        self.url == other.url
    }
}

impl Eq for WorkItem {}

impl PartialOrd for WorkItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for WorkItem {
    /// Ascending by `priority`: a smaller priority value compares as
    /// `Less`. Callers needing min-heap-out-of-`BinaryHeap` behaviour wrap
    /// entries in `std::cmp::Reverse`.
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority()
            .partial_cmp(&other.priority())
            .unwrap_or(Ordering::Equal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn article_sorts_before_nav() {
        let article = WorkItem::new(url("https://a.example/"), 0, WorkKind::Article, 0);
        let nav = WorkItem::new(url("https://a.example/nav"), 0, WorkKind::Nav, 0);
        assert!(article < nav);
    }

    #[test]
    fn older_discovery_breaks_ties() {
        let older = WorkItem::new(url("https://a.example/1"), 0, WorkKind::Article, 10);
        let newer = WorkItem::new(url("https://a.example/2"), 0, WorkKind::Article, 20_000);
        assert!(older < newer);
    }

    #[test]
    fn kind_display_matches_spec_vocabulary() {
        assert_eq!(WorkKind::HubSeed.to_string(), "hub-seed");
        assert_eq!(WorkKind::Article.to_string(), "article");
    }
}

//! Bounded min-heap frontier with deferred-wake scheduling and dedup.
//!
//! Grounded on the `BinaryHeap`-of-wrapper-struct pattern used for
//! priority-scored crawl requests: a small struct implementing a reversed
//! `Ord` so a max-heap (`BinaryHeap`'s only mode) behaves as a min-heap.

mod item;

pub use item::{WorkContext, WorkItem, WorkKind};

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashSet;
use log::debug;
use url::Url;

use crate::limiter::{HostKey, HostLimiter};
use crate::stats::Stats;

/// What `pull_next` handed back.
#[derive(Debug)]
pub enum Pulled {
    /// An item ready to be processed now.
    Item(WorkItem),
    /// Nothing is eligible yet; the caller should wait (at most) until this
    /// absolute clock time before probing again.
    WakeAt(u64),
    /// The frontier is empty.
    Empty,
}

struct Inner {
    heap: BinaryHeap<Reverse<WorkItem>>,
    queued: HashSet<Url>,
}

/// A trait for checking whether a cached entry exists for a URL, without
/// depending on the concrete `Store`/`cache` machinery. Kept separate so the
/// frontier's deferred-wake logic can be unit tested with a stub. Async
/// because a real implementation consults the `Store`.
#[async_trait]
pub trait CacheLookup: Send + Sync {
    async fn has_fresh_or_any_entry(&self, url: &Url) -> bool;
}

/// A lookup that always reports "no cache", for callers with no cache layer.
#[derive(Debug, Default)]
pub struct NoCache;

#[async_trait]
impl CacheLookup for NoCache {
    async fn has_fresh_or_any_entry(&self, _url: &Url) -> bool {
        false
    }
}

/// The bounded priority frontier shared by all workers.
pub struct PriorityFrontier {
    inner: std::sync::Mutex<Inner>,
    visited: DashSet<Url>,
    max_queue: usize,
    structure_only: std::sync::atomic::AtomicBool,
}

impl PriorityFrontier {
    #[must_use]
    pub fn new(max_queue: usize) -> Self {
        Self {
            inner: std::sync::Mutex::new(Inner {
                heap: BinaryHeap::new(),
                queued: HashSet::new(),
            }),
            visited: DashSet::new(),
            max_queue,
            structure_only: std::sync::atomic::AtomicBool::new(false),
        }
    }

    /// In `discover-structure` mode, article-kind enqueues are rejected
    /// outright (`queue:drop{reason:"structure-skip"}`); nav/hub-seed
    /// kinds are unaffected.
    pub fn set_structure_only(&self, structure_only: bool) {
        self.structure_only
            .store(structure_only, std::sync::atomic::Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_visited(&self, url: &Url) -> bool {
        self.visited.contains(url)
    }

    pub fn mark_visited(&self, url: Url) {
        self.visited.insert(url);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().heap.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn is_queued(&self, url: &Url) -> bool {
        self.inner.lock().unwrap().queued.contains(url)
    }

    /// Enqueue a work item. A no-op (returns `false`) if the URL is already
    /// queued or visited, or the heap is at capacity (drop-new overflow
    /// policy). Domain/robots/depth admission is the caller's
    /// responsibility (the URL Policy runs before this).
    pub fn enqueue(&self, item: WorkItem) -> bool {
        if self.visited.contains(&item.url) {
            return false;
        }
        if item.kind == WorkKind::Article
            && self.structure_only.load(std::sync::atomic::Ordering::SeqCst)
        {
            debug!("queue:drop reason=structure-skip url={}", item.url);
            return false;
        }
        let mut guard = self.inner.lock().unwrap();
        if guard.queued.contains(&item.url) {
            return false;
        }
        if guard.heap.len() >= self.max_queue {
            debug!("frontier at capacity ({}), dropping {}", self.max_queue, item.url);
            return false;
        }
        guard.queued.insert(item.url.clone());
        guard.heap.push(Reverse(item));
        true
    }

    /// Re-insert an item that was popped earlier (retry, deferred-wake, or
    /// rescheduled). Bypasses the visited/queued admission checks since the
    /// item is already accounted for.
    fn push_back(&self, item: WorkItem) {
        let mut guard = self.inner.lock().unwrap();
        guard.queued.insert(item.url.clone());
        guard.heap.push(Reverse(item));
    }

    /// Re-insert an item after a retriable failure. The URL must have been
    /// removed from `queued` by a prior `pull_next`.
    pub fn reinsert(&self, item: WorkItem) {
        self.push_back(item);
    }

    /// Pop the minimum-priority eligible item, honoring deferred-wake and
    /// host-blackout semantics. Atomic from peek through either
    /// return-with-item or push-back.
    pub async fn pull_next(
        &self,
        now: u64,
        limiter: &HostLimiter,
        cache: &dyn CacheLookup,
        stats: &Stats,
    ) -> Pulled {
        let popped = {
            let mut guard = self.inner.lock().unwrap();
            guard.heap.pop()
        };

        let Some(Reverse(mut item)) = popped else {
            return Pulled::Empty;
        };

        {
            let mut guard = self.inner.lock().unwrap();
            guard.queued.remove(&item.url);
        }

        if item.next_eligible_at > now {
            let wake_at = item.next_eligible_at;
            self.push_back(item);
            return Pulled::WakeAt(wake_at);
        }

        let host = match HostKey::try_from(&item.url) {
            Ok(h) => h,
            Err(_) => return Pulled::Item(item),
        };

        if limiter.in_blackout(&host).await {
            if cache.has_fresh_or_any_entry(&item.url).await {
                item.context = Some(WorkContext {
                    force_cache: true,
                    cached_page: true,
                    rate_limited_host: true,
                });
                return Pulled::Item(item);
            }
            let backoff_until = limiter.backoff_until(&host).await.unwrap_or(now);
            item.deferred_until = Some(backoff_until);
            let wake_at = backoff_until;
            self.push_back(item);
            stats.inc_cache_rate_limited_deferred();
            return Pulled::WakeAt(wake_at);
        }

        Pulled::Item(item)
    }
}

impl std::fmt::Debug for PriorityFrontier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PriorityFrontier")
            .field("len", &self.len())
            .field("max_queue", &self.max_queue)
            .finish()
    }
}

/// A shared, cloneable handle to a frontier.
pub type SharedFrontier = Arc<PriorityFrontier>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::TestClock;
    use crate::limiter::LimiterConfig;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn item(u: &str, kind: WorkKind, depth: u32) -> WorkItem {
        WorkItem::new(url(u), depth, kind, 0)
    }

    #[test]
    fn enqueue_dedups_and_tracks_queued_set() {
        let f = PriorityFrontier::new(100);
        assert!(f.enqueue(item("https://a.example/1", WorkKind::Article, 0)));
        assert!(f.is_queued(&url("https://a.example/1")));
        assert!(!f.enqueue(item("https://a.example/1", WorkKind::Article, 0)));
        assert_eq!(f.len(), 1);
    }

    #[test]
    fn visited_urls_are_rejected() {
        let f = PriorityFrontier::new(100);
        f.mark_visited(url("https://a.example/1"));
        assert!(!f.enqueue(item("https://a.example/1", WorkKind::Article, 0)));
    }

    #[test]
    fn overflow_drops_new_items() {
        let f = PriorityFrontier::new(1);
        assert!(f.enqueue(item("https://a.example/1", WorkKind::Article, 0)));
        assert!(!f.enqueue(item("https://a.example/2", WorkKind::Article, 0)));
        assert_eq!(f.len(), 1);
    }

    #[tokio::test]
    async fn pull_next_returns_lowest_priority_item() {
        let f = PriorityFrontier::new(100);
        f.enqueue(item("https://a.example/nav", WorkKind::Nav, 0));
        f.enqueue(item("https://a.example/article", WorkKind::Article, 0));
        let clock = TestClock::new();
        let limiter = HostLimiter::new(LimiterConfig::default(), Arc::new(clock));
        let stats = Stats::default();
        match f.pull_next(0, &limiter, &NoCache, &stats).await {
            Pulled::Item(i) => assert_eq!(i.url.as_str(), "https://a.example/article"),
            other => panic!("expected item, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn pull_next_defers_when_not_yet_eligible() {
        let f = PriorityFrontier::new(100);
        let mut it = item("https://a.example/1", WorkKind::Article, 0);
        it.next_eligible_at = 5_000;
        f.enqueue(it);
        let clock = TestClock::new();
        let limiter = HostLimiter::new(LimiterConfig::default(), Arc::new(clock));
        let stats = Stats::default();
        match f.pull_next(0, &limiter, &NoCache, &stats).await {
            Pulled::WakeAt(t) => assert_eq!(t, 5_000),
            other => panic!("expected wake-at, got {other:?}"),
        }
        assert!(f.is_queued(&url("https://a.example/1")));
    }

    #[tokio::test]
    async fn pull_next_during_blackout_without_cache_defers_and_counts() {
        let f = PriorityFrontier::new(100);
        f.enqueue(item("https://a.example/1", WorkKind::Article, 0));
        let clock = TestClock::new();
        let limiter = HostLimiter::new(LimiterConfig::default(), Arc::new(clock));
        let host = HostKey::from("a.example");
        limiter.note_429(&host, None).await;
        let stats = Stats::default();
        match f.pull_next(0, &limiter, &NoCache, &stats).await {
            Pulled::WakeAt(_) => {}
            other => panic!("expected wake-at, got {other:?}"),
        }
        assert_eq!(stats.snapshot().cache_rate_limited_deferred, 1);
    }

    struct AlwaysCached;
    #[async_trait]
    impl CacheLookup for AlwaysCached {
        async fn has_fresh_or_any_entry(&self, _url: &Url) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn pull_next_during_blackout_with_cache_forces_cache_context() {
        let f = PriorityFrontier::new(100);
        f.enqueue(item("https://a.example/1", WorkKind::Article, 0));
        let clock = TestClock::new();
        let limiter = HostLimiter::new(LimiterConfig::default(), Arc::new(clock));
        let host = HostKey::from("a.example");
        limiter.note_429(&host, None).await;
        let stats = Stats::default();
        match f.pull_next(0, &limiter, &AlwaysCached, &stats).await {
            Pulled::Item(i) => {
                let ctx = i.context.expect("context set");
                assert!(ctx.force_cache);
                assert!(ctx.rate_limited_host);
            }
            other => panic!("expected item, got {other:?}"),
        }
    }
}

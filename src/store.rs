//! Persistence is an external collaborator. The core depends only on this
//! trait's shape (`insertFetch`, `upsertArticle`, `insertLink`,
//! `getArticleByUrl`, `insertQueueEvent`, `insertProblem`,
//! `insertMilestone`), matching the "dynamic adapter registry" note: the
//! core depends on an interface, not a concrete store.

use std::sync::Mutex;

use async_trait::async_trait;
use url::Url;

use crate::cache::CacheEntry;
use crate::error::Result;
use crate::frontier::WorkKind;

/// A single completed (or attempted) fetch, as recorded by the pipeline.
#[derive(Debug, Clone)]
pub struct FetchRecord {
    pub url: Url,
    pub status: Option<u16>,
    pub classification: &'static str,
    pub bytes: u64,
    pub fetched_at: u64,
}

/// An upserted article: the store's record of a page classified as an
/// article.
#[derive(Debug, Clone, PartialEq)]
pub struct ArticleRecord {
    pub url: Url,
    pub html: String,
    pub discovered_at: u64,
}

/// A `(from, to)` link edge discovered during extraction.
#[derive(Debug, Clone)]
pub struct LinkEdge {
    pub from: Url,
    pub to: Url,
}

/// A queue lifecycle event (`enqueue`/`dequeue`/`drop`/`retry`/`defer`).
#[derive(Debug, Clone)]
pub struct QueueEvent {
    pub url: Url,
    pub action: &'static str,
    pub reason: Option<String>,
    pub kind: WorkKind,
}

/// A recurring condition, counted by `(kind, scope, target)`.
#[derive(Debug, Clone)]
pub struct Problem {
    pub kind: &'static str,
    pub scope: String,
    pub target: String,
}

/// A once-per-kind structured event marking a crawl-level achievement.
#[derive(Debug, Clone)]
pub struct Milestone {
    pub kind: String,
    pub details: serde_json::Value,
}

/// The persistence contract the crawler core depends on. Implementations
/// own however they actually store urls, http-responses, content, link
/// edges, queue-events, problems, milestones, and learned patterns; the
/// core sees only this interface.
#[async_trait]
pub trait Store: Send + Sync {
    async fn get_cache_entry(&self, url: &Url) -> Option<CacheEntry>;
    async fn insert_fetch(&self, record: FetchRecord) -> Result<()>;
    async fn upsert_article(&self, article: ArticleRecord) -> Result<()>;
    async fn insert_link(&self, edge: LinkEdge) -> Result<()>;
    async fn get_article_by_url(&self, url: &Url) -> Option<ArticleRecord>;
    async fn insert_queue_event(&self, event: QueueEvent) -> Result<()>;
    async fn insert_problem(&self, problem: Problem) -> Result<()>;
    async fn insert_milestone(&self, milestone: Milestone) -> Result<()>;
}

/// Bridges a `Store`'s cache table to the frontier's `CacheLookup` seam, so
/// a blackout can be force-served from whatever the store already has.
pub struct StoreCacheLookup {
    store: std::sync::Arc<dyn Store>,
}

impl StoreCacheLookup {
    #[must_use]
    pub fn new(store: std::sync::Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl crate::frontier::CacheLookup for StoreCacheLookup {
    async fn has_fresh_or_any_entry(&self, url: &Url) -> bool {
        self.store.get_cache_entry(url).await.is_some()
    }
}

/// An in-memory `Store` used by tests and as a reference implementation.
/// Not a real persistence backend (out of scope per the non-goals), only a
/// test double with the same shape.
#[derive(Default)]
pub struct InMemoryStore {
    cache: Mutex<std::collections::HashMap<Url, CacheEntry>>,
    articles: Mutex<std::collections::HashMap<Url, ArticleRecord>>,
    fetches: Mutex<Vec<FetchRecord>>,
    links: Mutex<Vec<LinkEdge>>,
    queue_events: Mutex<Vec<QueueEvent>>,
    problems: Mutex<Vec<Problem>>,
    milestones: Mutex<Vec<Milestone>>,
}

impl InMemoryStore {
    pub fn seed_cache(&self, url: Url, entry: CacheEntry) {
        self.cache.lock().unwrap().insert(url, entry);
    }

    #[must_use]
    pub fn milestone_count(&self) -> usize {
        self.milestones.lock().unwrap().len()
    }

    #[must_use]
    pub fn problems(&self) -> Vec<Problem> {
        self.problems.lock().unwrap().clone()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn get_cache_entry(&self, url: &Url) -> Option<CacheEntry> {
        self.cache.lock().unwrap().get(url).cloned()
    }

    async fn insert_fetch(&self, record: FetchRecord) -> Result<()> {
        self.fetches.lock().unwrap().push(record);
        Ok(())
    }

    async fn upsert_article(&self, article: ArticleRecord) -> Result<()> {
        self.articles
            .lock()
            .unwrap()
            .insert(article.url.clone(), article);
        Ok(())
    }

    async fn insert_link(&self, edge: LinkEdge) -> Result<()> {
        self.links.lock().unwrap().push(edge);
        Ok(())
    }

    async fn get_article_by_url(&self, url: &Url) -> Option<ArticleRecord> {
        self.articles.lock().unwrap().get(url).cloned()
    }

    async fn insert_queue_event(&self, event: QueueEvent) -> Result<()> {
        self.queue_events.lock().unwrap().push(event);
        Ok(())
    }

    async fn insert_problem(&self, problem: Problem) -> Result<()> {
        self.problems.lock().unwrap().push(problem);
        Ok(())
    }

    async fn insert_milestone(&self, milestone: Milestone) -> Result<()> {
        self.milestones.lock().unwrap().push(milestone);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_store_round_trips_a_cache_entry() {
        let store = InMemoryStore::default();
        let url = Url::parse("https://news.example.com/a").unwrap();
        store.seed_cache(
            url.clone(),
            CacheEntry {
                html: "<html></html>".into(),
                crawled_at: 0,
                source: crate::cache::CacheSource::Db,
                etag: None,
                last_modified: None,
            },
        );
        assert!(store.get_cache_entry(&url).await.is_some());
    }

    #[tokio::test]
    async fn milestones_and_problems_accumulate() {
        let store = InMemoryStore::default();
        store
            .insert_milestone(Milestone {
                kind: "intelligent-completion".into(),
                details: serde_json::json!({}),
            })
            .await
            .unwrap();
        assert_eq!(store.milestone_count(), 1);
    }
}

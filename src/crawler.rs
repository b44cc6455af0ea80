//! The composition root: a thin object that constructs the components of
//! the system and owns their lifecycle, rather than a deep call-chain of
//! member functions on one monolithic crawler object.

use std::sync::Arc;

use log::{info, warn};
use url::Url;

use crate::cache::FreshnessPolicy;
use crate::clock::{Clock, SharedClock, SystemClock};
use crate::config::{CrawlConfig, CrawlType};
use crate::error::{ErrorKind, Result};
use crate::frontier::{PriorityFrontier, SharedFrontier, WorkItem, WorkKind};
use crate::http_client::{HttpClient, HttpClientConfig};
use crate::limiter::{HostLimiter, LimiterConfig};
use crate::outcome::{CrawlOutcome, CrawlSummary, ProblemSample};
use crate::pipeline::{FetchPipeline, PipelineConfig};
use crate::planner::{NoopPlanner, PlannerSeeder, SeedRequest};
use crate::policy::{PolicyConfig, UrlPolicy};
use crate::problems::{ConnectionResetGuard, ProblemTracker};
use crate::robots::RobotsRuleset;
use crate::sitemap::SitemapReader;
use crate::stats::Stats;
use crate::store::{Milestone, Store};
use crate::telemetry::{NullSink, TelemetryEvent, TelemetrySink};
use crate::workers::{WorkerControl, WorkerPool, WorkerPoolConfig};

/// Ties the frontier, limiter, cache, pipeline, worker pool, planner,
/// telemetry, and store together. The crawler itself owns no business
/// logic beyond wiring these up and driving the run to completion.
pub struct Crawler {
    config: CrawlConfig,
    store: Arc<dyn Store>,
    telemetry: Arc<dyn TelemetrySink>,
    planner: Arc<dyn PlannerSeeder>,
    clock: SharedClock,
    frontier: SharedFrontier,
    control: WorkerControl,
    stats: Arc<Stats>,
    problems: Arc<ProblemTracker>,
    fatal_during_init: bool,
}

impl Crawler {
    #[must_use]
    pub fn new(config: CrawlConfig, store: Arc<dyn Store>) -> Self {
        Self::with_collaborators(config, store, Arc::new(NullSink), Arc::new(NoopPlanner))
    }

    #[must_use]
    pub fn with_collaborators(
        config: CrawlConfig,
        store: Arc<dyn Store>,
        telemetry: Arc<dyn TelemetrySink>,
        planner: Arc<dyn PlannerSeeder>,
    ) -> Self {
        let frontier = Arc::new(PriorityFrontier::new(config.max_queue));
        Self {
            config,
            store,
            telemetry,
            planner,
            clock: Arc::new(SystemClock::new()),
            frontier,
            control: WorkerControl::new(),
            stats: Arc::new(Stats::default()),
            problems: Arc::new(ProblemTracker::new()),
            fatal_during_init: false,
        }
    }

    /// Idempotent: stops the frontier from accepting new work and every
    /// worker from starting a new item.
    pub fn request_abort(&self) {
        self.control.request_abort();
    }

    pub fn pause(&self) {
        self.control.pause();
    }

    pub fn resume(&self) {
        self.control.resume();
    }

    /// Run the crawl to completion: seed the frontier (robots, sitemap,
    /// planner), start the worker pool, and wait for every worker to exit.
    pub async fn crawl(&mut self) -> Result<CrawlSummary> {
        let freshness = FreshnessPolicy {
            max_age_ms: self.config.max_age.as_millis() as u64,
            max_age_article_ms: self.config.max_age_article.map(|d| d.as_millis() as u64),
            max_age_hub_ms: self.config.max_age_hub.map(|d| d.as_millis() as u64),
            prefer_cache: self.config.prefer_cache,
        };

        let http_config = HttpClientConfig::builder()
            .request_timeout(std::time::Duration::from_millis(self.config.request_timeout_ms))
            .build();
        let client = match HttpClient::new(&http_config) {
            Ok(c) => Arc::new(c),
            Err(e) => {
                self.fatal_during_init = true;
                return Err(e);
            }
        };

        let robots = self.load_robots(&client).await;
        let policy = Arc::new(UrlPolicy::new(
            self.config
                .start_url
                .host_str()
                .unwrap_or_default()
                .to_string(),
            PolicyConfig {
                skip_query_urls: !self.config.allow_query_urls,
                allow_query_urls: self.config.allow_query_urls,
            },
            robots.clone(),
        ));

        self.frontier
            .set_structure_only(matches!(self.config.crawl_type, CrawlType::DiscoverStructure));

        let limiter_config = LimiterConfig {
            jitter_min_ms: self.config.pacer_jitter_min_ms,
            jitter_max_ms: self.config.pacer_jitter_max_ms,
        };
        let limiter = Arc::new(HostLimiter::new(limiter_config, self.clock.clone()));

        if self.config.sitemap_enabled {
            self.seed_from_sitemaps(&client, robots.as_ref()).await;
        }

        if !matches!(self.config.crawl_type, CrawlType::DiscoverStructure) || self.frontier.is_empty() {
            self.frontier.enqueue(WorkItem::new(
                self.config.start_url.clone(),
                0,
                WorkKind::HubSeed,
                self.clock.now_ms(),
            ));
        }

        let is_intelligent = matches!(self.config.crawl_type, CrawlType::Intelligent);
        let seed_summary = if is_intelligent {
            Some(self.run_planner().await?)
        } else {
            None
        };

        let pipeline_config = PipelineConfig {
            rate_limit_ms: self.config.rate_limit_ms,
            max_downloads: self.config.max_downloads,
            max_depth: self.config.max_depth,
            freshness,
        };

        let reset_guard = Arc::new(ConnectionResetGuard::new(
            self.config.connection_reset_threshold,
            self.config.connection_reset_window_ms,
        ));

        let pipeline = Arc::new(FetchPipeline::new(
            policy,
            limiter,
            client,
            self.frontier.clone(),
            self.store.clone(),
            self.clock.clone(),
            pipeline_config,
            self.problems.clone(),
            reset_guard,
            self.control.clone(),
            self.telemetry.clone(),
        ));

        let cache_lookup: Arc<dyn crate::frontier::CacheLookup> =
            Arc::new(crate::store::StoreCacheLookup::new(self.store.clone()));

        let pool = WorkerPool::new(
            self.frontier.clone(),
            pipeline,
            self.stats.clone(),
            self.clock.clone(),
            self.telemetry.clone(),
            self.control.clone(),
            WorkerPoolConfig {
                concurrency: self.config.concurrency.max(1),
                retry_limit: self.config.retry_limit,
                backoff_base_ms: self.config.backoff_base_ms,
                backoff_max_ms: self.config.backoff_max_ms,
                max_downloads: self.config.max_downloads,
            },
            cache_lookup,
        );

        pool.run().await;

        let snapshot = self.stats.snapshot();
        let outcome = CrawlOutcome::determine(self.fatal_during_init, &snapshot);
        let problems: Vec<ProblemSample> = self.problems.samples();

        if is_intelligent {
            let mut seed_summary = seed_summary.unwrap_or_default();
            seed_summary.visited = self.planner.seeded_visited_count().await;

            let expected = seed_summary.requested;
            let seeded = seed_summary.unique;
            let visited = seed_summary.visited;
            #[allow(clippy::cast_precision_loss)]
            let pct = |n: usize| {
                if expected == 0 {
                    0.0
                } else {
                    (n as f64 / expected as f64) * 100.0
                }
            };
            let coverage = serde_json::json!({
                "expected": expected,
                "seeded": seeded,
                "visited": visited,
                "coveragePct": pct(seeded),
                "visitedCoveragePct": pct(visited),
            });

            let details = serde_json::json!({
                "stats": snapshot,
                "seededHubs": seed_summary,
                "coverage": coverage,
                "problems": problems,
            });
            let milestone = Milestone {
                kind: "intelligent-completion".to_string(),
                details,
            };
            let _ = self.store.insert_milestone(milestone.clone()).await;
            self.telemetry.emit(TelemetryEvent::Milestone {
                kind: milestone.kind,
                details: milestone.details,
            });
        }

        if outcome == CrawlOutcome::CrawlFatal {
            return Err(ErrorKind::StoreUnavailable(
                "fatal issue recorded during initialisation".to_string(),
            ));
        }

        Ok(CrawlSummary {
            outcome,
            stats: snapshot,
            problems,
        })
    }

    async fn load_robots(&mut self, client: &HttpClient) -> Option<RobotsRuleset> {
        match RobotsRuleset::load(client, &self.config.start_url).await {
            Ok(r) => Some(r),
            Err(e) => {
                crate::robots::log_robots_failure(&self.config.start_url, &e);
                None
            }
        }
    }

    async fn seed_from_sitemaps(&mut self, client: &HttpClient, robots: Option<&RobotsRuleset>) {
        let host = self
            .config
            .start_url
            .host_str()
            .unwrap_or_default()
            .to_string();
        let reader = SitemapReader::new(client, host, self.config.sitemap_max_urls);

        let declared: Vec<Url> = robots
            .map(|r| {
                r.sitemaps
                    .iter()
                    .filter_map(|s| Url::parse(s).ok())
                    .collect()
            })
            .unwrap_or_default();

        let candidates = if declared.is_empty() {
            let default_sitemap = self
                .config
                .start_url
                .join("/sitemap.xml")
                .ok()
                .into_iter()
                .collect::<Vec<_>>();
            default_sitemap
        } else {
            declared
        };

        for sitemap_url in candidates {
            match reader.read(&sitemap_url).await {
                Ok(urls) => {
                    let now = self.clock.now_ms();
                    for u in urls {
                        self.frontier
                            .enqueue(WorkItem::new(u, 0, WorkKind::HubSeed, now));
                    }
                }
                Err(e) => {
                    warn!("sitemap discovery skipped for {sitemap_url}: {e}");
                }
            }
        }
    }

    async fn run_planner(&mut self) -> Result<crate::planner::SeedPlanSummary> {
        let host = self
            .config
            .start_url
            .host_str()
            .unwrap_or_default()
            .to_string();

        let should_plan = self
            .planner
            .bootstrap(&host, &self.config.int_target_hosts)
            .await?;
        if !should_plan {
            return Ok(crate::planner::SeedPlanSummary::default());
        }

        let section_slugs = self.planner.infer_patterns(&self.config.start_url).await?;
        let country_candidates = self.planner.country_candidates(&host).await?;
        let sections_from_patterns = section_slugs.len();
        let country_count = country_candidates.len();

        let summary = self
            .planner
            .seed_hubs(SeedRequest {
                section_slugs,
                country_candidates,
                max_seeds: self.config.int_max_seeds,
            })
            .await?;

        info!(
            "planner seeded {} hubs ({} from patterns, {} country candidates)",
            summary.unique, sections_from_patterns, country_count
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;

    #[tokio::test]
    async fn discover_structure_rejects_article_enqueues() {
        let frontier = PriorityFrontier::new(100);
        frontier.set_structure_only(true);

        let article = WorkItem::new(
            Url::parse("https://news.example.com/2024/01/a").unwrap(),
            1,
            WorkKind::Article,
            0,
        );
        assert!(!frontier.enqueue(article));

        let nav = WorkItem::new(
            Url::parse("https://news.example.com/section/world").unwrap(),
            1,
            WorkKind::Nav,
            0,
        );
        assert!(frontier.enqueue(nav));
    }

    #[tokio::test]
    async fn fatal_store_init_yields_crawl_fatal_outcome() {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::default());
        let config = CrawlConfig::builder()
            .start_url(Url::parse("https://news.example.com/").unwrap())
            .concurrency(1)
            .build();
        let mut crawler = Crawler::new(config, store);
        crawler.fatal_during_init = true;
        let snapshot = crawler.stats.snapshot();
        assert_eq!(
            CrawlOutcome::determine(crawler.fatal_during_init, &snapshot),
            CrawlOutcome::CrawlFatal
        );
    }
}

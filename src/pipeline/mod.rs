//! Single-URL orchestration: policy gate → downloads cap → cache gateway →
//! limiter acquire → global spacing → HTTP GET → classify → visit
//! bookkeeping → discovery.

pub mod classify;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashSet;
use log::{debug, warn};
use url::Url;

use crate::cache::{self, FreshnessPolicy, UrlClass};
use crate::clock::SharedClock;
use crate::frontier::{SharedFrontier, WorkItem, WorkKind};
use crate::http_client::HttpClient;
use crate::limiter::{parse_retry_after_ms, HostKey, HostLimiter};
use crate::pipeline::classify::{classify as classify_page, compute_signals, extract_outlinks, Classification};
use crate::policy::{Phase, UrlPolicy};
use crate::problems::{ConnectionResetGuard, ProblemTracker};
use crate::stats::Stats;
use crate::store::Store;
use crate::telemetry::{TelemetryEvent, TelemetrySink};
use crate::workers::WorkerControl;

/// Tunables that affect only the fetch pipeline (as opposed to the limiter
/// or frontier).
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Minimum spacing between *any* two outbound requests, regardless of
    /// host. `0` disables global spacing.
    pub rate_limit_ms: u64,
    /// `None` = unlimited.
    pub max_downloads: Option<u64>,
    pub max_depth: u32,
    pub freshness: FreshnessPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            rate_limit_ms: 0,
            max_downloads: None,
            max_depth: 8,
            freshness: FreshnessPolicy::default(),
        }
    }
}

/// The result of processing a single `WorkItem`.
#[derive(Debug)]
pub enum FetchOutcome {
    Skipped {
        reason: &'static str,
    },
    Cache {
        classification: Classification,
    },
    Success {
        classification: Classification,
        ttfb_ms: u64,
        download_ms: u64,
        total_ms: u64,
        bytes: u64,
        kbps: Option<f64>,
    },
    NotModified,
    Retriable {
        retry_after_ms: Option<u64>,
    },
    Permanent,
}

impl FetchOutcome {
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        matches!(self, FetchOutcome::Retriable { .. })
    }
}

/// Orchestrates a single `WorkItem` through policy, cache, limiter, HTTP,
/// classification, and discovery.
pub struct FetchPipeline {
    pub policy: Arc<UrlPolicy>,
    pub limiter: Arc<HostLimiter>,
    pub client: Arc<HttpClient>,
    pub frontier: SharedFrontier,
    pub store: Arc<dyn Store>,
    pub clock: SharedClock,
    pub config: PipelineConfig,
    pub problems: Arc<ProblemTracker>,
    pub reset_guard: Arc<ConnectionResetGuard>,
    pub control: WorkerControl,
    pub telemetry: Arc<dyn TelemetrySink>,
    cache_priority_hit_hosts: DashSet<HostKey>,
    last_request_at: AtomicU64,
}

impl FetchPipeline {
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        policy: Arc<UrlPolicy>,
        limiter: Arc<HostLimiter>,
        client: Arc<HttpClient>,
        frontier: SharedFrontier,
        store: Arc<dyn Store>,
        clock: SharedClock,
        config: PipelineConfig,
        problems: Arc<ProblemTracker>,
        reset_guard: Arc<ConnectionResetGuard>,
        control: WorkerControl,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Self {
        Self {
            policy,
            limiter,
            client,
            frontier,
            store,
            clock,
            config,
            problems,
            reset_guard,
            control,
            telemetry,
            cache_priority_hit_hosts: DashSet::new(),
            last_request_at: AtomicU64::new(0),
        }
    }

    pub async fn process(&self, item: &WorkItem, stats: &Stats) -> FetchOutcome {
        // 1. Policy gate.
        let decision = self.policy.decide(item.url.as_str(), Phase::Discovery);
        if !decision.allow {
            debug!("dropping {} ({})", item.url, decision.reason.unwrap_or("policy"));
            return FetchOutcome::Skipped {
                reason: decision.reason.unwrap_or("policy"),
            };
        }
        if !self.policy.is_on_domain(&item.url) || !self.policy.is_allowed(&item.url) {
            return FetchOutcome::Skipped { reason: "policy" };
        }

        // 2. Downloads cap.
        if let Some(max) = self.config.max_downloads {
            if max > 0 && stats.pages_downloaded_count() >= max {
                return FetchOutcome::Skipped { reason: "downloads-cap" };
            }
        }

        let host = match HostKey::try_from(&item.url) {
            Ok(h) => h,
            Err(_) => return FetchOutcome::Skipped { reason: "invalid-host" },
        };

        // 3. Cache gateway.
        let class = url_class(item.kind);
        let cached = self.store.get_cache_entry(&item.url).await;
        let host_in_blackout = self.limiter.in_blackout(&host).await
            || item.context.is_some_and(|c| c.force_cache);
        let now = self.clock.now_ms();
        let decision = cache::should_use_cache(
            &self.config.freshness,
            class,
            now,
            cached.as_ref(),
            host_in_blackout,
        );

        if decision.use_cache {
            if decision.forced {
                stats.inc_cache_rate_limited_served();
                if self.cache_priority_hit_hosts.insert(host.clone()) {
                    self.telemetry.emit(TelemetryEvent::Milestone {
                        kind: "cache-priority-hit".to_string(),
                        details: serde_json::json!({ "host": host.as_str() }),
                    });
                }
            }
            self.frontier.mark_visited(item.url.clone());
            stats.inc_pages_visited();
            let classification = if class == UrlClass::Article {
                Classification::Article
            } else {
                Classification::Other
            };
            return FetchOutcome::Cache { classification };
        }

        // 4. Limiter acquire.
        self.limiter.acquire(&host).await;

        // 5. Global spacing.
        if self.config.rate_limit_ms > 0 {
            let now = self.clock.now_ms();
            let last = self.last_request_at.load(Ordering::SeqCst);
            let eligible_at = last + self.config.rate_limit_ms;
            if eligible_at > now {
                tokio::time::sleep(std::time::Duration::from_millis(eligible_at - now)).await;
            }
        }
        self.last_request_at.store(self.clock.now_ms(), Ordering::SeqCst);

        // 6. HTTP GET.
        let request_start = self.clock.now_ms();
        let response = self
            .client
            .get_conditional(
                item.url.clone(),
                cached.as_ref().and_then(|c| c.etag.as_deref()),
                cached.as_ref().and_then(|c| c.last_modified.as_deref()),
            )
            .await;

        let response = match response {
            Ok(r) => r,
            Err(e) => {
                warn!("network error fetching {}: {e}", item.url);
                if is_connection_reset(&e) {
                    self.problems.record("connection-reset", "host", host.as_str());
                    let _ = self
                        .store
                        .insert_problem(crate::store::Problem {
                            kind: "connection-reset",
                            scope: "host".to_string(),
                            target: host.to_string(),
                        })
                        .await;
                    if self.reset_guard.record_and_check(&host, self.clock.now_ms()) {
                        warn!("connection-reset threshold tripped for {host}, requesting abort");
                        self.control.request_abort();
                    }
                }
                return FetchOutcome::Retriable { retry_after_ms: None };
            }
        };

        let headers_ready_at = self.clock.now_ms();
        let ttfb_ms = headers_ready_at.saturating_sub(request_start);

        // 7. Classify response.
        match response.status().as_u16() {
            304 => {
                stats.inc_pages_visited();
                self.frontier.mark_visited(item.url.clone());
                FetchOutcome::NotModified
            }
            429 => {
                let retry_after_ms = response
                    .headers()
                    .get(reqwest::header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| parse_retry_after_ms(v, self.clock.now_ms()));
                self.limiter.note_429(&host, retry_after_ms).await;
                FetchOutcome::Retriable { retry_after_ms }
            }
            200..=299 => {
                let bytes = match response.bytes().await {
                    Ok(b) => b,
                    Err(_) => return FetchOutcome::Retriable { retry_after_ms: None },
                };
                self.limiter.note_success(&host).await;
                let body_ready_at = self.clock.now_ms();
                let download_ms = body_ready_at.saturating_sub(headers_ready_at);
                let total_ms = body_ready_at.saturating_sub(request_start);
                let byte_len = bytes.len() as u64;
                let kbps = if download_ms > 0 {
                    Some((byte_len as f64 / 1024.0) / (download_ms as f64 / 1000.0))
                } else {
                    None
                };

                let body = String::from_utf8_lossy(&bytes).into_owned();
                let signals = compute_signals(&body);
                let classification = classify_page(&item.url, &signals);
                let outlinks = extract_outlinks(&body, &item.url);

                // 8. Visit bookkeeping.
                self.frontier.mark_visited(item.url.clone());
                stats.inc_pages_visited();
                stats.inc_pages_downloaded();
                stats.add_bytes_downloaded(byte_len);
                if classification == Classification::Article {
                    stats.inc_articles_found();
                }

                // 9. Discovery.
                let discovered_at = self.clock.now_ms();
                if item.depth < self.config.max_depth {
                    for link in outlinks.article_links.iter().chain(&outlinks.navigation_links) {
                        if self.frontier.is_visited(link) || self.frontier.is_queued(link) {
                            continue;
                        }
                        let decision = self.policy.decide(link.as_str(), Phase::Discovery);
                        if !decision.allow || !self.policy.is_on_domain(link) || !self.policy.is_allowed(link) {
                            continue;
                        }
                        let kind = if outlinks.article_links.contains(link) {
                            WorkKind::Article
                        } else {
                            WorkKind::Nav
                        };
                        self.frontier
                            .enqueue(WorkItem::new(link.clone(), item.depth + 1, kind, discovered_at));
                    }
                }

                FetchOutcome::Success {
                    classification,
                    ttfb_ms,
                    download_ms,
                    total_ms,
                    bytes: byte_len,
                    kbps,
                }
            }
            500..=599 => FetchOutcome::Retriable { retry_after_ms: None },
            _ => FetchOutcome::Permanent,
        }
    }
}

/// Walks the error's source chain looking for a connection-reset or
/// connection-aborted `io::Error`, the way a dropped keep-alive connection
/// or a mid-response server hangup surfaces through reqwest/hyper.
fn is_connection_reset(err: &reqwest::Error) -> bool {
    let mut source = (err as &dyn std::error::Error).source();
    while let Some(cause) = source {
        if let Some(io_err) = cause.downcast_ref::<std::io::Error>() {
            if matches!(
                io_err.kind(),
                std::io::ErrorKind::ConnectionReset | std::io::ErrorKind::ConnectionAborted
            ) {
                return true;
            }
        }
        source = cause.source();
    }
    false
}

fn url_class(kind: WorkKind) -> UrlClass {
    match kind {
        WorkKind::Article => UrlClass::Article,
        WorkKind::HubSeed | WorkKind::Nav => UrlClass::Hub,
        WorkKind::History | WorkKind::Refresh => UrlClass::Other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::TestClock;
    use crate::frontier::PriorityFrontier;
    use crate::http_client::HttpClientConfig;
    use crate::limiter::LimiterConfig;
    use crate::store::InMemoryStore;

    fn pipeline(max_downloads: Option<u64>) -> FetchPipeline {
        let clock: SharedClock = Arc::new(TestClock::new());
        let policy = Arc::new(UrlPolicy::new(
            "news.example.com".into(),
            crate::policy::PolicyConfig::default(),
            None,
        ));
        let limiter = Arc::new(HostLimiter::new(LimiterConfig::default(), clock.clone()));
        let client = Arc::new(HttpClient::new(&HttpClientConfig::default()).unwrap());
        let frontier = Arc::new(PriorityFrontier::new(1000));
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::default());
        let config = PipelineConfig {
            max_downloads,
            ..Default::default()
        };
        FetchPipeline::new(
            policy,
            limiter,
            client,
            frontier,
            store,
            clock,
            config,
            Arc::new(crate::problems::ProblemTracker::new()),
            Arc::new(crate::problems::ConnectionResetGuard::new(3, 120_000)),
            crate::workers::WorkerControl::new(),
            Arc::new(crate::telemetry::NullSink),
        )
    }

    #[tokio::test]
    async fn downloads_cap_skips_without_network() {
        let p = pipeline(Some(1));
        let stats = Stats::default();
        stats.inc_pages_downloaded();
        let item = WorkItem::new(
            Url::parse("https://news.example.com/2024/01/a").unwrap(),
            0,
            WorkKind::Article,
            0,
        );
        match p.process(&item, &stats).await {
            FetchOutcome::Skipped { reason } => assert_eq!(reason, "downloads-cap"),
            other => panic!("expected skip, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn off_domain_url_is_skipped() {
        let p = pipeline(None);
        let stats = Stats::default();
        let item = WorkItem::new(
            Url::parse("https://other.example.com/a").unwrap(),
            0,
            WorkKind::Article,
            0,
        );
        match p.process(&item, &stats).await {
            FetchOutcome::Skipped { reason } => assert_eq!(reason, "policy"),
            other => panic!("expected skip, got {other:?}"),
        }
    }
}

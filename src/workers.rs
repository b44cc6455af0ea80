//! N cooperative workers sharing one frontier; pause/abort; idle-drain
//! termination.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};
use rand::Rng;

use crate::clock::SharedClock;
use crate::frontier::{CacheLookup, Pulled, SharedFrontier};
use crate::pipeline::FetchPipeline;
use crate::stats::Stats;
use crate::telemetry::{TelemetryEvent, TelemetrySink};

/// A quiet window with no busy workers and an empty frontier, after which
/// a worker concludes there is no more work coming.
const IDLE_DRAIN_MS: u64 = 1_000;
/// Upper bound on how long a worker sleeps between `pullNext` probes.
const MAX_PROBE_SLEEP_MS: u64 = 1_000;
/// How often a paused worker polls the pause gate.
const PAUSE_POLL_MS: u64 = 200;

/// Shared lifecycle flags every worker polls between steps.
#[derive(Debug, Clone, Default)]
pub struct WorkerControl {
    abort: Arc<AtomicBool>,
    paused: Arc<AtomicBool>,
}

impl WorkerControl {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent: flips the abort flag. The frontier itself is not
    /// cleared here — the pool drains workers, which is sufficient since
    /// no new work starts once `is_aborted()` is observed.
    pub fn request_abort(&self) {
        self.abort.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.abort.load(Ordering::SeqCst)
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }
}

/// Runtime tunables for the worker pool's retry scheduling.
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    pub concurrency: usize,
    pub retry_limit: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    pub max_downloads: Option<u64>,
}

/// N cooperative workers driving a shared frontier through a shared
/// pipeline.
pub struct WorkerPool {
    frontier: SharedFrontier,
    pipeline: Arc<FetchPipeline>,
    stats: Arc<Stats>,
    clock: SharedClock,
    telemetry: Arc<dyn TelemetrySink>,
    control: WorkerControl,
    config: WorkerPoolConfig,
    cache_lookup: Arc<dyn CacheLookup>,
    busy_workers: Arc<AtomicUsize>,
    last_activity_at: Arc<AtomicU64>,
}

impl WorkerPool {
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        frontier: SharedFrontier,
        pipeline: Arc<FetchPipeline>,
        stats: Arc<Stats>,
        clock: SharedClock,
        telemetry: Arc<dyn TelemetrySink>,
        control: WorkerControl,
        config: WorkerPoolConfig,
        cache_lookup: Arc<dyn CacheLookup>,
    ) -> Self {
        let last_activity_at = Arc::new(AtomicU64::new(clock.now_ms()));
        Self {
            frontier,
            pipeline,
            stats,
            clock,
            telemetry,
            control,
            config,
            cache_lookup,
            busy_workers: Arc::new(AtomicUsize::new(0)),
            last_activity_at,
        }
    }

    #[must_use]
    pub fn control(&self) -> WorkerControl {
        self.control.clone()
    }

    /// Runs `concurrency` workers to completion (abort, idle-drain, or
    /// downloads cap reached by every worker).
    pub async fn run(&self) {
        let mut handles = Vec::with_capacity(self.config.concurrency);
        for id in 0..self.config.concurrency {
            let worker = Worker {
                id,
                frontier: self.frontier.clone(),
                pipeline: self.pipeline.clone(),
                stats: self.stats.clone(),
                clock: self.clock.clone(),
                telemetry: self.telemetry.clone(),
                control: self.control.clone(),
                config: self.config.clone(),
                cache_lookup: self.cache_lookup.clone(),
                busy_workers: self.busy_workers.clone(),
                last_activity_at: self.last_activity_at.clone(),
            };
            handles.push(tokio::spawn(worker.run()));
        }
        for handle in handles {
            let _ = handle.await;
        }
        info!("all workers exited");
    }
}

struct Worker {
    id: usize,
    frontier: SharedFrontier,
    pipeline: Arc<FetchPipeline>,
    stats: Arc<Stats>,
    clock: SharedClock,
    telemetry: Arc<dyn TelemetrySink>,
    control: WorkerControl,
    config: WorkerPoolConfig,
    cache_lookup: Arc<dyn CacheLookup>,
    busy_workers: Arc<AtomicUsize>,
    last_activity_at: Arc<AtomicU64>,
}

impl Worker {
    async fn run(self) {
        loop {
            if self.control.is_aborted() {
                debug!("worker {} exiting: abort requested", self.id);
                return;
            }

            while self.control.is_paused() {
                self.telemetry.emit(TelemetryEvent::Progress {
                    stats: self.stats.snapshot(),
                });
                tokio::time::sleep(Duration::from_millis(PAUSE_POLL_MS)).await;
                if self.control.is_aborted() {
                    return;
                }
            }

            if self.config.max_downloads.is_some_and(|max| {
                max > 0 && self.stats.pages_downloaded_count() >= max
            }) {
                debug!("worker {} exiting: downloads cap reached", self.id);
                return;
            }

            let now = self.clock.now_ms();
            match self
                .frontier
                .pull_next(now, &self.pipeline.limiter, self.cache_lookup.as_ref(), &self.stats)
                .await
            {
                Pulled::Empty => {
                    if self.busy_workers.load(Ordering::SeqCst) == 0 {
                        let idle_for = now.saturating_sub(self.last_activity_at.load(Ordering::SeqCst));
                        if idle_for >= IDLE_DRAIN_MS {
                            debug!("worker {} exiting: idle-drain window elapsed", self.id);
                            return;
                        }
                    }
                    tokio::time::sleep(Duration::from_millis(200)).await;
                }
                Pulled::WakeAt(wake_at) => {
                    let wait = wake_at.saturating_sub(now).min(MAX_PROBE_SLEEP_MS);
                    tokio::time::sleep(Duration::from_millis(wait)).await;
                }
                Pulled::Item(mut item) => {
                    self.busy_workers.fetch_add(1, Ordering::SeqCst);
                    self.last_activity_at
                        .store(self.clock.now_ms(), Ordering::SeqCst);

                    let outcome = self.pipeline.process(&item, &self.stats).await;

                    self.busy_workers.fetch_sub(1, Ordering::SeqCst);
                    self.last_activity_at
                        .store(self.clock.now_ms(), Ordering::SeqCst);

                    if outcome.is_retriable() {
                        if item.retries < self.config.retry_limit {
                            item.retries += 1;
                            let retry_after_ms = match &outcome {
                                crate::pipeline::FetchOutcome::Retriable { retry_after_ms } => {
                                    *retry_after_ms
                                }
                                _ => None,
                            };
                            let exp = self
                                .config
                                .backoff_base_ms
                                .saturating_mul(1u64 << item.retries.min(20))
                                .min(self.config.backoff_max_ms);
                            let base_delay = retry_after_ms.unwrap_or(exp);
                            item.next_eligible_at = self.clock.now_ms() + jitter(base_delay);
                            self.frontier.reinsert(item);
                        } else {
                            self.stats.inc_errors();
                            self.telemetry.emit(TelemetryEvent::Error {
                                kind: "retries-exhausted".to_string(),
                                target: item.url.to_string(),
                                message: "retry limit reached".to_string(),
                            });
                        }
                    } else if matches!(outcome, crate::pipeline::FetchOutcome::Permanent) {
                        self.stats.inc_errors();
                        self.telemetry.emit(TelemetryEvent::Error {
                            kind: "permanent".to_string(),
                            target: item.url.to_string(),
                            message: "non-retriable status code".to_string(),
                        });
                    }
                }
            }
        }
    }
}

fn jitter(base_ms: u64) -> u64 {
    if base_ms == 0 {
        return 0;
    }
    let span = base_ms / 10;
    if span == 0 {
        return base_ms;
    }
    base_ms + rand::rng().random_range(0..=span) - span / 2
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::FreshnessPolicy;
    use crate::clock::TestClock;
    use crate::frontier::{NoCache, PriorityFrontier, WorkItem, WorkKind};
    use crate::http_client::{HttpClient, HttpClientConfig};
    use crate::limiter::{HostLimiter, LimiterConfig};
    use crate::pipeline::PipelineConfig;
    use crate::policy::{PolicyConfig, UrlPolicy};
    use crate::store::InMemoryStore;
    use crate::telemetry::NullSink;
    use url::Url;

    #[tokio::test]
    async fn pool_drains_and_exits_when_frontier_is_empty() {
        let clock: SharedClock = Arc::new(TestClock::new());
        let frontier: SharedFrontier = Arc::new(PriorityFrontier::new(100));
        let policy = Arc::new(UrlPolicy::new(
            "news.example.com".into(),
            PolicyConfig::default(),
            None,
        ));
        let limiter = Arc::new(HostLimiter::new(LimiterConfig::default(), clock.clone()));
        let client = Arc::new(HttpClient::new(&HttpClientConfig::default()).unwrap());
        let store: Arc<dyn crate::store::Store> = Arc::new(InMemoryStore::default());
        let control = WorkerControl::new();
        let pipeline = Arc::new(FetchPipeline::new(
            policy,
            limiter,
            client,
            frontier.clone(),
            store,
            clock.clone(),
            PipelineConfig {
                freshness: FreshnessPolicy::default(),
                ..Default::default()
            },
            Arc::new(crate::problems::ProblemTracker::new()),
            Arc::new(crate::problems::ConnectionResetGuard::new(3, 120_000)),
            control.clone(),
            Arc::new(NullSink),
        ));
        let stats = Arc::new(Stats::default());
        let pool = WorkerPool::new(
            frontier,
            pipeline,
            stats,
            clock,
            Arc::new(NullSink),
            control,
            WorkerPoolConfig {
                concurrency: 2,
                retry_limit: 3,
                backoff_base_ms: 100,
                backoff_max_ms: 1_000,
                max_downloads: None,
            },
            Arc::new(NoCache),
        );
        tokio::time::timeout(Duration::from_secs(5), pool.run())
            .await
            .expect("pool should drain and exit");
    }

    #[tokio::test]
    async fn abort_flag_stops_workers_immediately() {
        let clock: SharedClock = Arc::new(TestClock::new());
        let frontier: SharedFrontier = Arc::new(PriorityFrontier::new(100));
        frontier.enqueue(WorkItem::new(
            Url::parse("https://news.example.com/2024/01/a").unwrap(),
            0,
            WorkKind::Article,
            0,
        ));
        let policy = Arc::new(UrlPolicy::new(
            "news.example.com".into(),
            PolicyConfig::default(),
            None,
        ));
        let limiter = Arc::new(HostLimiter::new(LimiterConfig::default(), clock.clone()));
        let client = Arc::new(HttpClient::new(&HttpClientConfig::default()).unwrap());
        let store: Arc<dyn crate::store::Store> = Arc::new(InMemoryStore::default());
        let control = WorkerControl::new();
        let pipeline = Arc::new(FetchPipeline::new(
            policy,
            limiter,
            client,
            frontier.clone(),
            store,
            clock.clone(),
            PipelineConfig::default(),
            Arc::new(crate::problems::ProblemTracker::new()),
            Arc::new(crate::problems::ConnectionResetGuard::new(3, 120_000)),
            control.clone(),
            Arc::new(NullSink),
        ));
        let stats = Arc::new(Stats::default());
        control.request_abort();
        let pool = WorkerPool::new(
            frontier,
            pipeline,
            stats,
            clock,
            Arc::new(NullSink),
            control,
            WorkerPoolConfig {
                concurrency: 1,
                retry_limit: 3,
                backoff_base_ms: 100,
                backoff_max_ms: 1_000,
                max_downloads: None,
            },
            Arc::new(NoCache),
        );
        tokio::time::timeout(Duration::from_secs(2), pool.run())
            .await
            .expect("aborted pool should exit immediately");
    }
}

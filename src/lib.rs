//! `newsroom-crawl-core` is a polite, cache-aware crawler engine for news
//! sites: a priority frontier, a per-host rate limiter that backs off and
//! ramps back up, a conditional-HTTP cache gateway, and a cooperative
//! worker pool sit behind a single [`Crawler`] composition root.
//!
//! "Hello world" example:
//!
//! ```no_run
//! use newsroom_crawl_core::{Crawler, CrawlConfig, InMemoryStore, Result};
//! use std::sync::Arc;
//! use url::Url;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = CrawlConfig::builder()
//!         .start_url(Url::parse("https://news.example.com/")?)
//!         .build();
//!     let store = Arc::new(InMemoryStore::default());
//!     let mut crawler = Crawler::new(config, store);
//!     let summary = crawler.crawl().await?;
//!     println!("{:?}", summary.outcome);
//!     Ok(())
//! }
//! ```
//!
//! The crawler depends only on the [`Store`] and [`TelemetrySink`]
//! interfaces for persistence and observability, and on [`PlannerSeeder`]
//! for hub/section/country seeding in `intelligent` mode — callers supply
//! their own implementations; [`InMemoryStore`] and [`NullSink`] exist for
//! tests and quick starts.
#![warn(clippy::all, clippy::pedantic)]
#![warn(
    absolute_paths_not_starting_with_crate,
    rustdoc::invalid_html_tags,
    missing_debug_implementations,
    semicolon_in_expressions_from_macros,
    unreachable_pub,
    variant_size_differences
)]
#![deny(anonymous_parameters, macro_use_extern_crate)]
#![allow(clippy::module_name_repetitions)]

/// Freshness windows and the forced-cache-during-blackout decision.
pub mod cache;
/// The injectable notion of "now" every timing-sensitive component uses.
pub mod clock;
/// Every tunable named in the CLI surface, typed with defaults.
pub mod config;
/// The composition root tying the frontier, limiter, pipeline, worker
/// pool, planner, telemetry, and store together.
pub mod crawler;
/// The crate's error taxonomy and its retriability rules.
pub mod error;
/// The priority frontier: a min-heap of pending work, deduplicated and
/// visited-tracked, host-blackout- and cache-aware on pull.
pub mod frontier;
/// A thin `reqwest` wrapper with conditional-GET support.
pub mod http_client;
/// The per-host rate limiter: blackout, probe, and ramp states.
pub mod limiter;
/// The crawl's completion outcome and final summary.
pub mod outcome;
/// External interface for hub/section/country URL seeding in
/// `intelligent` mode.
pub mod planner;
/// URL normalisation, on-domain checks, and query-argument policy.
pub mod policy;
/// Aggregated problem counters and the connection-reset guard.
pub mod problems;
/// Single-URL orchestration: policy gate through discovery.
pub mod pipeline;
/// `robots.txt` fetch, parsing, and allow/disallow checks.
pub mod robots;
/// Sitemap and sitemap-index discovery.
pub mod sitemap;
/// Atomic run-level counters and their point-in-time snapshot.
pub mod stats;
/// The persistence interface the core depends on, and an in-memory
/// reference implementation.
pub mod store;
/// Structured progress/queue/milestone/problem/cache/error events.
pub mod telemetry;
/// N cooperative workers sharing one frontier, with pause/abort and
/// idle-drain termination.
pub mod workers;

#[doc(inline)]
pub use crate::{
    cache::{CacheDecision, CacheEntry, CacheSource, FreshnessPolicy, UrlClass},
    clock::{Clock, SharedClock, SystemClock, TestClock},
    config::{CrawlConfig, CrawlType},
    crawler::Crawler,
    error::{ErrorKind, Result},
    frontier::{PriorityFrontier, SharedFrontier, WorkItem, WorkKind},
    outcome::{CrawlOutcome, CrawlSummary, ProblemSample},
    planner::{NoopPlanner, PlannerSeeder, SeedPlanSummary, SeedRequest},
    policy::{PolicyConfig, UrlPolicy},
    problems::{ConnectionResetGuard, ProblemTracker},
    stats::{Stats, StatsSnapshot},
    store::{InMemoryStore, Store},
    telemetry::{ChannelSink, NullSink, TelemetryEvent, TelemetrySink},
    workers::{WorkerControl, WorkerPool, WorkerPoolConfig},
};

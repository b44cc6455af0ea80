//! Every tunable named in the CLI surface, as typed fields with defaults,
//! independent of how a caller chooses to populate them (CLI flags, a
//! config file, or direct construction).

use std::time::Duration;

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;
use url::Url;

/// `--crawl-type=basic|intelligent|discover-structure|gazetteer|place-hubs`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum CrawlType {
    Basic,
    Intelligent,
    DiscoverStructure,
    Gazetteer,
    PlaceHubs,
}

impl Default for CrawlType {
    fn default() -> Self {
        CrawlType::Basic
    }
}

/// The crawler's full set of tunables. Durations that accept a CLI suffix
/// (`s`/`m`/`h`/`d`) round-trip through `humantime_serde`; plain
/// millisecond counts stay as `u64`.
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder)]
pub struct CrawlConfig {
    pub start_url: Url,

    #[builder(default)]
    pub crawl_type: CrawlType,

    #[builder(default = 10)]
    pub max_depth: u32,

    #[builder(default = 1)]
    pub concurrency: usize,

    #[builder(default = 10_000)]
    pub max_queue: usize,

    #[builder(default = 0)]
    pub rate_limit_ms: u64,

    #[builder(default = 10_000)]
    pub request_timeout_ms: u64,

    #[builder(default = 50)]
    pub pacer_jitter_min_ms: u64,

    #[builder(default = 250)]
    pub pacer_jitter_max_ms: u64,

    /// `None` = unlimited. `Some(0)` is never produced by a CLI parser
    /// (0 means unlimited at the surface); an explicit cap is always
    /// `Some(n)` with `n >= 1`.
    #[builder(default)]
    pub max_downloads: Option<u64>,

    #[builder(default = Duration::from_secs(24 * 60 * 60))]
    #[serde(with = "humantime_serde")]
    pub max_age: Duration,

    #[builder(default)]
    #[serde(with = "humantime_serde::option")]
    pub max_age_article: Option<Duration>,

    #[builder(default)]
    #[serde(with = "humantime_serde::option")]
    pub max_age_hub: Option<Duration>,

    #[builder(default = false)]
    pub prefer_cache: bool,

    #[builder(default = true)]
    pub sitemap_enabled: bool,

    #[builder(default = false)]
    pub sitemap_only: bool,

    #[builder(default = 50_000)]
    pub sitemap_max_urls: usize,

    #[builder(default = false)]
    pub allow_query_urls: bool,

    #[builder(default = false)]
    pub fast_start: bool,

    #[builder(default)]
    pub job_id: Option<String>,

    #[builder(default = false)]
    pub slow_mode: bool,

    #[builder(default = 200)]
    pub int_max_seeds: usize,

    #[builder(default)]
    pub int_target_hosts: Vec<String>,

    #[builder(default = 0)]
    pub planner_verbosity: u8,

    #[builder(default = 1_000)]
    pub backoff_base_ms: u64,

    #[builder(default = 60_000)]
    pub backoff_max_ms: u64,

    #[builder(default = 3)]
    pub connection_reset_threshold: u32,

    #[builder(default = 120_000)]
    pub connection_reset_window_ms: u64,

    #[builder(default = 8)]
    pub retry_limit: u32,
}

impl CrawlConfig {
    /// Whether `maxDownloads` should be treated as unlimited. The source
    /// is inconsistent about whether `0` means "unlimited" or "zero"; this
    /// crate treats `0` (and `None`) as unlimited, requiring an explicit
    /// positive cap to bound downloads.
    #[must_use]
    pub fn is_download_limited(&self) -> bool {
        matches!(self.max_downloads, Some(n) if n > 0)
    }
}

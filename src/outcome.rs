//! Determines the crawl's completion outcome.

use serde::Serialize;

use crate::stats::StatsSnapshot;

/// The crawl's completion outcome. A CLI layer maps this to a process exit
/// code (0 on success, 1 otherwise).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CrawlOutcome {
    Success,
    CrawlFatal,
    CrawlNoProgress,
}

impl CrawlOutcome {
    /// Whether a fatal issue was recorded during initialisation (e.g. the
    /// persistence layer could not be opened). This always wins over the
    /// no-progress determination.
    #[must_use]
    pub fn determine(fatal_during_init: bool, stats: &StatsSnapshot) -> Self {
        if fatal_during_init {
            return CrawlOutcome::CrawlFatal;
        }
        if stats.pages_downloaded == 0 && stats.errors > 0 {
            return CrawlOutcome::CrawlNoProgress;
        }
        CrawlOutcome::Success
    }
}

/// The complete summary handed to the final telemetry milestone and to the
/// caller once a crawl ends.
#[derive(Debug, Clone, Serialize)]
pub struct CrawlSummary {
    pub outcome: CrawlOutcome,
    pub stats: StatsSnapshot,
    /// First-sample-retained problems, ordered by `kind`.
    pub problems: Vec<ProblemSample>,
}

/// A single problem sample surfaced in the final summary.
#[derive(Debug, Clone, Serialize)]
pub struct ProblemSample {
    pub kind: String,
    pub scope: String,
    pub target: String,
    pub count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(pages_downloaded: u64, errors: u64) -> StatsSnapshot {
        StatsSnapshot {
            pages_downloaded,
            errors,
            ..Default::default()
        }
    }

    #[test]
    fn fatal_wins_over_everything_else() {
        assert_eq!(
            CrawlOutcome::determine(true, &stats(10, 0)),
            CrawlOutcome::CrawlFatal
        );
    }

    #[test]
    fn no_downloads_with_errors_is_no_progress() {
        assert_eq!(
            CrawlOutcome::determine(false, &stats(0, 3)),
            CrawlOutcome::CrawlNoProgress
        );
    }

    #[test]
    fn downloads_with_errors_is_still_success() {
        assert_eq!(
            CrawlOutcome::determine(false, &stats(1, 3)),
            CrawlOutcome::Success
        );
    }

    #[test]
    fn no_downloads_no_errors_is_success() {
        assert_eq!(
            CrawlOutcome::determine(false, &stats(0, 0)),
            CrawlOutcome::Success
        );
    }
}

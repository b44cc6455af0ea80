//! The intelligent planner is an external collaborator; this module
//! specifies only the seeding contract it is reached through, modeled on a
//! chain-of-responsibility `Handler` trait with constructor-injected
//! collaborators rather than global state.

use async_trait::async_trait;
use serde::Serialize;
use url::Url;

use crate::error::Result;

/// Candidate section slugs and country-hub URLs a planner infers before
/// seeding, plus the cap on how many hub seeds may be injected.
#[derive(Debug, Clone, Default)]
pub struct SeedRequest {
    pub section_slugs: Vec<String>,
    pub country_candidates: Vec<Url>,
    pub max_seeds: usize,
}

/// What a planner produced, summarised for the final intelligent-completion
/// milestone's `seededHubs` field.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedPlanSummary {
    pub unique: usize,
    pub requested: usize,
    pub sections_from_patterns: usize,
    pub country_candidates: usize,
    /// How many of the `unique` seeded hub URLs were actually visited by
    /// the time the crawl finished. Filled in by the crawler after the
    /// worker pool drains, not by the planner itself.
    pub visited: usize,
}

/// An ordered plan run once before workers start. Only the seeding
/// contract is in scope here; pattern-inference and gazetteer/topic
/// dictionary internals are the planner implementation's own concern.
#[async_trait]
pub trait PlannerSeeder: Send + Sync {
    /// May decide to skip planning entirely (e.g. a non-intelligent crawl
    /// type), in which case it returns `Ok(false)`.
    async fn bootstrap(&self, host: &str, target_hosts: &[String]) -> Result<bool>;

    /// Learned sections and article URL hints inferred from the start URL.
    async fn infer_patterns(&self, start_url: &Url) -> Result<Vec<String>>;

    /// Candidate country-hub URLs drawn from the gazetteer.
    async fn country_candidates(&self, host: &str) -> Result<Vec<Url>>;

    /// Enqueue hub seeds as `kind = hub-seed` with a positive
    /// `priorityBias`, returning a summary for the completion milestone.
    async fn seed_hubs(&self, request: SeedRequest) -> Result<SeedPlanSummary>;

    /// Called once the crawl has finished: how many of the hub seeds this
    /// planner enqueued were actually visited. The planner is the only
    /// party that knows which URLs it seeded, so it answers this itself
    /// rather than the crawler re-deriving the set.
    async fn seeded_visited_count(&self) -> usize;
}

/// A planner that performs no seeding, for crawl types that don't use one
/// (`basic`, `discover-structure`).
#[derive(Debug, Default)]
pub struct NoopPlanner;

#[async_trait]
impl PlannerSeeder for NoopPlanner {
    async fn bootstrap(&self, _host: &str, _target_hosts: &[String]) -> Result<bool> {
        Ok(false)
    }

    async fn infer_patterns(&self, _start_url: &Url) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    async fn country_candidates(&self, _host: &str) -> Result<Vec<Url>> {
        Ok(Vec::new())
    }

    async fn seed_hubs(&self, _request: SeedRequest) -> Result<SeedPlanSummary> {
        Ok(SeedPlanSummary::default())
    }

    async fn seeded_visited_count(&self) -> usize {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_planner_skips_bootstrap() {
        let planner = NoopPlanner;
        assert!(!planner.bootstrap("example.com", &[]).await.unwrap());
    }
}

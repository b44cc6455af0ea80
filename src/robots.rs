//! A minimal `robots.txt` loader: good enough to build an allow/deny prefix
//! matcher and harvest `Sitemap:` declarations, not a full RFC 9309 parser.

use log::{debug, warn};

use crate::error::{ErrorKind, Result};
use crate::http_client::HttpClient;

const USER_AGENT_TOKEN: &str = "*";

/// Parsed `Disallow`/`Allow` rules for the agent group that applies to this
/// crawler, plus any `Sitemap:` URLs declared in the file.
#[derive(Debug, Clone, Default)]
pub struct RobotsRuleset {
    disallow: Vec<String>,
    allow: Vec<String>,
    pub sitemaps: Vec<String>,
}

impl RobotsRuleset {
    /// Fetch and parse `<base_url>/robots.txt`. An absent or unparsable
    /// file is treated as allow-all, but the fetch error is still surfaced
    /// to the caller so it can be logged as a non-fatal problem.
    pub async fn load(client: &HttpClient, base_url: &url::Url) -> Result<Self> {
        let robots_url = base_url
            .join("/robots.txt")
            .map_err(|e| ErrorKind::ParseUrl(e, "/robots.txt".to_string()))?;

        let response = client
            .get(robots_url.clone())
            .await
            .map_err(|e| ErrorKind::RobotsUnavailable(robots_url.to_string(), e.to_string()))?;

        if !response.status().is_success() {
            debug!("no robots.txt at {robots_url} (status {})", response.status());
            return Ok(Self::default());
        }

        let body = response
            .text()
            .await
            .map_err(|e| ErrorKind::RobotsUnavailable(robots_url.to_string(), e.to_string()))?;

        Ok(Self::parse(&body))
    }

    /// Parse a raw `robots.txt` body, keeping only directives under the
    /// `User-agent: *` group (or groups with no applicable user-agent
    /// restriction).
    #[must_use]
    pub fn parse(body: &str) -> Self {
        let mut ruleset = Self::default();
        let mut in_relevant_group = false;
        let mut seen_any_agent_line = false;

        for raw_line in body.lines() {
            let line = raw_line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            let Some((directive, value)) = line.split_once(':') else {
                continue;
            };
            let directive = directive.trim().to_ascii_lowercase();
            let value = value.trim();

            match directive.as_str() {
                "user-agent" => {
                    seen_any_agent_line = true;
                    in_relevant_group = value == USER_AGENT_TOKEN
                        || value.eq_ignore_ascii_case("newsroom-crawler");
                }
                "disallow" if in_relevant_group && !value.is_empty() => {
                    ruleset.disallow.push(value.to_string());
                }
                "allow" if in_relevant_group && !value.is_empty() => {
                    ruleset.allow.push(value.to_string());
                }
                "sitemap" => {
                    ruleset.sitemaps.push(value.to_string());
                }
                _ if !seen_any_agent_line && (directive == "disallow" || directive == "allow") => {
                    // Bare directives with no preceding `User-agent:` line
                    // apply globally, matching common crawler leniency.
                    if directive == "disallow" && !value.is_empty() {
                        ruleset.disallow.push(value.to_string());
                    } else if directive == "allow" && !value.is_empty() {
                        ruleset.allow.push(value.to_string());
                    }
                }
                _ => {}
            }
        }

        ruleset
    }

    /// Whether `path` is allowed, using longest-prefix-match precedence
    /// between `Allow` and `Disallow` rules, as most crawlers implement it.
    #[must_use]
    pub fn is_allowed(&self, path: &str) -> bool {
        let best_allow = self
            .allow
            .iter()
            .filter(|p| path.starts_with(p.as_str()))
            .map(String::len)
            .max();
        let best_disallow = self
            .disallow
            .iter()
            .filter(|p| path.starts_with(p.as_str()))
            .map(String::len)
            .max();

        match (best_allow, best_disallow) {
            (None, None) => true,
            (Some(_), None) => true,
            (None, Some(_)) => false,
            (Some(a), Some(d)) => a >= d,
        }
    }
}

/// Logs a non-fatal failure fetching robots.txt, following the
/// "best-effort helper" re-architecture note rather than swallowing the
/// error silently.
pub fn log_robots_failure(base_url: &url::Url, err: &ErrorKind) {
    warn!("robots.txt unavailable for {base_url}, defaulting to allow-all: {err}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disallow_blocks_matching_prefix() {
        let r = RobotsRuleset::parse("User-agent: *\nDisallow: /admin\n");
        assert!(!r.is_allowed("/admin/settings"));
        assert!(r.is_allowed("/world/story"));
    }

    #[test]
    fn allow_overrides_shorter_disallow() {
        let r = RobotsRuleset::parse("User-agent: *\nDisallow: /\nAllow: /world\n");
        assert!(r.is_allowed("/world/story"));
        assert!(!r.is_allowed("/admin"));
    }

    #[test]
    fn sitemap_directives_are_collected_regardless_of_group() {
        let r = RobotsRuleset::parse(
            "User-agent: Googlebot\nDisallow: /private\nSitemap: https://example.com/sitemap.xml\n",
        );
        assert_eq!(r.sitemaps, vec!["https://example.com/sitemap.xml"]);
    }

    #[test]
    fn empty_body_allows_everything() {
        let r = RobotsRuleset::parse("");
        assert!(r.is_allowed("/anything"));
    }

    #[test]
    fn irrelevant_user_agent_group_is_ignored() {
        let r = RobotsRuleset::parse("User-agent: Bingbot\nDisallow: /everything\n");
        assert!(r.is_allowed("/everything"));
    }
}

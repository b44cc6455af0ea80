//! URL canonicalisation, on-domain admission, and query-argument policy.

use std::collections::HashMap;
use std::sync::Mutex;

use url::Url;

use crate::robots::RobotsRuleset;

/// The crawl phase a `decide` call is made on; part of the memoisation key
/// since the same raw URL can be admitted differently across phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Seed,
    Discovery,
    Refresh,
}

/// How a query argument contributes to the canonical identity of a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryArgClass {
    /// Changes which content is returned (e.g. an article id or slug).
    Essential,
    /// Purely cosmetic/tracking (e.g. `utm_source`, session ids).
    Ignorable,
    /// Unrecognised; treated conservatively as essential for admission but
    /// reported to telemetry as a point of uncertainty.
    Uncertain,
}

/// Query argument names known to carry no content-identifying meaning.
const IGNORABLE_QUERY_ARGS: &[&str] = &[
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "fbclid",
    "gclid",
    "ref",
    "referrer",
    "cmpid",
    "icid",
    "source",
    "sessionid",
    "sid",
];

#[must_use]
pub fn classify_query_arg(name: &str) -> QueryArgClass {
    if IGNORABLE_QUERY_ARGS.contains(&name.to_ascii_lowercase().as_str()) {
        QueryArgClass::Ignorable
    } else {
        QueryArgClass::Essential
    }
}

/// The result of a `decide` call.
#[derive(Debug, Clone)]
pub struct Decision {
    pub allow: bool,
    pub reason: Option<&'static str>,
    /// Classification of each query argument present on the URL.
    pub analysis: Vec<(String, QueryArgClass)>,
    /// When the URL was rejected for being query-superfluous, the guessed
    /// canonical URL without its ignorable query string.
    pub canonical_alias: Option<Url>,
}

/// Policy tunables relevant to URL admission.
#[derive(Debug, Clone)]
pub struct PolicyConfig {
    pub skip_query_urls: bool,
    pub allow_query_urls: bool,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            skip_query_urls: true,
            allow_query_urls: false,
        }
    }
}

/// Canonicalises URLs, decides on-domain and query-arg admission, and
/// checks robots rules. Decisions are memoised per `(phase, raw)` for the
/// life of the run.
pub struct UrlPolicy {
    start_domain: String,
    config: PolicyConfig,
    robots: Option<RobotsRuleset>,
    memo: Mutex<HashMap<(Phase, String), bool>>,
}

impl UrlPolicy {
    #[must_use]
    pub fn new(start_domain: String, config: PolicyConfig, robots: Option<RobotsRuleset>) -> Self {
        Self {
            start_domain: start_domain.to_ascii_lowercase(),
            config,
            robots,
            memo: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve `raw` against `base`, drop the fragment, and lowercase the
    /// scheme and host while preserving path case. Query strings are
    /// preserved; rejection of superfluous queries happens in `decide`.
    pub fn normalise(&self, raw: &str, base: &Url) -> Result<Url, url::ParseError> {
        let mut url = base.join(raw)?;
        url.set_fragment(None);
        let scheme = url.scheme().to_ascii_lowercase();
        let _ = url.set_scheme(&scheme);
        if let Some(host) = url.host_str() {
            let host = host.to_ascii_lowercase();
            let _ = url.set_host(Some(&host));
        }
        Ok(url)
    }

    #[must_use]
    pub fn is_on_domain(&self, u: &Url) -> bool {
        u.host_str()
            .is_some_and(|h| h.eq_ignore_ascii_case(&self.start_domain))
    }

    #[must_use]
    pub fn is_allowed(&self, u: &Url) -> bool {
        self.robots.as_ref().is_none_or(|r| r.is_allowed(u.path()))
    }

    /// Classify a URL's query string and decide whether it should be
    /// admitted, honoring `skipQueryUrls`/`allowQueryUrls`. Memoised per
    /// `(phase, raw)`.
    pub fn decide(&self, raw: &str, phase: Phase) -> Decision {
        let analysis: Vec<(String, QueryArgClass)> = Url::parse(raw)
            .map(|u| {
                u.query_pairs()
                    .map(|(k, _)| (k.to_string(), classify_query_arg(&k)))
                    .collect()
            })
            .unwrap_or_default();

        if self.config.allow_query_urls || !self.config.skip_query_urls || analysis.is_empty() {
            self.remember(phase, raw, true);
            return Decision {
                allow: true,
                reason: None,
                analysis,
                canonical_alias: None,
            };
        }

        let all_ignorable = analysis
            .iter()
            .all(|(_, class)| *class == QueryArgClass::Ignorable);

        if all_ignorable {
            let alias = Url::parse(raw).ok().map(|mut u| {
                u.set_query(None);
                u
            });
            self.remember(phase, raw, false);
            return Decision {
                allow: false,
                reason: Some("query-superfluous"),
                analysis,
                canonical_alias: alias,
            };
        }

        self.remember(phase, raw, true);
        Decision {
            allow: true,
            reason: None,
            analysis,
            canonical_alias: None,
        }
    }

    fn remember(&self, phase: Phase, raw: &str, allow: bool) {
        self.memo
            .lock()
            .unwrap()
            .insert((phase, raw.to_string()), allow);
    }

    /// Cached result of a previous `decide` call for `(phase, raw)`, if any.
    #[must_use]
    pub fn cached_decision(&self, phase: Phase, raw: &str) -> Option<bool> {
        self.memo
            .lock()
            .unwrap()
            .get(&(phase, raw.to_string()))
            .copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> UrlPolicy {
        UrlPolicy::new("example.com".into(), PolicyConfig::default(), None)
    }

    #[test]
    fn normalise_strips_fragment_and_lowercases_host() {
        let p = policy();
        let base = Url::parse("https://example.com/").unwrap();
        let u = p.normalise("HTTPS://EXAMPLE.COM/Path#frag", &base).unwrap();
        assert_eq!(u.host_str(), Some("example.com"));
        assert_eq!(u.fragment(), None);
        assert_eq!(u.path(), "/Path");
    }

    #[test]
    fn is_on_domain_is_strict_hostname_equality() {
        let p = policy();
        assert!(p.is_on_domain(&Url::parse("https://example.com/a").unwrap()));
        assert!(!p.is_on_domain(&Url::parse("https://sub.example.com/a").unwrap()));
    }

    #[test]
    fn query_superfluous_url_is_rejected_with_alias() {
        let p = policy();
        let d = p.decide("https://example.com/a?utm_source=x&utm_medium=y", Phase::Discovery);
        assert!(!d.allow);
        assert_eq!(d.reason, Some("query-superfluous"));
        assert_eq!(
            d.canonical_alias.unwrap().as_str(),
            "https://example.com/a"
        );
    }

    #[test]
    fn essential_query_arg_is_admitted() {
        let p = policy();
        let d = p.decide("https://example.com/a?id=42", Phase::Discovery);
        assert!(d.allow);
    }

    #[test]
    fn allow_query_urls_overrides_skip() {
        let p = UrlPolicy::new(
            "example.com".into(),
            PolicyConfig {
                skip_query_urls: true,
                allow_query_urls: true,
            },
            None,
        );
        let d = p.decide("https://example.com/a?utm_source=x", Phase::Discovery);
        assert!(d.allow);
    }

    #[test]
    fn decisions_are_memoised() {
        let p = policy();
        let raw = "https://example.com/a?utm_source=x";
        assert!(p.cached_decision(Phase::Discovery, raw).is_none());
        p.decide(raw, Phase::Discovery);
        assert_eq!(p.cached_decision(Phase::Discovery, raw), Some(false));
    }

    #[test]
    fn no_robots_ruleset_allows_all() {
        let p = policy();
        assert!(p.is_allowed(&Url::parse("https://example.com/anything").unwrap()));
    }
}

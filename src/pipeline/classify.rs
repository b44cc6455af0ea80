//! Post-fetch content classification from simple textual/link signals
//! computed over an already-decoded body — no DOM/Readability parsing.

use linkify::{LinkFinder, LinkKind};
use regex::Regex;
use std::sync::OnceLock;
use url::Url;

/// What a successfully-fetched page looks like, content-wise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Article,
    Hub,
    Nav,
    Other,
}

/// Outlinks discovered in a page body, split by how they will be enqueued.
#[derive(Debug, Clone, Default)]
pub struct Outlinks {
    pub article_links: Vec<Url>,
    pub navigation_links: Vec<Url>,
}

/// Signals computed from a decoded body, used to classify the page and to
/// extract outlinks.
#[derive(Debug, Clone, Copy)]
pub struct ContentSignals {
    pub word_count: usize,
    pub link_count: usize,
    pub link_density: f64,
    pub looks_like_article_container: bool,
}

fn tag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<script.*?</script>|<style.*?</style>|<[^>]+>").unwrap())
}

fn article_container_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?is)<(article)\b|class="[^"]*\b(article|story|post)\b"#).unwrap()
    })
}

fn strip_tags(body: &str) -> String {
    tag_regex().replace_all(body, " ").to_string()
}

/// Compute classification signals from a raw HTML body.
#[must_use]
pub fn compute_signals(body: &str) -> ContentSignals {
    let text = strip_tags(body);
    let word_count = text.split_whitespace().count();

    let mut finder = LinkFinder::new();
    finder.kinds(&[LinkKind::Url]);
    let link_count = finder.links(body).count();

    let link_density = if word_count == 0 {
        1.0
    } else {
        link_count as f64 / word_count as f64
    };

    let looks_like_article_container = article_container_regex().is_match(body);

    ContentSignals {
        word_count,
        link_count,
        link_density,
        looks_like_article_container,
    }
}

/// Minimum body word count for a page to be considered substantive enough
/// to be an article.
const ARTICLE_MIN_WORDS: usize = 300;
/// Above this link-to-word ratio, a page reads as navigation rather than
/// prose.
const NAV_LINK_DENSITY: f64 = 0.08;

/// Classify a page from its URL and computed content signals.
///
/// URL-shape heuristics (a dated path segment, or a long slug) take
/// precedence; content signals break ties for ambiguous URLs.
#[must_use]
pub fn classify(url: &Url, signals: &ContentSignals) -> Classification {
    if url_looks_like_article(url) && signals.word_count >= ARTICLE_MIN_WORDS / 2 {
        return Classification::Article;
    }

    if signals.word_count >= ARTICLE_MIN_WORDS
        && signals.link_density < NAV_LINK_DENSITY
        && signals.looks_like_article_container
    {
        return Classification::Article;
    }

    if signals.link_density >= NAV_LINK_DENSITY && signals.word_count < ARTICLE_MIN_WORDS {
        return Classification::Nav;
    }

    if signals.word_count >= 50 {
        return Classification::Hub;
    }

    Classification::Other
}

fn url_looks_like_article(url: &Url) -> bool {
    static DATE_RE: OnceLock<Regex> = OnceLock::new();
    let re = DATE_RE.get_or_init(|| Regex::new(r"/20\d{2}/\d{1,2}/").unwrap());
    re.is_match(url.path())
}

/// Extract outlinks from a decoded HTML body, splitting them between
/// "looks like another article" and "looks like navigation" using the same
/// URL-shape heuristic as `classify`.
#[must_use]
pub fn extract_outlinks(body: &str, base: &Url) -> Outlinks {
    let mut finder = LinkFinder::new();
    finder.kinds(&[LinkKind::Url]);

    let mut out = Outlinks::default();
    for link in finder.links(body) {
        let raw = link.as_str();
        let Ok(resolved) = base.join(raw).or_else(|_| Url::parse(raw)) else {
            continue;
        };
        if resolved.scheme() != "http" && resolved.scheme() != "https" {
            continue;
        }
        if url_looks_like_article(&resolved) {
            out.article_links.push(resolved);
        } else {
            out.navigation_links.push(resolved);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dated_url_with_some_body_classifies_as_article() {
        let url = Url::parse("https://news.example.com/2024/05/my-story").unwrap();
        let signals = compute_signals(&"word ".repeat(200));
        assert_eq!(classify(&url, &signals), Classification::Article);
    }

    #[test]
    fn link_heavy_short_page_classifies_as_nav() {
        let url = Url::parse("https://news.example.com/sections").unwrap();
        let body = "See https://a.example/1 https://a.example/2 https://a.example/3";
        let signals = compute_signals(body);
        assert_eq!(classify(&url, &signals), Classification::Nav);
    }

    #[test]
    fn substantive_prose_with_article_container_is_an_article() {
        let url = Url::parse("https://news.example.com/world/slug").unwrap();
        let body = format!(
            "<article>{}</article>",
            "lorem ipsum dolor sit amet ".repeat(60)
        );
        let signals = compute_signals(&body);
        assert_eq!(classify(&url, &signals), Classification::Article);
    }

    #[test]
    fn extract_outlinks_splits_article_and_nav_shaped_urls() {
        let base = Url::parse("https://news.example.com/").unwrap();
        let body = "https://news.example.com/2024/01/a-story and https://news.example.com/sections";
        let out = extract_outlinks(body, &base);
        assert_eq!(out.article_links.len(), 1);
        assert_eq!(out.navigation_links.len(), 1);
    }
}

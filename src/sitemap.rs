//! Recursive XML sitemap discovery: `<urlset>` and `<sitemapindex>`,
//! same-domain only, capped by `sitemap_max_urls`.

use log::{debug, warn};
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use url::Url;

use crate::error::{ErrorKind, Result};
use crate::http_client::HttpClient;

/// Reads one or more sitemaps reachable from a starting sitemap URL,
/// recursing into `<sitemapindex>` entries and stopping once `max_urls`
/// page URLs have been collected.
pub struct SitemapReader<'a> {
    client: &'a HttpClient,
    start_domain: String,
    max_urls: usize,
}

impl<'a> SitemapReader<'a> {
    #[must_use]
    pub fn new(client: &'a HttpClient, start_domain: String, max_urls: usize) -> Self {
        Self {
            client,
            start_domain: start_domain.to_ascii_lowercase(),
            max_urls,
        }
    }

    /// Fetch and recursively expand `sitemap_url`, returning page URLs up
    /// to `max_urls`.
    pub async fn read(&self, sitemap_url: &Url) -> Result<Vec<Url>> {
        let mut collected = Vec::new();
        let mut to_visit = vec![sitemap_url.clone()];
        let mut visited_sitemaps = std::collections::HashSet::new();

        while let Some(next) = to_visit.pop() {
            if collected.len() >= self.max_urls {
                debug!("sitemap cap of {} reached, stopping", self.max_urls);
                break;
            }
            if !visited_sitemaps.insert(next.clone()) {
                continue;
            }
            if !self.is_on_domain(&next) {
                continue;
            }

            let body = match self.fetch(&next).await {
                Ok(b) => b,
                Err(e) => {
                    warn!("failed to fetch sitemap {next}: {e}");
                    continue;
                }
            };

            let parsed = parse_sitemap(&body)
                .map_err(|e| ErrorKind::InvalidSitemap(next.to_string(), e))?;

            match parsed {
                SitemapDocument::UrlSet(urls) => {
                    for loc in urls {
                        if let Ok(u) = Url::parse(&loc) {
                            if self.is_on_domain(&u) {
                                collected.push(u);
                                if collected.len() >= self.max_urls {
                                    break;
                                }
                            }
                        }
                    }
                }
                SitemapDocument::SitemapIndex(children) => {
                    for loc in children {
                        if let Ok(u) = Url::parse(&loc) {
                            to_visit.push(u);
                        }
                    }
                }
            }
        }

        collected.truncate(self.max_urls);
        Ok(collected)
    }

    async fn fetch(&self, url: &Url) -> Result<String> {
        let response = self
            .client
            .get(url.clone())
            .await
            .map_err(|e| ErrorKind::InvalidSitemap(url.to_string(), e.to_string()))?;
        response
            .text()
            .await
            .map_err(|e| ErrorKind::InvalidSitemap(url.to_string(), e.to_string()))
    }

    fn is_on_domain(&self, u: &Url) -> bool {
        u.host_str()
            .is_some_and(|h| h.eq_ignore_ascii_case(&self.start_domain))
    }
}

enum SitemapDocument {
    UrlSet(Vec<String>),
    SitemapIndex(Vec<String>),
}

/// Parse a sitemap body, detecting whether it is a `<urlset>` (leaf page
/// list) or a `<sitemapindex>` (pointer to further sitemaps).
fn parse_sitemap(body: &str) -> std::result::Result<SitemapDocument, String> {
    let mut reader = Reader::from_str(body);
    reader.config_mut().trim_text(true);

    let mut locs = Vec::new();
    let mut in_loc = false;
    let mut is_index = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = e.local_name();
                let name = name.as_ref();
                if name == b"sitemapindex" {
                    is_index = true;
                } else if name == b"loc" {
                    in_loc = true;
                }
            }
            Ok(Event::Text(t)) if in_loc => {
                let text = t
                    .unescape()
                    .map_err(|e| e.to_string())?
                    .trim()
                    .to_string();
                if !text.is_empty() {
                    locs.push(text);
                }
            }
            Ok(Event::End(e)) => {
                if e.local_name().as_ref() == b"loc" {
                    in_loc = false;
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(e.to_string()),
            _ => {}
        }
        buf.clear();
    }

    if is_index {
        Ok(SitemapDocument::SitemapIndex(locs))
    } else {
        Ok(SitemapDocument::UrlSet(locs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_urlset() {
        let xml = r#"<?xml version="1.0"?>
        <urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
          <url><loc>https://example.com/a</loc></url>
          <url><loc>https://example.com/b</loc></url>
        </urlset>"#;
        match parse_sitemap(xml).unwrap() {
            SitemapDocument::UrlSet(urls) => assert_eq!(urls.len(), 2),
            SitemapDocument::SitemapIndex(_) => panic!("expected urlset"),
        }
    }

    #[test]
    fn parses_sitemapindex() {
        let xml = r#"<?xml version="1.0"?>
        <sitemapindex xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
          <sitemap><loc>https://example.com/sitemap-1.xml</loc></sitemap>
        </sitemapindex>"#;
        match parse_sitemap(xml).unwrap() {
            SitemapDocument::SitemapIndex(urls) => assert_eq!(urls.len(), 1),
            SitemapDocument::UrlSet(_) => panic!("expected sitemapindex"),
        }
    }

    #[test]
    fn mismatched_tags_are_an_error() {
        assert!(parse_sitemap("<urlset><url></wrongtag></urlset>").is_err());
    }
}

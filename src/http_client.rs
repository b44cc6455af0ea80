//! A `reqwest::Client` built once per scheme with a keep-alive pool, a
//! bounded timeout, and a descriptive `User-Agent`.

use std::time::Duration;

use typed_builder::TypedBuilder;
use url::Url;

use crate::error::{ErrorKind, Result};

const DEFAULT_USER_AGENT: &str =
    concat!("newsroom-crawl-core/", env!("CARGO_PKG_VERSION"));
const DEFAULT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_TCP_KEEPALIVE_SECS: u64 = 60;
const DEFAULT_POOL_MAX_IDLE_PER_HOST: usize = 50;

/// Builder for the crawler's shared HTTP client.
#[derive(Debug, Clone, TypedBuilder)]
pub struct HttpClientConfig {
    #[builder(default = DEFAULT_USER_AGENT.to_string())]
    pub user_agent: String,
    #[builder(default = Duration::from_secs(DEFAULT_TIMEOUT_SECS))]
    pub request_timeout: Duration,
    #[builder(default = Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS))]
    pub connect_timeout: Duration,
    #[builder(default = false)]
    pub allow_insecure: bool,
    #[builder(default)]
    pub proxy: Option<String>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Thin wrapper around `reqwest::Client` so the rest of the crate depends
/// on a crawler-owned type rather than `reqwest` directly at call sites.
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: reqwest::Client,
}

impl HttpClient {
    pub fn new(config: &HttpClientConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .tcp_keepalive(Duration::from_secs(DEFAULT_TCP_KEEPALIVE_SECS))
            .pool_max_idle_per_host(DEFAULT_POOL_MAX_IDLE_PER_HOST)
            .danger_accept_invalid_certs(config.allow_insecure)
            .gzip(true)
            .cookie_store(true);

        if let Some(proxy) = &config.proxy {
            if let Ok(p) = reqwest::Proxy::all(proxy) {
                builder = builder.proxy(p);
            }
        }

        let inner = builder.build().map_err(ErrorKind::BuildRequestClient)?;
        Ok(Self { inner })
    }

    pub async fn get(&self, url: Url) -> std::result::Result<reqwest::Response, reqwest::Error> {
        self.inner.get(url).send().await
    }

    pub async fn get_conditional(
        &self,
        url: Url,
        etag: Option<&str>,
        last_modified: Option<&str>,
    ) -> std::result::Result<reqwest::Response, reqwest::Error> {
        let mut req = self.inner.get(url);
        if let Some(etag) = etag {
            req = req.header(reqwest::header::IF_NONE_MATCH, etag);
        }
        if let Some(lm) = last_modified {
            req = req.header(reqwest::header::IF_MODIFIED_SINCE, lm);
        }
        req.send().await
    }

    #[must_use]
    pub fn inner(&self) -> &reqwest::Client {
        &self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_sets_a_descriptive_user_agent() {
        let config = HttpClientConfig::default();
        assert!(config.user_agent.starts_with("newsroom-crawl-core/"));
    }

    #[test]
    fn client_builds_with_default_config() {
        let client = HttpClient::new(&HttpClientConfig::default());
        assert!(client.is_ok());
    }
}

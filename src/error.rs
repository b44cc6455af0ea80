use std::path::PathBuf;

use serde::{Serialize, Serializer};
use thiserror::Error;

use crate::frontier::WorkKind;

/// Kinds of errors the crawler core can produce.
///
/// Note: error messages may change over time, so callers should match on
/// the variant, not the rendered text.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ErrorKind {
    /// Network error while handling a request (DNS, TCP, TLS, or transport
    /// failure). Does not include erroneous status codes.
    #[error("network error fetching {1}")]
    NetworkRequest(#[source] reqwest::Error, String),

    /// The request was aborted because it exceeded `request_timeout_ms`.
    #[error("request to {0} timed out")]
    Timeout(String),

    /// Cannot read the body of an otherwise successful response.
    #[error("error reading response body for {1}")]
    ReadResponseBody(#[source] reqwest::Error, String),

    /// The HTTP client required for making requests could not be built.
    #[error("error creating request client: {0}")]
    BuildRequestClient(#[source] reqwest::Error),

    /// A non-2xx/3xx/304 status code was returned and the error was not
    /// otherwise retriable.
    #[error("rejected status code {1} for {0}")]
    RejectedStatusCode(String, http::StatusCode),

    /// The given string could not be parsed as an absolute or relative URL.
    #[error("cannot parse `{1}` as a URL: {0}")]
    ParseUrl(#[source] url::ParseError, String),

    /// A URL has no host component (e.g. `file:///`).
    #[error("URL `{0}` is missing a host")]
    InvalidUrlHost(String),

    /// The `robots.txt` for a host could not be fetched or parsed; the
    /// crawler falls back to allow-all rather than surfacing this, but it
    /// is recorded as a problem.
    #[error("failed to load robots.txt for {0}: {1}")]
    RobotsUnavailable(String, String),

    /// A sitemap could not be fetched or its XML could not be parsed.
    #[error("failed to parse sitemap {0}: {1}")]
    InvalidSitemap(String, String),

    /// The persistence layer could not be reached or initialised at
    /// startup. This is the only error kind that can produce a
    /// `CrawlOutcome::Fatal`.
    #[error("persistence layer unavailable: {0}")]
    StoreUnavailable(String),

    /// A work item referenced a kind the frontier does not recognise.
    /// Exists purely as a defensive variant for external planner input.
    #[error("unsupported work item kind: {0:?}")]
    UnsupportedKind(WorkKind),

    /// The given path could not be used as a cache directory.
    #[error("invalid cache path `{0}`: {1}")]
    InvalidCachePath(PathBuf, String),
}

impl ErrorKind {
    /// Whether this error kind should ever be retried by the worker pool.
    ///
    /// Mirrors the taxonomy in the error-handling design: `http`/`timeout`/
    /// `network` are retriable, `policy`/`save`/`article-processing` are
    /// not, `fatal` never reaches this path (it aborts the run directly).
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        match self {
            ErrorKind::NetworkRequest(..) | ErrorKind::Timeout(_) => true,
            ErrorKind::RejectedStatusCode(_, code) => {
                code.is_server_error() || code.as_u16() == 429
            }
            ErrorKind::ParseUrl(..)
            | ErrorKind::InvalidUrlHost(_)
            | ErrorKind::RobotsUnavailable(..)
            | ErrorKind::InvalidSitemap(..)
            | ErrorKind::StoreUnavailable(_)
            | ErrorKind::UnsupportedKind(_)
            | ErrorKind::InvalidCachePath(..)
            | ErrorKind::ReadResponseBody(..)
            | ErrorKind::BuildRequestClient(_) => false,
        }
    }

    /// Return the underlying `reqwest::Error`, if this is a network-shaped
    /// error. Used to check for connection resets (see `crate::pipeline`).
    #[must_use]
    pub fn reqwest_error(&self) -> Option<&reqwest::Error> {
        match self {
            ErrorKind::NetworkRequest(e, _) | ErrorKind::ReadResponseBody(e, _) => Some(e),
            _ => None,
        }
    }
}

impl Serialize for ErrorKind {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

/// The crate-wide `Result` type.
pub type Result<T> = std::result::Result<T, ErrorKind>;

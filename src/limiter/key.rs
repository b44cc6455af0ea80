use std::fmt;

use serde::Deserialize;
use url::Url;

use crate::error::ErrorKind;

/// A type-safe, normalised hostname used to key per-host limiter state.
///
/// # Examples
///
/// ```
/// use newsroom_crawl_core::limiter::HostKey;
/// use url::Url;
///
/// let url = Url::parse("https://www.example.com/world/story").unwrap();
/// let key = HostKey::try_from(&url).unwrap();
/// assert_eq!(key.as_str(), "www.example.com");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
pub struct HostKey(String);

impl HostKey {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl TryFrom<&Url> for HostKey {
    type Error = ErrorKind;

    fn try_from(url: &Url) -> Result<Self, Self::Error> {
        let host = url
            .host_str()
            .ok_or_else(|| ErrorKind::InvalidUrlHost(url.to_string()))?;
        Ok(HostKey(host.to_lowercase()))
    }
}

impl TryFrom<Url> for HostKey {
    type Error = ErrorKind;

    fn try_from(url: Url) -> Result<Self, Self::Error> {
        HostKey::try_from(&url)
    }
}

impl fmt::Display for HostKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for HostKey {
    fn from(host: String) -> Self {
        HostKey(host.to_lowercase())
    }
}

impl From<&str> for HostKey {
    fn from(host: &str) -> Self {
        HostKey(host.to_lowercase())
    }
}

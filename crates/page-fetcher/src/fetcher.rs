//! Page fetcher
//!
//! A `PageFetcher` is an unordered set of keyword/URL couples parsed from a
//! single annotation value.

use crate::error::{FetchError, ParseError, TransportError};
use crate::transport::PageTransport;
use futures::future::join_all;
use std::borrow::Cow;
use std::collections::BTreeMap;
use tracing::debug;

/// Scheme prepended to URLs that carry none
pub const DEFAULT_SCHEME: &str = "http://";

const KNOWN_SCHEMES: [&str; 2] = ["http://", "https://"];

/// Fetched page bodies by key
pub type Pages = BTreeMap<String, String>;

/// Unordered set of keyword/URL couples.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageFetcher {
    pages: BTreeMap<String, String>,
}

impl PageFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a fetcher from a whitespace-separated list of `key=url` couples.
    ///
    /// Only the first `=` of a couple separates key from URL, so URLs may
    /// contain further `=`. A later couple overwrites an earlier one with the
    /// same key.
    ///
    /// # Errors
    /// Returns `ParseError::MissingSeparator` naming the first couple without
    /// `=`. Nothing parsed so far is returned in that case.
    pub fn parse(value: &str) -> Result<Self, ParseError> {
        let mut fetcher = Self::new();

        for couple in value.split_whitespace() {
            let (key, url) = couple
                .split_once('=')
                .ok_or_else(|| ParseError::MissingSeparator(couple.to_string()))?;
            fetcher.insert(key, url);
        }

        Ok(fetcher)
    }

    /// Add a couple, returning the URL it replaced
    pub fn insert(&mut self, key: impl Into<String>, url: impl Into<String>) -> Option<String> {
        self.pages.insert(key.into(), url.into())
    }

    /// Remove every couple whose key is in `keys`.
    pub fn exclude<I, K>(&mut self, keys: I)
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        for key in keys {
            self.pages.remove(key.as_ref());
        }
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.pages.get(key).map(String::as_str)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.pages.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pages.iter().map(|(key, url)| (key.as_str(), url.as_str()))
    }

    /// Fetch every page concurrently.
    ///
    /// Each key ends up in exactly one of the returned pages or the returned
    /// error. The error is `Some` if and only if at least one page failed.
    pub async fn fetch(&self, transport: &dyn PageTransport) -> (Pages, Option<FetchError>) {
        let requests = self.pages.iter().map(|(key, url)| async move {
            let url = with_scheme(url);
            debug!(key = %key, url = %url, "Fetching page");
            (key.clone(), transport.get(&url).await)
        });
        let results: Vec<(String, Result<String, TransportError>)> = join_all(requests).await;

        let mut pages = Pages::new();
        let mut errors = FetchError::default();
        for (key, result) in results {
            match result {
                Ok(body) => {
                    pages.insert(key, body);
                }
                Err(e) => errors.insert(key, e),
            }
        }

        if errors.is_empty() {
            (pages, None)
        } else {
            (pages, Some(errors))
        }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for PageFetcher {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut fetcher = Self::new();
        for (key, url) in iter {
            fetcher.insert(key, url);
        }
        fetcher
    }
}

/// Prepend `DEFAULT_SCHEME` unless `url` already starts with `http://` or
/// `https://` (case-insensitive).
pub fn with_scheme(url: &str) -> Cow<'_, str> {
    let has_scheme = KNOWN_SCHEMES.iter().any(|scheme| {
        url.get(..scheme.len())
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(scheme))
    });

    if has_scheme {
        Cow::Borrowed(url)
    } else {
        Cow::Owned(format!("{}{}", DEFAULT_SCHEME, url))
    }
}

//! Page fetcher errors

use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Errors that can occur while parsing an annotation value
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// A token carries no `=` separator
    #[error("cannot parse '{0}' as key=value")]
    MissingSeparator(String),
}

/// Errors that can occur while retrieving a single page
#[derive(Debug, Error)]
pub enum TransportError {
    /// HTTP request/response error (connect, timeout, body read)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-2xx status
    #[error("GET {url} returned status {status}")]
    Status { url: String, status: u16 },

    /// Any other retrieval failure
    #[error("{0}")]
    Other(String),
}

/// Collection of per-key failures that happened during a fetch.
///
/// A key appears here only if its page could not be retrieved.
#[derive(Debug, Default)]
pub struct FetchError {
    errors: BTreeMap<String, TransportError>,
}

impl FetchError {
    pub(crate) fn insert(&mut self, key: String, error: TransportError) {
        self.errors.insert(key, error);
    }

    /// Number of failed keys
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Failure for the given key, if it failed
    pub fn get(&self, key: &str) -> Option<&TransportError> {
        self.errors.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.errors.contains_key(key)
    }

    /// Failed keys, sorted
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.errors.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &TransportError)> {
        self.errors.iter().map(|(key, err)| (key.as_str(), err))
    }

    pub fn into_inner(self) -> BTreeMap<String, TransportError> {
        self.errors
    }
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (key, err) in &self.errors {
            if !first {
                f.write_str(" ")?;
            }
            write!(f, "{}='{}'", key, err)?;
            first = false;
        }
        Ok(())
    }
}

impl std::error::Error for FetchError {}

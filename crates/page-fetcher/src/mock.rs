//! Mock transport for unit testing
//!
//! Serves canned bodies or failures by exact URL and records every request,
//! so tests can assert what was (and was not) fetched.

use crate::error::TransportError;
use crate::transport::PageTransport;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
enum Route {
    Page(String),
    Failure(String),
}

/// Mock PageTransport for testing
///
/// URLs without a route fail with a "no route" error.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    routes: Arc<Mutex<HashMap<String, Route>>>,
    requests: Arc<Mutex<Vec<String>>>,
}

impl MockTransport {
    /// Create a mock with no routes
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `body` for `url`
    pub fn with_page(self, url: impl Into<String>, body: impl Into<String>) -> Self {
        self.routes.lock().unwrap().insert(url.into(), Route::Page(body.into()));
        self
    }

    /// Fail requests to `url` with `reason`
    pub fn with_failure(self, url: impl Into<String>, reason: impl Into<String>) -> Self {
        self.routes.lock().unwrap().insert(url.into(), Route::Failure(reason.into()));
        self
    }

    /// URLs requested so far, in request order
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl PageTransport for MockTransport {
    async fn get(&self, url: &str) -> Result<String, TransportError> {
        self.requests.lock().unwrap().push(url.to_string());

        let route = self.routes.lock().unwrap().get(url).cloned();
        match route {
            Some(Route::Page(body)) => Ok(body),
            Some(Route::Failure(reason)) => Err(TransportError::Other(reason)),
            None => Err(TransportError::Other(format!("no route to {}", url))),
        }
    }
}

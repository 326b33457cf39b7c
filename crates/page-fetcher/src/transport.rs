//! Page transport
//!
//! The `PageTransport` trait abstracts a single "GET this URL" so the fetcher
//! can be exercised without sockets. `HttpTransport` is the reqwest-backed
//! implementation used by the controller.

use crate::error::TransportError;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

/// Retrieves the body of one page.
///
/// Implementations must not retry; a failed call is reported as is.
#[async_trait::async_trait]
pub trait PageTransport: Send + Sync {
    /// GET `url` and return the fully read body
    async fn get(&self, url: &str) -> Result<String, TransportError>;
}

/// reqwest-backed transport
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Create a new transport
    ///
    /// # Arguments
    /// * `timeout` - Timeout applied to each request, body included
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(TransportError::Http)?;

        Ok(Self { client })
    }

    /// Wrap an already configured reqwest client
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl PageTransport for HttpTransport {
    async fn get(&self, url: &str) -> Result<String, TransportError> {
        debug!("GET {}", url);

        let response = self.client
            .get(url)
            .send()
            .await
            .map_err(TransportError::Http)?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        response.text().await.map_err(TransportError::Http)
    }
}

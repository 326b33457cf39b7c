//! Controller-specific error types.
//!
//! Parse and fetch failures never leave a reconcile pass, so they are not
//! represented here; see `page_fetcher::error` for those.

use kube::Error as KubeError;
use page_fetcher::TransportError;
use thiserror::Error;

/// Errors that can occur in the curl controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// HTTP transport could not be built
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// ConfigMap lacks metadata required to address it
    #[error("Invalid ConfigMap: {0}")]
    InvalidResource(String),

    /// ConfigMap does not exist in the store
    #[error("ConfigMap not found: {0}")]
    #[allow(dead_code)] // Only produced by the in-memory test store
    NotFound(String),

    /// Stale write rejected by the store
    #[error("Conflict writing ConfigMap: {0}")]
    #[allow(dead_code)] // Only produced by the in-memory test store
    Conflict(String),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),
}

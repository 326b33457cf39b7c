//! Curl Controller
//!
//! Watches ConfigMaps annotated with `x-k8s.io/curl-me-that` and fills their
//! data with the pages the annotation points to.
//!
//! The annotation holds whitespace separated `key=url` couples. Each key
//! missing from the ConfigMap data is fetched once and stored under that
//! key; keys already present are left alone.

mod config;
mod controller;
mod error;
mod reconciler;
mod store;
mod watcher;

#[cfg(test)]
mod test_utils;

use config::Config;
use controller::Controller;
use crate::error::ControllerError;
use kube::Client;
use page_fetcher::HttpTransport;
use reconciler::Reconciler;
use std::sync::Arc;
use store::KubeConfigMapStore;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use watcher::ConfigMapManager;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Install the ring provider before any TLS client is built
    if rustls::crypto::ring::default_provider().install_default().is_err() {
        warn!("rustls crypto provider already installed");
    }

    info!("Starting Curl Controller");

    let config = Config::from_env()?;
    info!("Configuration:");
    info!("  Namespace: {}", config.namespace.as_deref().unwrap_or("all namespaces"));
    info!("  Fetch timeout: {:?}", config.fetch_timeout);
    info!("  Watch buffer size: {}", config.watch_buffer_size);

    let client = Client::try_default().await?;
    let store = KubeConfigMapStore::new(client, config.namespace.clone());
    let transport = HttpTransport::new(config.fetch_timeout)?;

    let manager = ConfigMapManager::new(Arc::new(store))
        .with_buffer_size(config.watch_buffer_size);
    let controller = Controller::new(manager, Reconciler::new(Arc::new(transport)));

    controller.run(shutdown_signal()).await
}

/// Resolves on Ctrl-C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl-C"),
        () = terminate => info!("Received SIGTERM"),
    }
}

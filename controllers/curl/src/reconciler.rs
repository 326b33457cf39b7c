//! Reconciliation logic for annotated ConfigMaps.
//!
//! A ConfigMap opts in with the `x-k8s.io/curl-me-that` annotation, a
//! whitespace separated list of `key=url` tokens. Every key not yet present
//! in the ConfigMap data is fetched and the page bodies are written back
//! under their keys. Keys already present are never fetched again, which
//! is what stops our own write-back from triggering another round.

use crate::store::Diagnostic;
use crate::watcher::ConfigMapSnapshot;
use page_fetcher::{PageFetcher, PageTransport};
use std::sync::Arc;
use tracing::{Instrument, error, info, info_span, warn};

/// Annotation listing the pages to fetch
pub const CURL_ANNOTATION: &str = "x-k8s.io/curl-me-that";

/// Reason attached to the Event recorded after a successful write
pub const CURLED_REASON: &str = "Curled";

/// Result of one reconcile pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// ConfigMap does not carry the annotation
    NoAnnotation,
    /// Annotation could not be parsed; nothing was fetched
    InvalidAnnotation,
    /// Every annotated key already has data
    AlreadyProcessed,
    /// Every fetch failed; nothing was written
    NothingFetched { failed: Vec<String> },
    /// Fetched pages were written
    Curled { written: Vec<String>, failed: Vec<String> },
    /// Fetched pages could not be written back
    WriteFailed,
}

/// Reconciles ConfigMap snapshots.
pub struct Reconciler {
    transport: Arc<dyn PageTransport>,
}

impl Reconciler {
    pub fn new(transport: Arc<dyn PageTransport>) -> Self {
        Self { transport }
    }

    /// Processes one snapshot. Never fails: problems are logged and, where
    /// useful to the ConfigMap owner, recorded as warning Events. Events are
    /// published in the background and never hold up the write-back.
    pub async fn curl_config_map(&self, snapshot: ConfigMapSnapshot) -> ReconcileOutcome {
        let span = info_span!(
            "curl_config_map",
            namespace = %snapshot.namespace(),
            name = %snapshot.name(),
        );
        self.reconcile(snapshot).instrument(span).await
    }

    async fn reconcile(&self, mut snapshot: ConfigMapSnapshot) -> ReconcileOutcome {
        let Some(annotation) = snapshot.annotation(CURL_ANNOTATION) else {
            info!("Skipping configmap without annotation");
            return ReconcileOutcome::NoAnnotation;
        };

        let mut fetcher = match PageFetcher::parse(annotation) {
            Ok(fetcher) => fetcher,
            Err(e) => {
                warn!("Can't parse annotation: {}", e);
                snapshot.record_warning(format!("Can't parse URL: {}", e));
                return ReconcileOutcome::InvalidAnnotation;
            }
        };

        fetcher.exclude(snapshot.data_keys());
        if fetcher.is_empty() {
            info!("Leaving configmap already processed");
            return ReconcileOutcome::AlreadyProcessed;
        }

        let (pages, fetch_error) = fetcher.fetch(self.transport.as_ref()).await;

        let failed: Vec<String> = match fetch_error {
            Some(e) => {
                warn!("Can't fetch some URLs: {}", e);
                snapshot.record_warning(format!("Can't fetch URL: {}", e));
                e.keys().map(str::to_string).collect()
            }
            None => Vec::new(),
        };

        if pages.is_empty() {
            return ReconcileOutcome::NothingFetched { failed };
        }

        let written: Vec<String> = pages.keys().cloned().collect();
        if let Err(e) = snapshot.push(pages).await {
            error!("Failed to update configmap: {}", e);
            return ReconcileOutcome::WriteFailed;
        }

        info!("Curled {:?} into configmap", written);
        snapshot.record(Diagnostic::normal(
            CURLED_REASON,
            format!("Curled {} into ConfigMap", written.join(", ")),
        ));

        ReconcileOutcome::Curled { written, failed }
    }
}

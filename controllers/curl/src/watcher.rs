//! ConfigMap watch manager.
//!
//! `ConfigMapManager` owns the single live watch subscription. It translates
//! raw watch events into `ConfigMapSnapshot`s on a bounded channel and owns
//! the retrying write-back of ConfigMap data.
//!
//! Only `Added` and `Modified` events become snapshots. Deletions, bookmarks
//! and error events are dropped, as are payloads that do not decode as a
//! ConfigMap; none of them end the stream.

use crate::error::ControllerError;
use crate::store::{ConfigMapStore, Diagnostic};
use futures::stream::{AbortHandle, Stream, StreamExt, abortable};
use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::WatchEvent;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Default capacity of the snapshot channel
pub const DEFAULT_BUFFER_SIZE: usize = 100;

/// Number of write attempts before an update is reported as failed
pub const UPDATE_ATTEMPTS: usize = 3;

/// Reason attached to warning Events
pub const WARNING_REASON: &str = "k8s-url";

/// Write-back and diagnostics capability handed out with every snapshot.
///
/// Holds the store, never the manager, so snapshots outliving a stopped
/// watch can still be written.
#[derive(Clone)]
pub struct ConfigMapHandle {
    store: Arc<dyn ConfigMapStore>,
}

impl ConfigMapHandle {
    pub fn new(store: Arc<dyn ConfigMapStore>) -> Self {
        Self { store }
    }

    /// Merges `data` into the ConfigMap's data and writes it back.
    ///
    /// The write is attempted up to `UPDATE_ATTEMPTS` times, back to back,
    /// whatever the failure. The local ConfigMap keeps the merged data even
    /// when every attempt fails.
    ///
    /// # Errors
    /// Returns the error of the last attempt.
    pub async fn update_data(
        &self,
        config_map: &mut ConfigMap,
        data: BTreeMap<String, String>,
    ) -> Result<(), ControllerError> {
        config_map.data.get_or_insert_with(BTreeMap::new).extend(data);

        let mut attempt = 1;
        loop {
            match self.store.replace(config_map).await {
                Ok(_) => return Ok(()),
                Err(e) if attempt < UPDATE_ATTEMPTS => {
                    warn!("Update attempt {}/{} failed: {}", attempt, UPDATE_ATTEMPTS, e);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Records a diagnostic Event in the background and returns at once.
    /// Failures are logged and swallowed.
    pub fn record(&self, config_map: &ConfigMap, diagnostic: Diagnostic) {
        let store = self.store.clone();
        let config_map = config_map.clone();
        tokio::spawn(async move {
            if let Err(e) = store.publish(&config_map, diagnostic).await {
                warn!("Failed to record event: {}", e);
            }
        });
    }

    /// Records a warning Event under `WARNING_REASON`.
    pub fn record_warning(&self, config_map: &ConfigMap, message: impl Into<String>) {
        self.record(config_map, Diagnostic::warning(WARNING_REASON, message));
    }
}

/// A ConfigMap as seen by one watch event, with the handle to write it back.
#[derive(Clone)]
pub struct ConfigMapSnapshot {
    pub config_map: ConfigMap,
    handle: ConfigMapHandle,
}

impl ConfigMapSnapshot {
    pub fn new(config_map: ConfigMap, handle: ConfigMapHandle) -> Self {
        Self { config_map, handle }
    }

    pub fn name(&self) -> &str {
        self.config_map.metadata.name.as_deref().unwrap_or("<unknown>")
    }

    pub fn namespace(&self) -> &str {
        self.config_map.metadata.namespace.as_deref().unwrap_or("default")
    }

    /// Value of annotation `key`, if set
    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.config_map.metadata.annotations.as_ref()?
            .get(key)
            .map(String::as_str)
    }

    /// Keys currently present in the ConfigMap data
    pub fn data_keys(&self) -> impl Iterator<Item = &str> {
        self.config_map.data.iter().flat_map(|data| data.keys().map(String::as_str))
    }

    /// Merge `data` into this ConfigMap and write it back.
    pub async fn push(&mut self, data: BTreeMap<String, String>) -> Result<(), ControllerError> {
        self.handle.update_data(&mut self.config_map, data).await
    }

    pub fn record(&self, diagnostic: Diagnostic) {
        self.handle.record(&self.config_map, diagnostic);
    }

    pub fn record_warning(&self, message: impl Into<String>) {
        self.handle.record_warning(&self.config_map, message);
    }
}

/// A live subscription: the abort switch of its event stream and the worker
/// draining it.
struct Subscription {
    abort: AbortHandle,
    worker: JoinHandle<()>,
}

/// Owns the ConfigMap watch subscription.
///
/// At most one subscription is live per manager; starting a new one cancels
/// the previous. `start_watching` and `stop_watching` are meant to be called
/// from a single control path.
pub struct ConfigMapManager {
    store: Arc<dyn ConfigMapStore>,
    buffer_size: usize,
    subscription: Option<Subscription>,
}

impl ConfigMapManager {
    /// Creates a new manager instance.
    pub fn new(store: Arc<dyn ConfigMapStore>) -> Self {
        Self {
            store,
            buffer_size: DEFAULT_BUFFER_SIZE,
            subscription: None,
        }
    }

    /// Sets the snapshot channel capacity (at least 1).
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size.max(1);
        self
    }

    /// Handle for writing back ConfigMaps and recording Events
    pub fn handle(&self) -> ConfigMapHandle {
        ConfigMapHandle::new(self.store.clone())
    }

    /// True while a subscription is open. Turns false on `stop_watching`, and
    /// on its own once an upstream close has been fully drained.
    pub fn is_watching(&self) -> bool {
        self.subscription
            .as_ref()
            .is_some_and(|subscription| !subscription.worker.is_finished())
    }

    /// Starts watching ConfigMaps.
    ///
    /// Returns a channel receiving a snapshot every time a ConfigMap is added
    /// or modified. Any previous watch is stopped first. The channel closes
    /// once the watch ends, either upstream or through `stop_watching`.
    ///
    /// # Errors
    /// Returns the store error if the watch cannot be opened; the manager is
    /// then left without a subscription.
    pub async fn start_watching(&mut self) -> Result<mpsc::Receiver<ConfigMapSnapshot>, ControllerError> {
        self.stop_watching();

        info!("Starting ConfigMap watcher");
        let events = self.store.watch().await?;
        let (events, abort) = abortable(events);

        let (snapshots, receiver) = mpsc::channel(self.buffer_size);
        let worker = tokio::spawn(process_events(events, snapshots, self.handle()));
        self.subscription = Some(Subscription { abort, worker });

        Ok(receiver)
    }

    /// Cancels the current watch, if any.
    ///
    /// The snapshot channel closes shortly after, once the background worker
    /// observes the end of the event stream. Snapshots already buffered are
    /// still delivered.
    pub fn stop_watching(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            info!("Stopping ConfigMap watcher");
            subscription.abort.abort();
        }
    }
}

/// Drains raw watch events into snapshots until the event stream ends.
///
/// Sending waits for room in the channel, so a slow consumer stalls this
/// worker instead of losing updates.
async fn process_events<S>(
    mut events: S,
    snapshots: mpsc::Sender<ConfigMapSnapshot>,
    handle: ConfigMapHandle,
) where
    S: Stream<Item = Result<WatchEvent<ConfigMap>, kube::Error>> + Unpin,
{
    while let Some(event) = events.next().await {
        let config_map = match event {
            Ok(WatchEvent::Added(cm)) | Ok(WatchEvent::Modified(cm)) => cm,
            Ok(WatchEvent::Deleted(cm)) => {
                debug!("Ignoring deletion of ConfigMap {:?}", cm.metadata.name);
                continue;
            }
            Ok(WatchEvent::Bookmark(_)) => continue,
            Ok(WatchEvent::Error(e)) => {
                error!("ConfigMap watch error event: {:?}", e);
                continue;
            }
            Err(e) => {
                warn!("Dropping undecodable or failed watch event: {}", e);
                continue;
            }
        };

        if snapshots.send(ConfigMapSnapshot::new(config_map, handle.clone())).await.is_err() {
            debug!("Snapshot receiver dropped, stopping event processing");
            break;
        }
    }

    debug!("ConfigMap event source closed");
}

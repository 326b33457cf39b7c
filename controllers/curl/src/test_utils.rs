//! Test utilities for unit testing the watch manager and reconciler
//!
//! `MockConfigMapStore` is an in-memory ConfigMap store with watch support,
//! resourceVersion conflict checks, write failure injection and an Event log.

use crate::error::ControllerError;
use crate::store::{ConfigMapStore, Diagnostic, RawEventStream};
use crate::watcher::{ConfigMapHandle, ConfigMapSnapshot};
use futures::StreamExt;
use futures::channel::mpsc::{UnboundedSender, unbounded};
use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::WatchEvent;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

type RawEvent = Result<WatchEvent<ConfigMap>, kube::Error>;

#[derive(Default)]
struct MockState {
    objects: BTreeMap<(String, String), ConfigMap>,
    watchers: Vec<UnboundedSender<RawEvent>>,
    next_version: u64,
    watch_calls: usize,
    replace_calls: usize,
    failing_replaces: usize,
    fail_watch: bool,
    publish_delay: Option<Duration>,
    events: Vec<(String, Diagnostic)>,
}

impl MockState {
    fn broadcast(&mut self, event: impl Fn() -> RawEvent) {
        self.watchers.retain(|watcher| watcher.unbounded_send(event()).is_ok());
    }

    fn bump_version(&mut self, config_map: &mut ConfigMap) {
        self.next_version += 1;
        config_map.metadata.resource_version = Some(self.next_version.to_string());
    }
}

/// In-memory ConfigMap store for tests
#[derive(Clone, Default)]
pub struct MockConfigMapStore {
    state: Arc<Mutex<MockState>>,
}

fn key_of(config_map: &ConfigMap) -> (String, String) {
    (
        config_map.metadata.namespace.clone().unwrap_or_else(|| "default".to_string()),
        config_map.metadata.name.clone().unwrap_or_default(),
    )
}

impl MockConfigMapStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared trait object over the same state
    pub fn shared(&self) -> Arc<dyn ConfigMapStore> {
        Arc::new(self.clone())
    }

    /// Create a ConfigMap, notifying open watches with `Added`
    pub fn create(&self, mut config_map: ConfigMap) -> ConfigMap {
        let mut state = self.state.lock().unwrap();
        config_map.metadata.namespace.get_or_insert_with(|| "default".to_string());
        state.bump_version(&mut config_map);
        state.objects.insert(key_of(&config_map), config_map.clone());
        state.broadcast(|| Ok(WatchEvent::Added(config_map.clone())));
        config_map
    }

    /// Overwrite a ConfigMap as another client would, notifying with `Modified`
    pub fn update(&self, mut config_map: ConfigMap) -> ConfigMap {
        let mut state = self.state.lock().unwrap();
        config_map.metadata.namespace.get_or_insert_with(|| "default".to_string());
        state.bump_version(&mut config_map);
        state.objects.insert(key_of(&config_map), config_map.clone());
        state.broadcast(|| Ok(WatchEvent::Modified(config_map.clone())));
        config_map
    }

    /// Delete a ConfigMap, notifying with `Deleted`
    pub fn delete(&self, namespace: &str, name: &str) {
        let mut state = self.state.lock().unwrap();
        if let Some(config_map) = state.objects.remove(&(namespace.to_string(), name.to_string())) {
            state.broadcast(|| Ok(WatchEvent::Deleted(config_map.clone())));
        }
    }

    /// Send an arbitrary raw event to open watches
    pub fn send_raw(&self, event: impl Fn() -> RawEvent) {
        self.state.lock().unwrap().broadcast(event);
    }

    /// End every open watch, as the API server does on watch timeout
    pub fn close_watches(&self) {
        self.state.lock().unwrap().watchers.clear();
    }

    /// Watches still held open by a consumer
    pub fn open_watches(&self) -> usize {
        let mut state = self.state.lock().unwrap();
        state.watchers.retain(|watcher| !watcher.is_closed());
        state.watchers.len()
    }

    /// Make the next `count` replace calls fail
    pub fn fail_next_replaces(&self, count: usize) {
        self.state.lock().unwrap().failing_replaces = count;
    }

    /// Make every watch call fail
    pub fn fail_watch(&self) {
        self.state.lock().unwrap().fail_watch = true;
    }

    /// Make every Event publish take `delay` before it is recorded
    pub fn delay_publishes(&self, delay: Duration) {
        self.state.lock().unwrap().publish_delay = Some(delay);
    }

    pub fn watch_calls(&self) -> usize {
        self.state.lock().unwrap().watch_calls
    }

    pub fn replace_calls(&self) -> usize {
        self.state.lock().unwrap().replace_calls
    }

    /// Recorded Events as (ConfigMap name, diagnostic)
    pub fn events(&self) -> Vec<(String, Diagnostic)> {
        self.state.lock().unwrap().events.clone()
    }

    /// Wait until `count` Events have been recorded, then return them
    pub async fn wait_for_events(&self, count: usize) -> Vec<(String, Diagnostic)> {
        assert!(
            wait_for(Duration::from_secs(5), || self.events().len() >= count).await,
            "expected {} events, got {:?}",
            count,
            self.events()
        );
        self.events()
    }

    pub fn object(&self, namespace: &str, name: &str) -> Option<ConfigMap> {
        self.state.lock().unwrap()
            .objects
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }
}

#[async_trait::async_trait]
impl ConfigMapStore for MockConfigMapStore {
    async fn watch(&self) -> Result<RawEventStream, ControllerError> {
        let mut state = self.state.lock().unwrap();
        state.watch_calls += 1;
        if state.fail_watch {
            return Err(ControllerError::Watch("watch refused".to_string()));
        }

        let (sender, receiver) = unbounded();
        // Like a fresh Kubernetes watch, start with every existing object
        for config_map in state.objects.values() {
            let _ = sender.unbounded_send(Ok(WatchEvent::Added(config_map.clone())));
        }
        state.watchers.push(sender);
        Ok(receiver.boxed())
    }

    async fn get(&self, namespace: &str, name: &str) -> Result<ConfigMap, ControllerError> {
        self.object(namespace, name)
            .ok_or_else(|| ControllerError::NotFound(format!("{}/{}", namespace, name)))
    }

    async fn replace(&self, config_map: &ConfigMap) -> Result<ConfigMap, ControllerError> {
        let mut state = self.state.lock().unwrap();
        state.replace_calls += 1;
        if state.failing_replaces > 0 {
            state.failing_replaces -= 1;
            return Err(ControllerError::Conflict("injected failure".to_string()));
        }

        let key = key_of(config_map);
        let stored = state.objects.get(&key)
            .ok_or_else(|| ControllerError::NotFound(format!("{}/{}", key.0, key.1)))?;
        if stored.metadata.resource_version != config_map.metadata.resource_version {
            return Err(ControllerError::Conflict(format!(
                "{}/{} has resourceVersion {:?}",
                key.0, key.1, stored.metadata.resource_version
            )));
        }

        let mut updated = config_map.clone();
        state.bump_version(&mut updated);
        state.objects.insert(key, updated.clone());
        state.broadcast(|| Ok(WatchEvent::Modified(updated.clone())));
        Ok(updated)
    }

    async fn publish(&self, config_map: &ConfigMap, diagnostic: Diagnostic) -> Result<(), ControllerError> {
        let name = config_map.metadata.name.clone().unwrap_or_default();
        let delay = self.state.lock().unwrap().publish_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.state.lock().unwrap().events.push((name, diagnostic));
        Ok(())
    }
}

/// Helper to create a test ConfigMap
pub fn create_test_config_map(
    name: &str,
    annotations: &[(&str, &str)],
    data: &[(&str, &str)],
) -> ConfigMap {
    let to_map = |pairs: &[(&str, &str)]| -> Option<BTreeMap<String, String>> {
        if pairs.is_empty() {
            None
        } else {
            Some(pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect())
        }
    };

    ConfigMap {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some("default".to_string()),
            annotations: to_map(annotations),
            ..Default::default()
        },
        data: to_map(data),
        ..Default::default()
    }
}

/// Helper to wrap a ConfigMap into a snapshot writing to `store`
pub fn snapshot_for(store: &MockConfigMapStore, config_map: ConfigMap) -> ConfigMapSnapshot {
    ConfigMapSnapshot::new(config_map, ConfigMapHandle::new(store.shared()))
}

/// Poll `condition` until it holds or `timeout` elapses
pub async fn wait_for(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

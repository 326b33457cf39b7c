//! ConfigMap store boundary.
//!
//! `ConfigMapStore` is everything the controller needs from the cluster:
//! a raw watch, read and full-replace of a single ConfigMap, and Kubernetes
//! Events. The watch manager and reconciler only ever see the trait, which
//! keeps them testable against the in-memory store in `test_utils`.

use crate::error::ControllerError;
use futures::StreamExt;
use futures::stream::BoxStream;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::{Api, PostParams, WatchEvent, WatchParams};
use kube::{Client, Resource};
use kube_runtime::events::{Event, EventType, Recorder, Reporter};
use tracing::debug;

/// Name the controller reports Events under
pub const REPORTER: &str = "k8s-curl";

/// Raw ConfigMap watch events, undecodable payloads included as errors
pub type RawEventStream = BoxStream<'static, Result<WatchEvent<ConfigMap>, kube::Error>>;

/// Severity of a diagnostic event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Normal,
    Warning,
}

/// Diagnostic attached to a ConfigMap for observability
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub reason: String,
    pub message: String,
}

impl Diagnostic {
    pub fn warning(reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            reason: reason.into(),
            message: message.into(),
        }
    }

    pub fn normal(reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Normal,
            reason: reason.into(),
            message: message.into(),
        }
    }
}

/// Cluster operations on ConfigMaps
#[async_trait::async_trait]
pub trait ConfigMapStore: Send + Sync {
    /// Open a new raw watch on ConfigMaps
    async fn watch(&self) -> Result<RawEventStream, ControllerError>;

    /// Read one ConfigMap
    #[allow(dead_code)] // Only read back by tests
    async fn get(&self, namespace: &str, name: &str) -> Result<ConfigMap, ControllerError>;

    /// Replace a ConfigMap; the write carries its `resourceVersion`
    async fn replace(&self, config_map: &ConfigMap) -> Result<ConfigMap, ControllerError>;

    /// Publish a diagnostic Event about a ConfigMap
    async fn publish(&self, config_map: &ConfigMap, diagnostic: Diagnostic) -> Result<(), ControllerError>;
}

/// Kubernetes API backed store
pub struct KubeConfigMapStore {
    client: Client,
    namespace: Option<String>,
    recorder: Recorder,
}

impl KubeConfigMapStore {
    /// Creates a store watching `namespace`, or all namespaces when `None`.
    pub fn new(client: Client, namespace: Option<String>) -> Self {
        let reporter = Reporter {
            controller: REPORTER.to_string(),
            instance: std::env::var("POD_NAME").ok(),
        };
        let recorder = Recorder::new(client.clone(), reporter);

        Self {
            client,
            namespace,
            recorder,
        }
    }

    fn api(&self, namespace: &str) -> Api<ConfigMap> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

/// Namespace and name of a ConfigMap, for addressing writes
fn identity(config_map: &ConfigMap) -> Result<(&str, &str), ControllerError> {
    let name = config_map.metadata.name.as_deref()
        .ok_or_else(|| ControllerError::InvalidResource("ConfigMap missing name".to_string()))?;
    let namespace = config_map.metadata.namespace.as_deref()
        .unwrap_or("default");
    Ok((namespace, name))
}

#[async_trait::async_trait]
impl ConfigMapStore for KubeConfigMapStore {
    async fn watch(&self) -> Result<RawEventStream, ControllerError> {
        let api: Api<ConfigMap> = match &self.namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        };
        let params = WatchParams::default();

        // "0" starts from any version, so existing ConfigMaps arrive as Added
        let stream = api.watch(&params, "0").await
            .map_err(|e| ControllerError::Watch(format!("Cannot watch ConfigMaps: {}", e)))?;

        Ok(stream.boxed())
    }

    async fn get(&self, namespace: &str, name: &str) -> Result<ConfigMap, ControllerError> {
        Ok(self.api(namespace).get(name).await?)
    }

    async fn replace(&self, config_map: &ConfigMap) -> Result<ConfigMap, ControllerError> {
        let (namespace, name) = identity(config_map)?;
        debug!("Replacing ConfigMap {}/{}", namespace, name);

        Ok(self.api(namespace)
            .replace(name, &PostParams::default(), config_map)
            .await?)
    }

    async fn publish(&self, config_map: &ConfigMap, diagnostic: Diagnostic) -> Result<(), ControllerError> {
        let type_ = match diagnostic.severity {
            Severity::Normal => EventType::Normal,
            Severity::Warning => EventType::Warning,
        };
        let event = Event {
            type_,
            reason: diagnostic.reason,
            note: Some(diagnostic.message),
            action: "Curl".to_string(),
            secondary: None,
        };

        self.recorder.publish(&event, &config_map.object_ref(&())).await?;
        Ok(())
    }
}

//! Discovery provider interface and the Kubernetes provider.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::config::{DiscoveryConfig, PROVIDER};
use crate::error::{Error, Result};
use crate::k8s::{KubePodSource, PodSource};
use crate::resolver::pod_addresses;

/// A pluggable peer discovery backend.
#[async_trait]
pub trait DiscoveryProvider: Send + Sync {
    /// Short name of the backend.
    fn name(&self) -> &str;

    /// Prepares the provider for discovery.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be set up.
    async fn initialize(&mut self) -> Result<()>;

    /// Returns the addresses of the peers currently available.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend could not be queried, or
    /// [`Error::NoPeersFound`] if it was queried but yielded no peer.
    async fn discover_peers(&self) -> Result<Vec<String>>;

    /// Releases the resources acquired by [`initialize`](Self::initialize).
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails to shut down cleanly.
    async fn shutdown(&mut self) -> Result<()>;
}

/// Discovers peers among the pods of a Kubernetes namespace.
pub struct KubernetesDiscovery {
    config: DiscoveryConfig,
    source: Option<Box<dyn PodSource>>,
}

impl KubernetesDiscovery {
    /// Creates a provider. The Kubernetes client is built by
    /// [`initialize`](DiscoveryProvider::initialize).
    #[must_use]
    pub fn new(config: DiscoveryConfig) -> Self {
        Self {
            config,
            source: None,
        }
    }

    /// Creates a provider from a loosely typed option map.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the options are invalid.
    pub fn from_map(options: Map<String, Value>) -> Result<Self> {
        DiscoveryConfig::from_map(options).map(Self::new)
    }

    /// Creates a provider listing pods from `source` instead of the
    /// Kubernetes API.
    #[must_use]
    pub fn with_source(config: DiscoveryConfig, source: impl PodSource + 'static) -> Self {
        Self {
            config,
            source: Some(Box::new(source)),
        }
    }

    /// The configuration this provider was created with.
    #[must_use]
    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }
}

#[async_trait]
impl DiscoveryProvider for KubernetesDiscovery {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn initialize(&mut self) -> Result<()> {
        if self.source.is_none() {
            let source = KubePodSource::connect(self.config.kubeconfig.as_deref()).await?;
            self.source = Some(Box::new(source));
        }

        tracing::info!(
            "Service discovery plugin is enabled, provider: {}",
            self.config.provider
        );

        Ok(())
    }

    async fn discover_peers(&self) -> Result<Vec<String>> {
        let source = self.source.as_ref().ok_or(Error::NotInitialized)?;

        let pods = source.list_pods(&self.config).await?;
        let peers = pod_addresses(&pods, &self.config);

        tracing::debug!(
            "Kubernetes discovery: {} of {} pods in {} are peers",
            peers.len(),
            pods.len(),
            self.config.namespace
        );

        if peers.is_empty() {
            return Err(Error::NoPeersFound);
        }

        Ok(peers)
    }

    async fn shutdown(&mut self) -> Result<()> {
        self.source = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use k8s_openapi::api::core::v1::{Pod, PodStatus};
    use serde_json::json;

    use super::*;

    // Pod source returning a fixed snapshot and recording the queries it saw
    #[derive(Default)]
    struct StaticSource {
        pods: Vec<Pod>,
        queries: Arc<Mutex<Vec<DiscoveryConfig>>>,
    }

    #[async_trait]
    impl PodSource for StaticSource {
        async fn list_pods(&self, config: &DiscoveryConfig) -> Result<Vec<Pod>> {
            self.queries.lock().unwrap().push(config.clone());
            Ok(self.pods.clone())
        }
    }

    struct FailingSource;

    #[async_trait]
    impl PodSource for FailingSource {
        async fn list_pods(&self, _config: &DiscoveryConfig) -> Result<Vec<Pod>> {
            Err(Error::Credentials("no credentials".to_string()))
        }
    }

    fn make_pod(phase: &str, pod_ip: &str) -> Pod {
        Pod {
            status: Some(PodStatus {
                phase: Some(phase.to_string()),
                pod_ip: Some(pod_ip.to_string()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn discover_before_initialize_fails() {
        let provider = KubernetesDiscovery::new(DiscoveryConfig::new());

        let err = provider.discover_peers().await.unwrap_err();
        assert!(matches!(err, Error::NotInitialized));
    }

    #[tokio::test]
    async fn discover_returns_addresses_in_order() {
        let source = StaticSource {
            pods: vec![
                make_pod("Running", "10.0.0.2"),
                make_pod("Pending", "10.0.0.3"),
                make_pod("Running", "10.0.0.1"),
            ],
            ..Default::default()
        };

        let mut provider = KubernetesDiscovery::with_source(DiscoveryConfig::new(), source);
        provider.initialize().await.unwrap();

        let peers = provider.discover_peers().await.unwrap();
        assert_eq!(peers, ["10.0.0.2", "10.0.0.1"]);
    }

    #[tokio::test]
    async fn discover_passes_query_to_source() {
        let queries = Arc::new(Mutex::new(Vec::new()));
        let source = StaticSource {
            pods: vec![make_pod("Running", "10.0.0.1")],
            queries: Arc::clone(&queries),
        };

        let config = DiscoveryConfig::new()
            .namespace("olric")
            .label_selector("app=olric")
            .field_selector("status.phase=Running");

        let mut provider = KubernetesDiscovery::with_source(config.clone(), source);
        provider.initialize().await.unwrap();
        provider.discover_peers().await.unwrap();

        assert_eq!(*queries.lock().unwrap(), [config]);
    }

    #[tokio::test]
    async fn discover_with_no_eligible_pods_is_no_peers_found() {
        let source = StaticSource {
            pods: vec![make_pod("Pending", "10.0.0.1"), make_pod("Running", "")],
            ..Default::default()
        };

        let mut provider = KubernetesDiscovery::with_source(DiscoveryConfig::new(), source);
        provider.initialize().await.unwrap();

        let err = provider.discover_peers().await.unwrap_err();
        assert!(matches!(err, Error::NoPeersFound));
    }

    #[tokio::test]
    async fn discover_with_empty_namespace_is_no_peers_found() {
        let mut provider =
            KubernetesDiscovery::with_source(DiscoveryConfig::new(), StaticSource::default());
        provider.initialize().await.unwrap();

        let err = provider.discover_peers().await.unwrap_err();
        assert!(matches!(err, Error::NoPeersFound));
    }

    #[tokio::test]
    async fn discover_propagates_source_errors() {
        let mut provider = KubernetesDiscovery::with_source(DiscoveryConfig::new(), FailingSource);
        provider.initialize().await.unwrap();

        let err = provider.discover_peers().await.unwrap_err();
        assert!(matches!(err, Error::Credentials(_)));
    }

    #[tokio::test]
    async fn shutdown_releases_source() {
        let source = StaticSource {
            pods: vec![make_pod("Running", "10.0.0.1")],
            ..Default::default()
        };

        let mut provider = KubernetesDiscovery::with_source(DiscoveryConfig::new(), source);
        provider.initialize().await.unwrap();
        provider.shutdown().await.unwrap();

        let err = provider.discover_peers().await.unwrap_err();
        assert!(matches!(err, Error::NotInitialized));
    }

    #[test]
    fn from_map_builds_provider() {
        let options = json!({ "provider": "k8s", "namespace": "olric", "host_network": true });
        let Value::Object(options) = options else {
            unreachable!()
        };

        let provider = KubernetesDiscovery::from_map(options).unwrap();

        assert_eq!(provider.name(), "k8s");
        assert_eq!(provider.config().namespace, "olric");
        assert!(provider.config().host_network);
    }

    #[test]
    fn from_map_rejects_invalid_options() {
        let Value::Object(options) = json!({ "provider": "dns" }) else {
            unreachable!()
        };

        assert!(matches!(
            KubernetesDiscovery::from_map(options),
            Err(Error::Config(_))
        ));
    }

    #[tokio::test]
    async fn provider_is_usable_as_trait_object() {
        let source = StaticSource {
            pods: vec![make_pod("Running", "10.0.0.1")],
            ..Default::default()
        };

        let mut provider: Box<dyn DiscoveryProvider> =
            Box::new(KubernetesDiscovery::with_source(DiscoveryConfig::new(), source));
        provider.initialize().await.unwrap();

        assert_eq!(provider.discover_peers().await.unwrap(), ["10.0.0.1"]);
    }
}

//! Kubernetes pod listing.
//!
//! This module builds the Kubernetes client and lists the pods that are
//! candidates for peers. Nothing here interprets pods; that happens in the
//! resolver.
//!
//! # Credentials
//!
//! 1. The `kubeconfig` path from the configuration, if set. If it cannot be
//!    loaded, in-cluster credentials are tried before giving up.
//! 2. Otherwise the usual inference: the `KUBECONFIG` environment variable,
//!    then `~/.kube/config`, then in-cluster credentials.

use std::path::Path;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, ListParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};

use crate::config::DiscoveryConfig;
use crate::error::{Error, Result};

/// A source of candidate pods.
///
/// The production implementation is [`KubePodSource`]; other implementations
/// can feed the provider from anywhere else.
#[async_trait]
pub trait PodSource: Send + Sync {
    /// Lists the pods in `config.namespace` matching the configured label and
    /// field selectors.
    ///
    /// # Errors
    ///
    /// Returns an error if the pods cannot be listed.
    async fn list_pods(&self, config: &DiscoveryConfig) -> Result<Vec<Pod>>;
}

/// Lists pods through the Kubernetes API.
#[derive(Clone)]
pub struct KubePodSource {
    client: Client,
}

impl KubePodSource {
    /// Wraps an existing client.
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Builds a client from the given kubeconfig path, or from the inferred
    /// configuration when `None`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Credentials`] if no configuration could be loaded, or
    /// [`Error::Api`] if the client could not be built from it.
    pub async fn connect(kubeconfig: Option<&Path>) -> Result<Self> {
        let config = match kubeconfig {
            Some(path) => config_from_path(path).await?,
            None => Config::infer()
                .await
                .map_err(|e| Error::Credentials(e.to_string()))?,
        };

        Ok(Self::new(Client::try_from(config)?))
    }
}

#[async_trait]
impl PodSource for KubePodSource {
    async fn list_pods(&self, config: &DiscoveryConfig) -> Result<Vec<Pod>> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), &config.namespace);
        let list = pods.list(&list_params(config)).await?;

        tracing::debug!(
            "listed {} pods in namespace {}",
            list.items.len(),
            config.namespace
        );

        Ok(list.items)
    }
}

/// Loads a client configuration from an explicit kubeconfig path, falling back
/// to in-cluster credentials.
async fn config_from_path(path: &Path) -> Result<Config> {
    let loaded = match Kubeconfig::read_from(path) {
        Ok(kubeconfig) => {
            Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default()).await
        }
        Err(e) => Err(e),
    };

    match loaded {
        Ok(config) => Ok(config),
        Err(kubeconfig_err) => {
            tracing::debug!(
                "error loading kubeconfig {}: {kubeconfig_err}, trying in-cluster config",
                path.display()
            );

            Config::incluster().map_err(|incluster_err| {
                Error::Credentials(format!(
                    "error loading kubeconfig {}: {kubeconfig_err}; \
                     error loading in-cluster config: {incluster_err}",
                    path.display()
                ))
            })
        }
    }
}

/// Builds the list query. Selectors are passed through untouched.
fn list_params(config: &DiscoveryConfig) -> ListParams {
    let mut params = ListParams::default();

    if let Some(labels) = config.label_selector.as_deref() {
        params = params.labels(labels);
    }

    if let Some(fields) = config.field_selector.as_deref() {
        params = params.fields(fields);
    }

    params
}

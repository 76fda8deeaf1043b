//! Runs one discovery cycle and prints the peers found.
//!
//! # Environment Variables
//!
//! - `KUBECONFIG_PATH`: Explicit kubeconfig path (default: inferred)
//! - `POD_NAMESPACE`: Namespace to search (default: default)
//! - `LABEL_SELECTOR`: Label selector for the pod query (default: none)
//! - `FIELD_SELECTOR`: Field selector for the pod query (default: none)
//! - `HOST_NETWORK`: `true` to use host IPs and host ports (default: false)

use std::env;

use olric_k8s_discovery::{DiscoveryConfig, DiscoveryProvider, Error, KubernetesDiscovery};
use tracing::{Level, info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::INFO.into()),
        )
        .init();

    let mut config = DiscoveryConfig::new();
    if let Ok(path) = env::var("KUBECONFIG_PATH") {
        config = config.kubeconfig(path);
    }

    if let Ok(namespace) = env::var("POD_NAMESPACE") {
        config = config.namespace(namespace);
    }

    if let Ok(selector) = env::var("LABEL_SELECTOR") {
        config = config.label_selector(selector);
    }

    if let Ok(selector) = env::var("FIELD_SELECTOR") {
        config = config.field_selector(selector);
    }

    let host_network = env::var("HOST_NETWORK").is_ok_and(|v| v.eq_ignore_ascii_case("true"));
    let config = config.host_network(host_network).validate()?;

    info!("Namespace: {}", config.namespace);
    info!("Host network: {}", config.host_network);

    let mut provider = KubernetesDiscovery::new(config);
    provider.initialize().await?;

    match provider.discover_peers().await {
        Ok(peers) => {
            for peer in &peers {
                println!("{peer}");
            }

            info!("Discovered {} peers", peers.len());
        }

        Err(Error::NoPeersFound) => warn!("No eligible peers yet"),
        Err(e) => return Err(e.into()),
    }

    provider.shutdown().await?;
    Ok(())
}

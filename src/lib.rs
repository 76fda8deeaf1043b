#![deny(missing_docs)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! Kubernetes pod discovery for [Olric](https://github.com/buraksezer/olric) cluster membership.
//!
//! Olric nodes running as pods find each other by listing the pods of a
//! namespace and turning them into join addresses. This crate performs that
//! listing and resolution.
//!
//! # Features
//!
//! - **Label and field selectors**: Passed verbatim to the pod list query
//! - **Health filtering**: Only running pods that are not explicitly unready
//! - **Host networking**: Optionally joins on the host IP and host ports
//! - **Port annotation**: Pods may set `olric/auto-join-port` to a declared
//!   port name or a port number to get `ip:port` addresses
//!
//! # Usage
//!
//! ```ignore
//! use olric_k8s_discovery::{DiscoveryConfig, DiscoveryProvider, KubernetesDiscovery};
//!
//! let config = DiscoveryConfig::new()
//!     .namespace("olric")
//!     .label_selector("app=olric");
//!
//! let mut provider = KubernetesDiscovery::new(config);
//! provider.initialize().await?;
//!
//! let peers = provider.discover_peers().await?;
//! // e.g. ["10.1.0.12:3322", "10.1.0.13:3322"]
//! ```

mod config;
mod error;
mod k8s;
mod provider;
mod resolver;

pub use config::{DEFAULT_NAMESPACE, DiscoveryConfig, PROVIDER};
pub use error::{Error, Result};
pub use k8s::{KubePodSource, PodSource};
pub use provider::{DiscoveryProvider, KubernetesDiscovery};
pub use resolver::{ANNOTATION_KEY_PORT, pod_addresses};

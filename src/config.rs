//! Discovery configuration.
//!
//! The configuration normally arrives as a loosely typed map (the plugin
//! options of the host). It is decoded and validated once by
//! [`DiscoveryConfig::from_map`], after which the rest of the crate only sees
//! typed fields.
//!
//! ```
//! use olric_k8s_discovery::DiscoveryConfig;
//! use serde_json::json;
//!
//! let options = json!({
//!     "provider": "k8s",
//!     "namespace": "olric",
//!     "label_selector": "app=olric",
//!     "host_network": "true",
//! });
//!
//! let config = DiscoveryConfig::from_map(options.as_object().unwrap().clone()).unwrap();
//! assert_eq!(config.namespace, "olric");
//! assert!(config.host_network);
//! ```

use std::path::PathBuf;

use serde::de::{self, Unexpected};
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Provider name selecting this discovery backend.
pub const PROVIDER: &str = "k8s";

/// Namespace searched when none is configured.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Configuration for Kubernetes pod discovery.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DiscoveryConfig {
    /// Name of the discovery provider. Must be `k8s`.
    pub provider: String,

    /// Path to a kubeconfig file.
    ///
    /// If `None`, the `KUBECONFIG` environment variable, then `~/.kube/config`,
    /// then the in-cluster service account credentials are tried.
    pub kubeconfig: Option<PathBuf>,

    /// Namespace to search for pods.
    pub namespace: String,

    /// Label selector passed verbatim to the pod list query.
    pub label_selector: Option<String>,

    /// Field selector passed verbatim to the pod list query.
    pub field_selector: Option<String>,

    /// Use the host IP and host ports instead of the pod IP and container ports.
    #[serde(deserialize_with = "bool_or_string")]
    pub host_network: bool,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            provider: PROVIDER.to_string(),
            kubeconfig: None,
            namespace: DEFAULT_NAMESPACE.to_string(),
            label_selector: None,
            field_selector: None,
            host_network: false,
        }
    }
}

impl DiscoveryConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes and validates a configuration from a loosely typed option map.
    ///
    /// Recognized keys are `provider`, `kubeconfig`, `namespace`,
    /// `label_selector`, `field_selector` and `host_network`. Missing keys take
    /// their default values.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the map contains an unknown key, a value of
    /// the wrong type, or selects a provider other than `k8s`.
    pub fn from_map(options: Map<String, Value>) -> Result<Self> {
        let config: Self = serde_json::from_value(Value::Object(options))
            .map_err(|e| Error::Config(e.to_string()))?;

        config.validate()
    }

    /// Checks the provider name and normalizes empty values to their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the provider is not `k8s`.
    pub fn validate(mut self) -> Result<Self> {
        if self.provider != PROVIDER {
            return Err(Error::Config(format!(
                "unsupported provider {:?}, expected {PROVIDER:?}",
                self.provider
            )));
        }

        if self.namespace.is_empty() {
            self.namespace = DEFAULT_NAMESPACE.to_string();
        }

        if self
            .kubeconfig
            .as_ref()
            .is_some_and(|path| path.as_os_str().is_empty())
        {
            self.kubeconfig = None;
        }

        self.label_selector = self.label_selector.filter(|s| !s.is_empty());
        self.field_selector = self.field_selector.filter(|s| !s.is_empty());

        Ok(self)
    }

    /// Sets an explicit kubeconfig path.
    #[must_use]
    pub fn kubeconfig(mut self, path: impl Into<PathBuf>) -> Self {
        self.kubeconfig = Some(path.into());
        self
    }

    /// Sets the namespace to search for pods.
    #[must_use]
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Sets the label selector for the pod query.
    #[must_use]
    pub fn label_selector(mut self, selector: impl Into<String>) -> Self {
        self.label_selector = Some(selector.into());
        self
    }

    /// Sets the field selector for the pod query.
    #[must_use]
    pub fn field_selector(mut self, selector: impl Into<String>) -> Self {
        self.field_selector = Some(selector.into());
        self
    }

    /// Selects host networking (host IP and host ports).
    #[must_use]
    pub fn host_network(mut self, enabled: bool) -> Self {
        self.host_network = enabled;
        self
    }
}

/// Accepts either a JSON boolean or the strings `"true"` / `"false"`.
fn bool_or_string<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Text(String),
    }

    match Flag::deserialize(deserializer)? {
        Flag::Bool(value) => Ok(value),
        Flag::Text(text) if text.eq_ignore_ascii_case("true") => Ok(true),
        Flag::Text(text) if text.eq_ignore_ascii_case("false") => Ok(false),
        Flag::Text(text) => Err(de::Error::invalid_value(
            Unexpected::Str(&text),
            &"a boolean or \"true\"/\"false\"",
        )),
    }
}

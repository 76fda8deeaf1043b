//! Errors that cross the discovery boundary.
//!
//! Per-pod problems (not running, not ready, no IP, bad port annotation) are
//! never reported here; they are logged and the pod is left out of the result.

/// Error type for discovery failures.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The configuration could not be decoded or failed validation.
    #[error("invalid discovery configuration: {0}")]
    Config(String),

    /// Peers were requested before the provider was initialized.
    #[error("discovery provider is not initialized")]
    NotInitialized,

    /// Neither the kubeconfig nor the in-cluster credentials could be loaded.
    #[error("error loading kubernetes credentials: {0}")]
    Credentials(String),

    /// A Kubernetes API call failed.
    #[error("kubernetes API error: {0}")]
    Api(#[from] kube::Error),

    /// The query succeeded but no pod produced a usable address.
    #[error("no peer found")]
    NoPeersFound,
}

/// Result type for discovery operations.
pub type Result<T> = std::result::Result<T, Error>;

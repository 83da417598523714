//! Error types for the Splunk-K8s operator

use thiserror::Error;

/// Operator error type
#[derive(Error, Debug)]
pub enum Error {
    /// Kubernetes API request failed (create, update, delete, status write)
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    /// The IndexerCluster spec is structurally invalid
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Deletion finalizer logic failed while the cluster was terminating
    #[error("Termination error: {0}")]
    TerminationError(String),

    /// A resource descriptor could not be constructed from the spec
    #[error("Resource error: {0}")]
    ResourceError(String),

    /// Operator configuration problem (missing CRD, bad flags, server setup)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl Error {
    /// Whether the controller should retry quickly after this error
    ///
    /// API failures and termination failures are usually transient; a bad spec
    /// or descriptor will not fix itself until the user edits the resource.
    pub fn is_retriable(&self) -> bool {
        match self {
            Error::KubeError(kube::Error::Api(e)) => e.code >= 500 || e.code == 429 || e.code == 409,
            Error::KubeError(_) => true,
            Error::TerminationError(_) => true,
            Error::ValidationError(_)
            | Error::ResourceError(_)
            | Error::ConfigError(_)
            | Error::SerializationError(_) => false,
        }
    }

    /// Check if this error is a 404 from the API server
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::KubeError(kube::Error::Api(e)) if e.code == 404)
    }

    /// Short machine-readable category, used as a metrics label
    pub fn kind(&self) -> &'static str {
        match self {
            Error::KubeError(_) => "kube",
            Error::ValidationError(_) => "validation",
            Error::TerminationError(_) => "termination",
            Error::ResourceError(_) => "resource",
            Error::ConfigError(_) => "config",
            Error::SerializationError(_) => "serialization",
        }
    }
}

/// Result type alias for operator operations
pub type Result<T, E = Error> = std::result::Result<T, E>;

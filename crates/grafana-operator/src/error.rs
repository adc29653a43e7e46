//! Error types for the Grafana operator.

use thiserror::Error;

/// Errors that can occur while reconciling a Grafana instance.
#[derive(Debug, Error)]
pub enum Error {
    /// The requested object does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Optimistic concurrency check failed on write.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Any other Kubernetes API error.
    #[error("kubernetes error: {0}")]
    Kube(kube::Error),

    /// Applying a planned action failed.
    #[error("action {action} failed: {message}")]
    ActionFailed {
        /// Description of the action.
        action: String,
        /// Underlying cause.
        message: String,
    },

    /// Auxiliary discovery failed.
    #[error("discovery failed: {0}")]
    Discovery(String),

    /// None of the networking paths yields an admin URL.
    #[error("failed to find admin url")]
    NoAdminUrl,

    /// The reconcile was cancelled by the trigger layer.
    #[error("reconcile cancelled")]
    Cancelled,

    /// Object is missing something the operator requires.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result type for operator operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict(_))
    }
}

impl From<kube::Error> for Error {
    fn from(err: kube::Error) -> Self {
        match err {
            kube::Error::Api(resp) if resp.code == 404 => Error::NotFound(resp.message),
            kube::Error::Api(resp) if resp.code == 409 => Error::Conflict(resp.message),
            other => Error::Kube(other),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

#[cfg(test)]
pub(crate) fn api_error(code: u16, reason: &str) -> kube::Error {
    kube::Error::Api(kube::error::ErrorResponse {
        status: "Failure".to_string(),
        message: format!("{} ({})", reason, code),
        reason: reason.to_string(),
        code,
    })
}

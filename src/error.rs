//! Error types for the Simple operator

use thiserror::Error;

/// Main error type for Simple operator operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// The triggering object is missing part of its identity
    #[error("missing object key: {0}")]
    MissingObjectKey(&'static str),

    /// Validation error for resources handed to the reconciler
    #[error("validation error: {0}")]
    Validation(String),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Create a validation error with the given message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// HTTP status code of the API response, if this error carries one
    pub fn api_code(&self) -> Option<u16> {
        match self {
            Error::Kube(kube::Error::Api(resp)) => Some(resp.code),
            _ => None,
        }
    }

    /// True if the API server reported the object as missing
    pub fn is_not_found(&self) -> bool {
        self.api_code() == Some(404)
    }

    /// True if an update lost an optimistic-concurrency race
    ///
    /// The next pass re-reads every record before writing, so a plain requeue
    /// resolves it.
    pub fn is_conflict(&self) -> bool {
        self.api_code() == Some(409)
    }

    /// True if repeating the same call later may succeed
    ///
    /// Transport failures, throttling, conflicts and server-side errors are
    /// transient. Other client errors (forbidden, invalid), request building,
    /// decoding, auth and local errors are not.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Kube(kube::Error::Api(resp)) => {
                resp.code >= 500 || resp.code == 409 || resp.code == 429
            }
            Error::Kube(
                kube::Error::HyperError(_) | kube::Error::Service(_) | kube::Error::ReadEvents(_),
            ) => true,
            _ => false,
        }
    }
}

//! Provider error types

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Machine-readable classification carried by every provider error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorClass {
    /// Network failure, throttling, timeouts. Retry with backoff.
    Transient,
    /// Invalid spec, permission denied. Retry at a slow fixed cadence.
    Terminal,
    /// The external object does not exist.
    NotFound,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorClass::Transient => write!(f, "transient"),
            ErrorClass::Terminal => write!(f, "terminal"),
            ErrorClass::NotFound => write!(f, "notFound"),
        }
    }
}

/// Provider errors
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Throttled: {0}")]
    Throttled(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Invalid spec: {0}")]
    InvalidSpec(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("External object not found: {0}")]
    NotFound(String),

    #[error("Provider not found: {0}")]
    ProviderNotFound(String),

    #[error("Provider config not found: {0}")]
    ProviderConfigNotFound(String),

    #[error("Credential error: {0}")]
    Credentials(String),

    #[error("API error ({class}): {message}")]
    Api { class: ErrorClass, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ProviderError {
    pub fn class(&self) -> ErrorClass {
        match self {
            ProviderError::Throttled(_)
            | ProviderError::Network(_)
            | ProviderError::Timeout(_)
            | ProviderError::Io(_) => ErrorClass::Transient,
            ProviderError::NotFound(_) => ErrorClass::NotFound,
            ProviderError::Api { class, .. } => *class,
            ProviderError::InvalidSpec(_)
            | ProviderError::PermissionDenied(_)
            | ProviderError::AuthenticationFailed(_)
            | ProviderError::ProviderNotFound(_)
            | ProviderError::ProviderConfigNotFound(_)
            | ProviderError::Credentials(_)
            | ProviderError::Json(_) => ErrorClass::Terminal,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.class() == ErrorClass::Transient
    }

    pub fn is_terminal(&self) -> bool {
        self.class() == ErrorClass::Terminal
    }

    pub fn is_not_found(&self) -> bool {
        self.class() == ErrorClass::NotFound
    }
}

pub type Result<T> = std::result::Result<T, ProviderError>;

//! Resource store error types

use chrono::{DateTime, Utc};
use driftwood_core::ResourceKey;
use thiserror::Error;

/// Resource store errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Resource not found: {0}")]
    NotFound(ResourceKey),

    #[error("Resource already exists: {0}")]
    AlreadyExists(ResourceKey),

    #[error("Version conflict on {key}: expected {expected}, found {actual}")]
    Conflict {
        key: ResourceKey,
        expected: u64,
        actual: u64,
    },

    #[error("Resource is terminating: {0}")]
    Terminating(ResourceKey),

    #[error("Invalid owner for {key}: {reason}")]
    InvalidOwner { key: ResourceKey, reason: String },

    #[error("Lease {name} is held by {holder} until {expires_at}")]
    LeaseHeld {
        name: String,
        holder: String,
        expires_at: DateTime<Utc>,
    },

    #[error("Lease {name} is not held by {holder}")]
    LeaseLost { name: String, holder: String },

    #[error("State file error: {0}")]
    StateError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StoreError {
    /// Optimistic-lock mismatch; the caller must re-read and retry.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

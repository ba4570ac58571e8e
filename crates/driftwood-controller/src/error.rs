//! Reconcile error types
//!
//! Every failure inside a pass ends up as one of these. The dispatcher turns
//! the variant into a requeue decision; the condition manager turns it into
//! a `Synced=False` condition.

use driftwood_composition::CompositionError;
use driftwood_core::{CoreError, reason};
use driftwood_provider::{ErrorClass, ProviderError};
use driftwood_store::StoreError;
use std::time::Duration;
use thiserror::Error;

/// How the dispatcher should retry a failed pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    /// Exponential backoff keyed on the failure count
    Backoff,
    /// Slow fixed cadence
    Slow,
    /// Immediately, without counting a failure
    Immediate,
}

#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("Transient provider error: {0}")]
    TransientProvider(#[source] ProviderError),

    #[error("Terminal provider error: {0}")]
    TerminalProvider(#[source] ProviderError),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Composition failed: {0}")]
    Composition(#[from] CompositionError),

    #[error("Store error: {0}")]
    Store(#[source] StoreError),

    #[error("Reconcile pass exceeded its deadline of {0:?}")]
    Timeout(Duration),

    #[error("Invalid resource: {0}")]
    Invalid(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(#[source] Box<ReconcileError>),
}

impl ReconcileError {
    pub fn retry_class(&self) -> RetryClass {
        match self {
            ReconcileError::Conflict(_) => RetryClass::Immediate,
            ReconcileError::TerminalProvider(_) | ReconcileError::Invalid(_) => RetryClass::Slow,
            ReconcileError::TransientProvider(_)
            | ReconcileError::Composition(_)
            | ReconcileError::Store(_)
            | ReconcileError::Timeout(_) => RetryClass::Backoff,
            ReconcileError::DeleteFailed(inner) => inner.retry_class(),
        }
    }

    /// Condition reason recorded for this failure
    pub fn reason(&self) -> &'static str {
        match self {
            ReconcileError::TerminalProvider(_) | ReconcileError::Invalid(_) => reason::INVALID_SPEC,
            ReconcileError::Composition(_) => reason::COMPOSITION_FAILED,
            ReconcileError::DeleteFailed(_) => reason::DELETE_FAILED,
            _ => reason::RECONCILE_ERROR,
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, ReconcileError::Conflict(_))
    }

    pub fn delete_failed(self) -> Self {
        match self {
            // a conflict is retried immediately and never surfaced
            ReconcileError::Conflict(_) | ReconcileError::DeleteFailed(_) => self,
            other => ReconcileError::DeleteFailed(Box::new(other)),
        }
    }
}

impl From<ProviderError> for ReconcileError {
    fn from(err: ProviderError) -> Self {
        match err.class() {
            ErrorClass::Terminal => ReconcileError::TerminalProvider(err),
            // NotFound mid-pass means the object vanished; the next pass observes and recreates
            ErrorClass::Transient | ErrorClass::NotFound => ReconcileError::TransientProvider(err),
        }
    }
}

impl From<StoreError> for ReconcileError {
    fn from(err: StoreError) -> Self {
        if err.is_conflict() {
            ReconcileError::Conflict(err.to_string())
        } else {
            ReconcileError::Store(err)
        }
    }
}

impl From<CoreError> for ReconcileError {
    fn from(err: CoreError) -> Self {
        ReconcileError::Invalid(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ReconcileError>;

//! driftwood provider abstraction
//!
//! The boundary between the control plane and external systems.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │            ProviderRegistry              │
//! │   managed kind → Arc<dyn ProviderClient> │
//! └────────┬─────────────────────────────────┘
//!          │ observe / create / update / delete
//!   ┌──────▼──────┐  ┌────────────┐  ┌────────────────┐
//!   │ memory      │  │ (others)   │  │ CredentialCache│
//!   │ provider    │  │            │  │ inline/env/file│
//!   └─────────────┘  └────────────┘  └────────────────┘
//! ```
//!
//! Reconcilers never talk to an external system directly. They observe,
//! diff through the provider's [`DiffPolicy`], pick an [`Action`], and
//! classify failures by [`ErrorClass`] to choose a retry strategy.

pub mod action;
pub mod backoff;
pub mod client;
pub mod credentials;
pub mod diff;
pub mod error;
pub mod registry;

// Re-exports
pub use action::{Action, ActionType};
pub use backoff::BackoffConfig;
pub use client::{AuthStatus, CallContext, ExternalObject, Observation, ProviderClient};
pub use credentials::{CredentialCache, Credentials, resolve};
pub use diff::{DiffPolicy, FieldDiff};
pub use error::{ErrorClass, ProviderError, Result};
pub use registry::ProviderRegistry;

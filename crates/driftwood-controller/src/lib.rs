//! driftwood controller runtime
//!
//! Drives stored desired state toward the external world.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                  ControllerManager                       │
//! │        (runs controllers only while holding the lease)   │
//! │  ┌───────────────┐ ┌────────────────┐ ┌───────────────┐  │
//! │  │ Controller    │ │ Controller     │ │ Controller    │  │
//! │  │ (managed kind)│ │ (composite)    │ │ (claim)       │  │
//! │  │ queue+workers │ │ queue+workers  │ │ queue+workers │  │
//! │  └──────┬────────┘ └──────┬─────────┘ └──────┬────────┘  │
//! └─────────┼─────────────────┼──────────────────┼───────────┘
//!           │                 │                  │
//!    ProviderClient   CompositionEngine    composite upsert
//!           │                 │                  │
//!           └────────► ResourceStore ◄───────────┘
//! ```
//!
//! Every pass ends in a requeue decision: success resets the backoff,
//! conflicts retry at once, transient failures back off exponentially and
//! terminal failures retry on a slow fixed cadence. Failures surface only as
//! `Synced=False` conditions on the object.

pub mod conditions;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod leader;
pub mod manager;
pub mod phase;
pub mod queue;
pub mod rate_limit;
pub mod reconciler;

// Re-exports
pub use config::{ControllerConfig, LeaseConfig, RateLimitConfig};
pub use dispatcher::{Controller, Decision};
pub use error::{ReconcileError, Result, RetryClass};
pub use leader::LeaderElector;
pub use manager::ControllerManager;
pub use phase::Phase;
pub use queue::WorkQueue;
pub use reconciler::{
    ClaimReconciler, CompositeReconciler, Context, ManagedReconciler, Reconciler, Requeue,
};

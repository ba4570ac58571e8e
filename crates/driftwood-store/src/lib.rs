//! driftwood resource store
//!
//! The single piece of shared mutable state in a driftwood control plane.
//! Holds desired spec and observed status for every tracked object,
//! versioned for optimistic concurrency and watchable by controllers.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │                ResourceStore                  │
//! │  ┌─────────────────┐   ┌──────────────────┐   │
//! │  │ BTreeMap arena  │   │   OwnerIndex     │   │
//! │  │ key → Resource  │   │ owner ⇄ children │   │
//! │  └─────────────────┘   └──────────────────┘   │
//! │  ┌─────────────────┐   ┌──────────────────┐   │
//! │  │ broadcast watch │   │     Leases       │   │
//! │  └─────────────────┘   └──────────────────┘   │
//! └───────────────┬───────────────────────────────┘
//!                 │ snapshot / restore
//!         ┌───────▼───────┐
//!         │   StateFile   │
//!         │  state.json   │
//!         └───────────────┘
//! ```

pub mod error;
pub mod event;
pub mod index;
pub mod lease;
pub mod snapshot;
pub mod store;

// Re-exports
pub use error::{Result, StoreError};
pub use event::{ObjectRef, WatchEvent};
pub use index::{MAX_OWNERSHIP_DEPTH, OwnerIndex};
pub use lease::Lease;
pub use snapshot::{StateFile, StoreSnapshot};
pub use store::{DeleteOutcome, ResourceStore};

//! In-memory provider for driftwood
//!
//! A simulated cloud that implements [`driftwood_provider::ProviderClient`]
//! without talking to any real API. Used by the demo daemon and by the
//! controller test suite.
//!
//! # Features
//!
//! - Tag-based lookup, so a create whose response was lost is adopted
//! - Server-generated fields (`id`, `arn`, `endpoint`, `state`)
//! - Readiness after a configurable number of observations
//! - Scripted faults per operation (throttling, network, lost responses)
//! - Call counters
//!
//! # Example
//!
//! ```ignore
//! use driftwood_provider_memory::{Fault, MemoryProvider, Operation};
//!
//! let provider = MemoryProvider::new("memory").with_ready_after(2);
//! provider.inject(Operation::Create, Fault::Throttle, 2).await;
//! ```

pub mod fault;
pub mod provider;

pub use fault::{Fault, Operation};
pub use provider::{CallCounts, CloudObject, MemoryProvider};

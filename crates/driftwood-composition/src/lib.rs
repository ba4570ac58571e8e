//! driftwood composition engine
//!
//! Expands an abstract composite resource into concrete child resources.
//!
//! ```text
//! composite ──► select_composition ──► compose ──► [child, child, ...]
//!                 (pin on first use)    base
//!                                       patches (copy, interpolate,
//!                                                map, math, string, convert)
//!                                       pipeline steps
//! ```
//!
//! Everything here is synchronous and free of I/O. The composite
//! reconciler owns persistence of the results.

pub mod engine;
pub mod error;
pub mod patch;
pub mod pipeline;
pub mod prior;
pub mod selection;
pub mod transform;

// Re-exports
pub use engine::{
    COMPOSITE_LABEL, Composed, ComposedResource, CompositionEngine, DEFAULT_CHILD_API_VERSION,
    child_name,
};
pub use error::{CompositionError, Result};
pub use pipeline::{CompositionFunction, FunctionRegistry, FunctionRequest};
pub use prior::PriorState;
pub use selection::{SelectedBy, Selection, select_composition};

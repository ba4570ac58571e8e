//! モデル定義
//!
//! driftwood で使用されるデータモデルを定義します。

mod catalog;
mod composition;
mod condition;
mod definition;
mod key;
mod object;
mod provider_config;

// Re-exports
pub use catalog::*;
pub use composition::*;
pub use condition::{
    Condition, ConditionStatus, Conditions, READY, SYNCED, aggregate, reason,
};
pub use definition::*;
pub use key::*;
pub use object::*;
pub use provider_config::*;

//! driftwood-core
//!
//! 宣言的オブジェクトのデータモデル、フィールドパス、テンプレート展開、
//! KDLカタログパーサー、YAMLマニフェストローダーを提供します。

pub mod error;
pub mod fieldpath;
pub mod manifest;
pub mod model;
pub mod parser;
pub mod template;

pub use error::{CoreError, Result};
pub use fieldpath::FieldPath;
pub use manifest::{load_manifests, parse_manifests_str};
pub use model::*;
pub use parser::{parse_catalog_file, parse_catalog_str};
pub use template::TemplateProcessor;

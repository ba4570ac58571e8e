pub mod compose;
pub mod run;
pub mod validate;

use anyhow::Context;
use driftwood_core::Catalog;
use std::path::Path;

/// カタログを読み込み、参照整合性まで検証する
pub fn load_catalog(path: &Path) -> anyhow::Result<Catalog> {
    let catalog = driftwood_core::parse_catalog_file(path)
        .with_context(|| format!("カタログを読み込めません: {}", path.display()))?;
    catalog
        .validate()
        .with_context(|| format!("カタログが不正です: {}", path.display()))?;
    Ok(catalog)
}

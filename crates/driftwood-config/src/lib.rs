//! driftwoodd の設定
//!
//! 設定ファイル `driftwood.kdl` の探索とパースを担当します。
//! ファイルが見つからない場合はすべてデフォルト値で動作します。

pub mod duration;
pub mod error;
pub mod settings;

pub use duration::parse_duration;
pub use error::*;
pub use settings::{Settings, StoreSettings};

use std::path::PathBuf;
use tracing::{debug, info};

/// 設定ファイル名
pub const CONFIG_FILE_NAME: &str = "driftwood.kdl";

/// 設定ファイルパスを直接指定する環境変数
pub const CONFIG_PATH_ENV: &str = "DRIFTWOOD_CONFIG_PATH";

/// driftwood のグローバル設定ディレクトリを取得（なければ作成）
pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or(ConfigError::ConfigDirNotFound)?
        .join("driftwood");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
    }

    Ok(config_dir)
}

/// driftwood.kdl を探す
///
/// 以下の優先順位で検索:
/// 1. 環境変数 DRIFTWOOD_CONFIG_PATH
/// 2. カレントディレクトリの driftwood.kdl
/// 3. ./.driftwood/driftwood.kdl
/// 4. ~/.config/driftwood/driftwood.kdl
pub fn find_config_file() -> Result<Option<PathBuf>> {
    if let Ok(config_path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Ok(Some(path));
        }
        debug!(path = %path.display(), "{} points to a missing file", CONFIG_PATH_ENV);
    }

    let current_dir = std::env::current_dir()?;
    let local = [
        current_dir.join(CONFIG_FILE_NAME),
        current_dir.join(".driftwood").join(CONFIG_FILE_NAME),
    ];
    if let Some(path) = local.into_iter().find(|p| p.exists()) {
        return Ok(Some(path));
    }

    if let Some(config_dir) = dirs::config_dir() {
        let global = config_dir.join("driftwood").join(CONFIG_FILE_NAME);
        if global.exists() {
            return Ok(Some(global));
        }
    }

    Ok(None)
}

/// 設定を読み込む（ファイルがなければデフォルト）
pub fn load_settings() -> Result<Settings> {
    match find_config_file()? {
        Some(path) => {
            info!(path = %path.display(), "Loading settings");
            Settings::load(&path)
        }
        None => {
            debug!("No driftwood.kdl found, using defaults");
            Ok(Settings::default())
        }
    }
}

//! driftwood.kdl のパース
//!
//! ```kdl
//! controller {
//!     workers 4
//!     resync-interval "10m"
//!     pass-deadline "30s"
//!     terminal-retry-interval "5m"
//!     conflict-retries 5
//! }
//! backoff { base "500ms"; cap "5m"; jitter 0.2; }
//! credentials { ttl "60s"; }
//! lease { name "driftwood-controller"; duration "15s"; renew-interval "5s"; }
//! store { snapshot ".driftwood/state.json"; startup-grace "30s"; }
//! ```
//!
//! 未知のノードは無視し、不正な値はノード名付きのエラーにします。

use crate::duration::parse_duration;
use crate::error::{ConfigError, Result};
use driftwood_controller::ControllerConfig;
use kdl::{KdlDocument, KdlNode, KdlValue};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// ストアの永続化設定
#[derive(Debug, Clone, PartialEq)]
pub struct StoreSettings {
    /// スナップショットファイル（未指定なら永続化しない）
    pub snapshot: Option<PathBuf>,
    /// スナップショットを読めない状態をこの時間まで再試行する
    pub startup_grace: Duration,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            snapshot: None,
            startup_grace: Duration::from_secs(30),
        }
    }
}

/// デーモン設定
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub controller: ControllerConfig,
    pub store: StoreSettings,
}

impl Settings {
    /// ファイルから読み込む
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_kdl_str(&content)
    }

    /// KDL文字列からパース（未指定の値はデフォルト）
    pub fn from_kdl_str(content: &str) -> Result<Self> {
        let doc: KdlDocument = content.parse()?;
        let mut settings = Settings::default();

        for node in doc.nodes() {
            match node.name().value() {
                "controller" => parse_controller(node, &mut settings.controller)?,
                "backoff" => parse_backoff(node, &mut settings.controller)?,
                "credentials" => {
                    for child in children(node) {
                        if child.name().value() == "ttl" {
                            settings.controller.credential_ttl = duration(child)?;
                        }
                    }
                }
                "lease" => parse_lease(node, &mut settings.controller)?,
                "store" => parse_store(node, &mut settings.store)?,
                other => debug!(node = other, "Skipping unknown config node"),
            }
        }

        Ok(settings)
    }
}

fn parse_controller(node: &KdlNode, config: &mut ControllerConfig) -> Result<()> {
    for child in children(node) {
        match child.name().value() {
            "workers" => {
                let workers = integer(child)?;
                if workers == 0 {
                    return Err(ConfigError::invalid("workers", "must be at least 1"));
                }
                config.workers = usize::try_from(workers)
                    .map_err(|_| ConfigError::invalid("workers", "too large"))?;
            }
            "resync-interval" => config.resync_interval = nonzero(child)?,
            "pass-deadline" => config.pass_deadline = nonzero(child)?,
            "terminal-retry-interval" => config.terminal_retry_interval = nonzero(child)?,
            "poll-interval" => config.poll_interval = nonzero(child)?,
            "conflict-retries" => {
                config.conflict_retries = u32::try_from(integer(child)?)
                    .map_err(|_| ConfigError::invalid("conflict-retries", "too large"))?;
            }
            "rate-limit" => {
                if let Some(qps) = child.get("qps") {
                    config.rate_limit.qps = number(child, qps)?;
                }
                if let Some(burst) = child.get("burst") {
                    let burst = burst
                        .as_integer()
                        .and_then(|b| u32::try_from(b).ok())
                        .ok_or_else(|| ConfigError::invalid("rate-limit", "burst must be a non-negative integer"))?;
                    config.rate_limit.burst = burst;
                }
            }
            other => debug!(node = other, "Skipping unknown controller setting"),
        }
    }
    Ok(())
}

fn parse_backoff(node: &KdlNode, config: &mut ControllerConfig) -> Result<()> {
    for child in children(node) {
        match child.name().value() {
            "base" => config.backoff.base_delay_ms = millis(child)?,
            "cap" => config.backoff.max_delay_ms = millis(child)?,
            "multiplier" => {
                let multiplier = number(child, arg(child)?)?;
                if multiplier < 1.0 {
                    return Err(ConfigError::invalid("multiplier", "must be at least 1.0"));
                }
                config.backoff.multiplier = multiplier;
            }
            "jitter" => {
                let jitter = number(child, arg(child)?)?;
                if !(0.0..=1.0).contains(&jitter) {
                    return Err(ConfigError::invalid("jitter", "must be between 0.0 and 1.0"));
                }
                config.backoff.jitter = jitter;
            }
            other => debug!(node = other, "Skipping unknown backoff setting"),
        }
    }
    if config.backoff.base_delay_ms > config.backoff.max_delay_ms {
        return Err(ConfigError::invalid("backoff", "base must not exceed cap"));
    }
    Ok(())
}

fn parse_lease(node: &KdlNode, config: &mut ControllerConfig) -> Result<()> {
    for child in children(node) {
        match child.name().value() {
            "name" => config.lease.name = string(child)?,
            "duration" => config.lease.duration = nonzero(child)?,
            "renew-interval" => config.lease.renew_interval = nonzero(child)?,
            "enabled" => {
                config.lease.enabled = arg(child)?
                    .as_bool()
                    .ok_or_else(|| ConfigError::invalid("enabled", "expected #true or #false"))?;
            }
            other => debug!(node = other, "Skipping unknown lease setting"),
        }
    }
    if config.lease.renew_interval >= config.lease.duration {
        return Err(ConfigError::invalid(
            "lease",
            "renew-interval must be shorter than duration",
        ));
    }
    Ok(())
}

fn parse_store(node: &KdlNode, store: &mut StoreSettings) -> Result<()> {
    for child in children(node) {
        match child.name().value() {
            "snapshot" => store.snapshot = Some(PathBuf::from(string(child)?)),
            "startup-grace" => store.startup_grace = duration(child)?,
            other => debug!(node = other, "Skipping unknown store setting"),
        }
    }
    Ok(())
}

fn children(node: &KdlNode) -> impl Iterator<Item = &KdlNode> {
    node.children().into_iter().flat_map(|doc| doc.nodes())
}

/// 最初の位置引数
fn arg(node: &KdlNode) -> Result<&KdlValue> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .map(|e| e.value())
        .ok_or_else(|| ConfigError::invalid(node.name().value(), "missing value"))
}

fn string(node: &KdlNode) -> Result<String> {
    arg(node)?
        .as_string()
        .map(str::to_string)
        .ok_or_else(|| ConfigError::invalid(node.name().value(), "expected a string"))
}

fn integer(node: &KdlNode) -> Result<u64> {
    arg(node)?
        .as_integer()
        .and_then(|i| u64::try_from(i).ok())
        .ok_or_else(|| ConfigError::invalid(node.name().value(), "expected a non-negative integer"))
}

fn number(node: &KdlNode, value: &KdlValue) -> Result<f64> {
    value
        .as_float()
        .or_else(|| value.as_integer().map(|i| i as f64))
        .ok_or_else(|| ConfigError::invalid(node.name().value(), "expected a number"))
}

/// `"30s"` 形式の文字列、または秒数の整数
fn duration(node: &KdlNode) -> Result<Duration> {
    let value = arg(node)?;
    if let Some(text) = value.as_string() {
        return parse_duration(text);
    }
    value
        .as_integer()
        .and_then(|i| u64::try_from(i).ok())
        .map(Duration::from_secs)
        .ok_or_else(|| ConfigError::invalid(node.name().value(), "expected a duration such as \"30s\""))
}

fn nonzero(node: &KdlNode) -> Result<Duration> {
    let value = duration(node)?;
    if value.is_zero() {
        return Err(ConfigError::invalid(node.name().value(), "must be greater than zero"));
    }
    Ok(value)
}

fn millis(node: &KdlNode) -> Result<u64> {
    u64::try_from(duration(node)?.as_millis())
        .map_err(|_| ConfigError::invalid(node.name().value(), "too large"))
}

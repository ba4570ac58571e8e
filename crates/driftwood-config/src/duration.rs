//! 期間文字列のパース
//!
//! `"500ms"`, `"30s"`, `"10m"`, `"1h"` の形式。単位なしの整数は秒として扱います。

use crate::error::{ConfigError, Result};
use std::time::Duration;

pub fn parse_duration(input: &str) -> Result<Duration> {
    let text = input.trim();
    let invalid = || ConfigError::InvalidDuration(input.to_string());

    let split = text
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(text.len());
    let (digits, unit) = text.split_at(split);
    if digits.is_empty() {
        return Err(invalid());
    }
    let value: u64 = digits.parse().map_err(|_| invalid())?;

    let duration = match unit.trim() {
        "ms" => Duration::from_millis(value),
        "" | "s" => Duration::from_secs(value),
        "m" => Duration::from_secs(value.checked_mul(60).ok_or_else(invalid)?),
        "h" => Duration::from_secs(value.checked_mul(3600).ok_or_else(invalid)?),
        _ => return Err(invalid()),
    };
    Ok(duration)
}

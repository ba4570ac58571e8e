//! ステータスコンディション
//!
//! 型（type）をキーとした順序付きのコンディション集合と、
//! その合成ルールを定義します。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 外部リソースへの反映状態
pub const SYNCED: &str = "Synced";
/// 外部リソースの稼働状態
pub const READY: &str = "Ready";

/// 標準のreason
pub mod reason {
    pub const RECONCILE_SUCCESS: &str = "ReconcileSuccess";
    pub const RECONCILE_ERROR: &str = "ReconcileError";
    pub const RECONCILE_PAUSED: &str = "ReconcilePaused";
    pub const INVALID_SPEC: &str = "InvalidSpec";
    pub const DELETE_FAILED: &str = "DeleteFailed";
    pub const COMPOSITION_FAILED: &str = "CompositionFailed";
    pub const AVAILABLE: &str = "Available";
    pub const UNAVAILABLE: &str = "Unavailable";
    pub const CREATING: &str = "Creating";
    pub const DELETING: &str = "Deleting";
    pub const WAITING_FOR_CHILDREN: &str = "WaitingForChildren";
    pub const WAITING_FOR_SEQUENCE: &str = "WaitingForSequence";
    pub const CHILDREN_SYNC_FAILED: &str = "ChildrenSyncFailed";
}

/// コンディションの真偽値
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

impl ConditionStatus {
    /// 制約の強い方を返す（False < Unknown < True）
    pub fn and(self, other: ConditionStatus) -> ConditionStatus {
        use ConditionStatus::*;
        match (self, other) {
            (False, _) | (_, False) => False,
            (Unknown, _) | (_, Unknown) => Unknown,
            (True, True) => True,
        }
    }

    pub fn from_bool(value: bool) -> Self {
        if value { Self::True } else { Self::False }
    }

    pub fn is_true(self) -> bool {
        self == Self::True
    }
}

impl fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConditionStatus::True => write!(f, "True"),
            ConditionStatus::False => write!(f, "False"),
            ConditionStatus::Unknown => write!(f, "Unknown"),
        }
    }
}

/// 単一のコンディション
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: ConditionStatus,
    pub reason: String,
    #[serde(default)]
    pub message: String,
    pub last_transition_time: DateTime<Utc>,
}

impl Condition {
    pub fn new(
        type_: impl Into<String>,
        status: ConditionStatus,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            type_: type_.into(),
            status,
            reason: reason.into(),
            message: String::new(),
            last_transition_time: now,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn synced(now: DateTime<Utc>) -> Self {
        Self::new(SYNCED, ConditionStatus::True, reason::RECONCILE_SUCCESS, now)
    }

    pub fn sync_failed(reason: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self::new(SYNCED, ConditionStatus::False, reason, now)
    }

    pub fn available(now: DateTime<Utc>) -> Self {
        Self::new(READY, ConditionStatus::True, reason::AVAILABLE, now)
    }

    pub fn unavailable(now: DateTime<Utc>) -> Self {
        Self::new(READY, ConditionStatus::False, reason::UNAVAILABLE, now)
    }

    pub fn creating(now: DateTime<Utc>) -> Self {
        Self::new(READY, ConditionStatus::False, reason::CREATING, now)
    }

    pub fn deleting(now: DateTime<Utc>) -> Self {
        Self::new(READY, ConditionStatus::False, reason::DELETING, now)
    }

    /// type + status + reason が同一か（メッセージとタイムスタンプは比較しない）
    fn same_transition(&self, other: &Condition) -> bool {
        self.type_ == other.type_ && self.status == other.status && self.reason == other.reason
    }
}

/// 型をキーとした順序付きコンディション集合
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Conditions(Vec<Condition>);

impl Conditions {
    pub fn new() -> Self {
        Self::default()
    }

    /// コンディションをマージする
    ///
    /// - type + status + reason が変わらなければ `lastTransitionTime` を維持
    ///   （メッセージのみ更新）
    /// - いずれかが変われば新しいタイムスタンプを採用
    /// - 未登録の type は末尾に追加
    ///
    /// 集合が変化した場合に `true` を返します。
    pub fn set(&mut self, condition: Condition) -> bool {
        match self.0.iter_mut().find(|c| c.type_ == condition.type_) {
            Some(existing) if existing.same_transition(&condition) => {
                if existing.message == condition.message {
                    false
                } else {
                    existing.message = condition.message;
                    true
                }
            }
            Some(existing) => {
                *existing = condition;
                true
            }
            None => {
                self.0.push(condition);
                true
            }
        }
    }

    /// 複数のコンディションをまとめてマージ
    pub fn set_all(&mut self, conditions: impl IntoIterator<Item = Condition>) -> bool {
        conditions
            .into_iter()
            .fold(false, |changed, c| self.set(c) || changed)
    }

    pub fn get(&self, type_: &str) -> Option<&Condition> {
        self.0.iter().find(|c| c.type_ == type_)
    }

    /// 指定typeのステータス（未登録なら Unknown）
    pub fn status_of(&self, type_: &str) -> ConditionStatus {
        self.get(type_)
            .map(|c| c.status)
            .unwrap_or(ConditionStatus::Unknown)
    }

    pub fn is_true(&self, type_: &str) -> bool {
        self.status_of(type_).is_true()
    }

    pub fn remove(&mut self, type_: &str) -> bool {
        let before = self.0.len();
        self.0.retain(|c| c.type_ != type_);
        before != self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Condition> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// 子リソースのコンディションを AND で合成する
///
/// 子が存在しない場合は True（空集合に対する全称）。
pub fn aggregate<'a>(
    children: impl IntoIterator<Item = &'a Conditions>,
    type_: &str,
) -> ConditionStatus {
    children
        .into_iter()
        .map(|c| c.status_of(type_))
        .fold(ConditionStatus::True, ConditionStatus::and)
}

//! フィールドパス
//!
//! `spec.forProvider.tags[0]` のようなパスで JSON ドキュメントを読み書きします。
//! `[...]` 内が数値なら配列インデックス、それ以外はオブジェクトキー
//! （`metadata.labels[app.example.org/name]` のようにドットを含むキー用）。

use crate::error::{CoreError, Result};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    Field(String),
    Index(usize),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldPath {
    segments: Vec<Segment>,
}

impl FieldPath {
    pub fn parse(path: &str) -> Result<Self> {
        let invalid = |message: &str| CoreError::InvalidFieldPath {
            path: path.to_string(),
            message: message.to_string(),
        };

        let mut segments = Vec::new();
        let mut current = String::new();
        let mut chars = path.chars().peekable();
        let mut after_bracket = false;

        while let Some(c) = chars.next() {
            let was_bracket = std::mem::replace(&mut after_bracket, false);
            match c {
                '.' => {
                    if current.is_empty() {
                        // "a[0].b" のように ] の直後の . のみ許可
                        if !was_bracket {
                            return Err(invalid("empty segment"));
                        }
                    } else {
                        segments.push(Segment::Field(std::mem::take(&mut current)));
                    }
                    if chars.peek().is_none() {
                        return Err(invalid("trailing '.'"));
                    }
                }
                '[' => {
                    if !current.is_empty() {
                        segments.push(Segment::Field(std::mem::take(&mut current)));
                    }
                    let mut inner = String::new();
                    let mut closed = false;
                    for c in chars.by_ref() {
                        if c == ']' {
                            closed = true;
                            break;
                        }
                        inner.push(c);
                    }
                    if !closed {
                        return Err(invalid("unclosed '['"));
                    }
                    if inner.is_empty() {
                        return Err(invalid("empty brackets"));
                    }
                    match inner.parse::<usize>() {
                        Ok(index) => segments.push(Segment::Index(index)),
                        Err(_) => segments.push(Segment::Field(inner)),
                    }
                    after_bracket = true;
                }
                ']' => return Err(invalid("unexpected ']'")),
                _ => current.push(c),
            }
        }
        if !current.is_empty() {
            segments.push(Segment::Field(current));
        }
        if segments.is_empty() {
            return Err(invalid("empty path"));
        }

        Ok(Self { segments })
    }

    /// セグメント列から構築（空なら `None`）
    pub fn from_segments(segments: Vec<Segment>) -> Option<Self> {
        (!segments.is_empty()).then_some(Self { segments })
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// `self` が `other` の先頭部分と一致するか
    pub fn is_prefix_of(&self, other: &[Segment]) -> bool {
        other.starts_with(&self.segments)
    }

    /// 先頭セグメントが指定フィールドか
    pub fn starts_with_field(&self, field: &str) -> bool {
        matches!(self.segments.first(), Some(Segment::Field(f)) if f == field)
    }

    /// 先頭セグメントを取り除いたパス（`status.endpoint` → `endpoint`）
    pub fn strip_first(&self) -> Option<FieldPath> {
        if self.segments.len() < 2 {
            return None;
        }
        Some(Self {
            segments: self.segments[1..].to_vec(),
        })
    }

    pub fn get<'a>(&self, value: &'a Value) -> Option<&'a Value> {
        self.segments
            .iter()
            .try_fold(value, |current, segment| match segment {
                Segment::Field(name) => current.as_object()?.get(name),
                Segment::Index(i) => current.as_array()?.get(*i),
            })
    }

    /// 値を書き込む。途中のオブジェクト/配列は必要に応じて作成する。
    ///
    /// 既存の非コンテナ値を経由する場合はエラー。
    pub fn set(&self, target: &mut Value, new_value: Value) -> Result<()> {
        let mut current = target;
        let last = self.segments.len() - 1;

        for (i, segment) in self.segments.iter().enumerate() {
            if current.is_null() {
                *current = match segment {
                    Segment::Field(_) => Value::Object(Map::new()),
                    Segment::Index(_) => Value::Array(Vec::new()),
                };
            }

            current = match segment {
                Segment::Field(name) => {
                    let object = current.as_object_mut().ok_or_else(|| {
                        self.type_error(&format!("'{}' is not an object", name))
                    })?;
                    if i == last {
                        object.insert(name.clone(), new_value);
                        return Ok(());
                    }
                    object.entry(name.clone()).or_insert(Value::Null)
                }
                Segment::Index(index) => {
                    let array = current.as_array_mut().ok_or_else(|| {
                        self.type_error(&format!("[{}] is not an array", index))
                    })?;
                    if array.len() <= *index {
                        array.resize(index + 1, Value::Null);
                    }
                    if i == last {
                        array[*index] = new_value;
                        return Ok(());
                    }
                    &mut array[*index]
                }
            };
        }

        Ok(())
    }

    /// 値を削除して返す
    pub fn remove(&self, target: &mut Value) -> Option<Value> {
        let (last, parents) = self.segments.split_last()?;
        let mut current = target;
        for segment in parents {
            current = match segment {
                Segment::Field(name) => current.as_object_mut()?.get_mut(name)?,
                Segment::Index(i) => current.as_array_mut()?.get_mut(*i)?,
            };
        }
        match last {
            Segment::Field(name) => current.as_object_mut()?.remove(name),
            Segment::Index(i) => {
                let array = current.as_array_mut()?;
                (*i < array.len()).then(|| array.remove(*i))
            }
        }
    }

    fn type_error(&self, message: &str) -> CoreError {
        CoreError::InvalidFieldPath {
            path: self.to_string(),
            message: message.to_string(),
        }
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Field(name) if name.contains('.') => write!(f, "[{}]", name)?,
                Segment::Field(name) => {
                    if i > 0 {
                        write!(f, ".")?;
                    }
                    write!(f, "{}", name)?;
                }
                Segment::Index(index) => write!(f, "[{}]", index)?,
            }
        }
        Ok(())
    }
}

impl FromStr for FieldPath {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

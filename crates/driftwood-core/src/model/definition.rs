//! CompositeResourceDefinition (XRD)
//!
//! 抽象kindのスキーマと、それに対応するClaim kindを宣言します。

use crate::error::{CoreError, Result};
use crate::fieldpath::FieldPath;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// スキーマフィールドの型
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Integer,
    Number,
    Boolean,
    Object,
    Array,
    #[default]
    Any,
}

impl FieldType {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "string" => Some(Self::String),
            "integer" | "int" => Some(Self::Integer),
            "number" | "float" => Some(Self::Number),
            "boolean" | "bool" => Some(Self::Boolean),
            "object" => Some(Self::Object),
            "array" => Some(Self::Array),
            "any" => Some(Self::Any),
            _ => None,
        }
    }

    pub fn accepts(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Object => value.is_object(),
            Self::Array => value.is_array(),
            Self::Any => true,
        }
    }
}

/// スキーマフィールド（spec 配下のドット区切りパス）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaField {
    pub name: String,
    #[serde(default)]
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

/// CompositeResourceDefinition
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositeResourceDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    pub composite_kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claim_kind: Option<String>,
    #[serde(default)]
    pub fields: Vec<SchemaField>,
    /// セレクタも参照もない場合に使うComposition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_composition: Option<String>,
}

impl CompositeResourceDefinition {
    pub fn field(&self, name: &str) -> Option<&SchemaField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// spec をスキーマで検証し、デフォルト値を埋めた spec を返す
    ///
    /// 検証対象は必須フィールドの存在、デフォルト値、プリミティブ型のみ。
    /// スキーマにないフィールドはそのまま通す。
    pub fn validate_spec(&self, spec: &Value) -> Result<Value> {
        let mut spec = if spec.is_null() {
            Value::Object(Default::default())
        } else {
            spec.clone()
        };
        if !spec.is_object() {
            return Err(self.violation("spec", "spec must be an object"));
        }

        for field in &self.fields {
            let path = FieldPath::parse(&field.name)?;
            match path.get(&spec) {
                Some(value) if !value.is_null() => {
                    if !field.field_type.accepts(value) {
                        return Err(self.violation(
                            &field.name,
                            &format!("expected {:?}, got {}", field.field_type, value),
                        ));
                    }
                }
                _ => {
                    if let Some(default) = &field.default {
                        path.set(&mut spec, default.clone())?;
                    } else if field.required {
                        return Err(self.violation(&field.name, "required field is missing"));
                    }
                }
            }
        }

        Ok(spec)
    }

    /// 定義の更新が許されるかチェック
    ///
    /// インスタンスが存在する間は、任意フィールドの追加のみ許可。
    pub fn check_update(&self, next: &CompositeResourceDefinition, instances_exist: bool) -> Result<()> {
        if !instances_exist || self == next {
            return Ok(());
        }
        let incompatible = |message: String| CoreError::IncompatibleDefinition {
            name: self.name.clone(),
            message,
        };

        if self.composite_kind != next.composite_kind || self.claim_kind != next.claim_kind {
            return Err(incompatible("kind names cannot change".to_string()));
        }
        if self.group != next.group {
            return Err(incompatible("group cannot change".to_string()));
        }

        for field in &self.fields {
            match next.field(&field.name) {
                None => {
                    return Err(incompatible(format!("field '{}' was removed", field.name)));
                }
                Some(updated) if updated != field => {
                    return Err(incompatible(format!("field '{}' was modified", field.name)));
                }
                Some(_) => {}
            }
        }
        for field in &next.fields {
            if self.field(&field.name).is_none() && field.required && field.default.is_none() {
                return Err(incompatible(format!(
                    "new field '{}' must be optional or have a default",
                    field.name
                )));
            }
        }

        Ok(())
    }

    fn violation(&self, field: &str, message: &str) -> CoreError {
        CoreError::SchemaViolation {
            kind: self.composite_kind.clone(),
            field: field.to_string(),
            message: message.to_string(),
        }
    }
}

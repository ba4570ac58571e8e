//! Value transforms applied by patches

use driftwood_core::{ConvertTarget, StringCase, TemplateProcessor, Transform};
use serde_json::{Number, Value};

/// Apply `transforms` left to right. Errors are plain messages; the caller
/// attaches the resource context.
pub fn apply_all(transforms: &[Transform], value: Value) -> Result<Value, String> {
    transforms
        .iter()
        .try_fold(value, |value, transform| apply(transform, value))
}

pub fn apply(transform: &Transform, value: Value) -> Result<Value, String> {
    match transform {
        Transform::Map { pairs, default } => {
            let key = scalar_to_string(&value)
                .ok_or_else(|| format!("map: cannot use {} as a key", type_name(&value)))?;
            match pairs.get(&key).or(default.as_ref()) {
                Some(mapped) => Ok(mapped.clone()),
                None => Err(format!("map: no entry for '{}'", key)),
            }
        }
        Transform::Math {
            multiply,
            add,
            clamp_min,
            clamp_max,
        } => {
            let input = value
                .as_f64()
                .ok_or_else(|| format!("math: expected a number, got {}", type_name(&value)))?;
            let mut result = input * multiply.unwrap_or(1.0) + add.unwrap_or(0.0);
            if let Some(min) = clamp_min {
                result = result.max(*min);
            }
            if let Some(max) = clamp_max {
                result = result.min(*max);
            }
            number_value(result, value.is_i64() || value.is_u64())
        }
        Transform::String {
            format,
            case,
            trim_prefix,
            trim_suffix,
        } => {
            let mut text = scalar_to_string(&value)
                .ok_or_else(|| format!("string: cannot format {}", type_name(&value)))?;
            if let Some(prefix) = trim_prefix
                && let Some(rest) = text.strip_prefix(prefix.as_str())
            {
                text = rest.to_string();
            }
            if let Some(suffix) = trim_suffix
                && let Some(rest) = text.strip_suffix(suffix.as_str())
            {
                text = rest.to_string();
            }
            match case {
                Some(StringCase::Upper) => text = text.to_uppercase(),
                Some(StringCase::Lower) => text = text.to_lowercase(),
                None => {}
            }
            if let Some(format) = format {
                let mut processor = TemplateProcessor::new();
                processor.add_variable("value", &Value::String(text));
                text = processor.render_str(format).map_err(|e| e.to_string())?;
            }
            Ok(Value::String(text))
        }
        Transform::Convert { to } => convert(value, *to),
    }
}

fn convert(value: Value, to: ConvertTarget) -> Result<Value, String> {
    let fail = |value: &Value| format!("convert: cannot convert {} to {:?}", value, to);
    match to {
        ConvertTarget::String => scalar_to_string(&value)
            .map(Value::String)
            .ok_or_else(|| fail(&value)),
        ConvertTarget::Integer => match &value {
            Value::Number(n) if n.is_i64() || n.is_u64() => Ok(value),
            Value::Number(n) => n
                .as_f64()
                .filter(|f| f.is_finite())
                .map(|f| Value::from(f.trunc() as i64))
                .ok_or_else(|| fail(&value)),
            Value::String(s) => s
                .trim()
                .parse::<i64>()
                .map(Value::from)
                .map_err(|_| fail(&value)),
            Value::Bool(b) => Ok(Value::from(i64::from(*b))),
            _ => Err(fail(&value)),
        },
        ConvertTarget::Float => match &value {
            Value::Number(n) => n
                .as_f64()
                .and_then(Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| fail(&value)),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| fail(&value)),
            _ => Err(fail(&value)),
        },
        ConvertTarget::Boolean => match &value {
            Value::Bool(_) => Ok(value),
            Value::String(s) => match s.trim().to_lowercase().as_str() {
                "true" | "yes" | "1" => Ok(Value::Bool(true)),
                "false" | "no" | "0" => Ok(Value::Bool(false)),
                _ => Err(fail(&value)),
            },
            Value::Number(n) => Ok(Value::Bool(n.as_f64().is_some_and(|f| f != 0.0))),
            _ => Err(fail(&value)),
        },
    }
}

/// Keep integers integral when the input was an integer and the result is whole.
fn number_value(result: f64, integral_input: bool) -> Result<Value, String> {
    if !result.is_finite() {
        return Err(format!("math: result {} is not finite", result));
    }
    if integral_input && result.fract() == 0.0 && result.abs() < 9.007_199_254_740_992e15 {
        return Ok(Value::from(result as i64));
    }
    Number::from_f64(result)
        .map(Value::Number)
        .ok_or_else(|| format!("math: result {} is not representable", result))
}

pub(crate) fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn size_map() -> Transform {
        Transform::Map {
            pairs: BTreeMap::from([
                ("small".to_string(), json!("db.t3.micro")),
                ("large".to_string(), json!("db.r5.large")),
            ]),
            default: None,
        }
    }

    #[test]
    fn test_map() {
        assert_eq!(apply(&size_map(), json!("small")).unwrap(), json!("db.t3.micro"));
        assert!(apply(&size_map(), json!("huge")).is_err());

        let with_default = Transform::Map {
            pairs: BTreeMap::new(),
            default: Some(json!("db.t3.medium")),
        };
        assert_eq!(apply(&with_default, json!("huge")).unwrap(), json!("db.t3.medium"));
    }

    #[test]
    fn test_math_keeps_integers() {
        let math = Transform::Math {
            multiply: Some(1.0),
            add: Some(20.0),
            clamp_min: None,
            clamp_max: Some(100.0),
        };
        assert_eq!(apply(&math, json!(10)).unwrap(), json!(30));
        assert_eq!(apply(&math, json!(500)).unwrap(), json!(100));
        assert_eq!(apply(&math, json!(1.5)).unwrap(), json!(21.5));
        assert!(apply(&math, json!("ten")).is_err());
    }

    #[test]
    fn test_string() {
        let transform = Transform::String {
            format: Some("{{ value }}-primary".to_string()),
            case: Some(StringCase::Lower),
            trim_prefix: Some("DB-".to_string()),
            trim_suffix: None,
        };
        assert_eq!(apply(&transform, json!("DB-Orders")).unwrap(), json!("orders-primary"));
    }

    #[test]
    fn test_convert() {
        let to = |target| Transform::Convert { to: target };
        assert_eq!(apply(&to(ConvertTarget::String), json!(20)).unwrap(), json!("20"));
        assert_eq!(apply(&to(ConvertTarget::Integer), json!("42")).unwrap(), json!(42));
        assert_eq!(apply(&to(ConvertTarget::Float), json!("1.5")).unwrap(), json!(1.5));
        assert_eq!(apply(&to(ConvertTarget::Boolean), json!("yes")).unwrap(), json!(true));
        assert!(apply(&to(ConvertTarget::Integer), json!("abc")).is_err());
    }

    #[test]
    fn test_chain() {
        let chain = vec![
            size_map(),
            Transform::String {
                format: None,
                case: Some(StringCase::Upper),
                trim_prefix: None,
                trim_suffix: None,
            },
        ];
        assert_eq!(apply_all(&chain, json!("large")).unwrap(), json!("DB.R5.LARGE"));
    }
}

//! KDL値 → JSON値の変換

use kdl::{KdlNode, KdlValue};
use serde_json::{Map, Value};

/// KDL値をJSON値に変換
pub fn kdl_value_to_json(value: &KdlValue) -> Value {
    if let Some(s) = value.as_string() {
        Value::String(s.to_string())
    } else if let Some(i) = value.as_integer() {
        // i128をi64に変換してからJSONに変換
        Value::Number((i as i64).into())
    } else if let Some(f) = value.as_float() {
        serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    } else if let Some(b) = value.as_bool() {
        Value::Bool(b)
    } else {
        Value::Null
    }
}

/// 最初の位置引数（プロパティは除く）
pub fn first_arg(node: &KdlNode) -> Option<&KdlValue> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .map(|e| e.value())
}

pub fn first_string(node: &KdlNode) -> Option<String> {
    first_arg(node)
        .and_then(|v| v.as_string())
        .map(|s| s.to_string())
}

pub fn prop_string(node: &KdlNode, key: &str) -> Option<String> {
    node.get(key)
        .and_then(|v| v.as_string())
        .map(|s| s.to_string())
}

pub fn prop_f64(node: &KdlNode, key: &str) -> Option<f64> {
    node.get(key)
        .and_then(|v| v.as_float().or_else(|| v.as_integer().map(|i| i as f64)))
}

pub fn prop_bool(node: &KdlNode, key: &str) -> Option<bool> {
    node.get(key).and_then(|v| v.as_bool())
}

/// すべてのプロパティ（キー順）
pub fn props(node: &KdlNode) -> impl Iterator<Item = (&str, &KdlValue)> {
    node.entries()
        .iter()
        .filter_map(|e| e.name().map(|n| (n.value(), e.value())))
}

/// ノードの子ブロックをJSONオブジェクトへ変換
///
/// - 子ブロックを持つノード → オブジェクト（子がすべて `-` なら配列）
/// - 位置引数が複数 → 配列
/// - 位置引数が1つ → スカラー
/// - プロパティのみ → オブジェクト
pub fn children_to_json(node: &KdlNode) -> Value {
    let Some(children) = node.children() else {
        return Value::Object(Map::new());
    };

    let nodes = children.nodes();
    if !nodes.is_empty() && nodes.iter().all(|n| n.name().value() == "-") {
        return Value::Array(nodes.iter().map(node_to_json).collect());
    }

    let mut object = Map::new();
    for child in nodes {
        object.insert(child.name().value().to_string(), node_to_json(child));
    }
    Value::Object(object)
}

/// 単一ノードの値をJSONへ変換
pub fn node_to_json(node: &KdlNode) -> Value {
    if node.children().is_some() {
        return children_to_json(node);
    }

    let args: Vec<Value> = node
        .entries()
        .iter()
        .filter(|e| e.name().is_none())
        .map(|e| kdl_value_to_json(e.value()))
        .collect();
    let props: Map<String, Value> = props(node)
        .map(|(k, v)| (k.to_string(), kdl_value_to_json(v)))
        .collect();

    match (args.len(), props.is_empty()) {
        (0, false) => Value::Object(props),
        (0, true) => Value::Null,
        (1, _) => args.into_iter().next().unwrap_or(Value::Null),
        _ => Value::Array(args),
    }
}

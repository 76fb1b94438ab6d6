use crate::context::Decoded;
use crate::diagnostics::{Diagnostic, DiagnosticKind, Severity};
use crate::tree::{NodeRef, Value};
use serde::Serialize;
use serde_json::Value as JsonValue;

/// A JSON-serializable representation of one decoded node.
///
/// Used for `bitdump --json` and by anything that wants the tree without
/// linking against the arena types.
#[derive(Debug, Serialize)]
pub struct JsonNode {
    pub name: String,
    pub kind: &'static str,
    pub start_bit: u64,
    pub bit_len: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    /// Leaf value; byte strings are lowercase hex.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<JsonNode>>,
}

#[derive(Debug, Serialize)]
pub struct JsonDiagnostic {
    pub severity: Severity,
    pub kind: DiagnosticKind,
    pub message: String,
    pub start_bit: u64,
    pub bit_len: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct JsonDecoded {
    pub root: JsonNode,
    pub diagnostics: Vec<JsonDiagnostic>,
}

/// Whole decode result: tree from the root plus every diagnostic.
pub fn decoded_to_json(decoded: &Decoded, max_depth: usize) -> JsonDecoded {
    JsonDecoded {
        root: node_to_json(decoded.root(), max_depth),
        diagnostics: decoded.diagnostics.iter().map(diagnostic_to_json).collect(),
    }
}

/// `max_depth` limits how many scope levels below `node` get children.
pub fn node_to_json(node: NodeRef<'_>, max_depth: usize) -> JsonNode {
    let value = node.value();
    let children = if value.is_scope() {
        Some(if max_depth == 0 {
            Vec::new()
        } else {
            node.children()
                .map(|c| node_to_json(c, max_depth - 1))
                .collect()
        })
    } else {
        None
    };

    JsonNode {
        name: node.name().to_string(),
        kind: value.kind(),
        start_bit: node.range().start,
        bit_len: node.range().len,
        format: node.format().map(str::to_string),
        value: leaf_value(value),
        children,
    }
}

fn leaf_value(value: &Value) -> Option<JsonValue> {
    match value {
        Value::Unsigned { value, .. } => Some(JsonValue::from(*value)),
        Value::Signed { value, .. } => Some(JsonValue::from(*value)),
        Value::Float { value, .. } => Some(JsonValue::from(*value)),
        Value::Bool(b) => Some(JsonValue::Bool(*b)),
        Value::Bytes(b) => Some(JsonValue::String(hex::encode(b))),
        Value::Utf8(s) => Some(JsonValue::String(s.clone())),
        Value::Compound(_) | Value::Sequence(_) => None,
    }
}

fn diagnostic_to_json(d: &Diagnostic) -> JsonDiagnostic {
    JsonDiagnostic {
        severity: d.severity,
        kind: d.kind,
        message: d.message.clone(),
        start_bit: d.range.start,
        bit_len: d.range.len,
        format: d.format.as_deref().map(str::to_string),
    }
}

use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

pub(crate) static NON_ALPHANUMERIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9]+").expect("valid regex"));

/// Reduce an arbitrary label to a CSV-friendly column name.
pub fn sanitize_col(name: &str) -> String {
    let replaced = NON_ALPHANUMERIC.replace_all(name, "_");
    let trimmed = replaced.trim_matches('_');
    if trimmed.is_empty() {
        "unnamed".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Render a JSON value as a single CSV cell.
pub fn cell_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

fn is_container(value: &Value) -> bool {
    matches!(value, Value::Array(_) | Value::Object(_))
}

/// Flatten a nested response into `(column, cell)` pairs, in JSON order.
///
/// Object keys nest as `<prefix>_<key>`. A list of scalars becomes one
/// ` | `-joined cell; a list holding objects or lists is kept as JSON text.
pub fn flatten(prefix: &str, value: &Value) -> Vec<(String, String)> {
    let mut out = Vec::new();
    flatten_into(prefix, value, &mut out);
    out
}

fn flatten_into(prefix: &str, value: &Value, out: &mut Vec<(String, String)>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let col = sanitize_col(&format!("{}_{}", prefix, key));
                if is_container(child) {
                    flatten_into(&col, child, out);
                } else {
                    out.push((col, cell_value(child)));
                }
            }
        }
        Value::Array(items) => {
            let cell = if items.iter().any(is_container) {
                value.to_string()
            } else {
                items.iter().map(cell_value).collect::<Vec<_>>().join(" | ")
            };
            out.push((sanitize_col(prefix), cell));
        }
        scalar => out.push((sanitize_col(prefix), cell_value(scalar))),
    }
}

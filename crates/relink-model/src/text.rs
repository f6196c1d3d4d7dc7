use serde_json::Value;

/// Plain text of a cell, as cached alongside a link.
///
/// Strings as-is, numbers and booleans via their JSON form, objects through
/// their `text` member, arrays by joining their elements' text with `", "`.
pub fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Object(object) => object
            .get("text")
            .map(cell_text)
            .unwrap_or_default(),
        Value::Array(items) => items
            .iter()
            .map(cell_text)
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join(", "),
    }
}

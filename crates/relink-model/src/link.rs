//! Link cell codec
//!
//! The host returns link cells in several shapes depending on where they are
//! read from:
//!
//! 1. `["rec1", "rec2"]`
//! 2. `[{"record_id": "rec1"}, {"recordId": "rec2"}, {"id": "rec3"}]`
//! 3. `{"recordIds": ["rec1"]}` or `{"record_ids": ["rec1"]}`
//! 4. `{"record_id": "rec1"}` (or `recordId` / `id`)
//!
//! Shapes 1 and 2 may be mixed within one array. Everything decodes into a
//! [`CanonicalLinkValue`]; encoding always produces shape 3, the only one the
//! host accepts back on write, for single links as well.

use crate::{RecordId, TableId};
use serde_json::{json, Map, Value};

const ID_KEYS: [&str; 3] = ["record_id", "recordId", "id"];
const ID_LIST_KEYS: [&str; 2] = ["recordIds", "record_ids"];
const TABLE_KEYS: [&str; 2] = ["tableId", "table_id"];

/// Normalized link cell: target table, ordered unique record ids, cached text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CanonicalLinkValue {
    pub table_id: Option<TableId>,
    record_ids: Vec<RecordId>,
    pub text: Option<String>,
}

impl CanonicalLinkValue {
    pub fn new(table_id: Option<TableId>) -> Self {
        Self {
            table_id,
            ..Self::default()
        }
    }

    /// A value linking to exactly one record.
    pub fn singleton(
        table_id: impl Into<TableId>,
        record_id: impl Into<RecordId>,
        text: impl Into<String>,
    ) -> Self {
        let mut value = Self::new(Some(table_id.into()));
        value.push(record_id);
        value.text = Some(text.into());
        value
    }

    /// Appends an id unless already present. Returns whether it was added.
    pub fn push(&mut self, record_id: impl Into<RecordId>) -> bool {
        let record_id = record_id.into();
        if record_id.is_empty() || self.contains(&record_id) {
            return false;
        }
        self.record_ids.push(record_id);
        true
    }

    pub fn contains(&self, record_id: &str) -> bool {
        self.record_ids.iter().any(|id| id == record_id)
    }

    pub fn record_ids(&self) -> &[RecordId] {
        &self.record_ids
    }

    pub fn len(&self) -> usize {
        self.record_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.record_ids.is_empty()
    }

    pub fn encode(&self) -> Value {
        encode_link_cell(self)
    }
}

impl<S: Into<RecordId>> Extend<S> for CanonicalLinkValue {
    fn extend<I: IntoIterator<Item = S>>(&mut self, iter: I) {
        for record_id in iter {
            self.push(record_id);
        }
    }
}

// ============================================================================
// Decode
// ============================================================================

/// Decodes any observed link cell shape. Never fails: null, scalars and
/// unrecognized objects decode to an empty value with no table id, and
/// unreadable array elements are dropped.
pub fn decode_link_cell(raw: &Value) -> CanonicalLinkValue {
    match raw {
        Value::Array(items) => decode_array(items),
        Value::Object(object) => decode_object(object),
        _ => CanonicalLinkValue::default(),
    }
}

fn decode_array(items: &[Value]) -> CanonicalLinkValue {
    let mut value = CanonicalLinkValue::default();
    let mut texts = Vec::new();

    for item in items {
        match item {
            Value::String(id) => {
                value.push(id.as_str());
            }
            Value::Object(object) => {
                if let Some(id) = first_str(object, &ID_KEYS) {
                    value.push(id);
                }
                if value.table_id.is_none() {
                    value.table_id = first_str(object, &TABLE_KEYS).map(str::to_string);
                }
                if let Some(text) = object.get("text").and_then(Value::as_str) {
                    if !text.is_empty() {
                        texts.push(text);
                    }
                }
            }
            _ => {}
        }
    }

    if value.is_empty() {
        return CanonicalLinkValue::default();
    }
    if !texts.is_empty() {
        value.text = Some(texts.join(", "));
    }
    value
}

fn decode_object(object: &Map<String, Value>) -> CanonicalLinkValue {
    let mut value = CanonicalLinkValue::new(first_str(object, &TABLE_KEYS).map(str::to_string));
    value.text = object
        .get("text")
        .and_then(Value::as_str)
        .map(str::to_string);

    let list = ID_LIST_KEYS
        .iter()
        .find_map(|key| object.get(*key).and_then(Value::as_array));

    match list {
        Some(ids) => value.extend(ids.iter().filter_map(Value::as_str)),
        None => {
            if let Some(id) = first_str(object, &ID_KEYS) {
                value.push(id);
            }
        }
    }

    if value.is_empty() {
        return CanonicalLinkValue::default();
    }
    value
}

/// First of `keys` holding a non-empty string.
fn first_str<'a>(object: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|key| object.get(*key).and_then(Value::as_str))
        .find(|s| !s.is_empty())
}

// ============================================================================
// Encode
// ============================================================================

/// `{ "recordIds": [...], "tableId": ..., "text": ..., "type": "text" }`.
/// `tableId` is omitted when unknown; `text` defaults to an empty string.
pub fn encode_link_cell(value: &CanonicalLinkValue) -> Value {
    let mut cell = json!({
        "recordIds": value.record_ids,
        "text": value.text.clone().unwrap_or_default(),
        "type": "text",
    });
    if let (Some(table_id), Some(object)) = (&value.table_id, cell.as_object_mut()) {
        object.insert("tableId".to_string(), Value::String(table_id.clone()));
    }
    cell
}

//! Records as the host store returns and accepts them

use crate::{FieldId, RecordId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A stored record. Cell values are opaque; their shape depends on the field kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub record_id: RecordId,
    #[serde(default)]
    pub fields: Map<String, Value>,
}

impl Record {
    pub fn new(record_id: impl Into<RecordId>) -> Self {
        Self {
            record_id: record_id.into(),
            fields: Map::new(),
        }
    }

    pub fn with(mut self, field_id: impl Into<FieldId>, value: Value) -> Self {
        self.fields.insert(field_id.into(), value);
        self
    }

    /// The cell, or `Value::Null` when the record has none for this field.
    pub fn cell(&self, field_id: &str) -> &Value {
        self.fields.get(field_id).unwrap_or(&Value::Null)
    }
}

/// A record to be inserted. The host assigns the id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewRecord {
    pub fields: Map<String, Value>,
}

impl NewRecord {
    pub fn get(&self, field_id: &str) -> Option<&Value> {
        self.fields.get(field_id)
    }
}

//! Duplication planning
//!
//! Turns selected child records into insertable specs: copyable values carried
//! over unchanged, the back link rewritten to point at the target anchor.

use relink_model::{CanonicalLinkValue, Field, FieldId, NewRecord, Record, RecordId, TableId};
use serde_json::Value;
use std::collections::HashMap;

/// Where the copies get linked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelinkTarget {
    /// Back field on the child table
    pub back_field_id: FieldId,
    /// Anchor record on the main table
    pub anchor_record_id: RecordId,
    pub main_table_id: TableId,
    /// Anchor primary text cached in the link cell, when it could be read
    pub anchor_text: Option<String>,
}

/// What happens to one source cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellDecision {
    Copy,
    /// Not in the table's field metadata
    SkipUnknownField,
    /// Store-maintained kind
    SkipComputed,
    /// Old back link value; replaced by the relink
    SkipBackLink,
    SkipEmpty,
}

pub fn decide_cell(field: Option<&Field>, value: &Value, back_field_id: &str) -> CellDecision {
    let Some(field) = field else {
        return CellDecision::SkipUnknownField;
    };
    if !field.is_copyable() {
        CellDecision::SkipComputed
    } else if field.id == back_field_id {
        CellDecision::SkipBackLink
    } else if value.is_null() {
        CellDecision::SkipEmpty
    } else {
        CellDecision::Copy
    }
}

/// The back link cell every copy receives.
///
/// Always exactly the one target anchor, even when the back field allows
/// many targets: a copy is attached to the designated anchor and nothing the
/// source was linked to.
pub fn relink_cell(target: &RelinkTarget) -> Value {
    CanonicalLinkValue::singleton(
        target.main_table_id.as_str(),
        target.anchor_record_id.as_str(),
        target.anchor_text.clone().unwrap_or_default(),
    )
    .encode()
}

/// One spec per record, in the given order.
pub fn plan(records: &[Record], fields: &[Field], target: &RelinkTarget) -> Vec<NewRecord> {
    let by_id: HashMap<&str, &Field> = fields.iter().map(|f| (f.id.as_str(), f)).collect();
    let relink = relink_cell(target);

    records
        .iter()
        .enumerate()
        .map(|(index, record)| {
            let mut spec = NewRecord::default();
            for (field_id, value) in &record.fields {
                let field = by_id.get(field_id.as_str()).copied();
                match decide_cell(field, value, &target.back_field_id) {
                    CellDecision::Copy => {
                        spec.fields.insert(field_id.clone(), value.clone());
                    }
                    decision => {
                        tracing::trace!(record_id = %record.record_id, field_id = %field_id, ?decision, "cell skipped");
                    }
                }
            }
            spec.fields
                .insert(target.back_field_id.clone(), relink.clone());

            tracing::debug!(
                record_id = %record.record_id,
                position = index + 1,
                total = records.len(),
                copied = spec.fields.len() - 1,
                "planned copy"
            );
            spec
        })
        .collect()
}

//! Link field pairing
//!
//! A forward field `F` on the main table and a field `B` on the child table
//! form a pair when `B` is a duplex link whose `backFieldId` is `F.id`.

use crate::{CopyError, CopyResult, StoreError, TableService};
use relink_model::{decode_link_cell, link_fields, CanonicalLinkValue, Field, TableId};

/// The child table field paired with a forward field.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedBackField {
    pub field: Field,
    /// The main table, as recorded in the back field's property
    pub main_table_id: TableId,
    pub multiple: bool,
}

/// Finds the back field of `forward_field_id` among a child table's fields.
///
/// The first matching duplex link wins. Several fields sharing one
/// `backFieldId` is a misconfiguration that is not disambiguated here.
pub fn resolve_back_field(
    child_fields: &[Field],
    forward_field_id: &str,
) -> CopyResult<ResolvedBackField> {
    for field in link_fields(child_fields) {
        let Some(property) = field.link_property() else {
            tracing::debug!(field_id = %field.id, "duplex link without a readable property");
            continue;
        };
        tracing::debug!(
            field_id = %field.id,
            field_name = %field.name,
            back_field_id = ?property.back_field_id,
            multiple = property.multiple,
            "checking duplex link"
        );
        if property.back_field_id.as_deref() == Some(forward_field_id) {
            return Ok(ResolvedBackField {
                field: field.clone(),
                main_table_id: property.table_id,
                multiple: property.multiple,
            });
        }
    }

    tracing::warn!(
        forward_field_id,
        candidates = ?link_fields(child_fields).map(|f| f.id.as_str()).collect::<Vec<_>>(),
        "no duplex link pairs with the forward field"
    );
    Err(CopyError::BackLinkNotFound {
        forward_field_id: forward_field_id.to_string(),
    })
}

/// Records linked from `record_id` through `field_id`.
///
/// The returned value's table id is the linked table from the field's
/// metadata, whatever the cell itself carried.
pub async fn linked_records(
    service: &dyn TableService,
    table_id: &str,
    record_id: &str,
    field_id: &str,
) -> CopyResult<CanonicalLinkValue> {
    let fields = service.field_metadata(table_id).await?;
    let field = fields
        .iter()
        .find(|field| field.id == field_id)
        .ok_or_else(|| StoreError::FieldNotFound(field_id.to_string()))?;
    let property = field
        .link_property()
        .ok_or_else(|| CopyError::MissingLinkedTable {
            field_id: field_id.to_string(),
        })?;

    let raw = service.cell_value(table_id, field_id, record_id).await?;
    let mut linked = decode_link_cell(&raw);
    linked.table_id = Some(property.table_id);
    tracing::debug!(table_id, record_id, field_id, count = linked.len(), "decoded linked records");
    Ok(linked)
}

//! Field metadata
//!
//! Field kinds are carried as the host's PascalCase tags. Kinds with no
//! special handling here still round-trip through [`FieldType::Other`].

use crate::{FieldId, TableId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Field kinds
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FieldType {
    Text,
    Number,
    Phone,
    Url,
    Email,
    Checkbox,
    DateTime,
    SingleSelect,
    MultiSelect,
    User,
    Attachment,
    Formula,
    Lookup,
    AutoNumber,
    CreatedTime,
    CreatedUser,
    ModifiedTime,
    ModifiedUser,
    SingleLink,
    DuplexLink,
    /// Any host kind without a dedicated variant
    Other(String),
}

impl FieldType {
    pub fn as_str(&self) -> &str {
        match self {
            FieldType::Text => "Text",
            FieldType::Number => "Number",
            FieldType::Phone => "Phone",
            FieldType::Url => "Url",
            FieldType::Email => "Email",
            FieldType::Checkbox => "Checkbox",
            FieldType::DateTime => "DateTime",
            FieldType::SingleSelect => "SingleSelect",
            FieldType::MultiSelect => "MultiSelect",
            FieldType::User => "User",
            FieldType::Attachment => "Attachment",
            FieldType::Formula => "Formula",
            FieldType::Lookup => "Lookup",
            FieldType::AutoNumber => "AutoNumber",
            FieldType::CreatedTime => "CreatedTime",
            FieldType::CreatedUser => "CreatedUser",
            FieldType::ModifiedTime => "ModifiedTime",
            FieldType::ModifiedUser => "ModifiedUser",
            FieldType::SingleLink => "SingleLink",
            FieldType::DuplexLink => "DuplexLink",
            FieldType::Other(tag) => tag,
        }
    }

    /// Store-maintained kinds. The host rejects inserts that supply them.
    pub fn is_computed(&self) -> bool {
        matches!(
            self,
            FieldType::Formula
                | FieldType::Lookup
                | FieldType::AutoNumber
                | FieldType::CreatedTime
                | FieldType::CreatedUser
                | FieldType::ModifiedTime
                | FieldType::ModifiedUser
        )
    }

    pub fn is_link(&self) -> bool {
        matches!(self, FieldType::SingleLink | FieldType::DuplexLink)
    }
}

impl From<String> for FieldType {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "Text" => FieldType::Text,
            "Number" => FieldType::Number,
            "Phone" => FieldType::Phone,
            "Url" => FieldType::Url,
            "Email" => FieldType::Email,
            "Checkbox" => FieldType::Checkbox,
            "DateTime" => FieldType::DateTime,
            "SingleSelect" => FieldType::SingleSelect,
            "MultiSelect" => FieldType::MultiSelect,
            "User" => FieldType::User,
            "Attachment" => FieldType::Attachment,
            "Formula" => FieldType::Formula,
            "Lookup" => FieldType::Lookup,
            "AutoNumber" => FieldType::AutoNumber,
            "CreatedTime" => FieldType::CreatedTime,
            "CreatedUser" => FieldType::CreatedUser,
            "ModifiedTime" => FieldType::ModifiedTime,
            "ModifiedUser" => FieldType::ModifiedUser,
            "SingleLink" => FieldType::SingleLink,
            "DuplexLink" => FieldType::DuplexLink,
            _ => FieldType::Other(tag),
        }
    }
}

impl From<FieldType> for String {
    fn from(field_type: FieldType) -> Self {
        match field_type {
            FieldType::Other(tag) => tag,
            known => known.as_str().to_string(),
        }
    }
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether values of this kind may be written into a new record.
///
/// Shared by the duplication planner and anything that picks columns to show,
/// so the two never disagree about which kinds are store-maintained.
pub fn is_field_copyable(field_type: &FieldType) -> bool {
    !field_type.is_computed()
}

// ============================================================================
// Field metadata
// ============================================================================

/// The `property` block of a link field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkProperty {
    /// Table the link points at
    pub table_id: TableId,
    /// Paired field on that table (duplex links only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub back_field_id: Option<FieldId>,
    #[serde(default)]
    pub multiple: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Field {
    pub id: FieldId,
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub is_primary: bool,
    /// Kind-specific settings, kept raw; only link kinds are interpreted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property: Option<Value>,
}

impl Field {
    pub fn new(id: impl Into<FieldId>, name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            field_type,
            is_primary: false,
            property: None,
        }
    }

    /// A duplex-link field pointing at `table_id`, paired with `back_field_id`.
    pub fn duplex(
        id: impl Into<FieldId>,
        name: impl Into<String>,
        table_id: impl Into<TableId>,
        back_field_id: impl Into<FieldId>,
        multiple: bool,
    ) -> Self {
        let property = LinkProperty {
            table_id: table_id.into(),
            back_field_id: Some(back_field_id.into()),
            multiple,
        };
        Self {
            id: id.into(),
            name: name.into(),
            field_type: FieldType::DuplexLink,
            is_primary: false,
            property: serde_json::to_value(property).ok(),
        }
    }

    pub fn primary(mut self) -> Self {
        self.is_primary = true;
        self
    }

    /// The link property, when this is a link field with a readable one.
    pub fn link_property(&self) -> Option<LinkProperty> {
        if !self.field_type.is_link() {
            return None;
        }
        let property = self.property.as_ref()?;
        serde_json::from_value(property.clone()).ok()
    }

    pub fn is_copyable(&self) -> bool {
        is_field_copyable(&self.field_type)
    }
}

/// Duplex-link fields, in metadata order.
pub fn link_fields(fields: &[Field]) -> impl Iterator<Item = &Field> {
    fields
        .iter()
        .filter(|field| field.field_type == FieldType::DuplexLink)
}

pub fn copyable_fields(fields: &[Field]) -> impl Iterator<Item = &Field> {
    fields.iter().filter(|field| field.is_copyable())
}

/// The field flagged primary, else the first field.
pub fn primary_field(fields: &[Field]) -> Option<&Field> {
    fields
        .iter()
        .find(|field| field.is_primary)
        .or_else(|| fields.first())
}

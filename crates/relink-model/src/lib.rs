//! Relink table model
//!
//! Typed views over the metadata and cells a host table store hands out:
//!
//! ```text
//! ┌──────────────┐  forward (DuplexLink)  ┌──────────────┐
//! │  main table  │───────────────────────►│ child table  │
//! │  (anchors)   │◄───────────────────────│  (details)   │
//! └──────────────┘  back field            └──────────────┘
//!                   property.backFieldId == forward.id
//! ```
//!
//! - [`field`]: field kinds, link properties and the copyability predicate
//! - [`record`]: stored records and insertable record specs
//! - [`link`]: the link cell codec (every observed wire shape in, one shape out)
//! - [`text`]: plain-text rendering of a cell, used for cached link text

pub mod field;
pub mod link;
pub mod record;
pub mod text;

pub use field::{
    copyable_fields, is_field_copyable, link_fields, primary_field, Field, FieldType,
    LinkProperty,
};
pub use link::{decode_link_cell, encode_link_cell, CanonicalLinkValue};
pub use record::{NewRecord, Record};
pub use text::cell_text;

/// Host-assigned table identifier
pub type TableId = String;

/// Host-assigned field identifier
pub type FieldId = String;

/// Host-assigned record identifier
pub type RecordId = String;

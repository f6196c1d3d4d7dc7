//! Diagnostic events
//!
//! Emitted alongside the tracing output so callers and tests can observe
//! the verification outcome without it affecting the copy result.

use relink_model::{FieldId, RecordId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CopyEvent {
    /// The child table field paired with the forward field
    BackFieldResolved {
        back_field_id: FieldId,
        main_table_id: String,
        multiple: bool,
    },
    /// Anchor primary text could not be read; the link is cached with empty text
    AnchorTextUnavailable { reason: String },
    /// Selected ids missing from the fetched child records
    SelectionShortfall { requested: usize, found: usize },
    RecordsInserted { record_ids: Vec<RecordId> },
    VerificationPassed { record_id: RecordId },
    /// The anchor's forward cell does not list the first new record
    VerificationMismatch {
        expected: RecordId,
        actual: Vec<RecordId>,
    },
    VerificationSkipped { reason: String },
    CopyFailed { message: String },
}

/// Callback for copy events
pub type CopyEventHandler = Box<dyn Fn(CopyEvent) + Send + Sync>;

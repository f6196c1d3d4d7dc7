use relink_model::FieldId;

/// Failures reported by a [`crate::TableService`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("table not found: {0}")]
    TableNotFound(String),
    #[error("record not found: {0}")]
    RecordNotFound(String),
    #[error("field not found: {0}")]
    FieldNotFound(String),
    #[error("store rejected the request: {0}")]
    Rejected(String),
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Failures that end a duplication.
#[derive(Debug, thiserror::Error)]
pub enum CopyError {
    #[error("no records selected")]
    NoRecordsSelected,
    #[error("back link field not found for forward field {forward_field_id}; check the duplex link configuration")]
    BackLinkNotFound { forward_field_id: FieldId },
    #[error("field {field_id} has no linked table")]
    MissingLinkedTable { field_id: FieldId },
    #[error("batch insert failed: {0}")]
    WriteFailure(StoreError),
    #[error(transparent)]
    Store(#[from] StoreError),
    /// A collaborator panicked mid-run
    #[error("copy aborted: {0}")]
    Aborted(String),
}

pub type CopyResult<T> = Result<T, CopyError>;

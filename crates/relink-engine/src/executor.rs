//! Batch write plus after-the-fact observation
//!
//! The write is the outcome. Verification re-reads the anchor's forward cell
//! afterwards and only reports what it saw; it never turns a completed write
//! into a failure.

use crate::{CopyError, CopyResult, TableService};
use relink_model::{decode_link_cell, FieldId, NewRecord, RecordId, TableId};

/// The forward cell expected to list the new records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyTarget {
    pub main_table_id: TableId,
    pub forward_field_id: FieldId,
    pub anchor_record_id: RecordId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    Passed { record_id: RecordId },
    Mismatch {
        expected: RecordId,
        actual: Vec<RecordId>,
    },
    Skipped { reason: String },
}

impl Verification {
    pub fn is_mismatch(&self) -> bool {
        matches!(self, Verification::Mismatch { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Execution {
    /// Ids the store assigned, in spec order
    pub record_ids: Vec<RecordId>,
    /// Specs written
    pub written: usize,
    pub verification: Verification,
}

pub struct Executor<'a> {
    service: &'a dyn TableService,
}

impl<'a> Executor<'a> {
    pub fn new(service: &'a dyn TableService) -> Self {
        Self { service }
    }

    /// Writes `specs` in one batch. Empty input performs no call.
    pub async fn insert(
        &self,
        child_table_id: &str,
        specs: Vec<NewRecord>,
    ) -> CopyResult<Vec<RecordId>> {
        if specs.is_empty() {
            tracing::info!(child_table_id, "nothing to insert");
            return Ok(Vec::new());
        }

        let count = specs.len();
        let record_ids = self
            .service
            .add_records(child_table_id, specs)
            .await
            .map_err(CopyError::WriteFailure)?;
        tracing::info!(child_table_id, count, ids = ?record_ids, "inserted copies");
        Ok(record_ids)
    }

    /// Checks that the first new record shows up in the anchor's forward cell.
    pub async fn verify(&self, target: &VerifyTarget, new_ids: &[RecordId]) -> Verification {
        let Some(expected) = new_ids.first() else {
            return Verification::Skipped {
                reason: "no records inserted".to_string(),
            };
        };

        let raw = match self
            .service
            .cell_value(
                &target.main_table_id,
                &target.forward_field_id,
                &target.anchor_record_id,
            )
            .await
        {
            Ok(raw) => raw,
            Err(err) => {
                tracing::warn!(error = %err, anchor = %target.anchor_record_id, "verification read failed");
                return Verification::Skipped {
                    reason: err.to_string(),
                };
            }
        };

        let linked = decode_link_cell(&raw);
        if linked.contains(expected) {
            tracing::info!(anchor = %target.anchor_record_id, record_id = %expected, "anchor lists the new records");
            Verification::Passed {
                record_id: expected.clone(),
            }
        } else {
            tracing::warn!(
                anchor = %target.anchor_record_id,
                expected = %expected,
                actual = ?linked.record_ids(),
                "anchor does not list the new records yet"
            );
            Verification::Mismatch {
                expected: expected.clone(),
                actual: linked.record_ids().to_vec(),
            }
        }
    }

    /// Insert, then verify when a target is given.
    pub async fn execute(
        &self,
        child_table_id: &str,
        specs: Vec<NewRecord>,
        verify: Option<&VerifyTarget>,
    ) -> CopyResult<Execution> {
        let written = specs.len();
        let record_ids = self.insert(child_table_id, specs).await?;

        let verification = match verify {
            Some(target) => self.verify(target, &record_ids).await,
            None => Verification::Skipped {
                reason: "verification disabled".to_string(),
            },
        };

        Ok(Execution {
            record_ids,
            written,
            verification,
        })
    }
}

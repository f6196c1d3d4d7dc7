//! Copy-and-relink entry point
//!
//! ```text
//! resolve back field ─► anchor text (best effort) ─► fetch children
//!        │                                                │
//!        ▼                                                ▼
//!  BackLinkNotFound                          plan ─► insert ─► verify (observe only)
//! ```
//!
//! [`Relinker::copy_linked_records`] never returns an error: every failure
//! becomes a [`CopyOutcome`] with `success == false`.

use crate::executor::{Executor, Verification, VerifyTarget};
use crate::planner::{plan, RelinkTarget};
use crate::resolver::{linked_records, resolve_back_field, ResolvedBackField};
use crate::{CopyConfig, CopyError, CopyEvent, CopyEventHandler, CopyResult, TableService};
use futures::FutureExt;
use parking_lot::Mutex;
use relink_model::{cell_text, primary_field, CanonicalLinkValue, FieldId, Record, RecordId, TableId};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::OwnedMutexGuard;

type AnchorLocks = Mutex<HashMap<RecordId, Arc<tokio::sync::Mutex<()>>>>;

/// What the caller gets back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyOutcome {
    pub success: bool,
    pub count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CopyOutcome {
    pub fn succeeded(count: usize) -> Self {
        Self {
            success: true,
            count,
            error: None,
        }
    }

    pub fn failed(error: &CopyError) -> Self {
        Self {
            success: false,
            count: 0,
            error: Some(error.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyRequest {
    /// Table holding the records to duplicate
    pub child_table_id: TableId,
    pub selected_record_ids: Vec<RecordId>,
    /// Link field on the main table that lists the children
    pub forward_field_id: FieldId,
    /// Main table record the copies get linked to
    pub anchor_record_id: RecordId,
}

/// Everything a successful run produced.
#[derive(Debug, Clone, PartialEq)]
pub struct CopyReport {
    pub back_field: ResolvedBackField,
    pub record_ids: Vec<RecordId>,
    pub count: usize,
    pub verification: Verification,
}

pub struct Relinker {
    service: Arc<dyn TableService>,
    config: CopyConfig,
    event_handlers: Vec<CopyEventHandler>,
    anchor_locks: AnchorLocks,
}

impl Relinker {
    pub fn new(service: Arc<dyn TableService>, config: CopyConfig) -> Self {
        Self {
            service,
            config,
            event_handlers: Vec::new(),
            anchor_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &CopyConfig {
        &self.config
    }

    /// Add an event handler
    pub fn on_event(&mut self, handler: CopyEventHandler) {
        self.event_handlers.push(handler);
    }

    fn emit(&self, event: CopyEvent) {
        for handler in &self.event_handlers {
            handler(event.clone());
        }
    }

    // ========================================================================
    // Entry points
    // ========================================================================

    /// Duplicates the selected child records and links the copies to `anchor_record_id`.
    pub async fn copy_linked_records(
        &self,
        child_table_id: &str,
        selected_record_ids: &[RecordId],
        forward_field_id: &str,
        anchor_record_id: &str,
    ) -> CopyOutcome {
        let request = CopyRequest {
            child_table_id: child_table_id.to_string(),
            selected_record_ids: selected_record_ids.to_vec(),
            forward_field_id: forward_field_id.to_string(),
            anchor_record_id: anchor_record_id.to_string(),
        };

        let result = match AssertUnwindSafe(self.run(&request)).catch_unwind().await {
            Ok(result) => result,
            Err(payload) => Err(CopyError::Aborted(panic_message(&*payload))),
        };

        match result {
            Ok(report) => CopyOutcome::succeeded(report.count),
            Err(err) => {
                tracing::error!(
                    child_table = %request.child_table_id,
                    anchor = %request.anchor_record_id,
                    error = %err,
                    "copy failed"
                );
                self.emit(CopyEvent::CopyFailed {
                    message: err.to_string(),
                });
                CopyOutcome::failed(&err)
            }
        }
    }

    /// The typed pipeline behind [`Self::copy_linked_records`].
    pub async fn run(&self, request: &CopyRequest) -> CopyResult<CopyReport> {
        if request.selected_record_ids.is_empty() {
            return Err(CopyError::NoRecordsSelected);
        }

        let _lease = if self.config.serialize_per_anchor {
            Some(self.lease_anchor(&request.anchor_record_id).await)
        } else {
            None
        };

        tracing::info!(
            child_table = %request.child_table_id,
            selected = request.selected_record_ids.len(),
            forward_field = %request.forward_field_id,
            anchor = %request.anchor_record_id,
            "copying linked records"
        );

        // Step 1: pair the forward field with its back field
        let child_fields = self
            .service
            .field_metadata(&request.child_table_id)
            .await?;
        let back_field = resolve_back_field(&child_fields, &request.forward_field_id)?;
        tracing::info!(
            back_field = %back_field.field.id,
            name = %back_field.field.name,
            main_table = %back_field.main_table_id,
            multiple = back_field.multiple,
            "resolved back field"
        );
        self.emit(CopyEvent::BackFieldResolved {
            back_field_id: back_field.field.id.clone(),
            main_table_id: back_field.main_table_id.clone(),
            multiple: back_field.multiple,
        });

        // Step 2: anchor text for the cached link text
        let anchor_text = self
            .anchor_text(&back_field.main_table_id, &request.anchor_record_id)
            .await;

        // Step 3: selected children, in selection order
        let selected = self.fetch_selected(request).await?;

        // Step 4: plan and write
        let target = RelinkTarget {
            back_field_id: back_field.field.id.clone(),
            anchor_record_id: request.anchor_record_id.clone(),
            main_table_id: back_field.main_table_id.clone(),
            anchor_text,
        };
        let specs = plan(&selected, &child_fields, &target);
        tracing::info!(count = specs.len(), "planned copies");

        let verify = VerifyTarget {
            main_table_id: back_field.main_table_id.clone(),
            forward_field_id: request.forward_field_id.clone(),
            anchor_record_id: request.anchor_record_id.clone(),
        };
        let execution = Executor::new(self.service.as_ref())
            .execute(
                &request.child_table_id,
                specs,
                self.config.verify_after_write.then_some(&verify),
            )
            .await?;

        if !execution.record_ids.is_empty() {
            self.emit(CopyEvent::RecordsInserted {
                record_ids: execution.record_ids.clone(),
            });
        }
        self.emit(match &execution.verification {
            Verification::Passed { record_id } => CopyEvent::VerificationPassed {
                record_id: record_id.clone(),
            },
            Verification::Mismatch { expected, actual } => CopyEvent::VerificationMismatch {
                expected: expected.clone(),
                actual: actual.clone(),
            },
            Verification::Skipped { reason } => CopyEvent::VerificationSkipped {
                reason: reason.clone(),
            },
        });

        tracing::info!(count = execution.written, "copy finished");
        Ok(CopyReport {
            back_field,
            record_ids: execution.record_ids,
            count: execution.written,
            verification: execution.verification,
        })
    }

    /// Resolves the back field without writing anything.
    pub async fn back_field(
        &self,
        child_table_id: &str,
        forward_field_id: &str,
    ) -> CopyResult<ResolvedBackField> {
        let fields = self.service.field_metadata(child_table_id).await?;
        resolve_back_field(&fields, forward_field_id)
    }

    /// Records linked from `record_id` through the link field `field_id`.
    pub async fn linked_records(
        &self,
        table_id: &str,
        record_id: &str,
        field_id: &str,
    ) -> CopyResult<CanonicalLinkValue> {
        linked_records(self.service.as_ref(), table_id, record_id, field_id).await
    }

    // ========================================================================
    // Steps
    // ========================================================================

    /// Primary field text of the anchor; `None` on any failure.
    async fn anchor_text(&self, main_table_id: &str, anchor_record_id: &str) -> Option<String> {
        match self.read_anchor_text(main_table_id, anchor_record_id).await {
            Ok(Some(text)) => {
                tracing::debug!(anchor = anchor_record_id, text = %text, "anchor text");
                Some(text)
            }
            Ok(None) => {
                self.emit(CopyEvent::AnchorTextUnavailable {
                    reason: "main table has no fields".to_string(),
                });
                None
            }
            Err(err) => {
                tracing::warn!(anchor = anchor_record_id, error = %err, "anchor text unavailable");
                self.emit(CopyEvent::AnchorTextUnavailable {
                    reason: err.to_string(),
                });
                None
            }
        }
    }

    async fn read_anchor_text(
        &self,
        main_table_id: &str,
        anchor_record_id: &str,
    ) -> CopyResult<Option<String>> {
        let fields = self.service.field_metadata(main_table_id).await?;
        let Some(primary) = primary_field(&fields) else {
            return Ok(None);
        };
        let raw = self
            .service
            .cell_value(main_table_id, &primary.id, anchor_record_id)
            .await?;
        Ok(Some(cell_text(&raw)))
    }

    /// Selected records present in the child table. Missing ids are dropped.
    async fn fetch_selected(&self, request: &CopyRequest) -> CopyResult<Vec<Record>> {
        let mut seen = HashSet::new();
        let mut wanted: Vec<&str> = Vec::new();
        for id in &request.selected_record_ids {
            if seen.insert(id.as_str()) {
                wanted.push(id.as_str());
            }
        }

        let page_size = self.config.page_size_for(wanted.len());
        let mut fetched: HashMap<RecordId, Record> = self
            .service
            .records(&request.child_table_id, page_size)
            .await?
            .into_iter()
            .map(|record| (record.record_id.clone(), record))
            .collect();

        let selected: Vec<Record> = wanted
            .iter()
            .filter_map(|id| fetched.remove(*id))
            .collect();

        if selected.len() < wanted.len() {
            tracing::warn!(
                requested = wanted.len(),
                found = selected.len(),
                "some selected records were not found"
            );
            self.emit(CopyEvent::SelectionShortfall {
                requested: wanted.len(),
                found: selected.len(),
            });
        }
        Ok(selected)
    }

    /// Waits for exclusive use of `anchor_record_id` until the lease drops.
    async fn lease_anchor(&self, anchor_record_id: &str) -> AnchorLease<'_> {
        let lock = self
            .anchor_locks
            .lock()
            .entry(anchor_record_id.to_string())
            .or_default()
            .clone();
        AnchorLease {
            locks: &self.anchor_locks,
            anchor_record_id: anchor_record_id.to_string(),
            guard: Some(lock.lock_owned().await),
        }
    }
}

/// Held for the duration of a serialized run. The map entry goes away with
/// the last lease or waiter for that anchor.
struct AnchorLease<'a> {
    locks: &'a AnchorLocks,
    anchor_record_id: RecordId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for AnchorLease<'_> {
    fn drop(&mut self) {
        let mut locks = self.locks.lock();
        drop(self.guard.take());
        let idle = locks
            .get(&self.anchor_record_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1);
        if idle {
            locks.remove(&self.anchor_record_id);
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic with a non-string payload".to_string()
    }
}

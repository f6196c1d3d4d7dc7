//! End-to-end tests for copy-and-relink against the in-memory store
//!
//! Fixture: `tblMain` (standards) lists `tblChild` (details) through the
//! duplex field `fldF`; the child side of the pair is `fldB`.

use async_trait::async_trait;
use parking_lot::Mutex;
use relink_engine::*;
use relink_model::{decode_link_cell, Field, FieldType, NewRecord, Record, RecordId};
use serde_json::{json, Value};
use std::sync::Arc;

fn base() -> BaseSnapshot {
    BaseSnapshot {
        tables: vec![
            TableSnapshot::new(
                "tblMain",
                "Standards",
                vec![
                    Field::new("fldTitle", "Title", FieldType::Text).primary(),
                    Field::duplex("fldF", "Details", "tblChild", "fldB", true),
                ],
            )
            .with_records(vec![
                Record::new("M1")
                    .with("fldTitle", json!("Standard 1"))
                    .with(
                        "fldF",
                        json!([{"record_id": "C1"}, {"record_id": "C2"}, {"record_id": "C3"}]),
                    ),
                Record::new("M2").with("fldTitle", json!([{"type": "text", "text": "Standard 2"}])),
            ]),
            TableSnapshot::new(
                "tblChild",
                "Details",
                vec![
                    Field::new("fldName", "Name", FieldType::Text).primary(),
                    Field::new("fldQty", "Qty", FieldType::Number),
                    Field::new("fldTotal", "Total", FieldType::Formula),
                    Field::new("fldCreated", "Created", FieldType::CreatedTime),
                    Field::duplex("fldB", "Standard", "tblMain", "fldF", true),
                ],
            )
            .with_records(
                ["C1", "C2", "C3"]
                    .iter()
                    .enumerate()
                    .map(|(i, id)| {
                        Record::new(*id)
                            .with("fldName", json!(format!("Item {}", i + 1)))
                            .with("fldQty", json!(i + 1))
                            .with("fldTotal", json!((i + 1) * 10))
                            .with("fldCreated", json!(1_700_000_000_000u64))
                            .with("fldB", json!({"recordIds": ["M1"], "tableId": "tblMain"}))
                    })
                    .collect(),
            ),
        ],
    }
}

fn ids(values: &[&str]) -> Vec<RecordId> {
    values.iter().map(|s| s.to_string()).collect()
}

fn setup(config: CopyConfig) -> (Arc<MemoryTableService>, Relinker, Arc<Mutex<Vec<CopyEvent>>>) {
    let service = Arc::new(MemoryTableService::new(base()));
    let mut relinker = Relinker::new(service.clone(), config);
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    relinker.on_event(Box::new(move |event: CopyEvent| sink.lock().push(event)));
    (service, relinker, events)
}

async fn linked(service: &MemoryTableService, anchor: &str) -> Vec<RecordId> {
    let cell = service.cell_value("tblMain", "fldF", anchor).await.unwrap();
    decode_link_cell(&cell).record_ids().to_vec()
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn copies_selected_children_onto_other_anchor() {
    let (service, relinker, events) = setup(CopyConfig::default());

    let outcome = relinker
        .copy_linked_records("tblChild", &ids(&["C1", "C2"]), "fldF", "M2")
        .await;
    assert_eq!(outcome, CopyOutcome::succeeded(2));
    assert_eq!(service.record_count("tblChild"), 5);

    // M1 keeps exactly its original children
    assert_eq!(linked(&service, "M1").await, ids(&["C1", "C2", "C3"]));

    // M2 now lists the two copies, and each copy links only to M2
    let new_ids = linked(&service, "M2").await;
    assert_eq!(new_ids.len(), 2);
    for (new_id, source) in new_ids.iter().zip(["C1", "C2"]) {
        let copy = service.record("tblChild", new_id).unwrap();
        let original = service.record("tblChild", source).unwrap();
        assert_eq!(copy.cell("fldName"), original.cell("fldName"));
        assert_eq!(copy.cell("fldQty"), original.cell("fldQty"));
        assert!(copy.cell("fldTotal").is_null());
        assert!(copy.cell("fldCreated").is_null());

        let back = decode_link_cell(copy.cell("fldB"));
        assert_eq!(back.record_ids(), ids(&["M2"]).as_slice());
        assert_eq!(copy.cell("fldB")["text"], json!("Standard 2"));
    }

    // originals untouched
    let original = service.record("tblChild", "C1").unwrap();
    assert_eq!(decode_link_cell(original.cell("fldB")).record_ids(), ids(&["M1"]).as_slice());

    let events = events.lock();
    assert!(events.contains(&CopyEvent::BackFieldResolved {
        back_field_id: "fldB".to_string(),
        main_table_id: "tblMain".to_string(),
        multiple: true,
    }));
    assert!(events
        .iter()
        .any(|e| matches!(e, CopyEvent::VerificationPassed { .. })));
}

#[tokio::test]
async fn copies_follow_selection_order() {
    let (service, relinker, _events) = setup(CopyConfig::default());
    let report = relinker
        .run(&CopyRequest {
            child_table_id: "tblChild".to_string(),
            selected_record_ids: ids(&["C3", "C1"]),
            forward_field_id: "fldF".to_string(),
            anchor_record_id: "M2".to_string(),
        })
        .await
        .unwrap();

    let names: Vec<_> = report
        .record_ids
        .iter()
        .map(|id| service.record("tblChild", id).unwrap().cell("fldName").clone())
        .collect();
    assert_eq!(names, vec![json!("Item 3"), json!("Item 1")]);
}

#[tokio::test]
async fn empty_selection_fails_without_calls() {
    let (service, relinker, _events) = setup(CopyConfig::default());
    let outcome = relinker
        .copy_linked_records("tblChild", &[], "fldF", "M2")
        .await;

    assert!(!outcome.success);
    assert_eq!(outcome.count, 0);
    assert_eq!(outcome.error.as_deref(), Some("no records selected"));
    assert!(service.calls().is_empty());
}

#[tokio::test]
async fn unpaired_forward_field_fails_without_write() {
    let (service, relinker, events) = setup(CopyConfig::default());
    let outcome = relinker
        .copy_linked_records("tblChild", &ids(&["C1"]), "fldUnrelated", "M2")
        .await;

    assert!(!outcome.success);
    assert_eq!(outcome.count, 0);
    assert!(outcome.error.unwrap().contains("back link field not found"));
    assert_eq!(service.write_calls(), 0);
    assert_eq!(service.record_count("tblChild"), 3);
    assert!(events
        .lock()
        .iter()
        .any(|e| matches!(e, CopyEvent::CopyFailed { .. })));
}

#[tokio::test]
async fn repeating_a_copy_duplicates_again() {
    // No dedup between invocations: the same request twice makes two sets.
    let (service, relinker, _events) = setup(CopyConfig::default());
    let selection = ids(&["C1", "C2"]);

    let first = relinker
        .copy_linked_records("tblChild", &selection, "fldF", "M2")
        .await;
    let second = relinker
        .copy_linked_records("tblChild", &selection, "fldF", "M2")
        .await;

    assert_eq!(first.count + second.count, 4);
    assert_eq!(service.record_count("tblChild"), 7);
    assert_eq!(linked(&service, "M2").await.len(), 4);
}

#[tokio::test]
async fn write_failure_is_reported() {
    let (service, relinker, _events) = setup(CopyConfig::default());
    service.fail_writes(Some("quota exceeded"));

    let outcome = relinker
        .copy_linked_records("tblChild", &ids(&["C1"]), "fldF", "M2")
        .await;
    assert!(!outcome.success);
    assert_eq!(outcome.count, 0);
    assert_eq!(
        outcome.error.as_deref(),
        Some("batch insert failed: store rejected the request: quota exceeded")
    );
    assert_eq!(service.write_calls(), 1);
}

#[tokio::test]
async fn verification_mismatch_is_only_a_warning() {
    let (service, relinker, events) = setup(CopyConfig::default());
    service.set_duplex_sync(false);

    let outcome = relinker
        .copy_linked_records("tblChild", &ids(&["C1", "C2"]), "fldF", "M2")
        .await;
    assert_eq!(outcome, CopyOutcome::succeeded(2));

    let events = events.lock();
    let mismatch = events
        .iter()
        .find(|e| matches!(e, CopyEvent::VerificationMismatch { .. }))
        .expect("mismatch event");
    if let CopyEvent::VerificationMismatch { expected, actual } = mismatch {
        assert!(expected.starts_with("rec"));
        assert!(actual.is_empty());
    }
}

#[tokio::test]
async fn verification_can_be_disabled() {
    let (service, relinker, events) = setup(CopyConfig {
        verify_after_write: false,
        ..Default::default()
    });
    relinker
        .copy_linked_records("tblChild", &ids(&["C1"]), "fldF", "M2")
        .await;

    let verification_reads = service
        .calls()
        .into_iter()
        .filter(|call| matches!(call, ServiceCall::CellValue { field_id, .. } if field_id == "fldF"))
        .count();
    assert_eq!(verification_reads, 0);
    assert!(events
        .lock()
        .iter()
        .any(|e| matches!(e, CopyEvent::VerificationSkipped { .. })));
}

#[tokio::test]
async fn unreadable_anchor_text_does_not_block() {
    let (service, relinker, events) = setup(CopyConfig::default());
    service.fail_cell_reads("tblMain", "fldTitle");

    let outcome = relinker
        .copy_linked_records("tblChild", &ids(&["C1"]), "fldF", "M2")
        .await;
    assert_eq!(outcome, CopyOutcome::succeeded(1));

    let new_id = linked(&service, "M2").await.remove(0);
    let copy = service.record("tblChild", &new_id).unwrap();
    assert_eq!(copy.cell("fldB")["text"], json!(""));
    assert!(events
        .lock()
        .iter()
        .any(|e| matches!(e, CopyEvent::AnchorTextUnavailable { .. })));
}

#[tokio::test]
async fn missing_selected_records_are_skipped() {
    let (service, relinker, events) = setup(CopyConfig::default());
    let outcome = relinker
        .copy_linked_records("tblChild", &ids(&["C1", "C404", "C1"]), "fldF", "M2")
        .await;

    assert_eq!(outcome, CopyOutcome::succeeded(1));
    assert_eq!(service.record_count("tblChild"), 4);
    assert!(events.lock().contains(&CopyEvent::SelectionShortfall {
        requested: 2,
        found: 1,
    }));
}

#[tokio::test]
async fn selection_of_only_unknown_ids_writes_nothing() {
    let (service, relinker, _events) = setup(CopyConfig::default());
    let outcome = relinker
        .copy_linked_records("tblChild", &ids(&["C404"]), "fldF", "M2")
        .await;

    assert_eq!(outcome, CopyOutcome::succeeded(0));
    assert_eq!(service.write_calls(), 0);
}

#[tokio::test]
async fn page_size_covers_large_selection() {
    let (service, relinker, _events) = setup(CopyConfig {
        page_size: 1,
        ..Default::default()
    });
    relinker
        .copy_linked_records("tblChild", &ids(&["C1", "C2", "C3"]), "fldF", "M2")
        .await;

    assert!(service.calls().contains(&ServiceCall::Records {
        table_id: "tblChild".to_string(),
        page_size: 3,
    }));
    assert_eq!(linked(&service, "M2").await.len(), 3);
}

#[tokio::test]
async fn unknown_child_table_fails() {
    let (_service, relinker, _events) = setup(CopyConfig::default());
    let outcome = relinker
        .copy_linked_records("tblGone", &ids(&["C1"]), "fldF", "M2")
        .await;
    assert_eq!(outcome.error.as_deref(), Some("table not found: tblGone"));
}

/// Delegates to the in-memory store but panics on the chosen call.
struct PanickingService {
    inner: MemoryTableService,
    panic_on_insert: bool,
}

#[async_trait]
impl TableService for PanickingService {
    async fn field_metadata(&self, table_id: &str) -> Result<Vec<Field>, StoreError> {
        if !self.panic_on_insert {
            panic!("metadata backend crashed");
        }
        self.inner.field_metadata(table_id).await
    }

    async fn records(&self, table_id: &str, page_size: usize) -> Result<Vec<Record>, StoreError> {
        self.inner.records(table_id, page_size).await
    }

    async fn cell_value(
        &self,
        table_id: &str,
        field_id: &str,
        record_id: &str,
    ) -> Result<Value, StoreError> {
        self.inner.cell_value(table_id, field_id, record_id).await
    }

    async fn add_records(
        &self,
        _table_id: &str,
        _records: Vec<NewRecord>,
    ) -> Result<Vec<RecordId>, StoreError> {
        panic!("insert backend crashed")
    }
}

#[tokio::test]
async fn panicking_service_becomes_failed_outcome() {
    for (panic_on_insert, message) in [
        (false, "metadata backend crashed"),
        (true, "insert backend crashed"),
    ] {
        let service = Arc::new(PanickingService {
            inner: MemoryTableService::new(base()),
            panic_on_insert,
        });
        let config = CopyConfig {
            serialize_per_anchor: true,
            ..CopyConfig::default()
        };
        let mut relinker = Relinker::new(service, config);
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        relinker.on_event(Box::new(move |event: CopyEvent| sink.lock().push(event)));
        let relinker = Arc::new(relinker);

        let task = {
            let relinker = Arc::clone(&relinker);
            tokio::spawn(async move {
                relinker
                    .copy_linked_records("tblChild", &ids(&["C1"]), "fldF", "M2")
                    .await
            })
        };
        let outcome = task.await.expect("panic stays inside the facade");

        assert!(!outcome.success);
        assert_eq!(outcome.count, 0);
        assert_eq!(outcome.error, Some(format!("copy aborted: {message}")));
        assert!(events
            .lock()
            .iter()
            .any(|e| matches!(e, CopyEvent::CopyFailed { message: m } if m.contains(message))));

        // The anchor lock was released by the aborted run.
        let again = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            relinker.copy_linked_records("tblChild", &ids(&["C1"]), "fldF", "M2"),
        )
        .await
        .expect("anchor lock released");
        assert_eq!(again, outcome);
    }
}

#[tokio::test]
async fn concurrent_copies_to_one_anchor() {
    for serialize_per_anchor in [false, true] {
        let (service, relinker, _events) = setup(CopyConfig {
            serialize_per_anchor,
            ..Default::default()
        });
        let relinker = Arc::new(relinker);

        let tasks: Vec<_> = (0..4)
            .map(|_| {
                let relinker = Arc::clone(&relinker);
                tokio::spawn(async move {
                    relinker
                        .copy_linked_records("tblChild", &ids(&["C1"]), "fldF", "M2")
                        .await
                })
            })
            .collect();
        for task in tasks {
            assert!(task.await.unwrap().success);
        }

        assert_eq!(linked(&service, "M2").await.len(), 4);
    }
}

// ============================================================================
// Supporting operations
// ============================================================================

#[tokio::test]
async fn lists_linked_records_with_table() {
    let (_service, relinker, _events) = setup(CopyConfig::default());
    let value = relinker.linked_records("tblMain", "M1", "fldF").await.unwrap();
    assert_eq!(value.table_id.as_deref(), Some("tblChild"));
    assert_eq!(value.record_ids(), ids(&["C1", "C2", "C3"]).as_slice());

    let empty = relinker.linked_records("tblMain", "M2", "fldF").await.unwrap();
    assert!(empty.is_empty());
}

#[tokio::test]
async fn linked_records_needs_a_link_field() {
    let (_service, relinker, _events) = setup(CopyConfig::default());
    let err = relinker
        .linked_records("tblMain", "M1", "fldTitle")
        .await
        .unwrap_err();
    assert!(matches!(err, CopyError::MissingLinkedTable { .. }));
}

#[tokio::test]
async fn back_field_lookup() {
    let (service, relinker, _events) = setup(CopyConfig::default());
    let resolved = relinker.back_field("tblChild", "fldF").await.unwrap();
    assert_eq!(resolved.field.id, "fldB");
    assert_eq!(service.write_calls(), 0);
}

#[tokio::test]
async fn executor_skips_empty_batch() {
    let service = MemoryTableService::new(base());
    let executor = Executor::new(&service);
    let execution = executor.execute("tblChild", Vec::new(), None).await.unwrap();

    assert!(execution.record_ids.is_empty());
    assert_eq!(execution.written, 0);
    assert_eq!(service.write_calls(), 0);
}

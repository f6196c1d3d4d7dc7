//! In-memory Table Service
//!
//! Holds a whole base as a [`BaseSnapshot`] and behaves like the host store
//! where it matters to the engine: computed fields are rejected on insert, and
//! writing a duplex link cell also lists the new record in the paired field of
//! every linked record. Test knobs switch that synchronization off, make writes
//! fail and make cell reads fail.

use crate::{StoreError, TableService};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use relink_model::{
    decode_link_cell, Field, FieldId, FieldType, NewRecord, Record, RecordId, TableId,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;

// ============================================================================
// Snapshot
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSnapshot {
    pub id: TableId,
    pub name: String,
    pub fields: Vec<Field>,
    #[serde(default)]
    pub records: Vec<Record>,
}

impl TableSnapshot {
    pub fn new(id: impl Into<TableId>, name: impl Into<String>, fields: Vec<Field>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            fields,
            records: Vec::new(),
        }
    }

    pub fn with_records(mut self, records: Vec<Record>) -> Self {
        self.records = records;
        self
    }

    fn field(&self, field_id: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.id == field_id)
    }

    fn record_mut(&mut self, record_id: &str) -> Option<&mut Record> {
        self.records.iter_mut().find(|r| r.record_id == record_id)
    }
}

/// A whole base: every table with its fields and records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BaseSnapshot {
    pub tables: Vec<TableSnapshot>,
}

// ============================================================================
// Service
// ============================================================================

/// A call received by [`MemoryTableService`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceCall {
    FieldMetadata {
        table_id: TableId,
    },
    Records {
        table_id: TableId,
        page_size: usize,
    },
    CellValue {
        table_id: TableId,
        field_id: FieldId,
        record_id: RecordId,
    },
    AddRecords {
        table_id: TableId,
        count: usize,
    },
}

pub struct MemoryTableService {
    tables: RwLock<Vec<TableSnapshot>>,
    calls: Mutex<Vec<ServiceCall>>,
    duplex_sync: AtomicBool,
    write_failure: Mutex<Option<String>>,
    failing_cells: Mutex<HashSet<(TableId, FieldId)>>,
}

impl MemoryTableService {
    pub fn new(base: BaseSnapshot) -> Self {
        Self {
            tables: RwLock::new(base.tables),
            calls: Mutex::new(Vec::new()),
            duplex_sync: AtomicBool::new(true),
            write_failure: Mutex::new(None),
            failing_cells: Mutex::new(HashSet::new()),
        }
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        Ok(Self::new(serde_json::from_str(json)?))
    }

    pub fn snapshot(&self) -> BaseSnapshot {
        BaseSnapshot {
            tables: self.tables.read().clone(),
        }
    }

    pub fn record(&self, table_id: &str, record_id: &str) -> Option<Record> {
        self.tables
            .read()
            .iter()
            .find(|t| t.id == table_id)?
            .records
            .iter()
            .find(|r| r.record_id == record_id)
            .cloned()
    }

    pub fn record_count(&self, table_id: &str) -> usize {
        self.tables
            .read()
            .iter()
            .find(|t| t.id == table_id)
            .map_or(0, |t| t.records.len())
    }

    /// Every call received so far, in order.
    pub fn calls(&self) -> Vec<ServiceCall> {
        self.calls.lock().clone()
    }

    pub fn write_calls(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|call| matches!(call, ServiceCall::AddRecords { .. }))
            .count()
    }

    /// When off, writes no longer update the paired side of duplex links.
    pub fn set_duplex_sync(&self, enabled: bool) {
        self.duplex_sync.store(enabled, Ordering::SeqCst);
    }

    /// Makes every following insert fail with `message`; `None` clears it.
    pub fn fail_writes(&self, message: Option<&str>) {
        *self.write_failure.lock() = message.map(str::to_string);
    }

    /// Makes reads of one field's cells fail.
    pub fn fail_cell_reads(&self, table_id: &str, field_id: &str) {
        self.failing_cells
            .lock()
            .insert((table_id.to_string(), field_id.to_string()));
    }

    fn log(&self, call: ServiceCall) {
        self.calls.lock().push(call);
    }

    /// Checks a spec against the table's metadata the way the host does.
    fn validate(table: &TableSnapshot, spec: &NewRecord) -> Result<(), StoreError> {
        for field_id in spec.fields.keys() {
            let field = table
                .field(field_id)
                .ok_or_else(|| StoreError::FieldNotFound(field_id.clone()))?;
            if field.field_type.is_computed() {
                return Err(StoreError::Rejected(format!(
                    "field {} ({}) is maintained by the store",
                    field.name, field.field_type
                )));
            }
        }
        Ok(())
    }

    /// Lists `new_id` in the paired field of every record its duplex cells point at.
    fn sync_duplex(tables: &mut [TableSnapshot], table_idx: usize, new_id: &str, spec: &NewRecord) {
        let source_table_id = tables[table_idx].id.clone();
        let links: Vec<(TableId, FieldId, Vec<RecordId>)> = tables[table_idx]
            .fields
            .iter()
            .filter(|f| f.field_type == FieldType::DuplexLink)
            .filter_map(|field| {
                let property = field.link_property()?;
                let back_field_id = property.back_field_id?;
                let cell = spec.fields.get(&field.id)?;
                let targets = decode_link_cell(cell).record_ids().to_vec();
                Some((property.table_id, back_field_id, targets))
            })
            .collect();

        for (target_table_id, back_field_id, targets) in links {
            let Some(target_table) = tables.iter_mut().find(|t| t.id == target_table_id) else {
                tracing::warn!(table_id = %target_table_id, "linked table missing from base");
                continue;
            };
            for target_id in targets {
                let Some(record) = target_table.record_mut(&target_id) else {
                    continue;
                };
                let mut linked = decode_link_cell(record.cell(&back_field_id));
                linked.table_id = Some(source_table_id.clone());
                linked.push(new_id);
                record.fields.insert(back_field_id.clone(), linked.encode());
            }
        }
    }
}

#[async_trait]
impl TableService for MemoryTableService {
    async fn field_metadata(&self, table_id: &str) -> Result<Vec<Field>, StoreError> {
        self.log(ServiceCall::FieldMetadata {
            table_id: table_id.to_string(),
        });
        self.tables
            .read()
            .iter()
            .find(|t| t.id == table_id)
            .map(|t| t.fields.clone())
            .ok_or_else(|| StoreError::TableNotFound(table_id.to_string()))
    }

    async fn records(&self, table_id: &str, page_size: usize) -> Result<Vec<Record>, StoreError> {
        self.log(ServiceCall::Records {
            table_id: table_id.to_string(),
            page_size,
        });
        self.tables
            .read()
            .iter()
            .find(|t| t.id == table_id)
            .map(|t| t.records.iter().take(page_size).cloned().collect())
            .ok_or_else(|| StoreError::TableNotFound(table_id.to_string()))
    }

    async fn cell_value(
        &self,
        table_id: &str,
        field_id: &str,
        record_id: &str,
    ) -> Result<Value, StoreError> {
        self.log(ServiceCall::CellValue {
            table_id: table_id.to_string(),
            field_id: field_id.to_string(),
            record_id: record_id.to_string(),
        });
        if self
            .failing_cells
            .lock()
            .contains(&(table_id.to_string(), field_id.to_string()))
        {
            return Err(StoreError::Backend(format!(
                "cell read failed for {table_id}/{field_id}"
            )));
        }

        let tables = self.tables.read();
        let table = tables
            .iter()
            .find(|t| t.id == table_id)
            .ok_or_else(|| StoreError::TableNotFound(table_id.to_string()))?;
        if table.field(field_id).is_none() {
            return Err(StoreError::FieldNotFound(field_id.to_string()));
        }
        let record = table
            .records
            .iter()
            .find(|r| r.record_id == record_id)
            .ok_or_else(|| StoreError::RecordNotFound(record_id.to_string()))?;
        Ok(record.cell(field_id).clone())
    }

    async fn add_records(
        &self,
        table_id: &str,
        records: Vec<NewRecord>,
    ) -> Result<Vec<RecordId>, StoreError> {
        self.log(ServiceCall::AddRecords {
            table_id: table_id.to_string(),
            count: records.len(),
        });
        if let Some(message) = self.write_failure.lock().clone() {
            return Err(StoreError::Rejected(message));
        }

        let mut tables = self.tables.write();
        let table_idx = tables
            .iter()
            .position(|t| t.id == table_id)
            .ok_or_else(|| StoreError::TableNotFound(table_id.to_string()))?;
        for spec in &records {
            Self::validate(&tables[table_idx], spec)?;
        }

        let sync = self.duplex_sync.load(Ordering::SeqCst);
        let mut ids = Vec::with_capacity(records.len());
        for spec in records {
            let record_id = format!("rec{}", Uuid::new_v4().simple());
            if sync {
                Self::sync_duplex(&mut tables, table_idx, &record_id, &spec);
            }
            tables[table_idx].records.push(Record {
                record_id: record_id.clone(),
                fields: spec.fields,
            });
            ids.push(record_id);
        }
        Ok(ids)
    }
}

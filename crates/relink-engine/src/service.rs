//! Table Service interface
//!
//! The engine never talks to a host store directly. Everything it needs is
//! these four calls; each one may suspend on I/O.

use crate::StoreError;
use async_trait::async_trait;
use relink_model::{Field, NewRecord, Record, RecordId};
use serde_json::Value;

#[async_trait]
pub trait TableService: Send + Sync {
    /// Field metadata in table order.
    async fn field_metadata(&self, table_id: &str) -> Result<Vec<Field>, StoreError>;

    /// Up to `page_size` records of the table.
    async fn records(&self, table_id: &str, page_size: usize) -> Result<Vec<Record>, StoreError>;

    /// Raw cell value; `Value::Null` for an empty cell.
    async fn cell_value(
        &self,
        table_id: &str,
        field_id: &str,
        record_id: &str,
    ) -> Result<Value, StoreError>;

    /// Inserts records and returns their new ids, in input order.
    async fn add_records(
        &self,
        table_id: &str,
        records: Vec<NewRecord>,
    ) -> Result<Vec<RecordId>, StoreError>;
}

//! Relink engine: duplicate linked child records onto another anchor
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                         COPY AND RELINK                              │
//! ├──────────────────────────────────────────────────────────────────────┤
//! │                                                                      │
//! │  main table                          child table                     │
//! │  ┌────────┐  F (forward)             ┌────────┐  B (back)            │
//! │  │   M1   │─────────────────────────►│ C1 C2  │───► M1               │
//! │  │   M2   │─────────────────────────►│ C1' C2'│───► M2   (copies)    │
//! │  └────────┘                          └────────┘                      │
//! │                                                                      │
//! │  Resolver ──► Planner ──► Executor ──► verify (observe only)         │
//! │                                                                      │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The engine writes the copies' back field `B`; the host store is expected
//! to list them in the anchor's forward field `F`. The originals are never
//! touched. All store access goes through [`TableService`].

pub mod config;
pub mod error;
pub mod events;
pub mod executor;
pub mod facade;
pub mod memory;
pub mod planner;
pub mod resolver;
pub mod service;

pub use config::{ConfigError, CopyConfig};
pub use error::{CopyError, CopyResult, StoreError};
pub use events::{CopyEvent, CopyEventHandler};
pub use executor::{Execution, Executor, Verification, VerifyTarget};
pub use facade::{CopyOutcome, CopyReport, CopyRequest, Relinker};
pub use memory::{BaseSnapshot, MemoryTableService, ServiceCall, TableSnapshot};
pub use planner::{plan, relink_cell, CellDecision, RelinkTarget};
pub use resolver::{linked_records, resolve_back_field, ResolvedBackField};
pub use service::TableService;

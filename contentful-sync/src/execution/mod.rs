//! Execution layer: replays an operations graph against the Management API

pub mod batch;
pub mod sync;

pub use batch::{BatchExecutor, ExecutionPlan, ExecutionReport, PlannedBatch, chunk_operations};
pub use sync::{EntrySync, SyncOutcome};

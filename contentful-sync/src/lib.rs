//! Diff edited Contentful entry trees into create, update and dereference
//! operations, and replay them against the Management API in batches.

pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod execution;
pub mod graph;

pub use config::{BatchConfig, SyncConfig};
pub use error::{GraphError, OperationError, SyncError, VersionConflict};
pub use execution::{BatchExecutor, EntrySync, ExecutionReport};
pub use graph::{GraphBuilder, OperationsGraph};

//! Contentful Management API operations
//!
//! This module provides the unit of remote mutation derived from a diff and
//! the per-operation result the executor reports.

pub mod operation;

pub use operation::{Operation, OperationKind, OperationResult};

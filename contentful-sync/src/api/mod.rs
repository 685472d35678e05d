//! Contentful data model and the Management API seam
//!
//! Entries, links and content types as the diff sees them, the JSON parser
//! that produces them, and the [`ManagementApi`] trait the execution layer
//! writes through.

pub mod client;
pub mod locale;
pub mod memory;
pub mod metadata;
pub mod models;
pub mod operations;
pub mod parse;

pub use client::{ManagementApi, WriteOptions};
pub use memory::{ClientCall, MemoryClient, MemoryStats};
pub use metadata::{ContentType, ContentTypes, FieldMetadata, FieldType};
pub use models::{Entry, FieldValue, Link, LinkType, Reference};
pub use operations::{Operation, OperationKind, OperationResult};
pub use parse::EntryParser;

//! Management API collaborator
//!
//! The crate never talks HTTP itself. Callers hand in an implementation of
//! [`ManagementApi`]; the executor and the save orchestration only borrow it.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::api::metadata::ContentType;
use crate::api::models::Entry;

/// Options sent with create and update calls
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOptions {
    pub locale: String,
    /// Identity to create the entry under
    pub id: Option<String>,
    /// Version the update was computed against; clients should reject the
    /// write with [`crate::error::VersionConflict`] when it is stale
    pub version: Option<u64>,
}

impl WriteOptions {
    pub fn new(locale: impl Into<String>) -> Self {
        Self {
            locale: locale.into(),
            id: None,
            version: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_version(mut self, version: Option<u64>) -> Self {
        self.version = version;
        self
    }
}

/// Minimal surface of the Contentful Management API the sync needs
#[async_trait]
pub trait ManagementApi: Send + Sync {
    /// Current authoritative state, including version
    async fn get_entry(&self, id: &str) -> anyhow::Result<Entry>;

    async fn create_entry(
        &self,
        content_type_id: &str,
        fields: &Map<String, Value>,
        options: &WriteOptions,
    ) -> anyhow::Result<Entry>;

    async fn update_entry(
        &self,
        id: &str,
        fields: &Map<String, Value>,
        options: &WriteOptions,
    ) -> anyhow::Result<Entry>;

    async fn delete_entry(&self, id: &str) -> anyhow::Result<()>;

    /// Schema lookup, only used to improve reference detection
    async fn get_content_type(&self, content_type_id: &str) -> anyhow::Result<ContentType>;
}

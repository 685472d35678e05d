//! In-memory Management API
//!
//! Backs the `simulate` command and the executor tests. Entries are stored in
//! their localized wire shape and versions are bumped on every write, so
//! stale updates are rejected the way the remote API rejects them.

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use log::debug;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use crate::api::client::{ManagementApi, WriteOptions};
use crate::api::locale::DEFAULT_LOCALE;
use crate::api::metadata::{ContentType, ContentTypes};
use crate::api::models::Entry;
use crate::api::parse::EntryParser;
use crate::error::VersionConflict;

#[derive(Debug, Clone)]
struct StoredEntry {
    content_type: Option<String>,
    version: u64,
    fields: Map<String, Value>,
}

/// A call the client received, in arrival order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCall {
    Get(String),
    Create(String),
    Update(String),
    Delete(String),
    ContentType(String),
}

/// Statistics for the in-memory client
#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryStats {
    /// Highest number of writes observed in flight at once
    pub max_in_flight: usize,
    pub calls: usize,
}

#[derive(Debug)]
pub struct MemoryClient {
    locale: String,
    entries: Mutex<HashMap<String, StoredEntry>>,
    content_types: Mutex<ContentTypes>,
    failing: Mutex<HashSet<String>>,
    calls: Mutex<Vec<ClientCall>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl Default for MemoryClient {
    fn default() -> Self {
        Self::new(DEFAULT_LOCALE)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MemoryClient {
    pub fn new(locale: impl Into<String>) -> Self {
        Self {
            locale: locale.into(),
            entries: Mutex::new(HashMap::new()),
            content_types: Mutex::new(ContentTypes::new()),
            failing: Mutex::new(HashSet::new()),
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Store `entry` and every nested entry as if they already existed remotely
    pub fn seed(&self, entry: &Entry) {
        let mut entries = lock(&self.entries);
        entry.walk(&mut |e| {
            let Some(id) = e.id() else { return };
            let fields = e
                .payload_fields()
                .into_iter()
                .map(|(name, value)| {
                    let mut by_locale = Map::new();
                    by_locale.insert(self.locale.clone(), value);
                    (name, Value::Object(by_locale))
                })
                .collect();
            entries.entry(id.to_string()).or_insert(StoredEntry {
                content_type: e.content_type.clone(),
                version: e.version.unwrap_or(1),
                fields,
            });
        });
    }

    pub fn add_content_type(&self, content_type: ContentType) {
        lock(&self.content_types).insert(content_type);
    }

    /// Every call touching `id` fails from now on
    pub fn fail_on(&self, id: impl Into<String>) {
        lock(&self.failing).insert(id.into());
    }

    /// Bump the stored version, as a concurrent editor would
    pub fn touch(&self, id: &str) {
        if let Some(stored) = lock(&self.entries).get_mut(id) {
            stored.version += 1;
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        lock(&self.entries).contains_key(id)
    }

    pub fn calls(&self) -> Vec<ClientCall> {
        lock(&self.calls).clone()
    }

    pub fn stats(&self) -> MemoryStats {
        MemoryStats {
            max_in_flight: self.max_in_flight.load(Ordering::SeqCst),
            calls: lock(&self.calls).len(),
        }
    }

    /// Stored localized fields of an entry
    pub fn stored_fields(&self, id: &str) -> Option<Map<String, Value>> {
        lock(&self.entries).get(id).map(|stored| stored.fields.clone())
    }

    fn record(&self, call: ClientCall) {
        lock(&self.calls).push(call);
    }

    fn check_failing(&self, id: &str) -> Result<()> {
        if lock(&self.failing).contains(id) {
            bail!("Injected failure for entry {}", id);
        }
        Ok(())
    }

    /// Hold a write "in flight" across one scheduler turn so concurrent
    /// callers overlap
    async fn in_flight<T>(&self, work: impl FnOnce() -> Result<T>) -> Result<T> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        tokio::task::yield_now().await;
        let result = work();
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn to_entry(&self, id: &str, stored: &StoredEntry) -> Result<Entry> {
        let mut value = Map::new();
        let mut sys = Map::new();
        sys.insert("id".to_string(), Value::String(id.to_string()));
        sys.insert("type".to_string(), Value::String("Entry".to_string()));
        sys.insert("version".to_string(), Value::from(stored.version));
        if let Some(ct) = &stored.content_type {
            sys.insert(
                "contentType".to_string(),
                serde_json::json!({ "sys": { "type": "Link", "linkType": "ContentType", "id": ct } }),
            );
        }
        value.insert("sys".to_string(), Value::Object(sys));
        value.insert("fields".to_string(), Value::Object(stored.fields.clone()));

        let content_types = lock(&self.content_types).clone();
        EntryParser::new()
            .with_content_types(&content_types)
            .localized(&self.locale, &self.locale)
            .parse(&Value::Object(value))
            .with_context(|| format!("Stored entry {} is not readable", id))
    }
}

#[async_trait]
impl ManagementApi for MemoryClient {
    async fn get_entry(&self, id: &str) -> Result<Entry> {
        self.record(ClientCall::Get(id.to_string()));
        self.check_failing(id)?;
        let stored = lock(&self.entries)
            .get(id)
            .cloned()
            .ok_or_else(|| anyhow!("Entry {} not found", id))?;
        self.to_entry(id, &stored)
    }

    async fn create_entry(
        &self,
        content_type_id: &str,
        fields: &Map<String, Value>,
        options: &WriteOptions,
    ) -> Result<Entry> {
        let id = options
            .id
            .clone()
            .ok_or_else(|| anyhow!("In-memory client needs an explicit id to create"))?;
        self.record(ClientCall::Create(id.clone()));

        let stored = self
            .in_flight(|| {
                self.check_failing(&id)?;
                let mut entries = lock(&self.entries);
                if entries.contains_key(&id) {
                    bail!("Entry {} already exists", id);
                }
                let stored = StoredEntry {
                    content_type: Some(content_type_id.to_string()),
                    version: 1,
                    fields: fields.clone(),
                };
                entries.insert(id.clone(), stored.clone());
                Ok(stored)
            })
            .await?;

        debug!("Created entry {} ({})", id, content_type_id);
        self.to_entry(&id, &stored)
    }

    async fn update_entry(
        &self,
        id: &str,
        fields: &Map<String, Value>,
        options: &WriteOptions,
    ) -> Result<Entry> {
        self.record(ClientCall::Update(id.to_string()));

        let stored = self
            .in_flight(|| {
                self.check_failing(id)?;
                let mut entries = lock(&self.entries);
                let stored = entries
                    .get_mut(id)
                    .ok_or_else(|| anyhow!("Entry {} not found", id))?;
                if let Some(expected) = options.version {
                    if expected != stored.version {
                        return Err(VersionConflict {
                            id: id.to_string(),
                            expected: Some(expected),
                            actual: Some(stored.version),
                        }
                        .into());
                    }
                }
                stored.fields = fields.clone();
                stored.version += 1;
                Ok(stored.clone())
            })
            .await?;

        debug!("Updated entry {} to version {}", id, stored.version);
        self.to_entry(id, &stored)
    }

    async fn delete_entry(&self, id: &str) -> Result<()> {
        self.record(ClientCall::Delete(id.to_string()));

        self.in_flight(|| {
            self.check_failing(id)?;
            lock(&self.entries)
                .remove(id)
                .map(|_| ())
                .ok_or_else(|| anyhow!("Entry {} not found", id))
        })
        .await
    }

    async fn get_content_type(&self, content_type_id: &str) -> Result<ContentType> {
        self.record(ClientCall::ContentType(content_type_id.to_string()));
        lock(&self.content_types)
            .get(content_type_id)
            .cloned()
            .ok_or_else(|| anyhow!("Content type {} not found", content_type_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::{FieldValue, Link};
    use serde_json::json;

    #[tokio::test]
    async fn test_seed_and_get() {
        let client = MemoryClient::default();
        client.seed(
            &Entry::new("a")
                .with_content_type("post")
                .with_version(2)
                .with_field("title", "Hello")
                .with_field("child", Entry::new("b").with_field("title", "Child")),
        );

        let a = client.get_entry("a").await.unwrap();
        assert_eq!(a.version, Some(2));
        assert_eq!(a.field("title"), Some(&FieldValue::from("Hello")));
        assert_eq!(a.field("child"), Some(&FieldValue::Link(Link::entry("b"))));
        assert!(client.contains("b"));
    }

    #[tokio::test]
    async fn test_stale_update_is_a_conflict() {
        let client = MemoryClient::default();
        client.seed(&Entry::new("a").with_version(1));
        client.touch("a");

        let mut fields = Map::new();
        fields.insert("title".to_string(), json!({ "en-US": "x" }));
        let err = client
            .update_entry("a", &fields, &WriteOptions::new("en-US").with_version(Some(1)))
            .await
            .unwrap_err();

        let conflict = err.downcast_ref::<VersionConflict>().unwrap();
        assert_eq!(conflict.actual, Some(2));
    }

    #[tokio::test]
    async fn test_create_requires_id_and_rejects_duplicates() {
        let client = MemoryClient::default();
        let fields = Map::new();

        assert!(client
            .create_entry("post", &fields, &WriteOptions::new("en-US"))
            .await
            .is_err());

        let options = WriteOptions::new("en-US").with_id("n1");
        client.create_entry("post", &fields, &options).await.unwrap();
        assert!(client.create_entry("post", &fields, &options).await.is_err());
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let client = MemoryClient::default();
        client.seed(&Entry::new("a"));
        client.fail_on("a");

        assert!(client.delete_entry("a").await.is_err());
        assert!(client.contains("a"));
        assert_eq!(client.calls(), vec![ClientCall::Delete("a".to_string())]);
    }
}

//! Save orchestration: version check, diff, execute, reload

use anyhow::{Context, anyhow};
use log::{debug, info, warn};
use std::collections::BTreeSet;

use crate::api::client::ManagementApi;
use crate::api::metadata::ContentTypes;
use crate::api::models::Entry;
use crate::config::SyncConfig;
use crate::error::{OperationError, SyncError, VersionConflict};
use crate::execution::batch::{BatchExecutor, ExecutionReport};
use crate::graph::{GraphBuilder, OperationsGraph};

/// Result of a successful save
#[derive(Debug)]
pub struct SyncOutcome {
    /// Root entry as stored remotely after the save
    pub entry: Entry,
    pub report: ExecutionReport,
    pub graph: OperationsGraph,
}

/// Saves edited entry trees through a [`ManagementApi`]
pub struct EntrySync<'a, C: ManagementApi + ?Sized> {
    client: &'a C,
    config: SyncConfig,
    content_types: ContentTypes,
}

impl<'a, C: ManagementApi + ?Sized> EntrySync<'a, C> {
    pub fn new(client: &'a C, config: SyncConfig) -> Self {
        Self {
            client,
            config,
            content_types: ContentTypes::new(),
        }
    }

    /// Schemas known up front; fetched ones are added on top
    pub fn with_content_types(mut self, content_types: ContentTypes) -> Self {
        self.content_types = content_types;
        self
    }

    /// Operations needed to turn `initial` into `updated`, without executing them
    pub fn diff(
        &self,
        initial: Option<&Entry>,
        updated: Option<&Entry>,
    ) -> Result<OperationsGraph, SyncError> {
        let options = self.config.build_options(self.content_types.clone());
        Ok(GraphBuilder::new(options).build_entry(initial, updated)?)
    }

    /// Persist `updated`, diffed against `initial`, and return the stored root
    pub async fn save(
        &self,
        initial: Option<&Entry>,
        updated: &Entry,
    ) -> Result<SyncOutcome, SyncError> {
        if self.config.check_version {
            if let Some(initial) = initial {
                self.check_version(initial).await?;
            }
        }

        let content_types = self.resolve_content_types(initial, updated).await;
        let graph = GraphBuilder::new(self.config.build_options(content_types))
            .build_entry(initial, Some(updated))?;
        if graph.is_empty() {
            info!("No changes to save");
        }

        let report = BatchExecutor::new(self.client, self.config.batch.clone())
            .with_locale(self.config.locale.clone())
            .run_graph(&graph)
            .await;

        let root_id = graph
            .root
            .clone()
            .ok_or_else(|| SyncError::Api(anyhow!("Saved graph has no root entry")))?;

        for result in report.conflicts() {
            if result.operation.id() == root_id {
                if let Some(OperationError::Conflict(conflict)) = result.error() {
                    return Err(conflict.clone().into());
                }
            }
        }

        let summary = report.summary();
        info!("{}", summary);

        let entry = self
            .client
            .get_entry(&root_id)
            .await
            .with_context(|| format!("Failed to reload entry {} after save ({})", root_id, summary))
            .map_err(SyncError::Api)?;

        Ok(SyncOutcome {
            entry,
            report,
            graph,
        })
    }

    async fn check_version(&self, initial: &Entry) -> Result<(), SyncError> {
        let (Some(id), Some(expected)) = (initial.id(), initial.version) else {
            return Ok(());
        };

        let remote = self
            .client
            .get_entry(id)
            .await
            .with_context(|| format!("Failed to load entry {} for the version check", id))
            .map_err(SyncError::Api)?;

        if remote.version != Some(expected) {
            return Err(VersionConflict {
                id: id.to_string(),
                expected: Some(expected),
                actual: remote.version,
            }
            .into());
        }
        debug!("Entry {} is still at version {}", id, expected);
        Ok(())
    }

    /// Known schemas plus, when enabled, every schema both trees use
    async fn resolve_content_types(&self, initial: Option<&Entry>, updated: &Entry) -> ContentTypes {
        let mut content_types = self.content_types.clone();
        if !self.config.fetch_content_types {
            return content_types;
        }

        let wanted: BTreeSet<String> = initial
            .into_iter()
            .chain(Some(updated))
            .flat_map(Entry::content_type_ids)
            .filter(|id| !content_types.contains(id))
            .collect();

        for id in wanted {
            match self.client.get_content_type(&id).await {
                Ok(content_type) => content_types.insert(content_type),
                Err(err) => warn!(
                    "Could not load content type {}, detecting references by shape: {:#}",
                    id, err
                ),
            }
        }
        content_types
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::memory::{ClientCall, MemoryClient};
    use crate::api::metadata::{ContentType, FieldMetadata, FieldType};
    use crate::api::models::FieldValue;
    use crate::api::operations::OperationKind;

    fn post(id: &str) -> Entry {
        Entry::new(id).with_version(1).with_content_type("post")
    }

    #[tokio::test]
    async fn test_save_scalar_change() {
        let initial = post("0").with_field("test", "a");
        let updated = initial.clone().with_field("test", "b");
        let client = MemoryClient::default();
        client.seed(&initial);

        let outcome = EntrySync::new(&client, SyncConfig::default())
            .save(Some(&initial), &updated)
            .await
            .unwrap();

        assert_eq!(outcome.entry.field("test"), Some(&FieldValue::from("b")));
        assert_eq!(outcome.entry.version, Some(2));
        assert_eq!(outcome.graph.len(), 1);
        assert_eq!(
            client.calls(),
            vec![
                ClientCall::Get("0".to_string()),
                ClientCall::Update("0".to_string()),
                ClientCall::Get("0".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_save_new_tree() {
        let updated = Entry::draft()
            .with_content_type("post")
            .with_field("title", "Hello")
            .with_field("author", Entry::draft().with_content_type("author").with_field("name", "Ann"));
        let client = MemoryClient::default();

        let outcome = EntrySync::new(&client, SyncConfig::default())
            .save(None, &updated)
            .await
            .unwrap();

        assert!(outcome.report.is_success());
        assert_eq!(outcome.graph.of_kind(OperationKind::Create).len(), 2);
        assert_eq!(outcome.entry.id, outcome.graph.root);
        assert_eq!(outcome.entry.field("title"), Some(&FieldValue::from("Hello")));
    }

    #[tokio::test]
    async fn test_stale_root_is_rejected_before_writing() {
        let initial = post("0").with_field("test", "a");
        let updated = initial.clone().with_field("test", "b");
        let client = MemoryClient::default();
        client.seed(&initial);
        client.touch("0");

        let err = EntrySync::new(&client, SyncConfig::default())
            .save(Some(&initial), &updated)
            .await
            .unwrap_err();

        match err {
            SyncError::Conflict(conflict) => {
                assert_eq!(conflict.expected, Some(1));
                assert_eq!(conflict.actual, Some(2));
            }
            other => panic!("expected conflict, got {:?}", other),
        }
        assert_eq!(client.calls(), vec![ClientCall::Get("0".to_string())]);
    }

    #[tokio::test]
    async fn test_root_update_conflict_without_precheck() {
        let initial = post("0").with_field("test", "a");
        let updated = initial.clone().with_field("test", "b");
        let client = MemoryClient::default();
        client.seed(&initial);
        client.touch("0");
        let config = SyncConfig::builder().check_version(false).build();

        let err = EntrySync::new(&client, config)
            .save(Some(&initial), &updated)
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_child_failure_does_not_block_root() {
        let initial = post("p").with_field("title", "before");
        // No content type, so the child create cannot be sent
        let updated = post("p")
            .with_field("title", "after")
            .with_field("child", Entry::draft().with_field("name", "x"));
        let client = MemoryClient::default();
        client.seed(&initial);

        let outcome = EntrySync::new(&client, SyncConfig::default())
            .save(Some(&initial), &updated)
            .await
            .unwrap();

        let failures = outcome.report.failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].error(), Some(&OperationError::MissingContentType));
        assert_eq!(outcome.report.summary(), "Updating 1 of 2 entries failed");
        assert_eq!(outcome.entry.field("title"), Some(&FieldValue::from("after")));
    }

    #[tokio::test]
    async fn test_fetches_content_types_once_per_id() {
        let initial = post("p").with_field("slug", "a");
        let updated = post("p")
            .with_field("slug", "b")
            .with_field("child", Entry::draft().with_content_type("post"));
        let client = MemoryClient::default();
        client.seed(&initial);
        client.add_content_type(
            ContentType::new("post")
                .with_field(FieldMetadata::new("slug", FieldType::Symbol))
                .with_field(FieldMetadata::link("child", "Entry")),
        );
        let config = SyncConfig::builder().fetch_content_types(true).build();

        let outcome = EntrySync::new(&client, config)
            .save(Some(&initial), &updated)
            .await
            .unwrap();

        let lookups = client
            .calls()
            .into_iter()
            .filter(|c| matches!(c, ClientCall::ContentType(_)))
            .count();
        assert_eq!(lookups, 1);
        assert!(outcome.report.is_success());
    }

    #[tokio::test]
    async fn test_fetched_schema_detects_plain_json_link() {
        let initial = post("p")
            .with_field("slug", "a")
            .with_field("author", serde_json::json!({ "sys": { "id": "a", "linkType": "Entry" } }));
        let updated = post("p").with_field("slug", "a");
        let client = MemoryClient::default();
        client.seed(&initial);
        client.seed(&Entry::new("a").with_version(1).with_content_type("person"));
        client.add_content_type(
            ContentType::new("post")
                .with_field(FieldMetadata::new("slug", FieldType::Symbol))
                .with_field(FieldMetadata::link("author", "Entry")),
        );
        let config = SyncConfig::builder()
            .fetch_content_types(true)
            .should_delete(true)
            .build();

        let outcome = EntrySync::new(&client, config)
            .save(Some(&initial), &updated)
            .await
            .unwrap();

        assert_eq!(outcome.graph.dereferences().len(), 1);
        assert_eq!(outcome.graph.dereferences()[0].id(), "a");
        assert!(outcome.report.is_success());
        assert!(!client.contains("a"));
    }

    #[tokio::test]
    async fn test_missing_content_type_falls_back_to_shape() {
        let initial = Entry::new("p").with_version(1).with_content_type("unknown");
        let updated = initial.clone().with_field("title", "x");
        let client = MemoryClient::default();
        client.seed(&initial);
        let config = SyncConfig::builder().fetch_content_types(true).build();

        let outcome = EntrySync::new(&client, config)
            .save(Some(&initial), &updated)
            .await
            .unwrap();

        assert!(outcome.report.is_success());
        assert_eq!(outcome.entry.field("title"), Some(&FieldValue::from("x")));
    }

    #[test]
    fn test_diff_without_changes_is_empty() {
        let entry = post("0").with_field("test", "a");
        let client = MemoryClient::default();

        let graph = EntrySync::new(&client, SyncConfig::default())
            .diff(Some(&entry), Some(&entry))
            .unwrap();
        assert!(graph.is_empty());
        assert!(client.calls().is_empty());
    }
}

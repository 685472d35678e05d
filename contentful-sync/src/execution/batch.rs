//! Rate-limited replay of graph operations
//!
//! Batches run one after another and the operations inside a batch run
//! concurrently. A failed operation is recorded and never aborts its
//! siblings or later batches. Nothing is rolled back.

use futures::future::join_all;
use log::{debug, error, info, warn};
use serde::Serialize;

use crate::api::client::{ManagementApi, WriteOptions};
use crate::api::locale::DEFAULT_LOCALE;
use crate::api::operations::{Operation, OperationKind, OperationResult};
use crate::config::BatchConfig;
use crate::error::OperationError;
use crate::graph::OperationsGraph;

/// Split operations into chunks of at most `size`, keeping their order
pub fn chunk_operations(operations: &[Operation], size: usize) -> Vec<Vec<Operation>> {
    operations
        .chunks(size.max(1))
        .map(<[Operation]>::to_vec)
        .collect()
}

/// One batch of a plan, all operations of the same kind
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedBatch {
    pub kind: OperationKind,
    pub operations: Vec<Operation>,
}

/// What [`BatchExecutor::run_graph`] will execute, in order
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExecutionPlan {
    pub batches: Vec<PlannedBatch>,
    /// Dereferences left alone because deleting is disabled
    pub skipped: Vec<Operation>,
}

impl ExecutionPlan {
    /// Order the graph's operations: creates, updates, then dereferences
    pub fn from_graph(graph: &OperationsGraph, config: &BatchConfig) -> Self {
        let mut plan = Self::default();

        for kind in [OperationKind::Create, OperationKind::Update] {
            let groups: Vec<Vec<Operation>> = if config.respect_dependencies {
                graph
                    .dependency_levels(kind)
                    .into_iter()
                    .map(|level| level.into_iter().cloned().collect())
                    .collect()
            } else {
                vec![graph.of_kind(kind).into_iter().cloned().collect()]
            };
            for group in groups {
                plan.push(kind, group, config.batch_size());
            }
        }

        let dereferences: Vec<Operation> = graph.dereferences().into_iter().cloned().collect();
        if config.should_delete {
            plan.push(OperationKind::Dereference, dereferences, config.batch_size());
        } else {
            plan.skipped = dereferences;
        }
        plan
    }

    fn push(&mut self, kind: OperationKind, operations: Vec<Operation>, size: usize) {
        for chunk in chunk_operations(&operations, size) {
            self.batches.push(PlannedBatch {
                kind,
                operations: chunk,
            });
        }
    }

    pub fn operation_count(&self) -> usize {
        self.batches.iter().map(|b| b.operations.len()).sum()
    }
}

/// Outcome of a run
#[derive(Debug, Default)]
pub struct ExecutionReport {
    /// One result per executed operation, batch by batch
    pub results: Vec<OperationResult>,
    /// Operations that were deliberately not executed
    pub skipped: Vec<Operation>,
    /// Number of batches executed
    pub batches: usize,
}

impl ExecutionReport {
    /// Failed operations other than version conflicts
    pub fn failures(&self) -> Vec<&OperationResult> {
        self.results
            .iter()
            .filter(|r| r.is_error() && !r.is_conflict())
            .collect()
    }

    pub fn conflicts(&self) -> Vec<&OperationResult> {
        self.results.iter().filter(|r| r.is_conflict()).collect()
    }

    pub fn succeeded(&self) -> Vec<&OperationResult> {
        self.results.iter().filter(|r| r.is_success()).collect()
    }

    pub fn is_success(&self) -> bool {
        self.results.iter().all(OperationResult::is_success)
    }

    /// Ids of every operation that did not apply
    pub fn failed_ids(&self) -> Vec<&str> {
        self.results
            .iter()
            .filter(|r| r.is_error())
            .map(|r| r.operation.id())
            .collect()
    }

    /// One-line status for the user
    pub fn summary(&self) -> String {
        let conflicts = self.conflicts().len();
        let failures = self.failures().len();
        if conflicts > 0 {
            format!(
                "{} {} changed remotely since it was loaded, reload before saving",
                conflicts,
                if conflicts == 1 { "entry" } else { "entries" }
            )
        } else if failures > 0 {
            format!(
                "Updating {} of {} entries failed",
                failures,
                self.results.len()
            )
        } else {
            "Saved".to_string()
        }
    }
}

/// Replays operations against a [`ManagementApi`]
pub struct BatchExecutor<'a, C: ManagementApi + ?Sized> {
    client: &'a C,
    config: BatchConfig,
    locale: String,
}

impl<'a, C: ManagementApi + ?Sized> BatchExecutor<'a, C> {
    pub fn new(client: &'a C, config: BatchConfig) -> Self {
        Self {
            client,
            config,
            locale: DEFAULT_LOCALE.to_string(),
        }
    }

    /// Locale sent along with every write
    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = locale.into();
        self
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Run `operations` in order, `rate_limit` at a time
    pub async fn run(&self, operations: &[Operation]) -> ExecutionReport {
        let mut report = ExecutionReport::default();
        for batch in chunk_operations(operations, self.config.batch_size()) {
            self.run_batch(batch, &mut report).await;
        }
        report
    }

    /// Run a whole graph: creates, then updates, then dereferences when
    /// deleting is enabled
    pub async fn run_graph(&self, graph: &OperationsGraph) -> ExecutionReport {
        let plan = ExecutionPlan::from_graph(graph, &self.config);
        info!(
            "Executing {} operations in {} batches",
            plan.operation_count(),
            plan.batches.len()
        );

        let mut report = ExecutionReport::default();
        for batch in plan.batches {
            debug!("Starting {} batch", batch.kind);
            self.run_batch(batch.operations, &mut report).await;
        }

        if !plan.skipped.is_empty() {
            info!(
                "Skipping {} dereferenced entries, deleting is disabled",
                plan.skipped.len()
            );
        }
        report.skipped = plan.skipped;
        report
    }

    async fn run_batch(&self, batch: Vec<Operation>, report: &mut ExecutionReport) {
        report.batches += 1;
        debug!(
            "Batch {}: {} operations",
            report.batches,
            batch.len()
        );

        let results = join_all(batch.into_iter().map(|op| self.execute(op))).await;
        for result in results {
            match result.error() {
                Some(err) if err.is_conflict() => warn!("{}", err),
                Some(err) => error!(
                    "{} of entry {} failed: {}",
                    result.operation.kind(),
                    result.operation.id(),
                    err
                ),
                None => {}
            }
            report.results.push(result);
        }
    }

    /// Send a single operation to the client
    pub async fn execute(&self, operation: Operation) -> OperationResult {
        let options = WriteOptions::new(self.locale.clone());
        let outcome = match &operation {
            Operation::Create {
                id,
                content_type,
                fields,
            } => match content_type {
                Some(content_type) => self
                    .client
                    .create_entry(content_type, fields, &options.with_id(id.clone()))
                    .await
                    .map(Some)
                    .map_err(OperationError::from),
                None => Err(OperationError::MissingContentType),
            },
            Operation::Update {
                id,
                version,
                fields,
                ..
            } => self
                .client
                .update_entry(id, fields, &options.with_version(*version))
                .await
                .map(Some)
                .map_err(OperationError::from),
            Operation::Dereference { id } => self
                .client
                .delete_entry(id)
                .await
                .map(|()| None)
                .map_err(OperationError::from),
        };
        OperationResult::new(operation, outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::memory::{ClientCall, MemoryClient};
    use crate::api::models::Entry;
    use crate::graph::identity::sequential;
    use crate::graph::{BuildOptions, GraphBuilder};
    use serde_json::{Map, json};

    fn create(id: &str) -> Operation {
        let mut fields = Map::new();
        fields.insert("title".to_string(), json!({ "en-US": id }));
        Operation::Create {
            id: id.to_string(),
            content_type: Some("post".to_string()),
            fields,
        }
    }

    fn config(rate_limit: usize) -> BatchConfig {
        BatchConfig {
            rate_limit,
            ..Default::default()
        }
    }

    fn builder() -> GraphBuilder {
        GraphBuilder::new(BuildOptions::default()).with_id_generator(sequential("gen"))
    }

    #[test]
    fn test_chunk_operations() {
        let ops: Vec<Operation> = (0..10).map(|i| create(&format!("op-{}", i))).collect();

        let sizes: Vec<usize> = chunk_operations(&ops, 4).iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![4, 4, 2]);

        let chunks = chunk_operations(&ops, 0);
        assert_eq!(chunks.len(), 10);
        assert_eq!(chunks[3][0].id(), "op-3");

        assert!(chunk_operations(&[], 4).is_empty());
    }

    #[tokio::test]
    async fn test_partial_failure_is_isolated() {
        let client = MemoryClient::default();
        client.fail_on("op-2");
        let ops: Vec<Operation> = (0..10).map(|i| create(&format!("op-{}", i))).collect();

        let report = BatchExecutor::new(&client, config(4)).run(&ops).await;

        assert_eq!(report.batches, 3);
        assert_eq!(report.results.len(), 10);
        assert_eq!(report.failures().len(), 1);
        assert_eq!(report.failed_ids(), vec!["op-2"]);
        assert_eq!(report.succeeded().len(), 9);
        assert!(!report.is_success());
        assert_eq!(report.summary(), "Updating 1 of 10 entries failed");
        for i in (0..10).filter(|i| *i != 2) {
            assert!(client.contains(&format!("op-{}", i)));
        }
        assert!(!client.contains("op-2"));
    }

    #[tokio::test]
    async fn test_batch_never_exceeds_rate_limit() {
        let client = MemoryClient::default();
        let ops: Vec<Operation> = (0..10).map(|i| create(&format!("op-{}", i))).collect();

        let report = BatchExecutor::new(&client, config(4)).run(&ops).await;

        assert!(report.is_success());
        assert_eq!(report.summary(), "Saved");
        let stats = client.stats();
        assert!(stats.max_in_flight <= 4);
        assert!(stats.max_in_flight > 1);
        assert_eq!(stats.calls, 10);
    }

    #[tokio::test]
    async fn test_create_without_content_type_fails_locally() {
        let client = MemoryClient::default();
        let op = Operation::Create {
            id: "x".to_string(),
            content_type: None,
            fields: Map::new(),
        };

        let report = BatchExecutor::new(&client, config(4)).run(&[op]).await;

        assert_eq!(
            report.results[0].error(),
            Some(&OperationError::MissingContentType)
        );
        assert!(client.calls().is_empty());
    }

    #[tokio::test]
    async fn test_conflicts_are_reported_apart() {
        let client = MemoryClient::default();
        client.seed(&Entry::new("a").with_version(1).with_field("title", "old"));
        client.touch("a");
        let op = Operation::Update {
            id: "a".to_string(),
            content_type: None,
            version: Some(1),
            fields: Map::new(),
        };

        let report = BatchExecutor::new(&client, config(4)).run(&[op]).await;

        assert_eq!(report.conflicts().len(), 1);
        assert!(report.failures().is_empty());
        assert_eq!(report.failed_ids(), vec!["a"]);
        assert!(report.summary().contains("changed remotely"));
    }

    #[tokio::test]
    async fn test_graph_runs_creates_then_updates_and_skips_dereferences() {
        let initial = Entry::new("p")
            .with_version(1)
            .with_content_type("post")
            .with_field("child", Entry::new("old").with_content_type("post"));
        let updated = Entry::new("p").with_content_type("post").with_field(
            "child",
            Entry::draft().with_content_type("post").with_field("title", "new"),
        );
        let client = MemoryClient::default();
        client.seed(&initial);

        let graph = builder().build_entry(Some(&initial), Some(&updated)).unwrap();
        let report = BatchExecutor::new(&client, config(4)).run_graph(&graph).await;

        assert!(report.is_success());
        assert_eq!(
            client.calls(),
            vec![
                ClientCall::Create("gen-1".to_string()),
                ClientCall::Update("p".to_string()),
            ]
        );
        assert_eq!(report.skipped, vec![Operation::Dereference { id: "old".to_string() }]);
        assert!(client.contains("old"));
    }

    #[tokio::test]
    async fn test_dereferences_run_last_when_deleting() {
        let initial = Entry::new("p")
            .with_version(1)
            .with_content_type("post")
            .with_field("child", Entry::new("old").with_content_type("post"));
        let updated = Entry::new("p").with_content_type("post").with_field(
            "child",
            Entry::draft().with_content_type("post").with_field("title", "new"),
        );
        let client = MemoryClient::default();
        client.seed(&initial);
        let config = BatchConfig {
            should_delete: true,
            ..Default::default()
        };

        let graph = builder().build_entry(Some(&initial), Some(&updated)).unwrap();
        let report = BatchExecutor::new(&client, config).run_graph(&graph).await;

        assert!(report.is_success());
        assert!(report.skipped.is_empty());
        assert_eq!(report.batches, 3);
        assert_eq!(
            client.calls().last(),
            Some(&ClientCall::Delete("old".to_string()))
        );
        assert!(!client.contains("old"));
    }

    #[tokio::test]
    async fn test_respect_dependencies_creates_children_first() {
        let leaf = Entry::draft().with_content_type("post").with_field("title", "leaf");
        let middle = Entry::draft().with_content_type("post").with_field("child", leaf);
        let root = Entry::draft().with_content_type("post").with_field("child", middle);

        let graph = builder().build_entry(None, Some(&root)).unwrap();
        let root_id = graph.root.clone().unwrap();
        let middle_id = graph.children(&root_id)[0].clone();
        let leaf_id = graph.children(&middle_id)[0].clone();

        let client = MemoryClient::default();
        let config = BatchConfig {
            respect_dependencies: true,
            ..Default::default()
        };
        let report = BatchExecutor::new(&client, config).run_graph(&graph).await;

        assert!(report.is_success());
        assert_eq!(report.batches, 3);
        assert_eq!(
            client.calls(),
            vec![
                ClientCall::Create(leaf_id),
                ClientCall::Create(middle_id),
                ClientCall::Create(root_id),
            ]
        );
    }

    #[test]
    fn test_plan_batches_by_kind() {
        let mut graph = OperationsGraph::default();
        graph.nodes = (0..5).map(|i| create(&format!("c{}", i))).collect();
        graph.nodes.push(Operation::Dereference { id: "gone".to_string() });

        let plan = ExecutionPlan::from_graph(&graph, &config(2));
        let kinds: Vec<OperationKind> = plan.batches.iter().map(|b| b.kind).collect();
        assert_eq!(kinds, vec![OperationKind::Create; 3]);
        assert_eq!(plan.operation_count(), 5);
        assert_eq!(plan.skipped.len(), 1);
    }
}

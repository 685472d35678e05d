//! `simulate` command: dry run of a save against an in-memory space

use anyhow::{Context, Result, bail};
use colored::*;
use serde_json::json;

use crate::api::memory::MemoryClient;
use crate::cli::input::DiffInput;
use crate::cli::{EntryArgs, OutputFormat};
use crate::config::SyncConfig;
use crate::execution::{BatchExecutor, EntrySync, ExecutionReport};

pub async fn handle_simulate_command(
    args: EntryArgs,
    fail_on: Vec<String>,
    config: SyncConfig,
) -> Result<()> {
    let input = DiffInput::load(&args, config)?;
    let report = simulate(&input, fail_on).await?;

    match args.format {
        OutputFormat::Json => {
            let value = json!({
                "summary": report.summary(),
                "batches": report.batches,
                "succeeded": report.succeeded().iter().map(|r| r.operation.id()).collect::<Vec<_>>(),
                "failed": report.failed_ids(),
                "skipped": report.skipped.iter().map(|op| op.id()).collect::<Vec<_>>(),
            });
            println!(
                "{}",
                serde_json::to_string_pretty(&value).context("Failed to format JSON output")?
            );
        }
        OutputFormat::Summary => print!("{}", render_report(&report)),
    }
    Ok(())
}

/// Seed a [`MemoryClient`] with the initial entries and save the updated ones
pub async fn simulate(input: &DiffInput, fail_on: Vec<String>) -> Result<ExecutionReport> {
    let client = MemoryClient::new(input.config.locale.clone());
    for entry in &input.initial.entries {
        client.seed(entry);
    }
    for content_type in input.content_types.iter() {
        client.add_content_type(content_type.clone());
    }
    for id in fail_on {
        client.fail_on(id);
    }

    if input.is_single() {
        let Some(updated) = input.updated.entries.first() else {
            bail!("The updated file holds no entry to save");
        };
        let outcome = EntrySync::new(&client, input.config.clone())
            .with_content_types(input.content_types.clone())
            .save(input.initial.entries.first(), updated)
            .await?;
        return Ok(outcome.report);
    }

    let graph = input.build_graph()?;
    Ok(BatchExecutor::new(&client, input.config.batch.clone())
        .with_locale(input.config.locale.clone())
        .run_graph(&graph)
        .await)
}

fn render_report(report: &ExecutionReport) -> String {
    let mut out = String::new();
    for result in &report.results {
        let line = match result.error() {
            None => format!("{} {} {}", "ok".green(), result.operation.kind(), result.operation.id()),
            Some(err) if err.is_conflict() => {
                format!("{} {}", "conflict".yellow(), err)
            }
            Some(err) => format!(
                "{} {} {}: {}",
                "failed".red(),
                result.operation.kind(),
                result.operation.id(),
                err
            ),
        };
        out.push_str(&line);
        out.push('\n');
    }
    for op in &report.skipped {
        out.push_str(&format!("{} {} {}\n", "skipped".dimmed(), op.kind(), op.id()));
    }

    let summary = report.summary();
    let summary = if report.is_success() {
        summary.as_str().bright_green().bold()
    } else {
        summary.as_str().bright_red().bold()
    };
    out.push_str(&format!("{} ({} batches)\n", summary, report.batches));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::Entry;
    use crate::cli::input::EntryFile;
    use crate::api::metadata::ContentTypes;

    fn input(initial: Vec<Entry>, updated: Vec<Entry>, is_list: bool) -> DiffInput {
        DiffInput {
            initial: EntryFile {
                entries: initial,
                is_list,
            },
            updated: EntryFile {
                entries: updated,
                is_list,
            },
            content_types: ContentTypes::new(),
            config: SyncConfig::default(),
        }
    }

    #[tokio::test]
    async fn test_simulate_single_save() {
        let initial = Entry::new("0").with_version(1).with_content_type("post").with_field("t", "a");
        let updated = initial.clone().with_field("t", "b");

        let report = simulate(&input(vec![initial], vec![updated], false), Vec::new())
            .await
            .unwrap();
        assert!(report.is_success());
        assert_eq!(report.results.len(), 1);
    }

    #[tokio::test]
    async fn test_simulate_list_with_injected_failure() {
        let a = Entry::new("a").with_version(1).with_content_type("post").with_field("t", "1");
        let b = Entry::new("b").with_version(1).with_content_type("post").with_field("t", "1");
        let updated = vec![a.clone().with_field("t", "2"), b.clone().with_field("t", "2")];

        let report = simulate(&input(vec![a, b], updated, true), vec!["b".to_string()])
            .await
            .unwrap();
        assert_eq!(report.failed_ids(), vec!["b"]);
        assert_eq!(report.succeeded().len(), 1);

        colored::control::set_override(false);
        let out = render_report(&report);
        assert!(out.contains("ok update a"));
        assert!(out.contains("failed update b"));
        assert!(out.contains("Updating 1 of 2 entries failed"));
    }

    #[tokio::test]
    async fn test_simulate_requires_updated_entry() {
        let initial = Entry::new("0").with_version(1);
        let result = simulate(&input(vec![initial], Vec::new(), false), Vec::new()).await;
        assert!(result.is_err());
    }
}

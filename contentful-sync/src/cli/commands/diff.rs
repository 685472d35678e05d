//! `diff` and `plan` commands

use anyhow::{Context, Result};
use colored::*;

use crate::api::operations::{Operation, OperationKind};
use crate::cli::input::DiffInput;
use crate::cli::{EntryArgs, OutputFormat};
use crate::config::SyncConfig;
use crate::execution::ExecutionPlan;
use crate::graph::OperationsGraph;

pub fn handle_diff_command(args: EntryArgs, config: SyncConfig) -> Result<()> {
    let input = DiffInput::load(&args, config)?;
    let graph = input.build_graph()?;

    match args.format {
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(&graph).context("Failed to format JSON output")?
        ),
        OutputFormat::Summary => print!("{}", render_graph(&graph)),
    }
    Ok(())
}

pub fn handle_plan_command(args: EntryArgs, config: SyncConfig) -> Result<()> {
    let input = DiffInput::load(&args, config)?;
    let graph = input.build_graph()?;
    let plan = ExecutionPlan::from_graph(&graph, &input.config.batch);

    match args.format {
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(&plan).context("Failed to format JSON output")?
        ),
        OutputFormat::Summary => print!("{}", render_plan(&plan)),
    }
    Ok(())
}

fn describe(op: &Operation) -> String {
    let label = match op.kind() {
        OperationKind::Create => "+ create".green(),
        OperationKind::Update => "~ update".yellow(),
        OperationKind::Dereference => "- dereference".red(),
    };
    match op.content_type() {
        Some(ct) => format!("{} {} {}", label, op.id().bold(), format!("({})", ct).as_str().dimmed()),
        None => format!("{} {}", label, op.id().bold()),
    }
}

/// Human readable listing of a graph
pub fn render_graph(graph: &OperationsGraph) -> String {
    if graph.is_empty() {
        return format!("{}\n", "No changes".bright_green());
    }

    let mut out = String::new();
    for op in &graph.nodes {
        out.push_str(&describe(op));
        out.push('\n');
    }

    if !graph.edges.is_empty() {
        out.push('\n');
        out.push_str(&format!("{}\n", "References:".bold()));
        for (parent, children) in &graph.edges {
            out.push_str(&format!("  {} -> {}\n", parent, children.join(", ")));
        }
    }

    let counts: Vec<String> = OperationKind::ALL
        .iter()
        .map(|kind| format!("{} {}", graph.of_kind(*kind).len(), kind))
        .collect();
    out.push('\n');
    out.push_str(&format!("{}\n", counts.join(", ")));
    out
}

/// Human readable listing of the batches a run would execute
pub fn render_plan(plan: &ExecutionPlan) -> String {
    let mut out = String::new();
    if plan.batches.is_empty() {
        out.push_str(&format!("{}\n", "Nothing to execute".bright_green()));
    }

    for (idx, batch) in plan.batches.iter().enumerate() {
        out.push_str(&format!(
            "{} {} ({} {})\n",
            "Batch".bold(),
            idx + 1,
            batch.operations.len(),
            batch.kind
        ));
        for op in &batch.operations {
            out.push_str(&format!("  {}\n", describe(op)));
        }
    }

    if !plan.skipped.is_empty() {
        out.push_str(&format!(
            "{} {}\n",
            "Not deleted (deleting is disabled):".dimmed(),
            plan.skipped
                .iter()
                .map(Operation::id)
                .collect::<Vec<_>>()
                .join(", ")
        ));
    }
    out
}

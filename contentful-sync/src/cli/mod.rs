//! Command line interface

pub mod commands;
pub mod input;

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::config::SyncConfig;

#[derive(Parser, Debug)]
#[command(name = "contentful-sync")]
#[command(about = "Diff Contentful entry trees and replay the changes in batches", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Log debug output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Config file to use instead of the default location
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show the operations that turn the initial entries into the updated ones
    Diff(EntryArgs),

    /// Show the batches the executor would run
    Plan {
        #[command(flatten)]
        entries: EntryArgs,

        /// Override the configured batch size
        #[arg(long)]
        rate_limit: Option<usize>,

        /// Delete dereferenced entries
        #[arg(long)]
        delete: bool,

        /// Run creates and updates children first
        #[arg(long)]
        respect_dependencies: bool,
    },

    /// Run the save against an in-memory copy of the initial entries
    Simulate {
        #[command(flatten)]
        entries: EntryArgs,

        /// Make every call for this entry id fail (repeatable)
        #[arg(long, value_name = "ID")]
        fail_on: Vec<String>,

        /// Delete dereferenced entries
        #[arg(long)]
        delete: bool,
    },

    /// Print the effective configuration
    Config,
}

/// Inputs shared by the diffing commands
#[derive(Args, Debug, Clone)]
pub struct EntryArgs {
    /// Entries as loaded (`null` when there is no initial entry)
    #[arg(value_name = "INITIAL")]
    pub initial: PathBuf,

    /// Entries after editing
    #[arg(value_name = "UPDATED")]
    pub updated: PathBuf,

    /// Content type definitions used to detect reference fields
    #[arg(long, value_name = "PATH")]
    pub content_types: Option<PathBuf>,

    /// Field values in the files are keyed by locale
    #[arg(long)]
    pub localized: bool,

    /// Locale of the entries, overrides the configured one
    #[arg(long)]
    pub locale: Option<String>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Summary)]
    pub format: OutputFormat,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Summary,
    Json,
}

/// Dispatch a parsed command line
pub async fn run(cli: Cli, config: SyncConfig) -> Result<()> {
    match cli.command {
        Commands::Diff(args) => commands::diff::handle_diff_command(args, config),
        Commands::Plan {
            entries,
            rate_limit,
            delete,
            respect_dependencies,
        } => {
            let mut config = config;
            if let Some(rate_limit) = rate_limit {
                config.batch.rate_limit = rate_limit;
            }
            config.batch.should_delete |= delete;
            config.batch.respect_dependencies |= respect_dependencies;
            commands::diff::handle_plan_command(entries, config)
        }
        Commands::Simulate {
            entries,
            fail_on,
            delete,
        } => {
            let mut config = config;
            config.batch.should_delete |= delete;
            commands::simulate::handle_simulate_command(entries, fail_on, config).await
        }
        Commands::Config => commands::config::handle_config_command(cli.config.as_deref(), &config),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_plan_flags() {
        let cli = Cli::try_parse_from([
            "contentful-sync",
            "plan",
            "a.json",
            "b.json",
            "--rate-limit",
            "2",
            "--delete",
            "--format",
            "json",
        ])
        .unwrap();

        match cli.command {
            Commands::Plan {
                entries,
                rate_limit,
                delete,
                respect_dependencies,
            } => {
                assert_eq!(entries.initial, PathBuf::from("a.json"));
                assert_eq!(entries.format, OutputFormat::Json);
                assert_eq!(rate_limit, Some(2));
                assert!(delete);
                assert!(!respect_dependencies);
            }
            other => panic!("expected plan, got {:?}", other),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["contentful-sync", "config", "--verbose"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(cli.command, Commands::Config));
    }
}

//! `config` command

use anyhow::{Context, Result};
use colored::*;
use std::path::Path;

use crate::config::SyncConfig;

pub fn handle_config_command(path: Option<&Path>, config: &SyncConfig) -> Result<()> {
    let source = match path.map(Path::to_path_buf).or_else(SyncConfig::default_path) {
        Some(path) if path.exists() => path.display().to_string(),
        Some(path) => format!("{} (not found, using defaults)", path.display()),
        None => "defaults".to_string(),
    };
    println!("{} {}", "Config:".bold(), source.as_str().cyan());
    println!();
    println!(
        "{}",
        toml::to_string_pretty(config).context("Failed to format configuration")?
    );
    Ok(())
}

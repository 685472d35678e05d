use anyhow::Result;
use clap::Parser;
use log::debug;

use contentful_sync::cli::{self, Cli};
use contentful_sync::config::SyncConfig;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    let config = SyncConfig::load(cli.config.as_deref())?.with_env_overrides()?;
    debug!("Effective config: {:?}", config);

    cli::run(cli, config).await
}

//! Marquee CLI entry point.

use anyhow::Result;
use clap::Parser;
use marquee::cli::{commands, Cli, Commands};
use marquee::config::Settings;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| format!("marquee={}", log_level)),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    // Load configuration
    let config_path = cli.config.as_deref().map(Settings::expand_path);
    let settings = Settings::load_from(config_path.as_ref())?;

    // Ensure the data directory exists
    std::fs::create_dir_all(settings.data_dir())?;

    // Execute command
    match &cli.command {
        Commands::Index { source } => {
            commands::run_index(source, settings).await?;
        }

        Commands::Search { query, limit, item } => {
            commands::run_search(query, *limit, *item, settings).await?;
        }

        Commands::Ask {
            question,
            item,
            model,
        } => {
            commands::run_ask(question, *item, model.clone(), settings).await?;
        }

        Commands::Chat { item, model } => {
            commands::run_chat(*item, model.clone(), settings).await?;
        }

        Commands::Serve { host, port } => {
            commands::run_serve(host, *port, settings).await?;
        }

        Commands::Config { action } => {
            commands::run_config(action, config_path, settings)?;
        }
    }

    Ok(())
}

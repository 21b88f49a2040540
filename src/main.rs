//! node-stats-exporter
//!
//! One-shot exporter entry point. Resolves configuration, installs the stderr
//! logger and either runs a subcommand or performs a single scrape whose
//! exposition text is written to stdout.

mod commands;

use anyhow::{Context, Result};
use clap::Parser;
use std::io::Write;
use std::sync::Arc;
use tracing::level_filters::LevelFilter;
use tracing::{debug, info};

use commands::{command_check, command_config, command_nft};
use node_stats_exporter::cli::{Args, Commands};
use node_stats_exporter::config::{
    resolve_config, show_config, validate_effective_config, Config,
};
use node_stats_exporter::{RealFs, Scraper};

/// Maps a configured level name to a tracing filter. Unknown names fall back
/// to `warn`; `validate_effective_config` rejects them before a scrape.
fn level_filter(level: &str) -> LevelFilter {
    match level {
        "off" => LevelFilter::OFF,
        "error" => LevelFilter::ERROR,
        "info" => LevelFilter::INFO,
        "debug" => LevelFilter::DEBUG,
        "trace" => LevelFilter::TRACE,
        _ => LevelFilter::WARN,
    }
}

/// Initializes tracing. Logs go to stderr; stdout carries the exposition.
fn setup_logging(config: &Config) {
    let level = config.log_level.as_deref().unwrap_or("warn");
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level_filter(level))
        .with_target(true)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return;
    }
    debug!("Logging initialized with level: {}", level);
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = resolve_config(&args)?;

    if args.check_config {
        if let Err(e) = validate_effective_config(&config) {
            eprintln!("❌ Configuration invalid: {}", e);
            std::process::exit(1);
        }
        println!("✅ Configuration is valid");
        return Ok(());
    }

    if args.show_config {
        show_config(&config, args.config_format)?;
        return Ok(());
    }

    setup_logging(&config);

    if let Some(command) = args.command {
        return match command {
            Commands::Check { docker } => command_check(&config, docker).await,
            Commands::Config {
                output,
                format,
                commented,
            } => command_config(output, format, commented),
            Commands::Nft { input } => command_nft(&input, &config),
        };
    }

    validate_effective_config(&config).context("configuration invalid")?;

    let scraper = Scraper::new(config, Arc::new(RealFs));
    let text = scraper.run().await;

    let mut stdout = std::io::stdout().lock();
    stdout
        .write_all(text.as_bytes())
        .and_then(|_| stdout.flush())
        .context("failed to write metrics to stdout")?;
    info!(bytes = text.len(), "metrics written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_filter() {
        assert_eq!(level_filter("off"), LevelFilter::OFF);
        assert_eq!(level_filter("debug"), LevelFilter::DEBUG);
        assert_eq!(level_filter("bogus"), LevelFilter::WARN);
    }
}

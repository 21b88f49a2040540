//! Nft command implementation.
//!
//! Flattens a saved `nft -j list ruleset` document and prints the resulting
//! counter families, without touching the live ruleset.

use anyhow::{Context, Result};
use std::io::Read;
use std::path::Path;
use tracing::info;

use node_stats_exporter::config::Config;
use node_stats_exporter::exposition::ExpositionWriter;
use node_stats_exporter::nftables::{emit, flatten, Ruleset, SizeHistogram};

fn read_input(input: &Path) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    if input.as_os_str() == "-" {
        std::io::stdin()
            .read_to_end(&mut buf)
            .context("failed to read ruleset from stdin")?;
    } else {
        buf = std::fs::read(input)
            .with_context(|| format!("failed to read ruleset from {}", input.display()))?;
    }
    Ok(buf)
}

/// Flattens `json` with the configured size histogram into exposition text.
fn render_ruleset(json: &[u8], config: &Config) -> Result<String> {
    let ruleset = Ruleset::from_slice(json)?;
    let histogram = SizeHistogram::new(config.size_suffix(), &config.size_buckets());
    let rules = flatten(&ruleset, &histogram);
    info!(
        rules = ruleset.rules.len(),
        counted = rules.len(),
        "flattened ruleset"
    );

    let mut writer = ExpositionWriter::new(None);
    emit(&mut writer, &rules);
    Ok(writer.finish())
}

pub fn command_nft(input: &Path, config: &Config) -> Result<()> {
    let json = read_input(input)?;
    print!("{}", render_ruleset(&json, config)?);
    Ok(())
}

//! Config command implementation.
//!
//! Generates configuration files in various formats.

use anyhow::Result;
use std::fs;
use std::path::PathBuf;

use node_stats_exporter::cli::ConfigFormat;
use node_stats_exporter::config::{render_config, Config};

/// Generates configuration files.
pub fn command_config(output: Option<PathBuf>, format: ConfigFormat, commented: bool) -> Result<()> {
    let config = Config::default();
    let output = match output {
        Some(path) => path,
        None => PathBuf::from("node-stats-exporter.yaml"),
    };

    let mut content = render_config(&config, format)?;
    if commented && matches!(format, ConfigFormat::Yaml) {
        content = add_config_comments(content);
    }

    if output.to_string_lossy() == "-" {
        print!("{}", content);
    } else {
        fs::write(&output, content)?;
        println!("✅ Configuration written to: {}", output.display());
    }

    Ok(())
}

/// Adds comments to YAML configuration.
fn add_config_comments(yaml: String) -> String {
    let comments = r#"# node-stats-exporter Configuration
# =================================
#
# Host Interfaces
# ---------------
# proc_root: /proc                 # Mount point of procfs
# sys_root: /sys                   # Mount point of sysfs
# cgroup_root: /sys/fs/cgroup      # Root of the cgroup v1 hierarchies
# nft_path: /usr/sbin/nft          # nft binary, run as `nft -j list ruleset`
#
# Container Metadata
# ------------------
# enable_docker: true              # Label cgroups and interfaces with container names
# docker_socket: /var/run/docker.sock
# docker_timeout_ms: 3000          # Per-request timeout for the Docker API
#
# Output
# ------
# timestamps: true                 # Append the shared scrape timestamp to samples
#
# nftables Size Histogram
# -----------------------
# size_buckets: [75, 150, ...]     # Bucket bounds in bytes, inf is implied
# size_suffix: _SIZE               # Chains ending in this suffix get an `le` label
#
# Logging
# -------
# log_level: warn                  # off, error, warn, info, debug, trace (stderr)
#
# Collectors
# ----------
# collectors:                      # Every collector is enabled by default
#   nftables: false                # e.g. skip the nft subprocess
"#;

    format!("{comments}\n{yaml}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commented_config_still_parses() {
        let yaml = render_config(&Config::default(), ConfigFormat::Yaml).unwrap();
        let commented = add_config_comments(yaml);
        assert!(commented.starts_with("# node-stats-exporter Configuration"));

        let parsed: Config = serde_yaml::from_str(&commented).unwrap();
        assert_eq!(parsed.size_suffix(), "_SIZE");
    }

    #[test]
    fn test_writes_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        command_config(Some(path.clone()), ConfigFormat::Json, false).unwrap();

        let written = fs::read_to_string(&path).unwrap();
        let parsed: Config = serde_json::from_str(&written).unwrap();
        assert_eq!(parsed.docker_timeout_ms, Some(3000));
    }
}

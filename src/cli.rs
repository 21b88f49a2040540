//! CLI arguments and subcommands for node-stats-exporter.
//!
//! This module defines the command-line interface structure using the clap library,
//! including all flags, options, and subcommands.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Log level options for CLI parsing
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Off => "off",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Configuration format options for output
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ConfigFormat {
    Yaml,
    Json,
    Toml,
}

/// Main CLI arguments structure
#[derive(Parser, Debug)]
#[command(
    name = "node-stats-exporter",
    about = "One-shot Prometheus exporter for kernel, cgroup, container and nftables metrics",
    long_about = "One-shot Prometheus exporter for kernel, cgroup, container and nftables metrics.\n\n\
                  Reads /proc, /sys/fs/cgroup and the nftables ruleset, attributes cgroups to \
                  Docker containers and systemd services, and prints one scrape in the \
                  Prometheus text exposition format on stdout.",
    version,
    propagate_version = true
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Log level (logs go to stderr)
    #[arg(long, value_enum)]
    pub log_level: Option<LogLevel>,

    /// Config file (YAML/JSON/TOML)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Disable all config file loading
    #[arg(long)]
    pub no_config: bool,

    /// Print effective merged config and exit
    #[arg(long)]
    pub show_config: bool,

    /// Output format for --show-config
    #[arg(long, value_enum, default_value = "yaml")]
    pub config_format: ConfigFormat,

    /// Validate config and exit (return code 1 on error)
    #[arg(long)]
    pub check_config: bool,

    /// Mount point of procfs
    #[arg(long)]
    pub proc_root: Option<PathBuf>,

    /// Mount point of sysfs
    #[arg(long)]
    pub sys_root: Option<PathBuf>,

    /// Root of the cgroup v1 hierarchies
    #[arg(long)]
    pub cgroup_root: Option<PathBuf>,

    /// Path to the nft binary
    #[arg(long)]
    pub nft_path: Option<PathBuf>,

    /// Skip container metadata collection
    #[arg(long)]
    pub disable_docker: bool,

    /// Docker API unix socket
    #[arg(long)]
    pub docker_socket: Option<PathBuf>,

    /// Timeout for each Docker API request in milliseconds
    #[arg(long)]
    pub docker_timeout_ms: Option<u64>,

    /// Omit the shared timestamp from sample lines
    #[arg(long)]
    pub no_timestamps: bool,

    /// nftables transmit unit size bucket bounds (comma-separated, inf is implied)
    #[arg(long, value_delimiter = ',')]
    pub size_buckets: Option<Vec<u64>>,

    /// nftables chain suffix marking a size histogram chain
    #[arg(long)]
    pub size_suffix: Option<String>,
}

/// Subcommands for additional functionality
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check that kernel interfaces and helper tools are reachable
    Check {
        /// Also query the Docker API
        #[arg(long)]
        docker: bool,
    },

    /// Generate configuration files
    Config {
        /// Output file path ("-" for stdout)
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,

        /// Output format
        #[arg(long, value_enum, default_value = "yaml")]
        format: ConfigFormat,

        /// Include comments and examples
        #[arg(long)]
        commented: bool,
    },

    /// Flatten an nftables JSON ruleset file and print its metrics
    Nft {
        /// Ruleset file produced by `nft -j list ruleset` ("-" for stdin)
        #[arg(default_value = "-")]
        input: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bucket_list() {
        let args = Args::parse_from([
            "node-stats-exporter",
            "--size-buckets",
            "100,200,300",
            "--size-suffix",
            "_LEN",
        ]);
        assert_eq!(args.size_buckets, Some(vec![100, 200, 300]));
        assert_eq!(args.size_suffix.as_deref(), Some("_LEN"));
        assert!(args.command.is_none());
    }

    #[test]
    fn test_parse_nft_subcommand_defaults_to_stdin() {
        let args = Args::parse_from(["node-stats-exporter", "nft"]);
        match args.command {
            Some(Commands::Nft { input }) => assert_eq!(input, PathBuf::from("-")),
            other => panic!("unexpected command: {:?}", other),
        }
    }
}

//! Configuration management for node-stats-exporter.
//!
//! This module handles loading, merging, and validating configuration from files
//! and CLI arguments. It supports YAML, JSON, and TOML formats.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

use crate::cli::{Args, ConfigFormat};

// Default configuration constants
pub const DEFAULT_PROC_ROOT: &str = "/proc";
pub const DEFAULT_SYS_ROOT: &str = "/sys";
pub const DEFAULT_CGROUP_ROOT: &str = "/sys/fs/cgroup";
pub const DEFAULT_NFT_PATH: &str = "/usr/sbin/nft";
pub const DEFAULT_DOCKER_SOCKET: &str = "/var/run/docker.sock";
pub const DEFAULT_DOCKER_TIMEOUT_MS: u64 = 3000;
pub const DEFAULT_SIZE_SUFFIX: &str = "_SIZE";

/// Transmit unit size bucket bounds in bytes; the `inf` bucket is implied.
pub fn default_size_buckets() -> Vec<u64> {
    let mut buckets: Vec<u64> = (1..=20).map(|i| i * 75).collect();
    buckets.extend([4500, 9000]);
    buckets
}

fn enabled() -> bool {
    true
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("failed to serialize config: {0}")]
    Serialize(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Per-collector enable flags. Every collector is on by default.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorsConfig {
    #[serde(default = "enabled")]
    pub loadavg: bool,
    #[serde(default = "enabled")]
    pub filefd: bool,
    #[serde(default = "enabled")]
    pub conntrack: bool,
    #[serde(default = "enabled")]
    pub netstat: bool,
    #[serde(default = "enabled")]
    pub sockstat: bool,
    #[serde(default = "enabled")]
    pub vmstat: bool,
    #[serde(default = "enabled")]
    pub arp: bool,
    #[serde(default = "enabled")]
    pub entropy: bool,
    #[serde(default = "enabled")]
    pub threads: bool,
    #[serde(default = "enabled")]
    pub netdev: bool,
    #[serde(default = "enabled")]
    pub nftables: bool,
    #[serde(default = "enabled")]
    pub diskstats: bool,
    #[serde(default = "enabled")]
    pub stat: bool,
    #[serde(default = "enabled")]
    pub meminfo: bool,
    #[serde(default = "enabled", alias = "cgroup-memory")]
    pub cgroup_memory: bool,
    #[serde(default = "enabled", alias = "cgroup-cpu")]
    pub cgroup_cpu: bool,
    #[serde(default = "enabled", alias = "cgroup-blkio")]
    pub cgroup_blkio: bool,
    #[serde(default = "enabled")]
    pub uname: bool,
}

impl Default for CollectorsConfig {
    fn default() -> Self {
        Self {
            loadavg: true,
            filefd: true,
            conntrack: true,
            netstat: true,
            sockstat: true,
            vmstat: true,
            arp: true,
            entropy: true,
            threads: true,
            netdev: true,
            nftables: true,
            diskstats: true,
            stat: true,
            meminfo: true,
            cgroup_memory: true,
            cgroup_cpu: true,
            cgroup_blkio: true,
            uname: true,
        }
    }
}

/// Exporter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Host interfaces
    #[serde(alias = "proc-root")]
    pub proc_root: Option<PathBuf>,
    #[serde(alias = "sys-root")]
    pub sys_root: Option<PathBuf>,
    #[serde(alias = "cgroup-root")]
    pub cgroup_root: Option<PathBuf>,
    #[serde(alias = "nft-path")]
    pub nft_path: Option<PathBuf>,

    // Container metadata
    #[serde(alias = "enable-docker")]
    pub enable_docker: Option<bool>,
    #[serde(alias = "docker-socket")]
    pub docker_socket: Option<PathBuf>,
    #[serde(alias = "docker-timeout-ms")]
    pub docker_timeout_ms: Option<u64>,

    // Output
    /// Append the shared scrape timestamp to every sample line
    pub timestamps: Option<bool>,

    // nftables size histogram
    #[serde(alias = "size-buckets")]
    pub size_buckets: Option<Vec<u64>>,
    #[serde(alias = "size-suffix")]
    pub size_suffix: Option<String>,

    // Logging
    pub log_level: Option<String>,

    #[serde(default)]
    pub collectors: CollectorsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            proc_root: Some(PathBuf::from(DEFAULT_PROC_ROOT)),
            sys_root: Some(PathBuf::from(DEFAULT_SYS_ROOT)),
            cgroup_root: Some(PathBuf::from(DEFAULT_CGROUP_ROOT)),
            nft_path: Some(PathBuf::from(DEFAULT_NFT_PATH)),
            enable_docker: Some(true),
            docker_socket: Some(PathBuf::from(DEFAULT_DOCKER_SOCKET)),
            docker_timeout_ms: Some(DEFAULT_DOCKER_TIMEOUT_MS),
            timestamps: Some(true),
            size_buckets: Some(default_size_buckets()),
            size_suffix: Some(DEFAULT_SIZE_SUFFIX.into()),
            log_level: Some("warn".into()),
            collectors: CollectorsConfig::default(),
        }
    }
}

impl Config {
    pub fn proc_root(&self) -> PathBuf {
        self.proc_root
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_PROC_ROOT))
    }

    pub fn sys_root(&self) -> PathBuf {
        self.sys_root
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SYS_ROOT))
    }

    pub fn cgroup_root(&self) -> PathBuf {
        self.cgroup_root
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CGROUP_ROOT))
    }

    pub fn nft_path(&self) -> PathBuf {
        self.nft_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_NFT_PATH))
    }

    pub fn docker_socket(&self) -> PathBuf {
        self.docker_socket
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DOCKER_SOCKET))
    }

    pub fn size_buckets(&self) -> Vec<u64> {
        self.size_buckets.clone().unwrap_or_else(default_size_buckets)
    }

    pub fn size_suffix(&self) -> String {
        self.size_suffix
            .clone()
            .unwrap_or_else(|| DEFAULT_SIZE_SUFFIX.to_string())
    }
}

/// Validate effective config (used by --check-config and at startup)
pub fn validate_effective_config(cfg: &Config) -> Result<(), ConfigError> {
    let buckets = cfg.size_buckets();
    if let Some(pair) = buckets.windows(2).find(|w| w[0] >= w[1]) {
        return Err(ConfigError::Invalid(format!(
            "size_buckets must be strictly increasing, found {} before {}",
            pair[0], pair[1]
        )));
    }

    if cfg.size_suffix.as_deref().is_some_and(str::is_empty) {
        return Err(ConfigError::Invalid("size_suffix must not be empty".into()));
    }

    if cfg.docker_timeout_ms == Some(0) {
        return Err(ConfigError::Invalid(
            "docker_timeout_ms must be greater than zero".into(),
        ));
    }

    if let Some(level) = cfg.log_level.as_deref() {
        match level {
            "off" | "error" | "warn" | "info" | "debug" | "trace" => {}
            other => {
                return Err(ConfigError::Invalid(format!(
                    "Invalid log_level '{}', expected one of off/error/warn/info/debug/trace",
                    other
                )));
            }
        }
    }

    Ok(())
}

/// Resolves configuration from CLI args, config file, and defaults.
/// This enforces precedence: CLI (if provided) > config file > default.
pub fn resolve_config(args: &Args) -> Result<Config, ConfigError> {
    let mut config = if args.no_config {
        Config::default()
    } else {
        load_config(args.config.as_deref())?
    };

    if let Some(p) = &args.proc_root {
        config.proc_root = Some(p.clone());
    }
    if let Some(p) = &args.sys_root {
        config.sys_root = Some(p.clone());
    }
    if let Some(p) = &args.cgroup_root {
        config.cgroup_root = Some(p.clone());
    }
    if let Some(p) = &args.nft_path {
        config.nft_path = Some(p.clone());
    }

    if args.disable_docker {
        config.enable_docker = Some(false);
    }
    if let Some(socket) = &args.docker_socket {
        config.docker_socket = Some(socket.clone());
    }
    if let Some(ms) = args.docker_timeout_ms {
        config.docker_timeout_ms = Some(ms);
    }

    if args.no_timestamps {
        config.timestamps = Some(false);
    }

    if let Some(buckets) = &args.size_buckets {
        config.size_buckets = Some(buckets.clone());
    }
    if let Some(suffix) = &args.size_suffix {
        config.size_suffix = Some(suffix.clone());
    }

    if let Some(level) = args.log_level {
        config.log_level = Some(level.as_str().to_string());
    }

    Ok(config)
}

/// Loads a config file, trying the default locations when `path` is `None`.
/// A missing file yields the defaults.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => {
            let defaults = [
                "/etc/node-stats-exporter/config.yaml",
                "/etc/node-stats-exporter/config.yml",
                "/etc/node-stats-exporter/config.json",
                "/etc/node-stats-exporter/config.toml",
                "./node-stats-exporter.yaml",
                "./node-stats-exporter.yml",
                "./node-stats-exporter.json",
                "./node-stats-exporter.toml",
            ];

            match defaults.iter().map(Path::new).find(|p| p.exists()) {
                Some(p) => p.to_path_buf(),
                None => return Ok(Config::default()),
            }
        }
    };

    if !path.exists() {
        return Ok(Config::default());
    }

    let content = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
        path: path.clone(),
        source,
    })?;

    let parsed = match path.extension().and_then(|s| s.to_str()) {
        Some("json") => serde_json::from_str::<Config>(&content).map_err(|e| e.to_string()),
        Some("toml") => toml::from_str::<Config>(&content).map_err(|e| e.to_string()),
        _ => serde_yaml::from_str::<Config>(&content).map_err(|e| e.to_string()),
    };

    let config = parsed.map_err(|message| ConfigError::Parse {
        path: path.clone(),
        message,
    })?;
    info!("Loaded configuration from: {}", path.display());
    Ok(config)
}

/// Renders a configuration in the requested format.
pub fn render_config(config: &Config, format: ConfigFormat) -> Result<String, ConfigError> {
    match format {
        ConfigFormat::Json => {
            serde_json::to_string_pretty(config).map_err(|e| ConfigError::Serialize(e.to_string()))
        }
        ConfigFormat::Toml => {
            toml::to_string_pretty(config).map_err(|e| ConfigError::Serialize(e.to_string()))
        }
        ConfigFormat::Yaml => {
            serde_yaml::to_string(config).map_err(|e| ConfigError::Serialize(e.to_string()))
        }
    }
}

/// Shows configuration in requested format
pub fn show_config(config: &Config, format: ConfigFormat) -> Result<(), ConfigError> {
    println!("{}", render_config(config, format)?);
    Ok(())
}

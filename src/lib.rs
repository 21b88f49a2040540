//! node-stats-exporter library
//!
//! Collects Linux host metrics in one pass and renders them in the Prometheus
//! text exposition format. Kernel counters come from `/proc` and `/sys`, cgroup
//! v1 hierarchies are walked and attributed to Docker containers or systemd
//! services, and the nftables ruleset is flattened into per-rule counters.
//!
//! # Usage
//!
//! ```no_run
//! use node_stats_exporter::{Config, RealFs, Scraper};
//! use std::sync::Arc;
//!
//! # async fn run() {
//! let scraper = Scraper::new(Config::default(), Arc::new(RealFs));
//! let text = scraper.run().await;
//! print!("{}", text);
//! # }
//! ```

pub mod cgroup;
pub mod cli;
pub mod collectors;
pub mod config;
pub mod docker;
pub mod exposition;
pub mod fs;
pub mod identity;
pub mod nftables;
pub mod procfile;
pub mod scrape;

// Re-export main types for convenience
pub use config::Config;
pub use exposition::{ExpositionWriter, LabelSet, MetricKind, SampleValue};
pub use fs::{FileSystem, MockFs, RealFs};
pub use identity::{ContainerInfo, ContainerLabelCache, Correlator, Identity};
pub use scrape::{ScrapeContext, Scraper};

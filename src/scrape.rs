//! One scrape: shared context plus the ordered collector list.
//!
//! [`ScrapeContext`] owns everything a run mutates (the writer, the
//! device-mapper cache, the `major:minor` table) together with the read-only
//! inputs (filesystem handle, host paths, container labels). Nothing survives
//! between runs.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use crate::cgroup;
use crate::collectors::{self, CollectError};
use crate::config::{CollectorsConfig, Config};
use crate::docker;
use crate::exposition::ExpositionWriter;
use crate::fs::FileSystem;
use crate::identity::{ContainerLabelCache, Correlator, DeviceMapper};
use crate::nftables::{self, SizeHistogram};

/// Mount points of the kernel interfaces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostPaths {
    pub proc_root: PathBuf,
    pub sys_root: PathBuf,
    pub cgroup_root: PathBuf,
}

impl HostPaths {
    pub fn from_config(config: &Config) -> Self {
        Self {
            proc_root: config.proc_root(),
            sys_root: config.sys_root(),
            cgroup_root: config.cgroup_root(),
        }
    }

    pub fn proc(&self, rel: &str) -> PathBuf {
        self.proc_root.join(rel)
    }

    pub fn sys(&self, rel: &str) -> PathBuf {
        self.sys_root.join(rel)
    }

    /// Root of one cgroup v1 hierarchy, e.g. `memory` or `cpu,cpuacct`.
    pub fn cgroup(&self, subsystem: &str) -> PathBuf {
        self.cgroup_root.join(subsystem)
    }
}

pub struct ScrapeContext {
    pub fs: Arc<dyn FileSystem>,
    pub paths: HostPaths,
    pub writer: ExpositionWriter,
    pub correlator: Correlator,
    pub devices: DeviceMapper,
    pub nft_path: PathBuf,
    pub histogram: SizeHistogram,
}

impl ScrapeContext {
    pub fn new(config: &Config, fs: Arc<dyn FileSystem>, containers: ContainerLabelCache) -> Self {
        let writer = if config.timestamps.unwrap_or(true) {
            ExpositionWriter::now()
        } else {
            ExpositionWriter::new(None)
        };

        Self {
            fs,
            paths: HostPaths::from_config(config),
            writer,
            correlator: Correlator::new(containers),
            devices: DeviceMapper::new(),
            nft_path: config.nft_path(),
            histogram: SizeHistogram::new(config.size_suffix(), &config.size_buckets()),
        }
    }

    pub fn read(&self, path: &Path) -> Result<String, CollectError> {
        self.fs
            .read_to_string(path)
            .map_err(|source| CollectError::Read {
                path: path.to_path_buf(),
                source,
            })
    }

    /// Reads a file relative to the proc root.
    pub fn read_proc(&self, rel: &str) -> Result<String, CollectError> {
        self.read(&self.paths.proc(rel))
    }

    /// Consumes the context and returns the exposition text.
    pub fn finish(self) -> String {
        self.writer.finish()
    }
}

type CollectFn = fn(&mut ScrapeContext) -> Result<(), CollectError>;

/// A named collector and the config flag that enables it.
pub struct Collector {
    pub name: &'static str,
    pub enabled: fn(&CollectorsConfig) -> bool,
    pub collect: CollectFn,
}

/// Collectors in run order. Diskstats fills the `major:minor` table that the
/// blkio walk reads, so it has to come first.
pub const COLLECTORS: &[Collector] = &[
    Collector {
        name: "loadavg",
        enabled: |c| c.loadavg,
        collect: collectors::kernel::collect_loadavg,
    },
    Collector {
        name: "filefd",
        enabled: |c| c.filefd,
        collect: collectors::kernel::collect_filefd,
    },
    Collector {
        name: "conntrack",
        enabled: |c| c.conntrack,
        collect: collectors::kernel::collect_conntrack,
    },
    Collector {
        name: "netstat",
        enabled: |c| c.netstat,
        collect: collectors::net::collect_netstat,
    },
    Collector {
        name: "sockstat",
        enabled: |c| c.sockstat,
        collect: collectors::net::collect_sockstat,
    },
    Collector {
        name: "vmstat",
        enabled: |c| c.vmstat,
        collect: collectors::kernel::collect_vmstat,
    },
    Collector {
        name: "arp",
        enabled: |c| c.arp,
        collect: collectors::net::collect_arp,
    },
    Collector {
        name: "entropy",
        enabled: |c| c.entropy,
        collect: collectors::kernel::collect_entropy,
    },
    Collector {
        name: "threads",
        enabled: |c| c.threads,
        collect: collectors::kernel::collect_threads,
    },
    Collector {
        name: "netdev",
        enabled: |c| c.netdev,
        collect: collectors::netdev::collect,
    },
    Collector {
        name: "nftables",
        enabled: |c| c.nftables,
        collect: nftables::collect,
    },
    Collector {
        name: "diskstats",
        enabled: |c| c.diskstats,
        collect: collectors::diskstats::collect,
    },
    Collector {
        name: "cgroup_blkio",
        enabled: |c| c.cgroup_blkio,
        collect: cgroup::blkio::collect,
    },
    Collector {
        name: "stat",
        enabled: |c| c.stat,
        collect: collectors::stat::collect,
    },
    Collector {
        name: "cgroup_cpu",
        enabled: |c| c.cgroup_cpu,
        collect: cgroup::cpu::collect,
    },
    Collector {
        name: "meminfo",
        enabled: |c| c.meminfo,
        collect: collectors::meminfo::collect,
    },
    Collector {
        name: "cgroup_memory",
        enabled: |c| c.cgroup_memory,
        collect: cgroup::memory::collect,
    },
    Collector {
        name: "uname",
        enabled: |c| c.uname,
        collect: collectors::kernel::collect_uname,
    },
    Collector {
        name: "build_info",
        enabled: |_| true,
        collect: collectors::kernel::collect_build_info,
    },
];

/// Runs complete scrapes against one filesystem.
pub struct Scraper {
    config: Config,
    fs: Arc<dyn FileSystem>,
}

impl Scraper {
    pub fn new(config: Config, fs: Arc<dyn FileSystem>) -> Self {
        Self { config, fs }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Loads container metadata, then runs every enabled collector.
    pub async fn run(&self) -> String {
        let containers = docker::load_label_cache(&self.config).await;
        self.run_with(containers)
    }

    /// Runs every enabled collector with an already populated label cache.
    pub fn run_with(&self, containers: ContainerLabelCache) -> String {
        let started = Instant::now();
        let mut ctx = ScrapeContext::new(&self.config, self.fs.clone(), containers);

        for collector in COLLECTORS {
            if !(collector.enabled)(&self.config.collectors) {
                debug!(collector = collector.name, "collector disabled");
                continue;
            }

            let t = Instant::now();
            match (collector.collect)(&mut ctx) {
                Ok(()) => debug!(
                    collector = collector.name,
                    elapsed_ms = t.elapsed().as_millis() as u64,
                    "collector finished"
                ),
                Err(e) => debug!(collector = collector.name, error = %e, "collector skipped"),
            }
        }

        info!(
            families = ctx.writer.family_count(),
            samples = ctx.writer.sample_count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "scrape finished"
        );
        ctx.finish()
    }
}

#[cfg(test)]
pub(crate) fn test_context(fs: impl Into<Arc<crate::fs::MockFs>>) -> ScrapeContext {
    test_context_with(fs, ContainerLabelCache::new())
}

#[cfg(test)]
pub(crate) fn test_context_with(
    fs: impl Into<Arc<crate::fs::MockFs>>,
    containers: ContainerLabelCache,
) -> ScrapeContext {
    let config = Config {
        timestamps: Some(false),
        ..Config::default()
    };
    let fs: Arc<crate::fs::MockFs> = fs.into();
    ScrapeContext::new(&config, fs, containers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MockFs;

    #[test]
    fn test_collector_names_are_unique() {
        let mut names: Vec<_> = COLLECTORS.iter().map(|c| c.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), COLLECTORS.len());
    }

    #[test]
    fn test_diskstats_runs_before_blkio() {
        let position = |name: &str| COLLECTORS.iter().position(|c| c.name == name);
        assert!(position("diskstats") < position("cgroup_blkio"));
    }

    #[test]
    fn test_disabled_collectors_do_not_run() {
        let fs = MockFs::new();
        fs.add_file("/proc/loadavg", "0.5 0.4 0.3 1/100 200\n");
        fs.add_file("/proc/sys/kernel/random/entropy_avail", "256\n");
        let mut config = Config {
            timestamps: Some(false),
            nft_path: Some(PathBuf::from("/nonexistent/nft")),
            ..Config::default()
        };
        config.collectors.entropy = false;

        let out = Scraper::new(config, Arc::new(fs)).run_with(ContainerLabelCache::new());
        assert!(out.contains("node_load1 0.5\n"));
        assert!(!out.contains("node_entropy_available_bits"));
        assert!(out.contains("node_stats_exporter_build_info"));
    }

    #[test]
    fn test_timestamps_are_shared() {
        let fs = MockFs::new();
        fs.add_file("/proc/loadavg", "0.5 0.4 0.3 1/100 200\n");
        let config = Config {
            nft_path: Some(PathBuf::from("/nonexistent/nft")),
            ..Config::default()
        };

        let out = Scraper::new(config, Arc::new(fs)).run_with(ContainerLabelCache::new());
        let stamps: Vec<&str> = out
            .lines()
            .filter(|l| !l.starts_with('#'))
            .filter_map(|l| l.rsplit(' ').next())
            .collect();
        assert!(stamps.len() > 3);
        assert!(stamps.iter().all(|s| *s == stamps[0]));
    }
}

//! Small kernel tunables and counters: load average, file handles,
//! conntrack, entropy, thread limits, vmstat, uname and build info.

use tracing::debug;

use super::{emit_scalar_files, CollectError, ScalarFile};
use crate::exposition::{LabelSet, MetricKind};
use crate::procfile::{parse_float, parse_int, split_whitespace_fields, ProcText};
use crate::scrape::ScrapeContext;

const LOADAVG_METRICS: [(&str, &str); 3] = [
    ("node_load1", "1m load average"),
    ("node_load5", "5m load average"),
    ("node_load15", "15m load average"),
];

/// `/proc/loadavg`: `0.01 0.05 0.10 1/234 5678`.
pub fn collect_loadavg(ctx: &mut ScrapeContext) -> Result<(), CollectError> {
    let path = ctx.paths.proc("loadavg");
    let content = ctx.read(&path)?;
    let parts = split_whitespace_fields(&content);
    if parts.len() < 4 {
        return Err(CollectError::Format {
            path,
            message: format!("expected 4 or more fields, found {}", parts.len()),
        });
    }

    let labels = LabelSet::new();
    for ((name, help), raw) in LOADAVG_METRICS.iter().zip(&parts) {
        parse_float(raw)?;
        ctx.writer.declare(name, MetricKind::Gauge, help);
        ctx.writer.emit(&labels, *raw);
    }

    match parts[3].split_once('/').map(|(_, total)| parse_int(total)) {
        Some(Ok(threads)) => {
            ctx.writer
                .declare("node_procs_threads", MetricKind::Gauge, "Thread count");
            ctx.writer.emit(&labels, threads);
        }
        _ => debug!(field = parts[3], "unexpected scheduling entity field"),
    }
    Ok(())
}

/// `/proc/sys/fs/file-nr`: allocated, unused, maximum.
pub fn collect_filefd(ctx: &mut ScrapeContext) -> Result<(), CollectError> {
    let path = ctx.paths.proc("sys/fs/file-nr");
    let content = ctx.read(&path)?;
    let parts = split_whitespace_fields(&content);
    if parts.len() < 3 {
        return Err(CollectError::Format {
            path,
            message: format!("expected 3 fields, found {}", parts.len()),
        });
    }

    if let Ok(allocated) = parse_int(parts[0]) {
        ctx.writer.declare(
            "node_filefd_allocated",
            MetricKind::Gauge,
            "File descriptor statistics: allocated",
        );
        ctx.writer.emit(&LabelSet::new(), allocated);
    }
    if let Ok(maximum) = parse_int(parts[2]) {
        ctx.writer.declare(
            "node_filefd_maximum",
            MetricKind::Gauge,
            "File descriptor statistics: maximum",
        );
        ctx.writer.emit(&LabelSet::new(), maximum);
    }
    Ok(())
}

pub fn collect_conntrack(ctx: &mut ScrapeContext) -> Result<(), CollectError> {
    emit_scalar_files(
        ctx,
        &[
            ScalarFile {
                rel: "sys/net/netfilter/nf_conntrack_count",
                metric: "node_nf_conntrack_entries",
                help: "Number of currently allocated flow entries for connection tracking",
            },
            ScalarFile {
                rel: "sys/net/netfilter/nf_conntrack_max",
                metric: "node_nf_conntrack_entries_limit",
                help: "Maximum size of connection tracking table",
            },
        ],
    )
}

pub fn collect_entropy(ctx: &mut ScrapeContext) -> Result<(), CollectError> {
    emit_scalar_files(
        ctx,
        &[ScalarFile {
            rel: "sys/kernel/random/entropy_avail",
            metric: "node_entropy_available_bits",
            help: "Bits of available entropy",
        }],
    )
}

pub fn collect_threads(ctx: &mut ScrapeContext) -> Result<(), CollectError> {
    emit_scalar_files(
        ctx,
        &[
            ScalarFile {
                rel: "sys/kernel/threads-max",
                metric: "node_procs_threads_maximum",
                help: "Maximum threads",
            },
            ScalarFile {
                rel: "sys/vm/max_map_count",
                metric: "node_procs_map_count_maximum",
                help: "Maximum memory map areas per process",
            },
            ScalarFile {
                rel: "sys/kernel/pid_max",
                metric: "node_procs_pid_maximum",
                help: "Maximum process ID",
            },
        ],
    )
}

/// `/proc/vmstat`, one gauge per key in file order.
pub fn collect_vmstat(ctx: &mut ScrapeContext) -> Result<(), CollectError> {
    let content = ctx.read_proc("vmstat")?;
    let (_, pairs) = ProcText::new(&content).pairs();
    let labels = LabelSet::new();
    for (key, value) in pairs {
        match parse_int(value) {
            Ok(n) => {
                ctx.writer
                    .declare(&format!("node_vmstat_{}", key), MetricKind::Gauge, "");
                ctx.writer.emit(&labels, n);
            }
            Err(e) => debug!(key, error = %e, "skipping vmstat entry"),
        }
    }
    Ok(())
}

/// Kernel identification from `uname(2)`.
pub fn collect_uname(ctx: &mut ScrapeContext) -> Result<(), CollectError> {
    let uts = nix::sys::utsname::uname().map_err(|source| CollectError::Syscall {
        call: "uname",
        source,
    })?;

    let labels = LabelSet::new()
        .with("sysname", uts.sysname().to_string_lossy())
        .with("release", uts.release().to_string_lossy())
        .with("version", uts.version().to_string_lossy())
        .with("machine", uts.machine().to_string_lossy())
        .with("nodename", uts.nodename().to_string_lossy());
    ctx.writer.declare(
        "node_uname_info",
        MetricKind::Gauge,
        "Labeled system information as provided by the uname system call",
    );
    ctx.writer.emit(&labels, 1i64);
    Ok(())
}

/// Version and build time of this binary.
pub fn collect_build_info(ctx: &mut ScrapeContext) -> Result<(), CollectError> {
    let labels = LabelSet::new()
        .with("version", env!("CARGO_PKG_VERSION"))
        .with(
            "build_timestamp",
            option_env!("VERGEN_BUILD_TIMESTAMP").unwrap_or("unknown"),
        );
    ctx.writer.declare(
        "node_stats_exporter_build_info",
        MetricKind::Gauge,
        "Build information of node-stats-exporter",
    );
    ctx.writer.emit(&labels, 1i64);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MockFs;
    use crate::scrape::test_context;

    #[test]
    fn test_loadavg() {
        let fs = MockFs::new();
        fs.add_file("/proc/loadavg", "0.01 0.05 1.10 2/345 6789\n");
        let mut ctx = test_context(fs);

        collect_loadavg(&mut ctx).unwrap();
        let out = ctx.finish();
        assert!(out.contains("# HELP node_load1 1m load average.\n# TYPE node_load1 gauge\nnode_load1 0.01\n"));
        assert!(out.contains("node_load15 1.10\n"));
        assert!(out.contains("node_procs_threads 345\n"));
    }

    #[test]
    fn test_loadavg_short_file_is_an_error() {
        let fs = MockFs::new();
        fs.add_file("/proc/loadavg", "0.01 0.05\n");
        let mut ctx = test_context(fs);

        assert!(matches!(
            collect_loadavg(&mut ctx),
            Err(CollectError::Format { .. })
        ));
        assert_eq!(ctx.finish(), "");
    }

    #[test]
    fn test_filefd_and_threads() {
        let fs = MockFs::new();
        fs.add_file("/proc/sys/fs/file-nr", "1024\t0\t9223372036854775807\n");
        fs.add_file("/proc/sys/kernel/threads-max", "63388\n");
        fs.add_file("/proc/sys/kernel/pid_max", "4194304\n");
        let mut ctx = test_context(fs);

        collect_filefd(&mut ctx).unwrap();
        collect_threads(&mut ctx).unwrap();
        let out = ctx.finish();
        assert!(out.contains("node_filefd_allocated 1024\n"));
        assert!(out.contains("node_filefd_maximum 9223372036854775807\n"));
        assert!(out.contains("node_procs_threads_maximum 63388\n"));
        assert!(out.contains("node_procs_pid_maximum 4194304\n"));
        assert!(!out.contains("node_procs_map_count_maximum"));
    }

    #[test]
    fn test_conntrack_missing_module_is_an_error() {
        let mut ctx = test_context(MockFs::new());
        assert!(matches!(
            collect_conntrack(&mut ctx),
            Err(CollectError::Read { .. })
        ));
        assert_eq!(ctx.finish(), "");
    }

    #[test]
    fn test_vmstat_keeps_file_order() {
        let fs = MockFs::new();
        fs.add_file("/proc/vmstat", "nr_free_pages 100\nbogus x\npgfault 7\n");
        let mut ctx = test_context(fs);

        collect_vmstat(&mut ctx).unwrap();
        assert_eq!(
            ctx.finish(),
            "# TYPE node_vmstat_nr_free_pages gauge\nnode_vmstat_nr_free_pages 100\n\
             # TYPE node_vmstat_pgfault gauge\nnode_vmstat_pgfault 7\n"
        );
    }

    #[test]
    fn test_uname_and_build_info() {
        let mut ctx = test_context(MockFs::new());
        collect_uname(&mut ctx).unwrap();
        collect_build_info(&mut ctx).unwrap();
        let out = ctx.finish();
        assert!(out.contains("node_uname_info{sysname=\""));
        assert!(out.contains(&format!(
            "node_stats_exporter_build_info{{version=\"{}\"",
            env!("CARGO_PKG_VERSION")
        )));
    }
}

//! CPU accounting per cgroup (`cpuacct.usage_percpu`).

use tracing::debug;

use super::{read_int, walk, CgroupNode};
use crate::collectors::CollectError;
use crate::exposition::{ExpositionWriter, LabelSet, MetricKind};
use crate::fs::FileSystem;
use crate::procfile::split_whitespace_fields;
use crate::scrape::ScrapeContext;

pub const SUBSYSTEM: &str = "cpu,cpuacct";
pub const MARKER: &str = "cpuacct.usage_percpu";

const NANOS_PER_SECOND: u64 = 1_000_000_000;

pub fn collect(ctx: &mut ScrapeContext) -> Result<(), CollectError> {
    let root = ctx.paths.cgroup(SUBSYSTEM);
    let fs = ctx.fs.as_ref();
    let writer = &mut ctx.writer;
    walk(fs, &root, MARKER, &ctx.correlator, |node| {
        emit_node(fs, writer, node)
    });
    Ok(())
}

/// Renders a nanosecond count as seconds with nine decimals, exactly.
pub fn nanos_to_seconds(nanos: u64) -> String {
    format!("{}.{:09}", nanos / NANOS_PER_SECOND, nanos % NANOS_PER_SECOND)
}

pub fn emit_node(fs: &dyn FileSystem, writer: &mut ExpositionWriter, node: &CgroupNode<'_>) {
    for line in node.content.lines() {
        let cores = split_whitespace_fields(line);
        if line.trim().is_empty() || cores.first() == Some(&"0") {
            continue;
        }

        let mut total: u64 = 0;
        for (core, usage) in cores.iter().enumerate() {
            let nanos = match usage.parse::<u64>() {
                Ok(n) => n,
                Err(e) => {
                    debug!(cgroup = node.relative, core, error = %e, "skipping per-core usage");
                    continue;
                }
            };
            total = total.saturating_add(nanos);

            let labels = LabelSet::new()
                .with("cgroup", node.relative)
                .with("core", core.to_string())
                .merged(&node.identity.labels);
            writer.declare("node_cgroup_cpu_core_seconds", MetricKind::Gauge, "");
            writer.emit(&labels, nanos_to_seconds(nanos));
        }

        writer.declare("node_cgroup_cpu_seconds", MetricKind::Gauge, "");
        writer.emit(&node.labels(), nanos_to_seconds(total));
    }

    if let Some(shares) = read_int(fs, &node.dir.join("cpu.shares")) {
        writer.declare("node_cgroup_cpu_shares", MetricKind::Gauge, "");
        writer.emit(&node.labels(), shares);
    }
}

//! Memory controller statistics per cgroup.

use tracing::debug;

use super::{read_int, walk, CgroupNode};
use crate::collectors::CollectError;
use crate::exposition::{ExpositionWriter, MetricKind};
use crate::fs::FileSystem;
use crate::procfile::{parse_int, split_whitespace_fields};
use crate::scrape::ScrapeContext;

pub const SUBSYSTEM: &str = "memory";
pub const MARKER: &str = "memory.stat";

/// Files read only for cgroups with non-zero usage, and the metric each feeds.
const USAGE_FILES: &[(&str, &str, &str)] = &[
    (
        "memory.memsw.usage_in_bytes",
        "node_cgroup_memory_swap_bytes",
        "Memory plus swap usage of the cgroup",
    ),
    (
        "memory.swappiness",
        "node_cgroup_memory_swappiness",
        "Swappiness setting of the cgroup",
    ),
    (
        "memory.limit_in_bytes",
        "node_cgroup_memory_limit_bytes",
        "Memory limit of the cgroup",
    ),
    (
        "memory.memsw.limit_in_bytes",
        "node_cgroup_memory_swap_limit_bytes",
        "Memory plus swap limit of the cgroup",
    ),
    (
        "memory.max_usage_in_bytes",
        "node_cgroup_memory_max_usage_bytes",
        "Peak memory usage of the cgroup",
    ),
];

pub fn collect(ctx: &mut ScrapeContext) -> Result<(), CollectError> {
    let root = ctx.paths.cgroup(SUBSYSTEM);
    let fs = ctx.fs.as_ref();
    let writer = &mut ctx.writer;
    walk(fs, &root, MARKER, &ctx.correlator, |node| {
        emit_node(fs, writer, node)
    });
    Ok(())
}

/// Emits the hierarchical `total_*` counters of `memory.stat` and, for cgroups
/// that currently use memory, the usage and limit files.
pub fn emit_node(fs: &dyn FileSystem, writer: &mut ExpositionWriter, node: &CgroupNode<'_>) {
    let labels = node.labels();

    for line in node.content.lines() {
        let parts = split_whitespace_fields(line);
        let [key, value, ..] = parts.as_slice() else {
            continue;
        };
        if !key.starts_with("total_") || *value == "0" {
            continue;
        }
        match parse_int(value) {
            Ok(v) => {
                writer.declare(&format!("node_cgroup_memory_{}", key), MetricKind::Gauge, "");
                writer.emit(&labels, v);
            }
            Err(e) => debug!(cgroup = node.relative, key = *key, error = %e, "skipping memory.stat line"),
        }
    }

    let usage = match read_int(fs, &node.dir.join("memory.usage_in_bytes")) {
        Some(usage) if usage != 0 => usage,
        _ => return,
    };
    writer.declare(
        "node_cgroup_memory_bytes",
        MetricKind::Gauge,
        "Memory usage of the cgroup",
    );
    writer.emit(&labels, usage);

    for (file, metric, help) in USAGE_FILES {
        if let Some(v) = read_int(fs, &node.dir.join(file)) {
            writer.declare(metric, MetricKind::Gauge, help);
            writer.emit(&labels, v);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MockFs;
    use crate::identity::Correlator;
    use std::path::Path;

    fn render(fs: &MockFs) -> String {
        let mut writer = ExpositionWriter::new(None);
        walk(fs, Path::new("/cg/memory"), MARKER, &Correlator::default(), |node| {
            emit_node(fs, &mut writer, node)
        });
        writer.finish()
    }

    #[test]
    fn test_total_lines_and_usage_files() {
        let fs = MockFs::new();
        fs.add_file(
            "/cg/memory/app/memory.stat",
            "cache 10\ntotal_cache 4096\ntotal_rss 0\ntotal_swap 12\n",
        );
        fs.add_file("/cg/memory/app/memory.usage_in_bytes", "8192\n");
        fs.add_file("/cg/memory/app/memory.limit_in_bytes", "9223372036854771712\n");
        fs.add_file("/cg/memory/app/memory.max_usage_in_bytes", "10000\n");

        let out = render(&fs);
        assert!(out.contains("node_cgroup_memory_total_cache{cgroup=\"app\"} 4096\n"));
        assert!(out.contains("node_cgroup_memory_total_swap{cgroup=\"app\"} 12\n"));
        assert!(!out.contains("total_rss"));
        assert!(!out.contains("node_cgroup_memory_cache"));
        assert!(out.contains("node_cgroup_memory_bytes{cgroup=\"app\"} 8192\n"));
        assert!(out.contains(
            "node_cgroup_memory_limit_bytes{cgroup=\"app\"} 9223372036854771712\n"
        ));
        assert!(out.contains("node_cgroup_memory_max_usage_bytes{cgroup=\"app\"} 10000\n"));
        assert!(!out.contains("swap_bytes"));
    }

    #[test]
    fn test_zero_usage_skips_limit_files() {
        let fs = MockFs::new();
        fs.add_file("/cg/memory/idle/memory.stat", "total_cache 1\n");
        fs.add_file("/cg/memory/idle/memory.usage_in_bytes", "0\n");
        fs.add_file("/cg/memory/idle/memory.limit_in_bytes", "100\n");

        let out = render(&fs);
        assert!(out.contains("node_cgroup_memory_total_cache{cgroup=\"idle\"} 1\n"));
        assert!(!out.contains("node_cgroup_memory_bytes"));
        assert!(!out.contains("limit"));
    }

    #[test]
    fn test_malformed_lines_are_skipped() {
        let fs = MockFs::new();
        fs.add_file("/cg/memory/x/memory.stat", "total_cache\ntotal_rss abc\ntotal_dirty 3\n");

        let out = render(&fs);
        assert!(out.contains("node_cgroup_memory_total_dirty{cgroup=\"x\"} 3\n"));
        assert!(!out.contains("total_rss"));
        assert!(!out.contains("total_cache"));
    }
}

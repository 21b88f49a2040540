//! Disk I/O statistics collector.
//!
//! Reads `/proc/diskstats`, translates device-mapper nodes to their mapped
//! names and records the `major:minor` → name table that the block-I/O cgroup
//! walk uses to label its per-device counters.

use ahash::AHashMap as HashMap;
use tracing::debug;

use super::CollectError;
use crate::exposition::{LabelSet, MetricKind};
use crate::procfile::{parse_int, split_whitespace_fields};
use crate::scrape::ScrapeContext;

/// Names of the eleven classic diskstats columns following the device name.
pub const DISKSTATS_MODES: [&str; 11] = [
    "reads_completed",
    "reads_merged",
    "sectors_read",
    "read_time_ms",
    "writes_completed",
    "writes_merged",
    "sectors_written",
    "write_time_ms",
    "io_now",
    "io_time_ms",
    "io_time_weighted",
];

/// One `/proc/diskstats` line.
/// Format: major minor name read_ios read_merges read_sectors read_ticks
/// write_ios write_merges write_sectors write_ticks ios_in_progress
/// time_in_queue weighted_time_in_queue [discard and flush columns...]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskLine<'a> {
    pub major: &'a str,
    pub minor: &'a str,
    pub name: &'a str,
    pub values: [&'a str; 11],
}

impl DiskLine<'_> {
    pub fn major_minor(&self) -> String {
        format!("{}:{}", self.major, self.minor)
    }
}

/// Parses every line with at least the eleven classic columns.
pub fn parse_diskstats(content: &str) -> Vec<DiskLine<'_>> {
    content
        .lines()
        .filter_map(|line| {
            let parts = split_whitespace_fields(line);
            let [major, minor, name, rest @ ..] = parts.as_slice() else {
                return None;
            };
            let values: [&str; 11] = rest.get(..11)?.try_into().ok()?;
            Some(DiskLine {
                major: *major,
                minor: *minor,
                name: *name,
                values,
            })
        })
        .collect()
}

pub fn collect(ctx: &mut ScrapeContext) -> Result<(), CollectError> {
    let content = ctx.read_proc("diskstats")?;

    // Resolved device name → column values; a repeated name keeps its
    // first position and its last values.
    let mut devices: Vec<(String, [&str; 11])> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for line in parse_diskstats(&content) {
        let device = ctx
            .devices
            .resolve(ctx.fs.as_ref(), &ctx.paths.sys_root, line.name);
        ctx.devices.record_number(line.major_minor(), device.clone());

        match index.get(&device) {
            Some(&i) => devices[i].1 = line.values,
            None => {
                index.insert(device.clone(), devices.len());
                devices.push((device, line.values));
            }
        }
    }
    debug!(devices = devices.len(), "parsed diskstats");

    for (i, mode) in DISKSTATS_MODES.iter().enumerate() {
        ctx.writer
            .declare(&format!("node_disk_{}", mode), MetricKind::Gauge, "");
        for (device, values) in &devices {
            if let Ok(n) = parse_int(values[i]) {
                ctx.writer
                    .emit(&LabelSet::new().with("device", device.as_str()), n);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MockFs;
    use crate::scrape::test_context;
    use std::sync::Arc;

    const DISKSTATS: &str = "   8       0 sda 100 2 3000 40 50 6 7000 80 0 120 130 0 0 0 0\n \
  253       0 dm-0 11 0 22 0 33 0 44 0 0 55 66\n \
    7       0 loop0 1 0 2\n";

    #[test]
    fn test_parse_skips_short_lines() {
        let lines = parse_diskstats(DISKSTATS);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].name, "sda");
        assert_eq!(lines[0].values[2], "3000");
        assert_eq!(lines[1].major_minor(), "253:0");
    }

    #[test]
    fn test_device_mapper_names_and_number_table() {
        let fs = Arc::new(MockFs::new());
        fs.add_file("/proc/diskstats", DISKSTATS);
        fs.add_file("/sys/block/dm-0/dm/name", "vg0-root\n");
        let mut ctx = test_context(fs.clone());

        collect(&mut ctx).unwrap();
        collect(&mut ctx).unwrap();
        assert_eq!(fs.read_count("/sys/block/dm-0/dm/name"), 1);
        assert_eq!(ctx.devices.by_number("253:0"), Some("vg0-root"));
        assert_eq!(ctx.devices.by_number("8:0"), Some("sda"));

        let out = ctx.finish();
        assert!(out.contains("node_disk_sectors_read{device=\"sda\"} 3000\n"));
        assert!(out.contains("node_disk_io_time_weighted{device=\"vg0-root\"} 66\n"));
        assert!(!out.contains("dm-0"));
        assert!(!out.contains("loop0"));
        assert_eq!(out.matches("# TYPE node_disk_reads_completed gauge").count(), 1);
    }
}

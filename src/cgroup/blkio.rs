//! Block I/O throttle counters per cgroup.
//!
//! Device lines (`8:0 Read 1234`) are labelled with the device name recorded
//! by the diskstats collector for that `major:minor` pair, so diskstats must
//! run before this walk.

use tracing::debug;

use super::{walk, CgroupNode};
use crate::collectors::CollectError;
use crate::exposition::{ExpositionWriter, LabelSet, MetricKind};
use crate::fs::FileSystem;
use crate::identity::DeviceMapper;
use crate::procfile::{parse_int, split_whitespace_fields};
use crate::scrape::ScrapeContext;

pub const SUBSYSTEM: &str = "blkio";
pub const MARKER: &str = "blkio.throttle.io_serviced";
const SERVICE_BYTES: &str = "blkio.throttle.io_service_bytes";

pub fn collect(ctx: &mut ScrapeContext) -> Result<(), CollectError> {
    let root = ctx.paths.cgroup(SUBSYSTEM);
    let fs = ctx.fs.as_ref();
    let devices = &ctx.devices;
    let writer = &mut ctx.writer;
    walk(fs, &root, MARKER, &ctx.correlator, |node| {
        emit_node(fs, devices, writer, node)
    });
    Ok(())
}

pub fn emit_node(
    fs: &dyn FileSystem,
    devices: &DeviceMapper,
    writer: &mut ExpositionWriter,
    node: &CgroupNode<'_>,
) {
    emit_file(devices, writer, node, node.content, "");

    match fs.read_to_string(&node.dir.join(SERVICE_BYTES)) {
        Ok(content) => emit_file(devices, writer, node, &content, "_bytes"),
        Err(e) => debug!(cgroup = node.relative, error = %e, "no io_service_bytes"),
    }
}

fn emit_file(
    devices: &DeviceMapper,
    writer: &mut ExpositionWriter,
    node: &CgroupNode<'_>,
    content: &str,
    suffix: &str,
) {
    for line in content.lines() {
        let parts = split_whitespace_fields(line);
        if parts.last().map_or(true, |v| v.is_empty() || *v == "0") {
            continue;
        }

        let (op, value, labels) = match parts.as_slice() {
            [number, op, value] => {
                let device = devices.by_number(number).unwrap_or(*number);
                let labels = LabelSet::new()
                    .with("device", device)
                    .merged(&node.labels());
                (*op, *value, labels)
            }
            [op, value] => (*op, *value, node.labels()),
            _ => continue,
        };

        match parse_int(value) {
            Ok(v) => {
                let name = format!("node_cgroup_blkio_{}{}", op.to_lowercase(), suffix);
                writer.declare(&name, MetricKind::Gauge, "");
                writer.emit(&labels, v);
            }
            Err(e) => debug!(cgroup = node.relative, error = %e, "skipping blkio line"),
        }
    }
}

//! Network interface statistics collector.
//!
//! Reads `/proc/net/dev` for the host and `/proc/<pid>/net/dev` for every
//! known container, so container traffic is reported from inside its own
//! network namespace with the container's labels attached. Devices listed
//! under `/sys/devices/virtual/net` (loopback, bridges, veths) are skipped.

use std::collections::BTreeSet;
use tracing::debug;

use super::CollectError;
use crate::exposition::{LabelSet, MetricKind};
use crate::procfile::{parse_int, split_whitespace_fields, ProcText};
use crate::scrape::ScrapeContext;

/// Parsed `net/dev` table: column names from the header and per-device values
/// in file order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NetDevTable {
    pub receive: Vec<String>,
    pub transmit: Vec<String>,
    pub devices: Vec<(String, Vec<String>)>,
}

impl NetDevTable {
    /// `(direction, column)` for every value column, receive first.
    pub fn columns(&self) -> impl Iterator<Item = (&'static str, &str)> {
        self.receive
            .iter()
            .map(|c| ("receive", c.as_str()))
            .chain(self.transmit.iter().map(|c| ("transmit", c.as_str())))
    }
}

/// Parses a `net/dev` file. The second header line names the columns:
/// ` face |bytes packets ...|bytes packets ...`.
pub fn parse_netdev(content: &str) -> Option<NetDevTable> {
    let (header, pairs) = ProcText::new(content).with_sep(":").skip_rows(2).pairs();
    let [_, columns] = header.as_slice() else {
        return None;
    };

    let groups: Vec<&str> = columns.split('|').collect();
    let [_, receive, transmit, ..] = groups.as_slice() else {
        return None;
    };

    Some(NetDevTable {
        receive: split_whitespace_fields(receive)
            .into_iter()
            .map(String::from)
            .collect(),
        transmit: split_whitespace_fields(transmit)
            .into_iter()
            .map(String::from)
            .collect(),
        devices: pairs
            .into_iter()
            .map(|(device, values)| {
                let values = split_whitespace_fields(values)
                    .into_iter()
                    .map(String::from)
                    .collect();
                (device.to_string(), values)
            })
            .collect(),
    })
}

fn virtual_devices(ctx: &ScrapeContext) -> BTreeSet<String> {
    let dir = ctx.paths.sys("devices/virtual/net");
    match ctx.fs.read_dir(&dir) {
        Ok(entries) => entries
            .iter()
            .filter_map(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .collect(),
        Err(e) => {
            debug!(dir = %dir.display(), error = %e, "no virtual network device list");
            BTreeSet::new()
        }
    }
}

fn emit_table(
    ctx: &mut ScrapeContext,
    table: &NetDevTable,
    skip: &BTreeSet<String>,
    extra: &LabelSet,
) {
    for (i, (direction, column)) in table.columns().enumerate() {
        ctx.writer.declare(
            &format!("node_network_{}_{}", direction, column),
            MetricKind::Gauge,
            "",
        );
        for (device, values) in &table.devices {
            if skip.contains(device) {
                continue;
            }
            let Some(Ok(n)) = values.get(i).map(|v| parse_int(v)) else {
                continue;
            };
            let labels = LabelSet::new().with("device", device.as_str()).merged(extra);
            ctx.writer.emit(&labels, n);
        }
    }
}

pub fn collect(ctx: &mut ScrapeContext) -> Result<(), CollectError> {
    let skip = virtual_devices(ctx);

    let host = ctx.read_proc("net/dev");
    if let Ok(content) = &host {
        match parse_netdev(content) {
            Some(table) => emit_table(ctx, &table, &skip, &LabelSet::new()),
            None => debug!("unrecognised /proc/net/dev header"),
        }
    }

    let containers = ctx.correlator.containers().containers().to_vec();
    for container in containers.iter().filter(|c| c.pid > 0) {
        let rel = format!("{}/net/dev", container.pid);
        let content = match ctx.read_proc(&rel) {
            Ok(content) => content,
            Err(e) => {
                debug!(container = %container.id, error = %e, "container netdev unavailable");
                continue;
            }
        };
        if let Some(table) = parse_netdev(&content) {
            emit_table(ctx, &table, &skip, &container.labels());
        }
    }

    host.map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MockFs;
    use crate::identity::{ContainerInfo, ContainerLabelCache};
    use crate::scrape::test_context_with;

    const NET_DEV: &str = "Inter-|   Receive                            |  Transmit\n \
face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed\n    \
lo:    1000      10    0    0    0     0          0         0     1000      10    0    0    0     0       0          0\n  \
eth0:  5000      50    1    0    0     0          0         0     7000      70    0    2    0     0       0          0\n";

    #[test]
    fn test_parse_netdev_header_and_rows() {
        let table = parse_netdev(NET_DEV).unwrap();
        assert_eq!(table.receive.len(), 8);
        assert_eq!(table.transmit[5], "colls");
        assert_eq!(table.devices[1].0, "eth0");
        assert_eq!(table.devices[1].1[8], "7000");
        assert!(parse_netdev("garbage\n").is_none());
    }

    #[test]
    fn test_host_and_container_interfaces() {
        let fs = MockFs::new();
        fs.add_file("/proc/net/dev", NET_DEV);
        fs.add_file("/proc/4242/net/dev", NET_DEV);
        fs.add_dir("/sys/devices/virtual/net/lo");
        let containers = ContainerLabelCache::from_containers(vec![
            ContainerInfo {
                id: "abc".into(),
                name: "/web".into(),
                image: "nginx".into(),
                pid: 4242,
            },
            ContainerInfo {
                id: "def".into(),
                name: "/stopped".into(),
                image: "busybox".into(),
                pid: 0,
            },
        ]);
        let mut ctx = test_context_with(fs, containers);

        collect(&mut ctx).unwrap();
        let out = ctx.finish();
        assert!(out.contains("node_network_receive_bytes{device=\"eth0\"} 5000\n"));
        assert!(out.contains("node_network_receive_errs{device=\"eth0\"} 1\n"));
        assert!(out.contains("node_network_transmit_drop{device=\"eth0\"} 2\n"));
        assert!(out.contains(
            "node_network_transmit_bytes{device=\"eth0\",docker_name=\"web\",docker_image=\"nginx\"} 7000\n"
        ));
        assert!(!out.contains("device=\"lo\""));
        assert!(!out.contains("stopped"));
        assert_eq!(out.matches("# TYPE node_network_receive_bytes gauge").count(), 1);
    }

    #[test]
    fn test_missing_host_file_is_an_error() {
        let mut ctx = test_context_with(MockFs::new(), ContainerLabelCache::new());
        assert!(collect(&mut ctx).is_err());
    }
}

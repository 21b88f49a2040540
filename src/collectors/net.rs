//! Protocol counters from `/proc/net`: netstat/snmp, sockstat and ARP.

use std::collections::BTreeMap;
use tracing::debug;

use super::CollectError;
use crate::exposition::{LabelSet, MetricKind};
use crate::procfile::{parse_int, split_whitespace_fields, ProcText};
use crate::scrape::ScrapeContext;

/// `/proc/net/netstat` and `/proc/net/snmp` hold `Proto: names...` header
/// lines each followed by a `Proto: values...` line.
pub fn collect_netstat(ctx: &mut ScrapeContext) -> Result<(), CollectError> {
    let mut content = String::new();
    let mut first_error = None;
    for rel in ["net/netstat", "net/snmp"] {
        match ctx.read_proc(rel) {
            Ok(text) => {
                content.push_str(&text);
                if !text.ends_with('\n') {
                    content.push('\n');
                }
            }
            Err(e) => {
                debug!(file = rel, error = %e, "netstat source unavailable");
                first_error.get_or_insert(e);
            }
        }
    }
    if content.is_empty() {
        if let Some(e) = first_error {
            return Err(e);
        }
    }

    let (_, groups) = ProcText::new(&content).with_sep(":").kv_multi();
    let groups: BTreeMap<_, _> = groups.into_iter().collect();
    let labels = LabelSet::new();

    for (proto, lines) in &groups {
        let [names, values] = lines.as_slice() else {
            continue;
        };
        let names = split_whitespace_fields(names);
        let values = split_whitespace_fields(values);
        for (name, value) in names.iter().zip(&values) {
            let Ok(n) = parse_int(value) else {
                continue;
            };
            ctx.writer.declare(
                &format!("node_netstat_{}_{}", proto, name),
                MetricKind::Gauge,
                "",
            );
            ctx.writer.emit(&labels, n);
        }
    }
    Ok(())
}

/// `/proc/net/sockstat`: `TCP: inuse 5 orphan 0 ...`.
pub fn collect_sockstat(ctx: &mut ScrapeContext) -> Result<(), CollectError> {
    let content = ctx.read_proc("net/sockstat")?;
    let (_, pairs) = ProcText::new(&content).with_sep(":").pairs();
    let labels = LabelSet::new();

    for (proto, value) in pairs {
        let fields = split_whitespace_fields(value);
        for pair in fields.chunks_exact(2) {
            let Ok(n) = parse_int(pair[1]) else {
                continue;
            };
            ctx.writer.declare(
                &format!("node_sockstat_{}_{}", proto, pair[0]),
                MetricKind::Gauge,
                "",
            );
            ctx.writer.emit(&labels, n);
        }
    }
    Ok(())
}

/// `/proc/net/arp`: one entry per line after the header, device last.
pub fn collect_arp(ctx: &mut ScrapeContext) -> Result<(), CollectError> {
    let content = ctx.read_proc("net/arp")?;
    let (_, entries) = ProcText::new(&content).skip_rows(1).pairs();

    let mut devices: BTreeMap<&str, i64> = BTreeMap::new();
    for (_, rest) in entries {
        if let Some(device) = split_whitespace_fields(rest).last().copied() {
            *devices.entry(device).or_default() += 1;
        }
    }

    ctx.writer
        .declare("node_arp_entries", MetricKind::Gauge, "ARP entries by device");
    for (device, count) in devices {
        ctx.writer
            .emit(&LabelSet::new().with("device", device), count);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MockFs;
    use crate::scrape::test_context;

    #[test]
    fn test_netstat_pairs_headers_with_values() {
        let fs = MockFs::new();
        fs.add_file(
            "/proc/net/netstat",
            "TcpExt: SyncookiesSent SyncookiesRecv\nTcpExt: 0 3\n",
        );
        fs.add_file(
            "/proc/net/snmp",
            "Tcp: RtoAlgorithm RtoMin MaxConn\nTcp: 1 200 -1\nUdp: InDatagrams\n",
        );
        let mut ctx = test_context(fs);

        collect_netstat(&mut ctx).unwrap();
        let out = ctx.finish();
        assert!(out.contains("node_netstat_TcpExt_SyncookiesSent 0\n"));
        assert!(out.contains("node_netstat_TcpExt_SyncookiesRecv 3\n"));
        assert!(out.contains("node_netstat_Tcp_RtoMin 200\n"));
        assert!(out.contains("node_netstat_Tcp_MaxConn -1\n"));
        assert!(!out.contains("Udp"));
    }

    #[test]
    fn test_netstat_with_one_source_missing() {
        let fs = MockFs::new();
        fs.add_file("/proc/net/snmp", "Ip: Forwarding\nIp: 1");
        let mut ctx = test_context(fs);

        collect_netstat(&mut ctx).unwrap();
        assert!(ctx.finish().contains("node_netstat_Ip_Forwarding 1\n"));
    }

    #[test]
    fn test_sockstat() {
        let fs = MockFs::new();
        fs.add_file(
            "/proc/net/sockstat",
            "sockets: used 290\nTCP: inuse 5 orphan 0 tw 2 alloc 7 mem 1\nUDP: inuse 3 mem\n",
        );
        let mut ctx = test_context(fs);

        collect_sockstat(&mut ctx).unwrap();
        let out = ctx.finish();
        assert!(out.contains("node_sockstat_sockets_used 290\n"));
        assert!(out.contains("node_sockstat_TCP_tw 2\n"));
        assert!(out.contains("node_sockstat_UDP_inuse 3\n"));
        assert!(!out.contains("node_sockstat_UDP_mem"));
    }

    #[test]
    fn test_arp_counts_entries_per_device() {
        let fs = MockFs::new();
        fs.add_file(
            "/proc/net/arp",
            "IP address       HW type     Flags       HW address            Mask     Device\n\
             192.168.1.1      0x1         0x2         aa:bb:cc:dd:ee:ff     *        eth0\n\
             192.168.1.7      0x1         0x2         aa:bb:cc:dd:ee:00     *        eth0\n\
             10.0.0.1         0x1         0x2         aa:bb:cc:dd:ee:01     *        wg0\n",
        );
        let mut ctx = test_context(fs);

        collect_arp(&mut ctx).unwrap();
        assert_eq!(
            ctx.finish(),
            "# HELP node_arp_entries ARP entries by device.\n\
             # TYPE node_arp_entries gauge\n\
             node_arp_entries{device=\"eth0\"} 2\n\
             node_arp_entries{device=\"wg0\"} 1\n"
        );
    }
}

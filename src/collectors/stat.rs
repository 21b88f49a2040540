//! `/proc/stat` collector: boot time, scheduler counters and per-CPU time.

use once_cell::sync::Lazy;
use tracing::debug;

use super::CollectError;
use crate::exposition::{LabelSet, MetricKind};
use crate::procfile::{parse_int, split_whitespace_fields, ProcText};
use crate::scrape::ScrapeContext;

/// Column order of the `cpuN` lines.
pub const CPU_MODES: [&str; 10] = [
    "user",
    "nice",
    "system",
    "idle",
    "iowait",
    "irq",
    "softirq",
    "steal",
    "guest",
    "guest_nice",
];

fn get_clk_tck() -> f64 {
    // SAFETY: sysconf has no preconditions; -1 and 0 are handled below.
    let tck = unsafe { libc::sysconf(libc::_SC_CLK_TCK) };
    if tck > 0 {
        tck as f64
    } else {
        100.0
    }
}

/// Kernel clock ticks per second, the unit of the `cpuN` columns.
pub static CLK_TCK: Lazy<f64> = Lazy::new(get_clk_tck);

/// Scalar `/proc/stat` keys: (key, metric, kind, help).
const SCALARS: [(&str, &str, MetricKind, &str); 6] = [
    ("btime", "node_boot_time", MetricKind::Gauge, "Node boot time, in unixtime"),
    ("ctxt", "node_context_switches", MetricKind::Counter, "Total number of context switches"),
    ("processes", "node_forks", MetricKind::Counter, "Total number of forks"),
    ("intr", "node_intr", MetricKind::Counter, "Total number of interrupts serviced"),
    (
        "procs_blocked",
        "node_procs_blocked",
        MetricKind::Gauge,
        "Number of processes blocked waiting for I/O to complete",
    ),
    (
        "procs_running",
        "node_procs_running",
        MetricKind::Gauge,
        "Number of processes in runnable state",
    ),
];

pub fn collect(ctx: &mut ScrapeContext) -> Result<(), CollectError> {
    let content = ctx.read_proc("stat")?;
    collect_text(ctx, &content, *CLK_TCK);
    Ok(())
}

fn collect_text(ctx: &mut ScrapeContext, content: &str, ticks_per_second: f64) {
    let text = ProcText::new(content);
    let (_, kv) = text.kv();
    let labels = LabelSet::new();

    for (key, metric, kind, help) in SCALARS {
        let Some(value) = kv.get(key) else {
            continue;
        };
        // `intr` carries the total followed by per-IRQ counts.
        let first = split_whitespace_fields(value).first().copied().unwrap_or_default();
        match parse_int(first) {
            Ok(n) => {
                ctx.writer.declare(metric, kind, help);
                ctx.writer.emit(&labels, n);
            }
            Err(e) => debug!(key, error = %e, "skipping /proc/stat entry"),
        }
    }

    ctx.writer.declare(
        "node_cpu_seconds",
        MetricKind::Counter,
        "Seconds the cpus spent in each mode",
    );
    let (_, pairs) = text.pairs();
    let mut cores: i64 = 0;
    for (key, value) in pairs {
        if key == "cpu" || !key.starts_with("cpu") {
            continue;
        }
        cores += 1;

        for (mode, jiffies) in CPU_MODES.iter().zip(split_whitespace_fields(value)) {
            if let Ok(n) = parse_int(jiffies) {
                let labels = LabelSet::new().with("cpu", key).with("mode", *mode);
                ctx.writer.emit(&labels, n as f64 / ticks_per_second);
            }
        }
    }

    ctx.writer
        .declare("node_cpu_count", MetricKind::Gauge, "Core count");
    ctx.writer.emit(&labels, cores);
}

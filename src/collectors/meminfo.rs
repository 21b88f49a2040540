//! `/proc/meminfo` collector.

use tracing::debug;

use super::CollectError;
use crate::exposition::{LabelSet, MetricKind};
use crate::procfile::{parse_int, split_whitespace_fields, ProcText};
use crate::scrape::ScrapeContext;

/// Turns `Active(anon)` into `Active_anon`, a valid metric name fragment.
fn metric_key(key: &str) -> String {
    key.replace('(', "_").replace(')', "")
}

pub fn collect(ctx: &mut ScrapeContext) -> Result<(), CollectError> {
    let content = ctx.read_proc("meminfo")?;
    let (_, pairs) = ProcText::new(&content).with_sep(":").pairs();
    let labels = LabelSet::new();

    for (key, value) in pairs {
        let parts = split_whitespace_fields(value);
        let size = match parse_int(parts.first().copied().unwrap_or_default()) {
            Ok(size) => size,
            Err(e) => {
                debug!(key, error = %e, "skipping meminfo entry");
                continue;
            }
        };
        let bytes = match parts.get(1) {
            Some(&"kB") => size.saturating_mul(1024),
            _ => size,
        };

        ctx.writer.declare(
            &format!("node_memory_{}", metric_key(key)),
            MetricKind::Gauge,
            "",
        );
        ctx.writer.emit(&labels, bytes);
    }
    Ok(())
}

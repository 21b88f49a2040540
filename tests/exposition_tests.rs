use ahash::AHashMap as HashMap;
use regex::Regex;

use node_stats_exporter::{ExpositionWriter, LabelSet, MetricKind};

#[derive(Debug, PartialEq)]
struct Sample {
    name: String,
    labels: Vec<(String, String)>,
    value: String,
    timestamp: Option<i64>,
}

fn unescape(value: &str) -> String {
    let mut out = String::new();
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/// Minimal text-format parser: checks that every family has one TYPE line
/// that precedes all of its samples, which must be contiguous.
fn parse(text: &str) -> Vec<Sample> {
    let line_re =
        Regex::new(r#"^([a-zA-Z_:][a-zA-Z0-9_:]*)(?:\{(.*)\})? (\S+)(?: (-?\d+))?$"#).unwrap();
    let label_re = Regex::new(r#"([a-zA-Z_][a-zA-Z0-9_]*)="((?:[^"\\]|\\.)*)""#).unwrap();

    let mut types: HashMap<String, usize> = HashMap::new();
    let mut current: Option<String> = None;
    let mut closed: Vec<String> = Vec::new();
    let mut samples = Vec::new();

    for line in text.lines() {
        if let Some(rest) = line.strip_prefix("# TYPE ") {
            let name = rest.split(' ').next().unwrap().to_string();
            *types.entry(name.clone()).or_default() += 1;
            if let Some(prev) = current.replace(name) {
                closed.push(prev);
            }
            continue;
        }
        if line.starts_with("# HELP ") {
            continue;
        }

        let caps = line_re.captures(line).unwrap_or_else(|| panic!("bad line: {}", line));
        let name = caps[1].to_string();
        assert_eq!(current.as_deref(), Some(name.as_str()), "sample outside its family: {}", line);
        assert!(!closed.contains(&name), "family {} is not contiguous", name);

        let labels = caps
            .get(2)
            .map(|m| {
                label_re
                    .captures_iter(m.as_str())
                    .map(|c| (c[1].to_string(), unescape(&c[2])))
                    .collect()
            })
            .unwrap_or_default();
        samples.push(Sample {
            name,
            labels,
            value: caps[3].to_string(),
            timestamp: caps.get(4).map(|m| m.as_str().parse().unwrap()),
        });
    }

    assert!(types.values().all(|n| *n == 1), "duplicate TYPE lines: {:?}", types);
    samples
}

#[test]
fn test_interleaved_declarations_stay_valid() {
    let mut w = ExpositionWriter::new(Some(1_700_000_000_000));
    for cgroup in ["docker/a", "docker/b", "system.slice/cron.service"] {
        let labels = LabelSet::new().with("cgroup", cgroup);
        w.declare("node_cgroup_memory_bytes", MetricKind::Gauge, "Memory usage of the cgroup");
        w.emit(&labels, 4096i64);
        w.declare("node_cgroup_memory_limit_bytes", MetricKind::Gauge, "");
        w.emit(&labels, 8192i64);
    }

    let samples = parse(&w.finish());
    assert_eq!(samples.len(), 6);
    assert_eq!(samples[0].name, "node_cgroup_memory_bytes");
    assert_eq!(samples[2].labels, vec![("cgroup".into(), "system.slice/cron.service".into())]);
    assert_eq!(samples[3].name, "node_cgroup_memory_limit_bytes");
    assert!(samples.iter().all(|s| s.timestamp == Some(1_700_000_000_000)));
}

#[test]
fn test_emitted_triples_survive_reparsing() {
    let cases: Vec<(&str, LabelSet, String)> = vec![
        ("node_load1", LabelSet::new(), "0.42".into()),
        (
            "node_network_receive_bytes",
            LabelSet::new()
                .with("device", "eth0")
                .with("docker_name", "web")
                .with("docker_image", "nginx:1.25"),
            "5000".into(),
        ),
        (
            "nftables_rule_bytes_total",
            LabelSet::new()
                .with("comment", r#"allow "ssh" \ admin"#)
                .with("right", "[established related]"),
            "18446744073709551616000".into(),
        ),
    ];

    let mut w = ExpositionWriter::new(None);
    for (name, labels, value) in &cases {
        w.declare(name, MetricKind::Counter, "");
        w.emit(labels, value.as_str());
    }

    let samples = parse(&w.finish());
    assert_eq!(samples.len(), cases.len());
    for (sample, (name, labels, value)) in samples.iter().zip(&cases) {
        assert_eq!(sample.name, *name);
        let expected: Vec<(String, String)> = labels
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        assert_eq!(sample.labels, expected);
        assert_eq!(&sample.value, value);
        assert_eq!(sample.timestamp, None);
    }
}

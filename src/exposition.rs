//! Prometheus text exposition writer.
//!
//! Collectors call [`ExpositionWriter::declare`] to select a metric family and
//! [`ExpositionWriter::emit`] to append samples to it. The `# HELP`/`# TYPE`
//! preamble of a family is written exactly once, keyed by name, no matter how
//! often the family is declared during a run. All sample lines share one
//! millisecond timestamp fixed when the writer is created.

use ahash::AHashMap as HashMap;
use std::fmt::{self, Write as _};
use tracing::warn;

/// Declared type of a metric family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Gauge,
    Counter,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Gauge => "gauge",
            MetricKind::Counter => "counter",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered collection of `key="value"` label pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSet {
    pairs: Vec<(String, String)>,
}

impl LabelSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style push.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.push(key, value);
        self
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.pairs.push((key.into(), value.into()));
    }

    /// Appends every pair of `other` after the pairs already present.
    pub fn extend(&mut self, other: &LabelSet) {
        self.pairs.extend(other.pairs.iter().cloned());
    }

    /// Returns a copy of `self` followed by `other`.
    pub fn merged(&self, other: &LabelSet) -> LabelSet {
        let mut out = self.clone();
        out.extend(other);
        out
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

impl fmt::Display for LabelSet {
    /// Renders `k1="v1",k2="v2"` without the surrounding braces.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (key, value)) in self.pairs.iter().enumerate() {
            if i > 0 {
                f.write_char(',')?;
            }
            write!(f, "{}=\"", key)?;
            write_escaped(f, value)?;
            f.write_char('"')?;
        }
        Ok(())
    }
}

fn write_escaped(f: &mut impl fmt::Write, value: &str) -> fmt::Result {
    for c in value.chars() {
        match c {
            '\\' => f.write_str("\\\\")?,
            '"' => f.write_str("\\\"")?,
            '\n' => f.write_str("\\n")?,
            other => f.write_char(other)?,
        }
    }
    Ok(())
}

/// Sample value as supplied by a collector. The writer performs no unit
/// conversion: numbers render literally, booleans as `1`/`0`, and raw text
/// (already-formatted kernel values) verbatim.
#[derive(Debug, Clone, PartialEq)]
pub enum SampleValue {
    Int(i64),
    UInt(u64),
    Float(f64),
    Bool(bool),
    Raw(String),
}

impl fmt::Display for SampleValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SampleValue::Int(v) => write!(f, "{}", v),
            SampleValue::UInt(v) => write!(f, "{}", v),
            SampleValue::Float(v) if v.is_nan() => f.write_str("NaN"),
            SampleValue::Float(v) if v.is_infinite() => {
                f.write_str(if *v > 0.0 { "+Inf" } else { "-Inf" })
            }
            SampleValue::Float(v) => write!(f, "{}", v),
            SampleValue::Bool(v) => f.write_str(if *v { "1" } else { "0" }),
            SampleValue::Raw(v) => f.write_str(v),
        }
    }
}

impl From<i64> for SampleValue {
    fn from(v: i64) -> Self {
        SampleValue::Int(v)
    }
}

impl From<u64> for SampleValue {
    fn from(v: u64) -> Self {
        SampleValue::UInt(v)
    }
}

impl From<usize> for SampleValue {
    fn from(v: usize) -> Self {
        SampleValue::UInt(v as u64)
    }
}

impl From<f64> for SampleValue {
    fn from(v: f64) -> Self {
        SampleValue::Float(v)
    }
}

impl From<bool> for SampleValue {
    fn from(v: bool) -> Self {
        SampleValue::Bool(v)
    }
}

impl From<String> for SampleValue {
    fn from(v: String) -> Self {
        SampleValue::Raw(v)
    }
}

impl From<&str> for SampleValue {
    fn from(v: &str) -> Self {
        SampleValue::Raw(v.to_string())
    }
}

/// One metric family's accumulated text.
#[derive(Debug)]
struct Family {
    preamble: String,
    samples: String,
}

/// Accumulates exposition text for one scrape.
///
/// Families are rendered contiguously, in the order of their first
/// declaration, so samples of a family declared again later in the run are
/// grouped under the single preamble instead of being scattered through the
/// output.
#[derive(Debug)]
pub struct ExpositionWriter {
    timestamp_ms: Option<i64>,
    families: Vec<Family>,
    index: HashMap<String, usize>,
    current: Option<(String, usize)>,
    sample_count: usize,
}

impl ExpositionWriter {
    /// Creates a writer whose sample lines all end with `timestamp_ms`
    /// (or carry no timestamp when `None`).
    pub fn new(timestamp_ms: Option<i64>) -> Self {
        Self {
            timestamp_ms,
            families: Vec::new(),
            index: HashMap::new(),
            current: None,
            sample_count: 0,
        }
    }

    /// Creates a writer stamped with the current wall-clock time.
    pub fn now() -> Self {
        Self::new(Some(chrono::Utc::now().timestamp_millis()))
    }

    /// Selects `name` as the current family, writing its preamble on the
    /// first declaration only. `help` on later declarations is ignored.
    pub fn declare(&mut self, name: &str, kind: MetricKind, help: &str) {
        let idx = match self.index.get(name) {
            Some(&idx) => idx,
            None => {
                let mut preamble = String::new();
                if !help.is_empty() {
                    let _ = writeln!(preamble, "# HELP {} {}.", name, help);
                }
                let _ = writeln!(preamble, "# TYPE {} {}", name, kind);
                self.families.push(Family {
                    preamble,
                    samples: String::new(),
                });
                let idx = self.families.len() - 1;
                self.index.insert(name.to_string(), idx);
                idx
            }
        };
        self.current = Some((name.to_string(), idx));
    }

    /// Appends one sample to the most recently declared family.
    pub fn emit(&mut self, labels: &LabelSet, value: impl Into<SampleValue>) {
        let Some((name, idx)) = &self.current else {
            warn!("sample emitted before any metric family was declared, dropping it");
            return;
        };
        let value = value.into();
        let family = &mut self.families[*idx];

        let line = &mut family.samples;
        line.push_str(name);
        if !labels.is_empty() {
            let _ = write!(line, "{{{}}}", labels);
        }
        let _ = write!(line, " {}", value);
        if let Some(ts) = self.timestamp_ms {
            let _ = write!(line, " {}", ts);
        }
        line.push('\n');
        self.sample_count += 1;
    }

    /// Number of sample lines emitted so far.
    pub fn sample_count(&self) -> usize {
        self.sample_count
    }

    /// Number of distinct families declared so far.
    pub fn family_count(&self) -> usize {
        self.families.len()
    }

    /// Consumes the writer and returns the exposition text.
    pub fn finish(self) -> String {
        let len = self
            .families
            .iter()
            .map(|f| f.preamble.len() + f.samples.len())
            .sum();
        let mut out = String::with_capacity(len);
        for family in &self.families {
            out.push_str(&family.preamble);
            out.push_str(&family.samples);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declare_writes_preamble_once() {
        let mut w = ExpositionWriter::new(None);
        for _ in 0..5 {
            w.declare("node_load1", MetricKind::Gauge, "1m load average");
            w.emit(&LabelSet::new(), 1.5);
        }
        let out = w.finish();
        assert_eq!(out.matches("# TYPE node_load1 gauge").count(), 1);
        assert_eq!(out.matches("# HELP node_load1 1m load average.").count(), 1);
        assert_eq!(out.matches("node_load1 1.5\n").count(), 5);
    }

    #[test]
    fn test_help_on_later_declaration_is_ignored() {
        let mut w = ExpositionWriter::new(None);
        w.declare("x", MetricKind::Counter, "");
        w.declare("x", MetricKind::Counter, "late help");
        w.emit(&LabelSet::new(), 1i64);
        assert_eq!(w.finish(), "# TYPE x counter\nx 1\n");
    }

    #[test]
    fn test_samples_share_timestamp() {
        let mut w = ExpositionWriter::new(Some(1_600_000_000_123));
        w.declare("a", MetricKind::Gauge, "");
        w.emit(&LabelSet::new().with("dev", "sda"), 3u64);
        w.declare("b", MetricKind::Gauge, "");
        w.emit(&LabelSet::new(), true);
        let out = w.finish();
        assert!(out.contains("a{dev=\"sda\"} 3 1600000000123\n"));
        assert!(out.contains("b 1 1600000000123\n"));
    }

    #[test]
    fn test_families_are_grouped() {
        let mut w = ExpositionWriter::new(None);
        w.declare("a", MetricKind::Gauge, "");
        w.emit(&LabelSet::new().with("n", "1"), 1i64);
        w.declare("b", MetricKind::Gauge, "");
        w.emit(&LabelSet::new(), 2i64);
        w.declare("a", MetricKind::Gauge, "");
        w.emit(&LabelSet::new().with("n", "2"), 3i64);
        assert_eq!(
            w.finish(),
            "# TYPE a gauge\na{n=\"1\"} 1\na{n=\"2\"} 3\n# TYPE b gauge\nb 2\n"
        );
    }

    #[test]
    fn test_emit_without_declare_is_dropped() {
        let mut w = ExpositionWriter::new(None);
        w.emit(&LabelSet::new(), 1i64);
        assert_eq!(w.sample_count(), 0);
        assert_eq!(w.finish(), "");
    }

    #[test]
    fn test_label_values_are_escaped() {
        let labels = LabelSet::new().with("name", "a\"b\\c\nd");
        assert_eq!(labels.to_string(), r#"name="a\"b\\c\nd""#);
    }

    #[test]
    fn test_sample_value_rendering() {
        assert_eq!(SampleValue::from(false).to_string(), "0");
        assert_eq!(SampleValue::from(0.5).to_string(), "0.5");
        assert_eq!(SampleValue::from(f64::INFINITY).to_string(), "+Inf");
        assert_eq!(SampleValue::from("12.340000000").to_string(), "12.340000000");
        assert_eq!(SampleValue::from(u64::MAX).to_string(), "18446744073709551615");
    }

    #[test]
    fn test_label_set_merge_keeps_order() {
        let base = LabelSet::new().with("cgroup", "docker/abc");
        let identity = LabelSet::new()
            .with("docker_name", "web")
            .with("docker_image", "nginx");
        let merged = base.merged(&identity);
        assert_eq!(
            merged.to_string(),
            r#"cgroup="docker/abc",docker_name="web",docker_image="nginx""#
        );
        assert_eq!(merged.get("docker_name"), Some("web"));
        assert_eq!(merged.len(), 3);
    }
}

//! nftables ruleset flattening.
//!
//! The JSON produced by `nft -j list ruleset` is decoded into typed [`Rule`]s
//! and every rule that carries a counter becomes one labelled sample in each
//! of `nftables_rule_bytes_total` and `nftables_rule_packets_total`. Labels
//! follow the key order of the rule object; compound match operands are
//! flattened into a stable `key:value key[nested]` string. Rules in a chain
//! whose name ends with the size suffix additionally get a `le` label taken
//! from the bucket ladder by their position in the chain.

use ahash::AHashMap as HashMap;
use serde::de::{Deserializer, MapAccess, Visitor};
use serde::Deserialize;
use serde_json::value::RawValue;
use serde_json::{Number, Value};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, trace};

use crate::collectors::CollectError;
use crate::config::{default_size_buckets, DEFAULT_SIZE_SUFFIX};
use crate::exposition::{ExpositionWriter, LabelSet, MetricKind};
use crate::scrape::ScrapeContext;

pub const BYTES_METRIC: &str = "nftables_rule_bytes_total";
pub const PACKETS_METRIC: &str = "nftables_rule_packets_total";

#[derive(Debug, Error)]
pub enum RulesetError {
    #[error("failed to run {path}: {source}")]
    Spawn {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{path} exited with {status}: {stderr}")]
    Command {
        path: PathBuf,
        status: String,
        stderr: String,
    },

    #[error("malformed ruleset JSON: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Top-level `{"nftables": [...]}` document, reduced to its rules.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Ruleset {
    pub rules: Vec<Rule>,
}

// Entries stay raw so that one malformed rule does not fail the document.
#[derive(Deserialize)]
struct RawRuleset<'a> {
    #[serde(default, borrow)]
    nftables: Vec<&'a RawValue>,
}

#[derive(Deserialize)]
struct RawEntry {
    rule: Option<Rule>,
}

impl Ruleset {
    pub fn from_slice(json: &[u8]) -> Result<Self, RulesetError> {
        let raw: RawRuleset = serde_json::from_slice(json)?;
        let rules = raw
            .nftables
            .into_iter()
            .enumerate()
            .filter_map(|(index, entry)| {
                match serde_json::from_str::<RawEntry>(entry.get()) {
                    Ok(entry) => entry.rule,
                    Err(e) => {
                        debug!(index, error = %e, "skipping malformed ruleset entry");
                        None
                    }
                }
            })
            .collect();
        Ok(Self { rules })
    }
}

impl FromStr for Ruleset {
    type Err = RulesetError;

    fn from_str(json: &str) -> Result<Self, Self::Err> {
        Self::from_slice(json.as_bytes())
    }
}

/// One key of a rule object, in document order.
#[derive(Debug, Clone, PartialEq)]
pub enum RuleField {
    /// Any scalar key other than `chain`, rendered as text.
    Attr(String, String),
    Chain(String),
    Expr(Vec<Expression>),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Rule {
    pub fields: Vec<RuleField>,
}

impl Rule {
    pub fn table(&self) -> Option<&str> {
        self.fields.iter().find_map(|f| match f {
            RuleField::Attr(k, v) if k == "table" => Some(v.as_str()),
            _ => None,
        })
    }

    pub fn chain(&self) -> Option<&str> {
        self.fields.iter().find_map(|f| match f {
            RuleField::Chain(c) => Some(c.as_str()),
            _ => None,
        })
    }
}

// Labels follow document key order, so rule objects are visited key by key.
impl<'de> Deserialize<'de> for Rule {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct RuleVisitor;

        impl<'de> Visitor<'de> for RuleVisitor {
            type Value = Rule;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an nftables rule object")
            }

            fn visit_map<A>(self, mut map: A) -> Result<Rule, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut fields = Vec::new();
                while let Some(key) = map.next_key::<String>()? {
                    let value: Value = map.next_value()?;
                    if key == "expr" {
                        let exprs = match value {
                            Value::Array(items) => items.iter().map(Expression::lenient).collect(),
                            _ => Vec::new(),
                        };
                        fields.push(RuleField::Expr(exprs));
                    } else if let Some(text) = scalar_text(&value) {
                        if key == "chain" {
                            fields.push(RuleField::Chain(text));
                        } else {
                            fields.push(RuleField::Attr(key, text));
                        }
                    }
                }
                Ok(Rule { fields })
            }
        }

        deserializer.deserialize_map(RuleVisitor)
    }
}

/// One element of a rule's `expr` array.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "RawExpression")]
pub enum Expression {
    Match(Match),
    Jump(Jump),
    Counter(Counter),
    Other,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Match {
    pub left: Option<String>,
    pub right: Option<String>,
    pub op: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Jump {
    pub target: Option<String>,
}

/// Counter values keep the exact digits of the document.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Counter {
    pub bytes: Option<Number>,
    pub packets: Option<Number>,
}

/// Wire shape of an expression object. Keys other than these three leave
/// every field empty.
#[derive(Deserialize)]
struct RawExpression {
    #[serde(rename = "match")]
    matches: Option<MatchBody>,
    jump: Option<Jump>,
    counter: Option<Counter>,
}

/// Operands stay loosely typed until [`flatten_operand`] renders them.
#[derive(Deserialize)]
struct MatchBody {
    #[serde(default, deserialize_with = "present")]
    left: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    right: Option<Value>,
    op: Option<String>,
}

// Keeps an explicit `null` operand as `Some(Value::Null)`.
fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl From<RawExpression> for Expression {
    fn from(raw: RawExpression) -> Self {
        if let Some(m) = raw.matches {
            return Expression::Match(Match {
                left: m.left.as_ref().map(flatten_operand),
                right: m.right.as_ref().map(flatten_operand),
                op: m.op,
            });
        }
        if let Some(jump) = raw.jump {
            return Expression::Jump(jump);
        }
        match raw.counter {
            Some(counter) => Expression::Counter(counter),
            None => Expression::Other,
        }
    }
}

impl Expression {
    /// Decodes one `expr` element, treating a body of the wrong shape (such
    /// as a named counter reference) as [`Expression::Other`].
    fn lenient(value: &Value) -> Self {
        Expression::deserialize(value).unwrap_or_else(|e| {
            trace!(error = %e, "unrecognised expression shape");
            Expression::Other
        })
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Renders a match operand as a single string.
///
/// Scalars render as their text. Objects become space-joined fragments,
/// `key[...]` for nested objects and `key:value` otherwise, sorted so that the
/// result does not depend on key order. Arrays render as `[a b]` in order.
pub fn flatten_operand(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut fragments: Vec<String> = map
                .iter()
                .map(|(key, v)| match v {
                    Value::Object(_) => format!("{}[{}]", key, flatten_operand(v)),
                    other => format!("{}:{}", key, flatten_operand(other)),
                })
                .collect();
            fragments.sort();
            fragments.join(" ")
        }
        Value::Array(items) => {
            let items: Vec<String> = items.iter().map(flatten_operand).collect();
            format!("[{}]", items.join(" "))
        }
        Value::Null => "null".to_string(),
        scalar => scalar_text(scalar).unwrap_or_default(),
    }
}

/// Upper bound of one size bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    Le(u64),
    Inf,
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bucket::Le(n) => write!(f, "{}", n),
            Bucket::Inf => f.write_str("inf"),
        }
    }
}

/// Maps the n-th rule of a size chain to a bucket of the ladder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SizeHistogram {
    suffix: String,
    ladder: Vec<Bucket>,
}

impl SizeHistogram {
    /// Ladder of `bounds` followed by the `inf` sentinel.
    pub fn new(suffix: impl Into<String>, bounds: &[u64]) -> Self {
        let ladder = bounds
            .iter()
            .map(|b| Bucket::Le(*b))
            .chain(std::iter::once(Bucket::Inf))
            .collect();
        Self::with_ladder(suffix, ladder)
    }

    pub fn with_ladder(suffix: impl Into<String>, ladder: Vec<Bucket>) -> Self {
        Self {
            suffix: suffix.into(),
            ladder,
        }
    }

    /// Bucket for the 1-based `position` of a rule in `chain`, if the chain
    /// is a size chain and the position is within the ladder.
    pub fn bucket(&self, chain: &str, position: usize) -> Option<Bucket> {
        if position == 0 || !chain.ends_with(&self.suffix) {
            return None;
        }
        self.ladder.get(position - 1).copied()
    }
}

impl Default for SizeHistogram {
    fn default() -> Self {
        Self::new(DEFAULT_SIZE_SUFFIX, &default_size_buckets())
    }
}

/// A counted rule ready for emission.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatRule {
    pub labels: LabelSet,
    pub bytes: Number,
    pub packets: Number,
}

/// Flattens every counted rule of `ruleset` into a label set.
///
/// Rule positions are counted per `(table, chain)` pair over all rules,
/// including those without a counter. A counter field missing from the
/// document is reported as 0.
pub fn flatten(ruleset: &Ruleset, histogram: &SizeHistogram) -> Vec<FlatRule> {
    let mut positions: HashMap<(String, String), usize> = HashMap::new();
    let mut out = Vec::new();

    for rule in &ruleset.rules {
        let table = rule.table().unwrap_or_default();
        let mut labels = LabelSet::new();
        let mut counter = None;

        for field in &rule.fields {
            match field {
                RuleField::Attr(key, value) => labels.push(key, value),
                RuleField::Chain(chain) => {
                    let n = positions
                        .entry((table.to_string(), chain.clone()))
                        .or_insert(0);
                    *n += 1;
                    let position = *n;

                    labels.push("chain", chain);
                    // `num` and `le` come from the rule's place in the
                    // `nft -j list ruleset` output, so they only identify the
                    // same rule across scrapes while that order is unchanged.
                    labels.push("num", position.to_string());
                    if let Some(bucket) = histogram.bucket(chain, position) {
                        labels.push("le", bucket.to_string());
                    }
                }
                RuleField::Expr(exprs) => {
                    for expr in exprs {
                        match expr {
                            Expression::Match(m) => {
                                if let Some(left) = &m.left {
                                    labels.push("left", left);
                                }
                                if let Some(right) = &m.right {
                                    labels.push("right", right);
                                }
                                if let Some(op) = &m.op {
                                    labels.push("op", op);
                                }
                            }
                            Expression::Jump(j) => {
                                if let Some(target) = &j.target {
                                    labels.push("jump", target);
                                }
                            }
                            Expression::Counter(c) => counter = Some(c),
                            Expression::Other => {}
                        }
                    }
                }
            }
        }

        match counter {
            Some(c) => out.push(FlatRule {
                labels,
                bytes: c.bytes.clone().unwrap_or_else(|| Number::from(0u64)),
                packets: c.packets.clone().unwrap_or_else(|| Number::from(0u64)),
            }),
            None => trace!(labels = %labels, "rule has no counter"),
        }
    }

    out
}

/// Writes both counter families. Nothing is written for an empty rule list.
pub fn emit(writer: &mut ExpositionWriter, rules: &[FlatRule]) {
    if rules.is_empty() {
        return;
    }

    writer.declare(
        BYTES_METRIC,
        MetricKind::Counter,
        "nftables rule matched total bytes",
    );
    for rule in rules {
        writer.emit(&rule.labels, rule.bytes.to_string());
    }

    writer.declare(
        PACKETS_METRIC,
        MetricKind::Counter,
        "nftables rule matched total packets",
    );
    for rule in rules {
        writer.emit(&rule.labels, rule.packets.to_string());
    }
}

/// Runs `<nft> -j list ruleset` and returns its standard output.
pub fn list_ruleset(nft: &Path) -> Result<Vec<u8>, RulesetError> {
    let output = Command::new(nft)
        .args(["-j", "list", "ruleset"])
        .output()
        .map_err(|source| RulesetError::Spawn {
            path: nft.to_path_buf(),
            source,
        })?;

    if !output.status.success() {
        return Err(RulesetError::Command {
            path: nft.to_path_buf(),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(output.stdout)
}

pub fn collect(ctx: &mut ScrapeContext) -> Result<(), CollectError> {
    let json = list_ruleset(&ctx.nft_path)?;
    let ruleset = Ruleset::from_slice(&json)?;
    let rules = flatten(&ruleset, &ctx.histogram);
    debug!(
        rules = ruleset.rules.len(),
        counted = rules.len(),
        "flattened nftables ruleset"
    );
    emit(&mut ctx.writer, &rules);
    Ok(())
}

//! Parsing views over semi-structured kernel text.
//!
//! [`ProcText`] wraps the raw contents of a `/proc` or `/sys` file and exposes
//! the handful of shapes those files come in: a single scalar, a
//! whitespace-separated field list, or `key<sep>value` lines with an optional
//! header block. Every view re-parses the wrapped text, so a `ProcText` can be
//! shared freely between collectors.

use ahash::AHashMap as HashMap;
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

/// One-or-more whitespace characters, the default field separator.
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Error returned when a scalar view cannot parse the wrapped text.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("invalid integer literal '{0}'")]
    InvalidInt(String),

    #[error("invalid float literal '{0}'")]
    InvalidFloat(String),
}

/// A raw text blob plus the options that control how it is split.
#[derive(Debug, Clone)]
pub struct ProcText<'a> {
    text: &'a str,
    sep: Option<&'a str>,
    skip_rows: usize,
}

/// Header lines skipped by a key/value view, returned verbatim.
pub type Header = Vec<String>;

impl<'a> ProcText<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            text,
            sep: None,
            skip_rows: 0,
        }
    }

    /// Key/value separator; defaults to a single space.
    pub fn with_sep(mut self, sep: &'a str) -> Self {
        self.sep = Some(sep).filter(|s| !s.is_empty());
        self
    }

    /// Number of leading lines returned as header by the key/value views.
    pub fn skip_rows(mut self, rows: usize) -> Self {
        self.skip_rows = rows;
        self
    }

    /// Parses the whole trimmed text as a signed 64-bit integer.
    pub fn int(&self) -> Result<i64, ParseError> {
        parse_int(self.text)
    }

    /// Parses the whole trimmed text as a 64-bit float.
    pub fn float(&self) -> Result<f64, ParseError> {
        parse_float(self.text)
    }

    /// Splits the trimmed text on runs of whitespace.
    ///
    /// An empty (or all-whitespace) text yields a single empty field, the
    /// same shape a regex split of an empty string produces.
    pub fn fields(&self) -> Vec<&'a str> {
        WHITESPACE.split(self.text.trim()).collect()
    }

    /// Key/value view keeping the last value seen for a repeated key.
    pub fn kv(&self) -> (Header, HashMap<String, String>) {
        let mut map = HashMap::new();
        let header = self.scan_pairs(|key, value| {
            map.insert(key.to_string(), value.to_string());
        });
        (header, map)
    }

    /// Key/value view accumulating every value of a key in encounter order.
    pub fn kv_multi(&self) -> (Header, HashMap<String, Vec<String>>) {
        let mut map: HashMap<String, Vec<String>> = HashMap::new();
        let header = self.scan_pairs(|key, value| {
            map.entry(key.to_string())
                .or_default()
                .push(value.to_string());
        });
        (header, map)
    }

    /// Ordered key/value pairs, duplicates preserved.
    ///
    /// Collectors iterate this instead of the maps when the output order
    /// should follow the file.
    pub fn pairs(&self) -> (Header, Vec<(&'a str, &'a str)>) {
        let mut pairs = Vec::new();
        let header = self.scan_pairs(|key, value| pairs.push((key, value)));
        (header, pairs)
    }

    fn scan_pairs(&self, mut on_pair: impl FnMut(&'a str, &'a str)) -> Header {
        let sep = self.sep.unwrap_or(" ");
        let mut lines = self.text.lines();
        let mut header = Vec::with_capacity(self.skip_rows);

        for _ in 0..self.skip_rows {
            match lines.next() {
                Some(line) => header.push(line.to_string()),
                None => return header,
            }
        }

        for line in lines {
            if let Some((key, value)) = line.split_once(sep) {
                on_pair(key.trim(), value.trim());
            }
        }

        header
    }
}

/// Parses a trimmed integer literal.
pub fn parse_int(text: &str) -> Result<i64, ParseError> {
    let trimmed = text.trim();
    trimmed
        .parse::<i64>()
        .map_err(|_| ParseError::InvalidInt(trimmed.to_string()))
}

/// Parses a trimmed float literal.
pub fn parse_float(text: &str) -> Result<f64, ParseError> {
    let trimmed = text.trim();
    trimmed
        .parse::<f64>()
        .map_err(|_| ParseError::InvalidFloat(trimmed.to_string()))
}

/// Splits on one-or-more whitespace after trimming.
pub fn split_whitespace_fields(text: &str) -> Vec<&str> {
    ProcText::new(text).fields()
}

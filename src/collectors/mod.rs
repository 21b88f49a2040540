//! Host collectors for kernel statistics.
//!
//! Each collector reads one family of `/proc` or `/sys` files through the
//! scrape's [`FileSystem`](crate::fs::FileSystem) and writes its samples to the
//! shared exposition writer. A collector that fails returns a
//! [`CollectError`]; the scrape logs it and moves on to the next one.

pub mod diskstats;
pub mod kernel;
pub mod meminfo;
pub mod net;
pub mod netdev;
pub mod stat;

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::exposition::{LabelSet, MetricKind};
use crate::nftables::RulesetError;
use crate::procfile::{parse_int, ParseError};
use crate::scrape::ScrapeContext;

#[derive(Debug, Error)]
pub enum CollectError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("unexpected content in {path}: {message}")]
    Format { path: PathBuf, message: String },

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("{call} failed: {source}")]
    Syscall {
        call: &'static str,
        #[source]
        source: nix::errno::Errno,
    },

    #[error(transparent)]
    Ruleset(#[from] RulesetError),
}

/// A single-integer kernel file and the gauge it feeds.
pub(crate) struct ScalarFile {
    pub rel: &'static str,
    pub metric: &'static str,
    pub help: &'static str,
}

/// Emits one gauge per readable file under the proc root. Fails only when
/// none of the files could be used.
pub(crate) fn emit_scalar_files(
    ctx: &mut ScrapeContext,
    files: &[ScalarFile],
) -> Result<(), CollectError> {
    let mut first_error = None;
    let mut emitted = 0;

    for file in files {
        let value = ctx
            .read_proc(file.rel)
            .and_then(|content| parse_int(&content).map_err(CollectError::from));
        match value {
            Ok(v) => {
                ctx.writer.declare(file.metric, MetricKind::Gauge, file.help);
                ctx.writer.emit(&LabelSet::new(), v);
                emitted += 1;
            }
            Err(e) => {
                first_error.get_or_insert(e);
            }
        }
    }

    match first_error {
        Some(e) if emitted == 0 => Err(e),
        _ => Ok(()),
    }
}

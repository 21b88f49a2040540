//! Cgroup v1 hierarchy walking.
//!
//! [`walk`] visits every directory under a subsystem root, treats each
//! directory containing the subsystem's marker file as one cgroup node, and
//! hands the node (relative path, resolved identity, marker content) to a
//! subsystem-specific callback. Unreadable directories and files are skipped so
//! that one inaccessible cgroup never hides its siblings.

pub mod blkio;
pub mod cpu;
pub mod memory;

use std::path::Path;
use tracing::{debug, trace};

use crate::exposition::LabelSet;
use crate::fs::FileSystem;
use crate::identity::{Correlator, Identity};
use crate::procfile::parse_int;

/// One control group discovered during a walk.
#[derive(Debug)]
pub struct CgroupNode<'a> {
    /// Absolute directory of the cgroup.
    pub dir: &'a Path,
    /// Path relative to the subsystem root, `/`-separated.
    pub relative: &'a str,
    pub identity: &'a Identity,
    /// Content of the marker file.
    pub content: &'a str,
}

impl CgroupNode<'_> {
    /// `cgroup="<relative>"` followed by the identity fragment.
    pub fn labels(&self) -> LabelSet {
        LabelSet::new()
            .with("cgroup", self.relative)
            .merged(&self.identity.labels)
    }
}

/// Walks `root` and calls `on_node` for every cgroup below it that carries a
/// file named `marker`. The root cgroup itself is skipped. Returns the number
/// of nodes visited.
pub fn walk<F>(
    fs: &dyn FileSystem,
    root: &Path,
    marker: &str,
    correlator: &Correlator,
    mut on_node: F,
) -> usize
where
    F: FnMut(&CgroupNode<'_>),
{
    let mut visited = 0;
    visit_dir(fs, root, root, marker, correlator, &mut on_node, &mut visited);
    debug!(root = %root.display(), marker, nodes = visited, "cgroup walk finished");
    visited
}

fn visit_dir<F>(
    fs: &dyn FileSystem,
    root: &Path,
    dir: &Path,
    marker: &str,
    correlator: &Correlator,
    on_node: &mut F,
    visited: &mut usize,
) where
    F: FnMut(&CgroupNode<'_>),
{
    let entries = match fs.read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            debug!(dir = %dir.display(), error = %e, "skipping unreadable cgroup directory");
            return;
        }
    };

    for entry in entries {
        if fs.is_dir(&entry) {
            visit_dir(fs, root, &entry, marker, correlator, on_node, visited);
            continue;
        }
        if entry.file_name().and_then(|n| n.to_str()) != Some(marker) {
            continue;
        }

        let relative = match dir.strip_prefix(root) {
            Ok(rel) => rel.to_string_lossy().into_owned(),
            Err(_) => continue,
        };
        if relative.is_empty() {
            continue;
        }

        let content = match fs.read_to_string(&entry) {
            Ok(content) => content,
            Err(e) => {
                debug!(file = %entry.display(), error = %e, "skipping unreadable marker file");
                continue;
            }
        };

        let identity = correlator.classify(&relative);
        trace!(cgroup = %relative, kind = %identity.kind(), "cgroup node");
        on_node(&CgroupNode {
            dir,
            relative: &relative,
            identity: &identity,
            content: &content,
        });
        *visited += 1;
    }
}

/// Reads a single-integer cgroup file; `None` when missing or unparseable.
pub(crate) fn read_int(fs: &dyn FileSystem, path: &Path) -> Option<i64> {
    let content = fs.read_to_string(path).ok()?;
    match parse_int(&content) {
        Ok(v) => Some(v),
        Err(e) => {
            debug!(file = %path.display(), error = %e, "unparseable cgroup value");
            None
        }
    }
}

//! # Segment File Naming
//!
//! A database owns one directory; every segment lives directly inside it.
//! Index segments are named `db<N>.hashdisk` and value segments
//! `db<N>.valuesdisk`, with `<N>` a decimal id assigned from 0. Anything
//! else in the directory (subdirectories, foreign files, names with extra
//! dots or non-digit ids) is ignored by the scan.

use std::fs;
use std::path::{Path, PathBuf};

use eyre::{Result, WrapErr};

/// Extension of index segment files.
pub const INDEX_EXTENSION: &str = "hashdisk";

/// Extension of value segment files.
pub const VALUES_EXTENSION: &str = "valuesdisk";

/// Which of the two segment kinds a file name matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    Index,
    Values,
}

/// File name of the index segment with the given id.
pub fn index_file_name(id: u32) -> String {
    format!("db{id}.{INDEX_EXTENSION}")
}

/// File name of the value segment with the given id.
pub fn values_file_name(id: u32) -> String {
    format!("db{id}.{VALUES_EXTENSION}")
}

/// Parses a segment file name, returning its kind and id.
///
/// Matches exactly `db<digits>.hashdisk` / `db<digits>.valuesdisk`; ids that
/// overflow u32 are rejected along with everything else.
pub fn parse_segment_file(name: &str) -> Option<(SegmentKind, u32)> {
    let rest = name.strip_prefix("db")?;
    let (digits, extension) = rest.split_once('.')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let id = digits.parse().ok()?;
    let kind = match extension {
        INDEX_EXTENSION => SegmentKind::Index,
        VALUES_EXTENSION => SegmentKind::Values,
        _ => return None,
    };
    Some((kind, id))
}

/// Segment files found in a database directory, sorted by id ascending.
#[derive(Debug, Default)]
pub struct SegmentFiles {
    pub index: Vec<(u32, PathBuf)>,
    pub values: Vec<(u32, PathBuf)>,
}

/// Lists the segment files directly inside `root`.
pub fn scan_segments(root: &Path) -> Result<SegmentFiles> {
    let entries = fs::read_dir(root)
        .wrap_err_with(|| format!("failed to list database directory '{}'", root.display()))?;

    let mut files = SegmentFiles::default();
    for entry in entries {
        let entry = entry
            .wrap_err_with(|| format!("failed to read entry in '{}'", root.display()))?;
        let file_type = entry
            .file_type()
            .wrap_err_with(|| format!("failed to stat '{}'", entry.path().display()))?;
        if file_type.is_dir() {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        match parse_segment_file(name) {
            Some((SegmentKind::Index, id)) => files.index.push((id, entry.path())),
            Some((SegmentKind::Values, id)) => files.values.push((id, entry.path())),
            None => continue,
        }
    }

    files.index.sort_unstable_by_key(|&(id, _)| id);
    files.values.sort_unstable_by_key(|&(id, _)| id);
    Ok(files)
}

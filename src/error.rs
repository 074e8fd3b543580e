//! # Error Kinds
//!
//! wormdb reports failures through `eyre::Result`, the same way every other
//! fallible path in the crate does. The kinds callers are expected to match
//! on (a lookup miss, an exhausted segment) are carried as
//! a typed [`StoreError`] inside the report and recovered with
//! [`StoreError::of`]. IO and mmap failures stay plain `eyre` reports with
//! operation context attached via `wrap_err`.
//!
//! ## Propagation Policy
//!
//! - `KeyNotFound` is ordinary control flow: lookups walk the index chain and
//!   continue past it.
//! - `NoSpace` is operational: the caller (or the write path itself) retries
//!   after rotation has installed a fresh segment.
//! - `Corrupted` and IO reports are fatal; the database should be closed.
//! - `InvalidKey` is a programmer error at the call site.

use thiserror::Error;

/// Failure kinds embedding callers can match on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The key is the all-zero vacant-slot sentinel, or not exactly
    /// `KEY_SIZE` bytes long.
    #[error("key is not valid")]
    InvalidKey,

    /// The key is absent from every index segment.
    #[error("key was not found in database")]
    KeyNotFound,

    /// The segment cannot accept the write: the index is at its load
    /// ceiling, or the value log is exhausted. Retry after rotation.
    #[error("segment is out of space")]
    NoSpace,

    /// The requested segment size cannot be addressed by 32-bit offsets.
    #[error("file size is too big (max 4Gb)")]
    FileTooBig,

    /// The database has been closed; no further operations are possible.
    #[error("database is closed")]
    Closed,

    /// A value segment's recovery scan ran past end-of-file without finding
    /// the end-of-log marker, or a frame points outside the segment.
    #[error("value segment is corrupted")]
    Corrupted,
}

impl StoreError {
    /// Extracts the typed kind from a report, if it carries one.
    pub fn of(report: &eyre::Report) -> Option<StoreError> {
        report.downcast_ref::<StoreError>().copied()
    }

    /// True when `report` carries exactly `kind`.
    pub fn is(report: &eyre::Report, kind: StoreError) -> bool {
        Self::of(report) == Some(kind)
    }
}

//! # Storage Module
//!
//! The file-backed layer of the store. Everything here is built on
//! memory-mapped I/O: segment files are mapped once at open, accessed as
//! plain byte slices, and flushed at close.
//!
//! ## Segment Types
//!
//! - [`IndexSegment`]: one open-addressed hash table file mapping a
//!   fixed-width key to a [`ValueRef`]
//! - [`ValueSegment`]: one append-only log file of varint-framed values with
//!   lock-free concurrent appends
//!
//! A database directory holds any number of each, named `db<N>.hashdisk`
//! and `db<N>.valuesdisk` (see [`paths`]). The database layer chains index
//! segments for lookups and keeps exactly one value segment write-active.
//!
//! ## Module Organization
//!
//! - `mmap`: fixed-size create-or-open mapped file (`SegmentFile`)
//! - `index`: the hash-table segment
//! - `values`: the value-log segment
//! - `paths`: segment file naming and directory scanning

mod index;
mod mmap;
pub mod paths;
mod values;

pub use index::IndexSegment;
pub use mmap::SegmentFile;
pub use values::{ValueSegment, ZERO_LEN_MARKER};

/// Location of a stored value: the id of the owning value segment and the
/// byte offset of its frame inside that segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueRef {
    pub segment: u32,
    pub offset: u32,
}

//! # Configuration Constants
//!
//! Centralizes the crate's fixed parameters. Several values depend on each
//! other; they are co-located here so a change to one can be checked against
//! the others instead of hunting through the storage modules.
//!
//! ## Dependency Graph
//!
//! ```text
//! KEY_SIZE (16 bytes)
//!       │
//!       └─> INDEX_ENTRY_SIZE (derived: KEY_SIZE + 8)
//!             16 key bytes + u32 LE value-segment id + u32 LE value offset.
//!             An index file is a packed array of these slots.
//!
//! MAX_INDEX_LOAD (0.8)
//!       │
//!       └─> INDEX_ROTATE_LOAD (0.7, must stay below MAX_INDEX_LOAD)
//!             Rotation has to install a fresh index segment before the
//!             active one starts rejecting inserts, otherwise every write
//!             between the ceiling and the next tick pays a retry.
//!
//! VALUES_ROTATE_LOAD (0.9)
//!       Value appends are variable-size, so the ceiling is the file end
//!       itself; 0.9 leaves one tick's worth of headroom.
//!
//! DEFAULT_ROTATION_TICK (2s)
//!       Wake interval of the rotation supervisor. Tests shorten it through
//!       `DatabaseBuilder::rotation_tick`.
//! ```
//!
//! ## Invariants
//!
//! - `INDEX_ENTRY_SIZE == KEY_SIZE + 8`, enforced below.
//! - `INDEX_ROTATE_LOAD < MAX_INDEX_LOAD`: the index `load()` ratio is
//!   measured against `max_occupied` (the 0.8 ceiling), so the rotation
//!   threshold fires while inserts still succeed.
//! - Segment sizes are `u32`: every on-disk offset fits 4 bytes, which is
//!   what the index slot layout stores.

use std::time::Duration;

/// Fixed key width. Keys are opaque byte strings of exactly this length;
/// the all-zero string is reserved as the vacant-slot sentinel.
pub const KEY_SIZE: usize = 16;

/// The reserved vacant-slot sentinel. Never a valid user key.
pub const EMPTY_KEY: [u8; KEY_SIZE] = [0u8; KEY_SIZE];

/// Byte width of one index slot: key bytes plus (segment id, offset) as
/// two little-endian u32 fields.
pub const INDEX_ENTRY_SIZE: u32 = KEY_SIZE as u32 + 8;

/// Fraction of an index segment's slots that may be occupied. Past this the
/// segment rejects inserts so linear probing always terminates at a vacancy.
pub const MAX_INDEX_LOAD: f64 = 0.8;

/// Index `load()` ratio above which the supervisor chains a new segment.
pub const INDEX_ROTATE_LOAD: f64 = 0.7;

/// Value-segment `load()` ratio above which the supervisor opens the next
/// value segment.
pub const VALUES_ROTATE_LOAD: f64 = 0.9;

/// Default wake interval of the background rotation supervisor.
pub const DEFAULT_ROTATION_TICK: Duration = Duration::from_secs(2);

/// Default size of each index and value segment file.
pub const DEFAULT_SEGMENT_SIZE: u32 = 256 << 20;

const _: () = assert!(INDEX_ENTRY_SIZE as usize == KEY_SIZE + 8);
const _: () = assert!((DEFAULT_SEGMENT_SIZE as u64) < u32::MAX as u64);

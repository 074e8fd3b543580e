//! # Database Builder
//!
//! Fluent configuration for opening a database. The two knobs are the
//! segment size (shared by index and value files) and the rotation
//! supervisor's wake interval, which tests shorten to keep rotation
//! scenarios fast and deterministic.
//!
//! ```ignore
//! use wormdb::Database;
//!
//! let db = Database::builder()
//!     .segment_size(128 << 20)
//!     .open("./mydb")?;
//! ```

use std::path::Path;
use std::time::Duration;

use eyre::Result;

use crate::config::{DEFAULT_ROTATION_TICK, DEFAULT_SEGMENT_SIZE};

use super::Database;

/// Builder for configuring and opening a database.
///
/// Use [`Database::builder`] to create one, chain configuration methods,
/// then call [`open`](DatabaseBuilder::open).
#[derive(Debug, Clone)]
pub struct DatabaseBuilder {
    pub(crate) segment_size: u32,
    pub(crate) rotation_tick: Duration,
}

impl Default for DatabaseBuilder {
    fn default() -> Self {
        Self {
            segment_size: DEFAULT_SEGMENT_SIZE,
            rotation_tick: DEFAULT_ROTATION_TICK,
        }
    }
}

impl DatabaseBuilder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Size in bytes of each index and value segment file. Existing files
    /// keep the size they were created with.
    pub fn segment_size(mut self, size: u32) -> Self {
        self.segment_size = size;
        self
    }

    /// Wake interval of the background rotation supervisor.
    pub fn rotation_tick(mut self, tick: Duration) -> Self {
        self.rotation_tick = tick;
        self
    }

    /// Opens (creating if necessary) the database rooted at `root`.
    pub fn open<P: AsRef<Path>>(self, root: P) -> Result<Database> {
        Database::open_with(root, self)
    }
}

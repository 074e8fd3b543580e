//! # wormdb - Write-Once Embedded Key-Value Store
//!
//! wormdb is an embedded, append-only key-value store for fixed-size keys
//! (16 bytes, typically content hashes) and small variable-size values.
//! Values are immutable once written: writing an existing key again is a
//! successful no-op. In exchange the engine gets a very
//! simple shape with no deletion and no compaction machinery, and reads
//! and writes that are mostly pointer arithmetic over memory-mapped files:
//!
//! - **Zero-copy lookups**: index probes and value frames are read straight
//!   out of the mappings
//! - **Lock-free value appends**: writers reserve disjoint log ranges with a
//!   single atomic fetch-add
//! - **Unbounded growth**: segments rotate before they saturate; old ones
//!   stay mapped read-only
//!
//! ## Quick Start
//!
//! ```ignore
//! use wormdb::Database;
//!
//! let db = Database::open("./mydb", 128 << 20)?;
//!
//! let key = [0x42u8; 16];
//! db.write(&key, b"hello")?;
//! assert_eq!(db.read(&key)?, b"hello");
//!
//! db.close()?;
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │          Public API (Database)          │
//! ├─────────────────────────────────────────┤
//! │  Index chain (newest → oldest lookup)   │  rotation
//! │  Value segment map (one write-active)   │◄─ supervisor
//! ├─────────────────────────────────────────┤
//! │ IndexSegment        │ ValueSegment      │
//! │ open-addressed hash │ varint-framed log │
//! ├─────────────────────────────────────────┤
//! │     Memory-mapped fixed-size files      │
//! └─────────────────────────────────────────┘
//! ```
//!
//! ## File Layout
//!
//! A database owns one directory; all state lives directly inside it:
//!
//! ```text
//! mydb/
//! ├── db0.hashdisk      # index segment 0 (oldest)
//! ├── db1.hashdisk      # index segment 1 (write-active)
//! ├── db0.valuesdisk    # value segment 0
//! └── db1.valuesdisk    # value segment 1 (write-active)
//! ```
//!
//! ## Durability
//!
//! Writes are not synced per operation; the mappings are flushed at
//! [`Database::close`]. A crash can lose recent writes, but on-disk state
//! stays consistent: reopening truncates the value log at the first zero
//! varint and the index is rebuilt slot by slot from deterministic offsets.
//!
//! ## Module Overview
//!
//! - [`database`]: the public `Database` API and rotation supervisor
//! - [`storage`]: mmap-backed index and value segments, file naming
//! - [`encoding`]: the varint framing used by the value log
//! - [`config`]: centralized constants (key width, load ceilings, tick)
//! - [`error`]: typed failure kinds carried through `eyre` reports

pub mod config;
pub mod database;
pub mod encoding;
pub mod error;
pub mod storage;

pub use config::KEY_SIZE;
pub use database::{Database, DatabaseBuilder};
pub use error::StoreError;
pub use storage::ValueRef;

//! # Database Module
//!
//! The public face of the store. A [`Database`] owns one directory of
//! segment files and routes every read and write:
//!
//! ```text
//! write(key, value)
//!     │
//!     ▼
//! ┌──────────────────────────────────────────────────┐
//! │ 1. LOOKUP: walk index chain newest → oldest      │
//! │    hit → done (write-once: first value wins)     │
//! └──────────────────────────────────────────────────┘
//!     │ miss
//!     ▼
//! ┌──────────────────────────────────────────────────┐
//! │ 2. APPEND: lock-free reserve + copy into the     │
//! │    active value segment → (segment id, offset)   │
//! └──────────────────────────────────────────────────┘
//!     │
//!     ▼
//! ┌──────────────────────────────────────────────────┐
//! │ 3. INSERT: bind key → ref in the active index    │
//! │    segment under its writer lock                 │
//! └──────────────────────────────────────────────────┘
//! ```
//!
//! Reads run the lookup and then fetch the frame from the identified value
//! segment under the segment map's shared lock.
//!
//! ## Rotation
//!
//! A background supervisor thread wakes every tick (default 2 s) and chains
//! a fresh index segment past 70% load or opens the next value segment past
//! 90%. Old segments stay mapped read-only for lookups. The write path also
//! rotates inline when it runs into `NoSpace`, so writes never have to wait
//! out a tick.
//!
//! ## Shutdown
//!
//! `close` signals the supervisor through a condvar, joins it, then closes
//! every segment while holding both exclusive locks (index chain first,
//! then value segments). After that all operations fail with `Closed`.

mod builder;
#[allow(clippy::module_inception)]
mod database;

pub use builder::DatabaseBuilder;
pub use database::Database;

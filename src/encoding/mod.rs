//! # Encoding Module
//!
//! Wire-level primitives shared by the storage layer. Currently this is just
//! the varint used to frame entries in the value log.
//!
//! - [`varint`]: little-endian base-128 unsigned varint, max 5 bytes for any
//!   32-bit value

pub mod varint;

pub use varint::{decode_varint, encode_varint, varint_len, MAX_VARINT_LEN32};

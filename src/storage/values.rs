//! # Value Segments
//!
//! One value segment is an append-only log of length-prefixed values over a
//! memory-mapped file. Entries are laid out back to back: a varint length,
//! then the raw value bytes. The file never grows; when the log reaches the
//! end of the file the segment reports `NoSpace` and rotation opens a new
//! one.
//!
//! ## Zero-Length Sentinel
//!
//! A zero-length value is framed with the length `u32::MAX` instead of 0,
//! so that a decoded length of 0 can only mean "nothing was ever written
//! here". That rule is what makes crash recovery a simple forward scan.
//!
//! ## Recovery
//!
//! Reopening always scans from offset 0, hopping frame to frame until the
//! first zero varint; that offset becomes the write index. A scan that
//! reaches end-of-file without finding the marker means the log was
//! overwritten or truncated badly, and fails with `Corrupted`.
//!
//! ## Concurrency
//!
//! `set` is lock-free: writers reserve disjoint byte ranges by atomically
//! advancing the write index, then copy into their reservation through a raw
//! pointer. Readers never touch the write index. Publication ordering is the
//! database's job: a value becomes reachable only through an index insert,
//! which happens under the index segment's writer lock after the copy has
//! completed.

use std::path::Path;
use std::ptr;
use std::slice;
use std::sync::atomic::{AtomicU32, Ordering};

use eyre::{bail, ensure, Result, WrapErr};

use crate::encoding::{decode_varint, encode_varint, MAX_VARINT_LEN32};
use crate::error::StoreError;

use super::mmap::SegmentFile;

/// Frame length announcing a zero-byte value.
pub const ZERO_LEN_MARKER: u64 = u32::MAX as u64;

/// A single append-only value log file.
#[derive(Debug)]
pub struct ValueSegment {
    id: u32,
    max_size: u32,
    write_index: AtomicU32,
    data: *mut u8,
    file: SegmentFile,
}

// SAFETY: `data` points into the mapping owned by `file`, which lives
// exactly as long as this struct and is never remapped. Concurrent `set`
// calls write disjoint ranges reserved through `write_index`; `get` reads
// frames that were published through an index insert, which happens-after
// the frame copy under the index segment's writer lock. The only racy reads
// are lookups with offsets that were never published, which return garbage
// bytes but never touch memory outside the mapping.
unsafe impl Send for ValueSegment {}
unsafe impl Sync for ValueSegment {}

impl ValueSegment {
    /// Creates the segment file at `size` bytes, or reopens an existing one
    /// at its on-disk size. The write index is always recovered by scanning;
    /// on a fresh file the scan terminates immediately at offset 0.
    pub fn open<P: AsRef<Path>>(path: P, size: u32, id: u32) -> Result<Self> {
        let path = path.as_ref();
        let mut file = SegmentFile::open(path, size)?;
        let max_size = file.len();

        let write_index = Self::recover_write_index(&file)
            .wrap_err_with(|| format!("failed to recover value segment '{}'", path.display()))?;
        tracing::debug!(segment = id, write_index, "opened value segment");

        let data = file.bytes_mut().as_mut_ptr();
        Ok(Self {
            id,
            max_size,
            write_index: AtomicU32::new(write_index),
            data,
            file,
        })
    }

    /// Walks the log frame by frame until the first zero varint.
    fn recover_write_index(file: &SegmentFile) -> Result<u32> {
        file.advise_sequential();
        let bytes = file.bytes();
        let max_size = u64::from(file.len());

        let mut index: u64 = 0;
        while index < max_size {
            let start = index as usize;
            let window_end = (start + MAX_VARINT_LEN32).min(max_size as usize);
            let Ok((frame_len, varint_len)) = decode_varint(&bytes[start..window_end]) else {
                bail!(StoreError::Corrupted);
            };
            if frame_len == 0 {
                return Ok(index as u32);
            }
            index += if frame_len == ZERO_LEN_MARKER {
                varint_len as u64
            } else {
                varint_len as u64 + frame_len
            };
        }
        bail!(StoreError::Corrupted)
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    /// Appends `value`, returning the offset it was written at.
    ///
    /// On exhaustion the write index is intentionally left past the end:
    /// the segment is finished and rotation will retire it.
    pub fn set(&self, value: &[u8]) -> Result<u32> {
        // A frame that cannot fit even an empty segment must not advance
        // the write index, or the u32 counter could be wrapped by retries.
        ensure!(
            value.len() as u64 + MAX_VARINT_LEN32 as u64 <= u64::from(self.max_size),
            StoreError::NoSpace
        );

        let mut frame = [0u8; MAX_VARINT_LEN32];
        let frame_len = if value.is_empty() {
            ZERO_LEN_MARKER
        } else {
            value.len() as u64
        };
        let varint_len = encode_varint(frame_len, &mut frame);
        let added = (varint_len + value.len()) as u32;

        let reserved = self.write_index.fetch_add(added, Ordering::Relaxed);
        let end = u64::from(reserved) + u64::from(added);
        if end >= u64::from(self.max_size) {
            bail!(StoreError::NoSpace);
        }

        // SAFETY: [reserved, reserved + added) is inside the mapping (end
        // was bounds-checked above) and no other writer can hold the same
        // reservation: fetch_add hands out disjoint ranges.
        unsafe {
            ptr::copy_nonoverlapping(frame.as_ptr(), self.data.add(reserved as usize), varint_len);
            if !value.is_empty() {
                ptr::copy_nonoverlapping(
                    value.as_ptr(),
                    self.data.add(reserved as usize + varint_len),
                    value.len(),
                );
            }
        }
        Ok(reserved)
    }

    /// Reads the value stored at `offset`.
    ///
    /// The offset is trusted to come from an index segment; an offset that
    /// points at a frame running past end-of-file reports `Corrupted`.
    pub fn get(&self, offset: u32) -> Result<Vec<u8>> {
        ensure!(offset < self.max_size, StoreError::NoSpace);

        let start = offset as usize;
        let window_end = (start + MAX_VARINT_LEN32).min(self.max_size as usize);
        // SAFETY: [start, window_end) is inside the mapping, which outlives
        // this call because &self keeps it alive.
        let window = unsafe { slice::from_raw_parts(self.data.add(start), window_end - start) };
        let (frame_len, varint_len) = decode_varint(window).wrap_err_with(|| {
            format!(
                "unreadable length prefix at offset {} in value segment {}",
                offset, self.id
            )
        })?;

        if frame_len == ZERO_LEN_MARKER {
            return Ok(Vec::new());
        }

        let data_start = u64::from(offset) + varint_len as u64;
        let data_end = data_start + frame_len;
        ensure!(data_end <= u64::from(self.max_size), StoreError::Corrupted);

        // SAFETY: [data_start, data_end) is inside the mapping per the
        // bounds check above.
        let data =
            unsafe { slice::from_raw_parts(self.data.add(data_start as usize), frame_len as usize) };
        Ok(data.to_vec())
    }

    /// Used bytes as a fraction of the file size. May exceed 1.0 after a
    /// failed append; rotation treats that as saturated.
    pub fn load(&self) -> f64 {
        f64::from(self.write_index.load(Ordering::Relaxed)) / f64::from(self.max_size)
    }

    /// Flushes and unmaps the segment. The durability point.
    pub fn close(self) -> Result<()> {
        self.file.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, RngCore};
    use tempfile::tempdir;

    const TEST_SIZE: u32 = 1 << 20;

    fn random_value(max_len: usize) -> Vec<u8> {
        let mut rng = rand::thread_rng();
        let mut value = vec![0u8; rng.gen_range(0..max_len)];
        rng.fill_bytes(&mut value);
        value
    }

    #[test]
    fn set_then_get_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.valuesdisk");
        let segment = ValueSegment::open(&path, TEST_SIZE, 0).unwrap();

        let mut values: Vec<Vec<u8>> = (0..100).map(|_| random_value(2000)).collect();
        values[55] = Vec::new();

        let offsets: Vec<u32> = values
            .iter()
            .map(|value| segment.set(value).unwrap())
            .collect();

        for (value, &offset) in values.iter().zip(&offsets) {
            assert_eq!(&segment.get(offset).unwrap(), value);
        }
    }

    #[test]
    fn zero_length_value_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.valuesdisk");
        let segment = ValueSegment::open(&path, TEST_SIZE, 0).unwrap();

        let offset = segment.set(&[]).unwrap();
        assert_eq!(segment.get(offset).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn reopen_recovers_data_and_keeps_appending() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.valuesdisk");
        let segment = ValueSegment::open(&path, TEST_SIZE, 0).unwrap();

        let mut values: Vec<Vec<u8>> = (0..100).map(|_| random_value(2000)).collect();
        values[55] = Vec::new();
        let offsets: Vec<u32> = values
            .iter()
            .map(|value| segment.set(value).unwrap())
            .collect();
        let load_before = segment.load();
        segment.close().unwrap();

        let segment = ValueSegment::open(&path, TEST_SIZE, 0).unwrap();
        assert_eq!(segment.load(), load_before);
        for (value, &offset) in values.iter().zip(&offsets) {
            assert_eq!(&segment.get(offset).unwrap(), value);
        }

        // The recovered write index lines up after the last frame, so new
        // appends land beyond everything already stored.
        let appended = segment.set(b"after reopen").unwrap();
        assert!(offsets.iter().all(|&offset| offset < appended));
        assert_eq!(segment.get(appended).unwrap(), b"after reopen");
    }

    #[test]
    fn exhausted_segment_reports_no_space() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.valuesdisk");
        let segment = ValueSegment::open(&path, 64, 0).unwrap();

        let err = segment.set(&[7u8; 128]).unwrap_err();
        assert_eq!(StoreError::of(&err), Some(StoreError::NoSpace));

        // Fill the segment with small frames until it runs out.
        let mut wrote = 0;
        loop {
            match segment.set(&[1u8; 10]) {
                Ok(_) => wrote += 1,
                Err(err) => {
                    assert_eq!(StoreError::of(&err), Some(StoreError::NoSpace));
                    break;
                }
            }
        }
        assert!(wrote > 0);
        assert!(segment.load() >= 1.0);
    }

    #[test]
    fn fresh_segment_load_is_zero() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.valuesdisk");
        let segment = ValueSegment::open(&path, TEST_SIZE, 0).unwrap();
        assert_eq!(segment.load(), 0.0);
    }

    #[test]
    fn get_past_end_reports_no_space() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.valuesdisk");
        let segment = ValueSegment::open(&path, TEST_SIZE, 0).unwrap();

        let err = segment.get(TEST_SIZE).unwrap_err();
        assert_eq!(StoreError::of(&err), Some(StoreError::NoSpace));
    }

    #[test]
    fn log_without_terminator_is_corrupted() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.valuesdisk");
        // Every byte has the continuation bit set: no zero varint anywhere.
        std::fs::write(&path, vec![0x81u8; 4096]).unwrap();

        let err = ValueSegment::open(&path, 4096, 0).unwrap_err();
        assert_eq!(StoreError::of(&err), Some(StoreError::Corrupted));
    }

    #[test]
    fn truncated_trailing_frame_is_corrupted() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.valuesdisk");
        // One frame claiming 100 bytes of payload in a 16-byte file.
        let mut bytes = vec![0u8; 16];
        encode_varint(100, &mut bytes);
        std::fs::write(&path, bytes).unwrap();

        let err = ValueSegment::open(&path, 16, 0).unwrap_err();
        assert_eq!(StoreError::of(&err), Some(StoreError::Corrupted));
    }
}

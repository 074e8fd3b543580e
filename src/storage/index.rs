//! # Index Segments
//!
//! One index segment is a single open-addressed hash table over a
//! memory-mapped file, mapping a fixed-width key to the [`ValueRef`] of its
//! stored value. The file is a packed array of 24-byte slots (16 key bytes,
//! u32 LE value-segment id, u32 LE value offset); an all-zero key marks a
//! vacant slot, which is why the all-zero key is forbidden as user input.
//!
//! ## Probing
//!
//! Linear probing from `xxh3(key) mod entries`. Occupancy is capped at 80%
//! of the slot count; past that ceiling `set` rejects with `NoSpace` while
//! lookups keep working. The ceiling is what makes the probe loops safe:
//! a vacant slot is always reachable, so neither `set` nor `get` can spin.
//!
//! ## Reopen
//!
//! The occupancy counter is not persisted. `open` restores it by scanning
//! the slot array and counting non-empty keys, so a reloaded segment keeps
//! an accurate load ceiling and rotation signal.
//!
//! ## Concurrency
//!
//! The segment carries no lock of its own: `set` takes `&mut self`, `get`
//! takes `&self`, and the database wraps each segment in a `RwLock`. The
//! borrow checker enforces the same discipline inside a single thread.

use std::path::Path;

use eyre::{bail, ensure, Result};
use twox_hash::xxh3;

use crate::config::{EMPTY_KEY, INDEX_ENTRY_SIZE, KEY_SIZE, MAX_INDEX_LOAD};
use crate::error::StoreError;

use super::mmap::SegmentFile;
use super::ValueRef;

/// A single open-addressed hash table file.
#[derive(Debug)]
pub struct IndexSegment {
    file: SegmentFile,
    entries: u32,
    max_occupied: u32,
    occupied: u32,
}

impl IndexSegment {
    /// Creates the segment file at `size` bytes, or reopens an existing one
    /// at its on-disk size. Reopening scans the slot array to restore the
    /// occupancy counter.
    pub fn open<P: AsRef<Path>>(path: P, size: u32) -> Result<Self> {
        let path = path.as_ref();
        let file = SegmentFile::open(path, size)?;

        let entries = file.len() / INDEX_ENTRY_SIZE;
        let max_occupied = (f64::from(entries) * MAX_INDEX_LOAD) as u32;
        ensure!(
            max_occupied > 0,
            "index segment '{}' is too small to hold any entries",
            path.display()
        );

        let mut segment = Self {
            file,
            entries,
            max_occupied,
            occupied: 0,
        };
        segment.occupied = segment.count_occupied();
        Ok(segment)
    }

    fn count_occupied(&self) -> u32 {
        self.file.advise_sequential();
        let bytes = self.file.bytes();
        let mut occupied = 0;
        for slot in 0..self.entries {
            let offset = slot as usize * INDEX_ENTRY_SIZE as usize;
            if bytes[offset..offset + KEY_SIZE] != EMPTY_KEY {
                occupied += 1;
            }
        }
        occupied
    }

    fn slot_for(&self, key: &[u8; KEY_SIZE]) -> u32 {
        (xxh3::hash64(key) % u64::from(self.entries)) as u32
    }

    fn slot_offset(&self, slot: u32) -> usize {
        slot as usize * INDEX_ENTRY_SIZE as usize
    }

    /// Binds `key` to `value`. A key already present is overwritten in place
    /// without growing occupancy; the database's pre-lookup normally keeps
    /// duplicates from ever reaching this point.
    pub fn set(&mut self, key: &[u8; KEY_SIZE], value: ValueRef) -> Result<()> {
        ensure!(key != &EMPTY_KEY, StoreError::InvalidKey);
        if self.occupied >= self.max_occupied {
            bail!(StoreError::NoSpace);
        }

        let mut slot = self.slot_for(key);
        let new_entry = loop {
            let offset = self.slot_offset(slot);
            let stored = &self.file.bytes()[offset..offset + KEY_SIZE];
            if stored == key {
                break false;
            }
            if stored == EMPTY_KEY {
                break true;
            }
            slot = (slot + 1) % self.entries;
        };

        let offset = self.slot_offset(slot);
        let bytes = self.file.bytes_mut();
        bytes[offset..offset + KEY_SIZE].copy_from_slice(key);
        bytes[offset + KEY_SIZE..offset + KEY_SIZE + 4]
            .copy_from_slice(&value.segment.to_le_bytes());
        bytes[offset + KEY_SIZE + 4..offset + KEY_SIZE + 8]
            .copy_from_slice(&value.offset.to_le_bytes());

        if new_entry {
            self.occupied += 1;
        }
        Ok(())
    }

    /// Looks up the [`ValueRef`] bound to `key`.
    pub fn get(&self, key: &[u8; KEY_SIZE]) -> Result<ValueRef> {
        ensure!(key != &EMPTY_KEY, StoreError::InvalidKey);

        let mut slot = self.slot_for(key);
        loop {
            let offset = self.slot_offset(slot);
            let bytes = self.file.bytes();
            let stored = &bytes[offset..offset + KEY_SIZE];
            if stored == key {
                let base = offset + KEY_SIZE;
                // INVARIANT: both 4-byte ranges are inside the slot.
                let segment = u32::from_le_bytes(bytes[base..base + 4].try_into().unwrap());
                let value_offset =
                    u32::from_le_bytes(bytes[base + 4..base + 8].try_into().unwrap());
                return Ok(ValueRef {
                    segment,
                    offset: value_offset,
                });
            }
            if stored == EMPTY_KEY {
                bail!(StoreError::KeyNotFound);
            }
            slot = (slot + 1) % self.entries;
        }
    }

    /// Occupancy as a fraction of the load ceiling (not of raw capacity).
    pub fn load(&self) -> f64 {
        f64::from(self.occupied) / f64::from(self.max_occupied)
    }

    /// Flushes and unmaps the segment. The durability point.
    pub fn close(self) -> Result<()> {
        self.file.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;
    use tempfile::tempdir;

    // Enough room for a few thousand entries.
    const TEST_SIZE: u32 = INDEX_ENTRY_SIZE * 4096;

    fn random_key() -> [u8; KEY_SIZE] {
        rand::thread_rng().gen()
    }

    #[test]
    fn set_then_get_returns_the_ref() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.hashdisk");
        let mut segment = IndexSegment::open(&path, TEST_SIZE).unwrap();

        for _ in 0..100 {
            let key = random_key();
            let value = ValueRef {
                segment: rand::thread_rng().gen(),
                offset: rand::thread_rng().gen(),
            };
            segment.set(&key, value).unwrap();
            assert_eq!(segment.get(&key).unwrap(), value);
        }
    }

    #[test]
    fn missing_key_is_not_found() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.hashdisk");
        let segment = IndexSegment::open(&path, TEST_SIZE).unwrap();

        let err = segment.get(&random_key()).unwrap_err();
        assert_eq!(StoreError::of(&err), Some(StoreError::KeyNotFound));
    }

    #[test]
    fn empty_key_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.hashdisk");
        let mut segment = IndexSegment::open(&path, TEST_SIZE).unwrap();

        let err = segment
            .set(&EMPTY_KEY, ValueRef { segment: 0, offset: 0 })
            .unwrap_err();
        assert_eq!(StoreError::of(&err), Some(StoreError::InvalidKey));

        let err = segment.get(&EMPTY_KEY).unwrap_err();
        assert_eq!(StoreError::of(&err), Some(StoreError::InvalidKey));
    }

    #[test]
    fn duplicate_set_overwrites_without_growing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.hashdisk");
        let mut segment = IndexSegment::open(&path, TEST_SIZE).unwrap();

        let key = random_key();
        segment.set(&key, ValueRef { segment: 1, offset: 10 }).unwrap();
        let load_after_first = segment.load();

        segment.set(&key, ValueRef { segment: 2, offset: 20 }).unwrap();
        assert_eq!(segment.load(), load_after_first);
        assert_eq!(
            segment.get(&key).unwrap(),
            ValueRef { segment: 2, offset: 20 }
        );
    }

    #[test]
    fn reopen_restores_entries_and_occupancy() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.hashdisk");
        let mut segment = IndexSegment::open(&path, TEST_SIZE).unwrap();

        let mut expected = Vec::new();
        for i in 0..100u32 {
            let key = random_key();
            let value = ValueRef { segment: i, offset: i + 3 };
            segment.set(&key, value).unwrap();
            expected.push((key, value));
        }
        let load_before = segment.load();
        segment.close().unwrap();

        let segment = IndexSegment::open(&path, TEST_SIZE).unwrap();
        assert_eq!(segment.load(), load_before);
        assert_eq!(segment.occupied, 100);
        for (key, value) in expected {
            assert_eq!(segment.get(&key).unwrap(), value);
        }
    }

    #[test]
    fn load_ceiling_rejects_further_inserts() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.hashdisk");
        // 10 slots, ceiling at 8.
        let mut segment = IndexSegment::open(&path, INDEX_ENTRY_SIZE * 10).unwrap();
        assert_eq!(segment.max_occupied, 8);

        let mut keys = Vec::new();
        for i in 0..8u32 {
            let key = random_key();
            segment.set(&key, ValueRef { segment: 0, offset: i }).unwrap();
            keys.push(key);
        }
        assert!(segment.load() >= 1.0);

        let err = segment
            .set(&random_key(), ValueRef { segment: 0, offset: 99 })
            .unwrap_err();
        assert_eq!(StoreError::of(&err), Some(StoreError::NoSpace));

        // Lookups still work at the ceiling.
        for (i, key) in keys.iter().enumerate() {
            assert_eq!(segment.get(key).unwrap().offset, i as u32);
        }
    }

    #[test]
    fn fresh_segment_load_is_zero() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.hashdisk");
        let segment = IndexSegment::open(&path, TEST_SIZE).unwrap();
        assert_eq!(segment.load(), 0.0);
    }

    #[test]
    fn too_small_file_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.hashdisk");
        assert!(IndexSegment::open(&path, INDEX_ENTRY_SIZE).is_err());
    }
}

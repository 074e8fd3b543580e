use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use eyre::{bail, ensure, Result, WrapErr};
use hashbrown::HashMap;
use parking_lot::{Condvar, Mutex, RwLock};

use crate::config::{EMPTY_KEY, INDEX_ROTATE_LOAD, KEY_SIZE, VALUES_ROTATE_LOAD};
use crate::error::StoreError;
use crate::storage::paths::{index_file_name, scan_segments, values_file_name};
use crate::storage::{IndexSegment, ValueRef, ValueSegment};

use super::builder::DatabaseBuilder;

/// An embedded, append-only, write-once key-value store.
///
/// Keys are exactly [`KEY_SIZE`] bytes and immutable once bound: writing an
/// existing key again succeeds without changing the stored value. Reads and
/// writes may be issued concurrently from any number of threads.
///
/// Dropping an open database performs a best-effort [`close`](Self::close).
#[derive(Debug)]
pub struct Database {
    shared: Arc<Shared>,
    supervisor: Mutex<Option<thread::JoinHandle<()>>>,
}

/// State shared between the public handle and the rotation supervisor.
#[derive(Debug)]
struct Shared {
    root: PathBuf,
    segment_size: u32,
    rotation_tick: Duration,
    /// Ordered oldest → newest; the last segment is write-active.
    index_chain: RwLock<Vec<RwLock<IndexSegment>>>,
    /// All mapped value segments by id; only `current_value_id` accepts
    /// appends.
    value_segments: RwLock<HashMap<u32, ValueSegment>>,
    current_value_id: AtomicU32,
    next_index_id: AtomicU32,
    /// Set under the mutex by `close`; the condvar wakes the supervisor so
    /// it exits without waiting out its tick.
    shutdown: Mutex<bool>,
    shutdown_signal: Condvar,
}

fn check_key(key: &[u8]) -> Result<&[u8; KEY_SIZE]> {
    let key: &[u8; KEY_SIZE] = key.try_into().map_err(|_| StoreError::InvalidKey)?;
    ensure!(key != &EMPTY_KEY, StoreError::InvalidKey);
    Ok(key)
}

impl Database {
    /// Opens (creating if necessary) the database rooted at `root`, with
    /// `segment_size`-byte segment files and the default rotation tick.
    pub fn open<P: AsRef<Path>>(root: P, segment_size: u32) -> Result<Database> {
        Self::builder().segment_size(segment_size).open(root)
    }

    /// Starts configuring a database open.
    pub fn builder() -> DatabaseBuilder {
        DatabaseBuilder::new()
    }

    pub(crate) fn open_with<P: AsRef<Path>>(root: P, options: DatabaseBuilder) -> Result<Database> {
        let root = root.as_ref().to_path_buf();
        ensure!(options.segment_size < u32::MAX, StoreError::FileTooBig);

        fs::create_dir_all(&root)
            .wrap_err_with(|| format!("failed to create database directory '{}'", root.display()))?;
        let files = scan_segments(&root)?;

        let mut chain = Vec::with_capacity(files.index.len().max(1));
        for (_, path) in &files.index {
            chain.push(RwLock::new(IndexSegment::open(path, options.segment_size)?));
        }
        if chain.is_empty() {
            let path = root.join(index_file_name(0));
            chain.push(RwLock::new(IndexSegment::open(path, options.segment_size)?));
        }
        let next_index_id = files.index.last().map_or(1, |&(id, _)| id + 1);

        let mut segments = HashMap::with_capacity(files.values.len().max(1));
        let mut current_value_id = 0;
        for (id, path) in &files.values {
            segments.insert(*id, ValueSegment::open(path, options.segment_size, *id)?);
            current_value_id = current_value_id.max(*id);
        }
        if segments.is_empty() {
            let path = root.join(values_file_name(0));
            segments.insert(0, ValueSegment::open(path, options.segment_size, 0)?);
        }

        let shared = Arc::new(Shared {
            root,
            segment_size: options.segment_size,
            rotation_tick: options.rotation_tick,
            index_chain: RwLock::new(chain),
            value_segments: RwLock::new(segments),
            current_value_id: AtomicU32::new(current_value_id),
            next_index_id: AtomicU32::new(next_index_id),
            shutdown: Mutex::new(false),
            shutdown_signal: Condvar::new(),
        });

        let supervisor = {
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name("wormdb-rotation".into())
                .spawn(move || shared.supervise())
                .wrap_err("failed to spawn rotation supervisor")?
        };

        Ok(Database {
            shared,
            supervisor: Mutex::new(Some(supervisor)),
        })
    }

    /// Returns the value stored under `key`.
    pub fn read(&self, key: &[u8]) -> Result<Vec<u8>> {
        self.shared.read(key)
    }

    /// Stores `value` under `key`. If the key already exists the call is a
    /// successful no-op and the first value remains bound.
    pub fn write(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.shared.write(key, value)
    }

    /// Runs one rotation pass immediately instead of waiting for the
    /// supervisor's next tick.
    pub fn rotate_now(&self) -> Result<()> {
        self.shared.rotate()
    }

    /// The directory this database lives in.
    pub fn root(&self) -> &Path {
        &self.shared.root
    }

    pub fn is_closed(&self) -> bool {
        *self.shared.shutdown.lock()
    }

    /// Stops the rotation supervisor, drains in-flight operations, and
    /// closes every segment. This is the durability point; operations after
    /// `close` fail with [`StoreError::Closed`].
    pub fn close(&self) -> Result<()> {
        {
            let mut stopped = self.shared.shutdown.lock();
            ensure!(!*stopped, StoreError::Closed);
            *stopped = true;
            self.shared.shutdown_signal.notify_all();
        }
        if let Some(handle) = self.supervisor.lock().take() {
            let _ = handle.join();
        }

        // Index chain first, then value segments: once both exclusive locks
        // are held no reader or writer is mid-operation.
        let mut chain = self.shared.index_chain.write();
        let mut segments = self.shared.value_segments.write();

        let mut first_error = None;
        for (_, segment) in segments.drain() {
            if let Err(report) = segment.close() {
                first_error.get_or_insert(report);
            }
        }
        for segment in chain.drain(..) {
            if let Err(report) = segment.into_inner().close() {
                first_error.get_or_insert(report);
            }
        }
        tracing::debug!(root = %self.shared.root.display(), "database closed");

        match first_error {
            Some(report) => Err(report),
            None => Ok(()),
        }
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        let open = { !*self.shared.shutdown.lock() };
        if open {
            let _ = self.close();
        }
    }
}

impl Shared {
    /// Body of the rotation supervisor thread: wake every tick, rotate, go
    /// back to sleep; exit as soon as `close` signals shutdown.
    fn supervise(&self) {
        let mut stopped = self.shutdown.lock();
        while !*stopped {
            let _ = self
                .shutdown_signal
                .wait_for(&mut stopped, self.rotation_tick);
            if *stopped {
                break;
            }
            drop(stopped);
            if let Err(report) = self.rotate() {
                tracing::warn!(error = %report, "rotation pass failed");
            }
            stopped = self.shutdown.lock();
        }
    }

    fn read(&self, key: &[u8]) -> Result<Vec<u8>> {
        let key = check_key(key)?;
        let value_ref = self.find_key(key)?;

        let segments = self.value_segments.read();
        ensure!(!segments.is_empty(), StoreError::Closed);
        let Some(segment) = segments.get(&value_ref.segment) else {
            bail!(
                "index entry points at unknown value segment {}",
                value_ref.segment
            );
        };
        segment.get(value_ref.offset)
    }

    fn write(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let key = check_key(key)?;

        // Write-once: a key that already resolves keeps its first value.
        match self.find_key(key) {
            Ok(_) => return Ok(()),
            Err(report) if StoreError::is(&report, StoreError::KeyNotFound) => {}
            Err(report) => return Err(report),
        }

        let value_ref = match self.append_value(value) {
            Ok(value_ref) => value_ref,
            Err(report) if StoreError::is(&report, StoreError::NoSpace) => {
                self.rotate()?;
                self.append_value(value)?
            }
            Err(report) => return Err(report),
        };

        match self.insert_key(key, value_ref) {
            Ok(()) => Ok(()),
            Err(report) if StoreError::is(&report, StoreError::NoSpace) => {
                self.rotate()?;
                self.insert_key(key, value_ref)
            }
            Err(report) => Err(report),
        }
    }

    /// Walks the index chain newest → oldest and returns the first hit.
    fn find_key(&self, key: &[u8; KEY_SIZE]) -> Result<ValueRef> {
        let chain = self.index_chain.read();
        ensure!(!chain.is_empty(), StoreError::Closed);
        for segment in chain.iter().rev() {
            match segment.read().get(key) {
                Ok(value_ref) => return Ok(value_ref),
                Err(report) if StoreError::is(&report, StoreError::KeyNotFound) => continue,
                Err(report) => return Err(report),
            }
        }
        bail!(StoreError::KeyNotFound)
    }

    fn append_value(&self, value: &[u8]) -> Result<ValueRef> {
        let segments = self.value_segments.read();
        ensure!(!segments.is_empty(), StoreError::Closed);
        let current = self.current_value_id.load(Ordering::Acquire);
        let Some(segment) = segments.get(&current) else {
            bail!("active value segment {current} is missing");
        };
        let offset = segment.set(value)?;
        Ok(ValueRef {
            segment: current,
            offset,
        })
    }

    fn insert_key(&self, key: &[u8; KEY_SIZE], value_ref: ValueRef) -> Result<()> {
        let chain = self.index_chain.read();
        let Some(active) = chain.last() else {
            bail!(StoreError::Closed);
        };
        let result = active.write().set(key, value_ref);
        result
    }

    fn rotate(&self) -> Result<()> {
        self.rotate_index()?;
        self.rotate_values()
    }

    /// Chains a fresh index segment when the active one passes the rotation
    /// threshold. The condition is re-checked under the exclusive lock so
    /// racing rotators (supervisor, write retries, `rotate_now`) cannot
    /// install the same id twice.
    fn rotate_index(&self) -> Result<()> {
        let load = {
            let chain = self.index_chain.read();
            match chain.last() {
                Some(active) => active.read().load(),
                None => return Ok(()),
            }
        };
        if load <= INDEX_ROTATE_LOAD {
            return Ok(());
        }

        let mut chain = self.index_chain.write();
        let Some(active) = chain.last() else {
            return Ok(());
        };
        let load = active.read().load();
        if load <= INDEX_ROTATE_LOAD {
            return Ok(());
        }

        let id = self.next_index_id.load(Ordering::Relaxed);
        let path = self.root.join(index_file_name(id));
        let segment = IndexSegment::open(&path, self.segment_size)?;
        chain.push(RwLock::new(segment));
        self.next_index_id.store(id + 1, Ordering::Relaxed);
        tracing::debug!(segment = id, load, "rotated index segment");
        Ok(())
    }

    /// Opens the next value segment when the active one passes the rotation
    /// threshold, and makes it current.
    fn rotate_values(&self) -> Result<()> {
        let (load, current) = {
            let segments = self.value_segments.read();
            let current = self.current_value_id.load(Ordering::Acquire);
            match segments.get(&current) {
                Some(active) => (active.load(), current),
                None => return Ok(()),
            }
        };
        if load <= VALUES_ROTATE_LOAD {
            return Ok(());
        }

        let mut segments = self.value_segments.write();
        if self.current_value_id.load(Ordering::Acquire) != current {
            // Another rotator already moved on.
            return Ok(());
        }

        let id = current + 1;
        let path = self.root.join(values_file_name(id));
        let segment = ValueSegment::open(&path, self.segment_size, id)?;
        segments.insert(id, segment);
        self.current_value_id.store(id, Ordering::Release);
        tracing::debug!(segment = id, load, "rotated value segment");
        Ok(())
    }
}

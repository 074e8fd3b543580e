//! # Memory-Mapped Segment Files
//!
//! `SegmentFile` is the low-level building block under both segment types:
//! a file of fixed size mapped read-write into the process address space.
//! Index segments treat the mapping as a packed slot array; value segments
//! treat it as a byte arena. Neither ever grows a file: when a segment
//! fills up, the database opens a new one next to it.
//!
//! ## Create-or-Open Semantics
//!
//! `open(path, size)` creates the file at `size` bytes when it does not
//! exist yet. When it does exist, the size on disk wins and the requested
//! size is ignored; segments keep the geometry they were created with.
//! Newly extended regions read as zeroes, which both formats rely on: an
//! all-zero key marks a vacant index slot, and a zero varint marks the end
//! of the value log.
//!
//! ## Durability
//!
//! No page is synced per write. `close` flushes the mapping and drops it;
//! that is the durability point. A crash may lose recent writes, but the
//! on-disk state stays consistent (see the value-log recovery scan).
//!
//! ## Safety Considerations
//!
//! The mapping is only valid while the `SegmentFile` is alive. Slices handed
//! out by `bytes`/`bytes_mut` borrow the struct, so the borrow checker keeps
//! them from outliving the mapping. The one place that steps outside this,
//! the value segment's lock-free append path, captures a raw pointer and
//! documents its own invariants.

use std::fs::{File, OpenOptions};
use std::path::Path;

use eyre::{ensure, Result, WrapErr};
use memmap2::MmapMut;

/// A fixed-size file mapped read-write.
#[derive(Debug)]
pub struct SegmentFile {
    file: File,
    mmap: MmapMut,
    len: u32,
}

impl SegmentFile {
    /// Creates the file at `size` bytes, or opens it at its on-disk size if
    /// it already exists.
    pub fn open<P: AsRef<Path>>(path: P, size: u32) -> Result<Self> {
        let path = path.as_ref();
        let existed = path.exists();

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)
            .wrap_err_with(|| format!("failed to open segment file '{}'", path.display()))?;

        if !existed {
            file.set_len(u64::from(size))
                .wrap_err_with(|| format!("failed to size '{}' to {} bytes", path.display(), size))?;
        }

        let metadata = file
            .metadata()
            .wrap_err_with(|| format!("failed to stat '{}'", path.display()))?;
        let file_size = metadata.len();

        ensure!(
            file_size > 0,
            "cannot map empty segment file '{}'",
            path.display()
        );
        ensure!(
            file_size <= u64::from(u32::MAX),
            "segment file '{}' is {} bytes, beyond 32-bit offsets",
            path.display(),
            file_size
        );

        // SAFETY: MmapMut::map_mut is unsafe because externally modified
        // mappings are undefined behavior. This is safe because:
        // 1. The database owns its directory; segment files are not shared
        //    with other processes while open.
        // 2. The mapping's lifetime is tied to SegmentFile, so it cannot be
        //    used after unmap.
        // 3. All access goes through bytes()/bytes_mut(), or through the
        //    value segment's pointer whose range discipline is documented
        //    at its definition.
        let mmap = unsafe {
            MmapMut::map_mut(&file)
                .wrap_err_with(|| format!("failed to memory-map '{}'", path.display()))?
        };

        Ok(Self {
            file,
            mmap,
            len: file_size as u32,
        })
    }

    pub fn len(&self) -> u32 {
        self.len
    }

    pub fn bytes(&self) -> &[u8] {
        &self.mmap
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.mmap
    }

    /// Tells the kernel the whole mapping is about to be read front to back.
    /// Used before the recovery and occupancy scans.
    pub fn advise_sequential(&self) {
        #[cfg(unix)]
        // SAFETY: madvise is a hint; the range is exactly the live mapping
        // (base pointer and full length), which stays valid for the duration
        // of the call because &self keeps the mapping alive.
        unsafe {
            libc::madvise(
                self.mmap.as_ptr() as *mut libc::c_void,
                self.len as usize,
                libc::MADV_SEQUENTIAL,
            );
        }
    }

    /// Flushes dirty pages, unmaps, and closes the file descriptor.
    pub fn close(self) -> Result<()> {
        self.mmap
            .flush()
            .wrap_err("failed to flush segment mmap to disk")?;
        drop(self.mmap);
        drop(self.file);
        Ok(())
    }
}

use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use log::{debug, warn};

use crate::config::StoreConfig;
use crate::error::{DeltaliteError, Result};
use crate::pagestore::page::Page;

/// Observability counters for one `Store` instance: `reads`/`writes`
/// plus a `reset`.
#[derive(Debug, Default)]
pub struct StoreStats {
    reads: AtomicU64,
    writes: AtomicU64,
}

impl StoreStats {
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.reads.store(0, Ordering::Relaxed);
        self.writes.store(0, Ordering::Relaxed);
    }
}

/// A random-access fixed-page file with explicit allocation.
///
/// Concurrency: a single `RwLock` serializes writers (`allocate_page`,
/// `write_page`) against each other and against all readers, but readers of
/// *different* pages run concurrently with each other under the read lock —
/// reads use `FileExt::read_at`, which takes `&File`, so a shared
/// `RwLockReadGuard` is enough; no `seek` is involved to race over.
pub struct Store {
    path: PathBuf,
    page_size: u64,
    data_fsync: bool,
    file: RwLock<File>,
    next_page_id: AtomicU64,
    pub stats: StoreStats,
}

impl Store {
    /// Open or create the page file at `path` with the default
    /// [`StoreConfig`] (4096-byte pages, fsync on).
    pub fn open(path: impl AsRef<Path>, page_size: u64) -> Result<Self> {
        Self::open_with_config(path, &StoreConfig::default().with_page_size(page_size))
    }

    /// Open or create the page file at `path`. Discovers the next free
    /// `PageId` as `file_len / page_size`; a file whose length is not an
    /// exact multiple of `page_size` is reported as a truncated/corrupt
    /// store rather than silently rounded.
    pub fn open_with_config(path: impl AsRef<Path>, config: &StoreConfig) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let page_size = config.page_size;
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&path)?;
        let file_len = file.metadata()?.len();
        if file_len % page_size != 0 {
            return Err(DeltaliteError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!(
                    "store file length {file_len} is not a multiple of page_size {page_size}"
                ),
            )));
        }
        let next_page_id = file_len / page_size;
        debug!(
            "opened page store {} (page_size={}, next_page_id={}, data_fsync={})",
            path.display(),
            page_size,
            next_page_id,
            config.data_fsync
        );
        Ok(Self {
            path,
            page_size,
            data_fsync: config.data_fsync,
            file: RwLock::new(file),
            next_page_id: AtomicU64::new(next_page_id),
            stats: StoreStats::default(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    pub fn allocated_pages(&self) -> u64 {
        self.next_page_id.load(Ordering::SeqCst)
    }

    /// Allocate a fresh zero-initialized page and return its id. Extends
    /// the file and flushes before returning, so a crash right after
    /// `allocate_page` never leaves a dangling id that reads as
    /// out-of-range one moment and in-range the next.
    pub fn allocate_page(&self) -> Result<u64> {
        let mut file = self.file.write().unwrap();
        let id = self.next_page_id.fetch_add(1, Ordering::SeqCst);
        let zeros = vec![0u8; self.page_size as usize];
        file.seek(SeekFrom::Start(id * self.page_size))?;
        file.write_all(&zeros)?;
        if self.data_fsync {
            file.sync_all()?;
        }
        self.stats.writes.fetch_add(1, Ordering::Relaxed);
        Ok(id)
    }

    /// Read exactly `page_size` bytes for `id`. Takes only the read lock:
    /// `read_at` is a positioned read against `&File`, so concurrent
    /// readers of different pages don't serialize against each other.
    pub fn read_page(&self, id: u64) -> Result<Page> {
        let allocated = self.next_page_id.load(Ordering::SeqCst);
        if id >= allocated {
            return Err(DeltaliteError::OutOfRange {
                page_id: id,
                allocated,
            });
        }
        let file = self.file.read().unwrap();
        let mut buf = vec![0u8; self.page_size as usize];
        file.read_exact_at(&mut buf, id * self.page_size)?;
        self.stats.reads.fetch_add(1, Ordering::Relaxed);
        Ok(Page::from_bytes(id, buf))
    }

    /// Write exactly `page_size` bytes for `page.id`, fsync'ing before
    /// returning when `data_fsync` is set.
    pub fn write_page(&self, page: &Page) -> Result<()> {
        if page.page_size() as u64 != self.page_size {
            return Err(DeltaliteError::CorruptPage {
                page_id: page.id,
                offset: 0,
                reason: format!(
                    "page buffer is {} bytes, store page_size is {}",
                    page.page_size(),
                    self.page_size
                ),
            });
        }
        let allocated = self.next_page_id.load(Ordering::SeqCst);
        if page.id >= allocated {
            warn!(
                "write_page({}) targets an id beyond next_page_id={}; allocate_page first",
                page.id, allocated
            );
            return Err(DeltaliteError::OutOfRange {
                page_id: page.id,
                allocated,
            });
        }
        let file = self.file.write().unwrap();
        file.write_all_at(page.bytes(), page.id * self.page_size)?;
        if self.data_fsync {
            file.sync_all()?;
        }
        self.stats.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_read_write_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("store.page"), 256).unwrap();
        let id = store.allocate_page().unwrap();
        assert_eq!(id, 0);

        let mut page = store.read_page(id).unwrap();
        page.set_next_page_id(7);
        store.write_page(&page).unwrap();

        let back = store.read_page(id).unwrap();
        assert_eq!(back.next_page_id(), 7);
        assert_eq!(store.stats.reads(), 2);
        assert_eq!(store.stats.writes(), 2); // allocate_page + write_page
    }

    #[test]
    fn read_out_of_range_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("s.page"), 256).unwrap();
        let err = store.read_page(3).unwrap_err();
        assert!(matches!(err, DeltaliteError::OutOfRange { page_id: 3, .. }));
    }

    #[test]
    fn reopen_recovers_next_page_id() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s.page");
        {
            let store = Store::open(&path, 256).unwrap();
            store.allocate_page().unwrap();
            store.allocate_page().unwrap();
        }
        let store = Store::open(&path, 256).unwrap();
        assert_eq!(store.allocated_pages(), 2);
    }
}

//! btree/tree — the `BTree` struct: open, point read, upsert-only write,
//! and root-pointer persistence across reopens.
//!
//! Page 0 is the tree's root upon initialization, but once it splits and a
//! new page becomes the root, that new root id has to live somewhere. A
//! flat page file has no spare page 0 slot to store it in (page 0 is a
//! real LEAF/BRANCH page, not a header), so the root id is tracked in a
//! tiny sidecar file next to the page file (`<path>.root`, 8 bytes LE),
//! updated only when the root itself splits.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use byteorder::{ByteOrder, LittleEndian};
use log::debug;

use crate::btree::scan::ScanCursor;
use crate::btree::split::{split_branch, split_leaf, SplitResult};
use crate::error::{DeltaliteError, Result};
use crate::page::Element;
use crate::pagestore::Store;

fn root_sidecar_path(store_path: &Path) -> PathBuf {
    let mut os = store_path.as_os_str().to_owned();
    os.push(".root");
    PathBuf::from(os)
}

fn read_root_sidecar(path: &Path) -> Result<Option<u64>> {
    if !path.exists() {
        return Ok(None);
    }
    let bytes = fs::read(path)?;
    if bytes.len() != 8 {
        return Err(DeltaliteError::CorruptPage {
            page_id: 0,
            offset: 0,
            reason: format!("root sidecar file {} is not 8 bytes", path.display()),
        });
    }
    Ok(Some(LittleEndian::read_u64(&bytes)))
}

fn write_root_sidecar(path: &Path, root_id: u64) -> Result<()> {
    let mut buf = [0u8; 8];
    LittleEndian::write_u64(&mut buf, root_id);
    let tmp = path.with_extension("root.tmp");
    fs::write(&tmp, buf)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// An ordered byte-key B+Tree on top of a `pagestore::Store`.
///
/// Delete is not implemented: rebalancing semantics for removal are left
/// open, and this crate resolves that by surfacing
/// `DeltaliteError::NotSupported` rather than guessing at them.
pub struct BTree {
    store: Arc<Store>,
    root_sidecar: PathBuf,
    root_id: AtomicU64,
    root_lock: Mutex<()>,
}

impl BTree {
    /// Open (creating if needed) a tree backed by `store`. Page 0 is
    /// allocated and initialized as an empty leaf the first time the
    /// underlying store is created; every later open recovers the current
    /// root id from the sidecar file, defaulting to 0.
    pub fn open(store: Arc<Store>) -> Result<Self> {
        let root_sidecar = root_sidecar_path(store.path());
        if store.allocated_pages() == 0 {
            let id = store.allocate_page()?;
            debug_assert_eq!(id, 0, "first page allocated by a fresh store must be id 0");
            let leaf = crate::pagestore::Page::new_leaf(0, store.page_size() as usize);
            store.write_page(&leaf)?;
        }
        let root_id = read_root_sidecar(&root_sidecar)?.unwrap_or(0);
        debug!("opened btree over {} (root={})", store.path().display(), root_id);
        Ok(Self {
            store,
            root_sidecar,
            root_id: AtomicU64::new(root_id),
            root_lock: Mutex::new(()),
        })
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn root_id(&self) -> u64 {
        self.root_id.load(Ordering::SeqCst)
    }

    /// Return the index of the last element whose key is <= `key`, treating
    /// an empty key (used only on branch pages) as -infinity. Branch pages
    /// always carry a leading empty-key element, so this never returns an
    /// out-of-bounds "no child" result for a well-formed branch.
    fn select_child_index(elements: &[Element], key: &[u8]) -> usize {
        match elements.binary_search_by(|e| e.key.as_slice().cmp(key)) {
            Ok(i) => {
                // Land on the *last* element equal to key, then walk forward
                // to the start of the run so callers see a stable index
                // regardless of how many duplicates share this key.
                let mut i = i;
                while i + 1 < elements.len() && elements[i + 1].key == key {
                    i += 1;
                }
                i
            }
            Err(insert_at) => insert_at.saturating_sub(1),
        }
    }

    /// Point read: first matching value for `key`, or `None`.
    pub fn read(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let mut page_id = self.root_id();
        loop {
            let page = self.store.read_page(page_id)?;
            let elements = page.elements()?;
            if page.is_leaf() {
                for el in &elements {
                    if el.key == key {
                        if el.has_overflow {
                            return Err(DeltaliteError::NotSupported {
                                what: "overflow-chain value assembly".into(),
                            });
                        }
                        return Ok(Some(el.value.clone()));
                    }
                }
                return Ok(None);
            }
            if elements.is_empty() {
                return Ok(None);
            }
            let idx = Self::select_child_index(&elements, key);
            page_id = LittleEndian::read_u64(&elements[idx].value);
        }
    }

    /// Upsert `key -> value`. Always appends after any existing equal key
    /// on a leaf, so `read` (first match) keeps returning the oldest write
    /// for a given key until overflow/duplicate semantics are specified.
    pub fn write(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let _guard = self.root_lock.lock().unwrap();
        let root = self.root_id();
        if let Some(split) = self.insert_into(root, key, value)? {
            self.promote_root(root, split)?;
        }
        Ok(())
    }

    fn promote_root(&self, old_root: u64, split: SplitResult) -> Result<()> {
        let new_root_id = self.store.allocate_page()?;
        let mut new_root = crate::pagestore::Page::new_branch(new_root_id, self.store.page_size() as usize);
        let mut left_ptr = [0u8; 8];
        LittleEndian::write_u64(&mut left_ptr, old_root);
        let mut right_ptr = [0u8; 8];
        LittleEndian::write_u64(&mut right_ptr, split.right_id);
        new_root.write_elements(&[
            Element::inline(Vec::new(), left_ptr.to_vec()),
            Element::inline(split.separator.clone(), right_ptr.to_vec()),
        ])?;
        self.store.write_page(&new_root)?;
        write_root_sidecar(&self.root_sidecar, new_root_id)?;
        self.root_id.store(new_root_id, Ordering::SeqCst);
        debug!(
            "root split: old_root={old_root} right={} new_root={new_root_id}",
            split.right_id
        );
        Ok(())
    }

    /// Recursively insert into the subtree rooted at `page_id`. Returns
    /// `Some(split)` when this page overflowed and split, leaving the
    /// caller responsible for inserting `(split.separator, split.right_id)`
    /// into its own page (or, at the root, building a new root).
    fn insert_into(&self, page_id: u64, key: &[u8], value: &[u8]) -> Result<Option<SplitResult>> {
        let mut page = self.store.read_page(page_id)?;
        let elements = page.elements()?;

        if page.is_leaf() {
            let new_el = Element::inline(key.to_vec(), value.to_vec());
            let insert_at = elements.partition_point(|e| e.key.as_slice() <= key);
            let mut all = elements;
            all.insert(insert_at, new_el);

            if self.fits(&all, page.page_size()) {
                page.write_elements(&all)?;
                self.store.write_page(&page)?;
                return Ok(None);
            }
            return Ok(Some(split_leaf(&self.store, &mut page, all)?));
        }

        // Branch: descend, then splice in a promoted child if our child split.
        let idx = Self::select_child_index(&elements, key);
        let child_id = LittleEndian::read_u64(&elements[idx].value);
        let child_split = self.insert_into(child_id, key, value)?;

        let Some(child_split) = child_split else {
            return Ok(None);
        };

        let mut right_ptr = [0u8; 8];
        LittleEndian::write_u64(&mut right_ptr, child_split.right_id);
        let new_el = Element::inline(child_split.separator, right_ptr.to_vec());
        let mut all = elements;
        all.insert(idx + 1, new_el);

        if self.fits(&all, page.page_size()) {
            page.write_elements(&all)?;
            self.store.write_page(&page)?;
            return Ok(None);
        }
        Ok(Some(split_branch(&self.store, &mut page, all)?))
    }

    fn fits(&self, elements: &[Element], page_size: usize) -> bool {
        let used: usize = elements.iter().map(Element::encoded_len).sum();
        used + crate::page::HEADER_LEN <= page_size
    }

    /// Rebalancing on removal is left open; this tree does not implement
    /// it and reports so explicitly rather than approximating it.
    pub fn delete(&self, _key: &[u8]) -> Result<()> {
        Err(DeltaliteError::NotSupported {
            what: "delete".into(),
        })
    }

    /// Inclusive/exclusive byte-range scan over `[start, end)`, following
    /// the leaf sibling chain. `start: None` starts at the leftmost leaf;
    /// `end: None` runs to the end of the chain.
    pub fn scan(&self, start: Option<&[u8]>, end: Option<&[u8]>) -> Result<ScanCursor<'_>> {
        self.scan_with_projection(start, end, None)
    }

    /// Range scan restricted to a subset of value fields. `fields: None`
    /// returns the full value, matching `scan`; `Some(fields)` deserializes
    /// each leaf value and keeps only the named fields, leaving the scan
    /// key itself untouched.
    pub fn scan_with_projection(
        &self,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
        fields: Option<&[String]>,
    ) -> Result<ScanCursor<'_>> {
        let descend_key = start.unwrap_or(&[]);
        let mut page_id = self.root_id();
        loop {
            let page = self.store.read_page(page_id)?;
            if page.is_leaf() {
                return Ok(ScanCursor::new(
                    &self.store,
                    page_id,
                    start.map(|s| s.to_vec()),
                    end.map(|e| e.to_vec()),
                    fields.map(|f| f.to_vec()),
                ));
            }
            let elements = page.elements()?;
            if elements.is_empty() {
                return Ok(ScanCursor::empty());
            }
            let idx = Self::select_child_index(&elements, descend_key);
            page_id = LittleEndian::read_u64(&elements[idx].value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn open_tree(page_size: u64) -> (tempfile::TempDir, BTree) {
        let dir = tempdir().unwrap();
        let store = Arc::new(Store::open(dir.path().join("t.page"), page_size).unwrap());
        let tree = BTree::open(store).unwrap();
        (dir, tree)
    }

    #[test]
    fn write_then_read_single_page() {
        let (_dir, tree) = open_tree(256);
        tree.write(b"a", b"1").unwrap();
        tree.write(b"b", b"2").unwrap();
        assert_eq!(tree.read(b"a").unwrap(), Some(b"1".to_vec()));
        assert_eq!(tree.read(b"b").unwrap(), Some(b"2".to_vec()));
        assert_eq!(tree.read(b"missing").unwrap(), None);
    }

    #[test]
    fn enough_writes_force_a_root_split() {
        let (_dir, tree) = open_tree(128);
        for i in 0..40u32 {
            let key = format!("key-{i:04}");
            tree.write(key.as_bytes(), b"value").unwrap();
        }
        assert_ne!(tree.root_id(), 0, "root should have split at least once");
        for i in 0..40u32 {
            let key = format!("key-{i:04}");
            assert_eq!(
                tree.read(key.as_bytes()).unwrap(),
                Some(b"value".to_vec()),
                "lost key {key}"
            );
        }
    }

    #[test]
    fn reopen_recovers_root_after_split() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.page");
        {
            let store = Arc::new(Store::open(&path, 128).unwrap());
            let tree = BTree::open(store).unwrap();
            for i in 0..40u32 {
                let key = format!("key-{i:04}");
                tree.write(key.as_bytes(), b"value").unwrap();
            }
        }
        let store = Arc::new(Store::open(&path, 128).unwrap());
        let tree = BTree::open(store).unwrap();
        assert_ne!(tree.root_id(), 0);
        assert_eq!(tree.read(b"key-0005").unwrap(), Some(b"value".to_vec()));
    }

    #[test]
    fn delete_is_not_supported() {
        let (_dir, tree) = open_tree(256);
        let err = tree.delete(b"a").unwrap_err();
        assert!(matches!(err, DeltaliteError::NotSupported { .. }));
    }
}

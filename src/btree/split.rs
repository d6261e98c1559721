//! btree/split — the leaf and branch split algorithms.

use byteorder::{ByteOrder, LittleEndian};

use crate::error::Result;
use crate::page::{Element, NO_SIBLING};
use crate::pagestore::{Page, Store};

pub fn encode_page_id(id: u64) -> Vec<u8> {
    let mut buf = [0u8; 8];
    LittleEndian::write_u64(&mut buf, id);
    buf.to_vec()
}

pub fn decode_page_id(bytes: &[u8]) -> u64 {
    LittleEndian::read_u64(bytes)
}

/// Outcome of inserting into a page: either it fit, or the page split and
/// the caller must insert `(separator, right_id)` into the parent.
pub struct SplitResult {
    pub left_id: u64,
    pub right_id: u64,
    pub separator: Vec<u8>,
}

/// Split a full LEAF page. `all` is every existing element plus the new
/// one, already in sorted order. Preserves the sibling chain (I4):
/// `right.next = left.next` (the page's old sibling), then
/// `left.next = right.id`.
pub fn split_leaf(store: &Store, page: &mut Page, all: Vec<Element>) -> Result<SplitResult> {
    let mid = all.len() / 2;
    let (left_elems, right_elems) = all.split_at(mid);
    let separator = right_elems[0].key.clone();

    let right_id = store.allocate_page()?;
    let old_sibling = page.next_page_id();

    let mut right_page = Page::new_leaf(right_id, store.page_size() as usize);
    right_page.set_next_page_id(old_sibling);
    right_page.write_elements(right_elems)?;
    store.write_page(&right_page)?;

    page.set_next_page_id(right_id);
    page.write_elements(left_elems)?;
    store.write_page(page)?;

    Ok(SplitResult {
        left_id: page.id,
        right_id,
        separator,
    })
}

/// Split a full BRANCH page. The median element is promoted to the
/// grandparent rather than stored in either half: its child pointer
/// becomes the right page's new leftmost (empty-key) entry, and its key
/// becomes the separator handed up.
pub fn split_branch(store: &Store, page: &mut Page, all: Vec<Element>) -> Result<SplitResult> {
    let mid = all.len() / 2;
    let left_elems = &all[..mid];
    let median = &all[mid];
    let right_rest = &all[mid + 1..];

    let separator = median.key.clone();
    let mut right_elems = Vec::with_capacity(1 + right_rest.len());
    right_elems.push(Element::inline(Vec::new(), median.value.clone()));
    right_elems.extend_from_slice(right_rest);

    let right_id = store.allocate_page()?;
    let mut right_page = Page::new_branch(right_id, store.page_size() as usize);
    right_page.set_next_page_id(NO_SIBLING);
    right_page.write_elements(&right_elems)?;
    store.write_page(&right_page)?;

    page.write_elements(left_elems)?;
    store.write_page(page)?;

    Ok(SplitResult {
        left_id: page.id,
        right_id,
        separator,
    })
}

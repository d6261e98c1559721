use crate::error::{DeltaliteError, Result};
use crate::page::{decode_elements, encode_elements, Element, PageHeader, HEADER_LEN};

/// A page's bytes plus its identity, held in memory while an operation works
/// on it. `Store::read_page`/`write_page` move `Page`s in and out of the
/// file; everything else (free-space accounting, element layout) is pure
/// byte manipulation so it can be exercised without a `Store` in unit tests.
#[derive(Debug, Clone)]
pub struct Page {
    pub id: u64,
    buf: Vec<u8>,
}

impl Page {
    pub fn zeroed(id: u64, page_size: usize) -> Self {
        Self {
            id,
            buf: vec![0u8; page_size],
        }
    }

    pub fn new_leaf(id: u64, page_size: usize) -> Self {
        let mut p = Self::zeroed(id, page_size);
        PageHeader::new_leaf().write(&mut p.buf);
        p
    }

    pub fn new_branch(id: u64, page_size: usize) -> Self {
        let mut p = Self::zeroed(id, page_size);
        PageHeader::new_branch().write(&mut p.buf);
        p
    }

    pub fn from_bytes(id: u64, buf: Vec<u8>) -> Self {
        Self { id, buf }
    }

    pub fn page_size(&self) -> usize {
        self.buf.len()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn header(&self) -> PageHeader {
        PageHeader::read(&self.buf)
    }

    pub fn is_leaf(&self) -> bool {
        self.header().is_leaf()
    }

    pub fn is_branch(&self) -> bool {
        self.header().is_branch()
    }

    pub fn next_page_id(&self) -> u64 {
        self.header().next_page_id
    }

    pub fn set_next_page_id(&mut self, next: u64) {
        let mut hdr = self.header();
        hdr.next_page_id = next;
        hdr.write(&mut self.buf);
    }

    /// Decode every element currently stored on this page. `count` is
    /// trusted to match the number actually present, enforced by
    /// `decode_elements`' defensive bounds checks.
    pub fn elements(&self) -> Result<Vec<Element>> {
        let hdr = self.header();
        decode_elements(&self.buf[HEADER_LEN..], hdr.count, self.id)
    }

    /// Bytes available for more elements. A corrupt element stream reports
    /// 0 free bytes directly, rather than deriving it from a used-bytes
    /// figure that is *also* 0 on corruption (which would otherwise read
    /// as "the whole page is free" and invite an overwrite instead of a
    /// split).
    pub fn free_space(&self) -> usize {
        let hdr = self.header();
        let used = match decode_elements(&self.buf[HEADER_LEN..], hdr.count, self.id) {
            Ok(elements) => elements.iter().map(Element::encoded_len).sum(),
            Err(_) => return 0,
        };
        self.buf.len().saturating_sub(HEADER_LEN).saturating_sub(used)
    }

    /// Rewrite this page's element region from scratch with `elements`
    /// (already sorted by key), preserving flags and `next_page_id`.
    pub fn write_elements(&mut self, elements: &[Element]) -> Result<()> {
        let encoded = encode_elements(elements)?;
        if HEADER_LEN + encoded.len() > self.buf.len() {
            return Err(DeltaliteError::CorruptPage {
                page_id: self.id,
                offset: HEADER_LEN,
                reason: "elements do not fit on page".into(),
            });
        }
        let mut hdr = self.header();
        hdr.count = elements.len() as u32;
        hdr.write(&mut self.buf);

        let body = &mut self.buf[HEADER_LEN..];
        body[..encoded.len()].copy_from_slice(&encoded);
        for b in &mut body[encoded.len()..] {
            *b = 0;
        }
        Ok(())
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_leaf_has_no_elements() {
        let page = Page::new_leaf(0, 256);
        assert!(page.is_leaf());
        assert_eq!(page.elements().unwrap().len(), 0);
        assert_eq!(page.free_space(), 256 - HEADER_LEN);
    }

    #[test]
    fn write_and_read_back_elements() {
        let mut page = Page::new_leaf(1, 256);
        let elements = vec![
            Element::inline(b"a".to_vec(), b"1".to_vec()),
            Element::inline(b"b".to_vec(), b"2".to_vec()),
        ];
        page.write_elements(&elements).unwrap();
        assert_eq!(page.elements().unwrap(), elements);
    }
}

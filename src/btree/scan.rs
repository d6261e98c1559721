//! btree/scan — range iteration over the leaf sibling chain.

use crate::error::Result;
use crate::page::Element;
use crate::pagestore::Store;
use crate::value;

/// A forward cursor over `[start, end)` that walks leaf pages via
/// `next_page_id` rather than re-descending from the root for each page,
/// the way a B+Tree range scan is supposed to behave.
pub struct ScanCursor<'a> {
    store: Option<&'a Store>,
    current_page: Option<u64>,
    buffer: std::vec::IntoIter<Element>,
    start: Option<Vec<u8>>,
    end: Option<Vec<u8>>,
    projection: Option<Vec<String>>,
    done: bool,
}

impl<'a> ScanCursor<'a> {
    pub(crate) fn new(
        store: &'a Store,
        first_leaf: u64,
        start: Option<Vec<u8>>,
        end: Option<Vec<u8>>,
        projection: Option<Vec<String>>,
    ) -> Self {
        Self {
            store: Some(store),
            current_page: Some(first_leaf),
            buffer: Vec::new().into_iter(),
            start,
            end,
            projection,
            done: false,
        }
    }

    pub(crate) fn empty() -> Self {
        Self {
            store: None,
            current_page: None,
            buffer: Vec::new().into_iter(),
            start: None,
            end: None,
            projection: None,
            done: true,
        }
    }

    fn load_next_page(&mut self) -> Result<bool> {
        loop {
            let Some(page_id) = self.current_page else {
                return Ok(false);
            };
            let store = self.store.expect("store present whenever current_page is");
            let page = store.read_page(page_id)?;
            let elements = page.elements()?;
            // Keys are globally sorted across the sibling chain, so the
            // first element past `end` on this page means every later page
            // is past it too; stop following the chain right here instead
            // of reading pages we'll discard anyway.
            let past_end = match &self.end {
                Some(end) => elements.iter().any(|e| e.key.as_slice() >= end.as_slice()),
                None => false,
            };
            self.current_page = if past_end {
                None
            } else {
                let next = page.next_page_id();
                if next == crate::page::NO_SIBLING {
                    None
                } else {
                    Some(next)
                }
            };
            let filtered: Vec<Element> = elements
                .into_iter()
                .filter(|e| self.in_range(&e.key))
                .collect();
            if !filtered.is_empty() || self.current_page.is_some() {
                self.buffer = filtered.into_iter();
                return Ok(true);
            }
        }
    }

    fn in_range(&self, key: &[u8]) -> bool {
        if let Some(start) = &self.start {
            if key < start.as_slice() {
                return false;
            }
        }
        if let Some(end) = &self.end {
            if key >= end.as_slice() {
                return false;
            }
        }
        true
    }

    /// Eagerly collect the remaining items into a `Vec`, the simpler entry
    /// point for callers (and tests) that don't need streaming.
    pub fn collect_all(mut self) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut out = Vec::new();
        while let Some(item) = self.next_item()? {
            out.push(item);
        }
        Ok(out)
    }

    fn next_item(&mut self) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        if self.done {
            return Ok(None);
        }
        loop {
            if let Some(el) = self.buffer.next() {
                // Once we cross past `end`, every later key on every later
                // page (keys are globally sorted) is also past it.
                if let Some(end) = &self.end {
                    if el.key.as_slice() >= end.as_slice() {
                        self.done = true;
                        return Ok(None);
                    }
                }
                let value = self.project(&el.value)?;
                return Ok(Some((el.key, value)));
            }
            if self.current_page.is_none() {
                self.done = true;
                return Ok(None);
            }
            if !self.load_next_page()? {
                self.done = true;
                return Ok(None);
            }
        }
    }

    /// Restrict a leaf value's fields to `self.projection`, leaving the
    /// scan key (the caller's identifying field) untouched since it never
    /// lives inside the encoded value in the first place.
    fn project(&self, raw: &[u8]) -> Result<Vec<u8>> {
        let Some(fields) = &self.projection else {
            return Ok(raw.to_vec());
        };
        let record = value::deserialize(raw)?;
        let projected: value::RecordMap = record
            .into_iter()
            .filter(|(k, _)| fields.iter().any(|f| f == k))
            .collect();
        value::serialize(&projected)
    }
}

impl<'a> Iterator for ScanCursor<'a> {
    type Item = Result<(Vec<u8>, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_item().transpose()
    }
}

//! page/header — the 16-byte fixed page header shared by every page in the
//! store: `flags: u32`, `count: u32`, `next_page_id: u64`.
//!
//! Fixed prefix offsets, no trailer and no per-format variant: every
//! page on disk has exactly this one shape.

use byteorder::{ByteOrder, LittleEndian};

pub const HEADER_LEN: usize = 16;

pub const OFF_FLAGS: usize = 0;
pub const OFF_COUNT: usize = 4;
pub const OFF_NEXT_PAGE_ID: usize = 8;

pub const FLAG_LEAF: u32 = 0x01;
pub const FLAG_BRANCH: u32 = 0x02;
pub const FLAG_OVERFLOW: u32 = 0x04;

pub const NO_SIBLING: u64 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageHeader {
    pub flags: u32,
    pub count: u32,
    pub next_page_id: u64,
}

impl PageHeader {
    pub fn is_leaf(&self) -> bool {
        self.flags & FLAG_LEAF != 0
    }

    pub fn is_branch(&self) -> bool {
        self.flags & FLAG_BRANCH != 0
    }

    pub fn new_leaf() -> Self {
        Self {
            flags: FLAG_LEAF,
            count: 0,
            next_page_id: NO_SIBLING,
        }
    }

    pub fn new_branch() -> Self {
        Self {
            flags: FLAG_BRANCH,
            count: 0,
            next_page_id: NO_SIBLING,
        }
    }

    pub fn read(page: &[u8]) -> Self {
        Self {
            flags: LittleEndian::read_u32(&page[OFF_FLAGS..OFF_FLAGS + 4]),
            count: LittleEndian::read_u32(&page[OFF_COUNT..OFF_COUNT + 4]),
            next_page_id: LittleEndian::read_u64(
                &page[OFF_NEXT_PAGE_ID..OFF_NEXT_PAGE_ID + 8],
            ),
        }
    }

    pub fn write(&self, page: &mut [u8]) {
        LittleEndian::write_u32(&mut page[OFF_FLAGS..OFF_FLAGS + 4], self.flags);
        LittleEndian::write_u32(&mut page[OFF_COUNT..OFF_COUNT + 4], self.count);
        LittleEndian::write_u64(
            &mut page[OFF_NEXT_PAGE_ID..OFF_NEXT_PAGE_ID + 8],
            self.next_page_id,
        );
    }
}

//! btree — an ordered byte-key -> typed-record map on top of `pagestore`.
//! Point read, range scan, and upsert-only write; delete and
//! overflow-chain assembly are declared but not implemented (both surface
//! `NotSupported`).

mod scan;
mod split;
mod tree;

pub use scan::ScanCursor;
pub use tree::BTree;

//! page — byte-exact page header and element codec.
//!
//! Layout: `[header: 16 bytes][elements...]`, elements in strictly
//! non-decreasing key order (I1). The codec here never reads or writes a
//! whole page by itself — it encodes/decodes what `pagestore::Page` hands
//! it. Splits, scanning and the B+Tree shape live in `btree`.

pub mod element;
pub mod header;

pub use element::{decode_elements, encode_elements, used_bytes, Element, ELEMENT_HEADER_LEN};
pub use header::{PageHeader, FLAG_BRANCH, FLAG_LEAF, FLAG_OVERFLOW, HEADER_LEN, NO_SIBLING};

//! deltalite — a teaching-grade mini data platform made of three
//! independent pieces that compose: a paged B+Tree store (`page`,
//! `pagestore`, `btree`, `value`), a snapshot-isolated table log
//! (`txlog`), and a deterministic distributed simulator (`sim`).
//!
//! A page-and-pager architecture, trimmed down to the invariants this
//! crate's format actually needs: no WAL, no segment splitting, no
//! transparent encryption, no bloom filters. See `DESIGN.md` for what
//! was kept, what was dropped, and why.

pub mod btree;
pub mod config;
pub mod error;
pub mod page;
pub mod pagestore;
pub mod sim;
pub mod txlog;
pub mod value;

pub use btree::BTree;
pub use error::{DeltaliteError, Result};
pub use pagestore::Store;
pub use value::{RecordMap, Value};

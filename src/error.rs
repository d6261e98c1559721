//! Crate-wide error taxonomy.
//!
//! Propagating everything as `anyhow::Error` with `.context(...)` strings
//! reads nicely in a CLI but cannot be matched on by a caller that needs
//! to distinguish, say, a conflicting commit from a corrupt page (a
//! `ConcurrentModification{expected, found}` must be distinguishable
//! from a `CorruptLog`), so library code here returns
//! `Result<T, DeltaliteError>` and only the CLI boundary collapses it
//! into `anyhow::Error`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeltaliteError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt page {page_id} at offset {offset}: {reason}")]
    CorruptPage {
        page_id: u64,
        offset: usize,
        reason: String,
    },

    #[error("corrupt value: {0}")]
    CorruptValue(String),

    #[error("corrupt log version {version}: {reason}")]
    CorruptLog { version: u64, reason: String },

    #[error("page id {page_id} out of range (file holds {allocated} pages)")]
    OutOfRange { page_id: u64, allocated: u64 },

    #[error("key already exists: {key}")]
    AlreadyExists { key: String },

    #[error("not found: {key}")]
    NotFound { key: String },

    #[error("invalid range [{start}, {end}) for key {key}")]
    InvalidRange { key: String, start: i64, end: i64 },

    #[error("concurrent modification: expected version {expected}, found {found}")]
    ConcurrentModification { expected: i64, found: i64 },

    #[error("interrupted")]
    Interrupted,

    #[error("not supported: {what}")]
    NotSupported { what: String },

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, DeltaliteError>;

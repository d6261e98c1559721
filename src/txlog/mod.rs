//! txlog — the "deltalite" table log: an append-only, versioned JSON
//! action log with optimistic-concurrency commits.
//!
//! The write path follows a JSON-sidecar-plus-rename pattern; commits
//! are serialized with per-table mutual exclusion.

mod action;
mod log;
mod snapshot;
mod transaction;

pub use action::{Action, Schema, SchemaField};
pub use log::TableLog;
pub use snapshot::Snapshot;
pub use transaction::{Transaction, TxnState};

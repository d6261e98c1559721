//! txlog/transaction — optimistic concurrency control over a `TableLog`.
//!
//! The per-table mutual-exclusion lock is an `fs2` exclusive file lock on
//! `_delta_log/.commit_lock`, an advisory single-writer lock scoped to
//! the commit critical section only.

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use fs2::FileExt;
use log::{debug, warn};

use crate::error::{DeltaliteError, Result};
use crate::txlog::action::Action;
use crate::txlog::log::TableLog;

const MAX_ATTEMPTS: u32 = 3;
const INITIAL_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnState {
    New,
    Committed,
    Aborted,
}

/// A transaction against one table's log. Borrows the `TableLog` rather
/// than owning a second handle to it, since the two never need to diverge
/// within the transaction's lifetime.
pub struct Transaction<'a> {
    log: &'a TableLog,
    initial_version: i64,
    actions: Vec<Action>,
    state: TxnState,
    committed_version: Option<u64>,
}

impl<'a> Transaction<'a> {
    /// Begin a new transaction, observing `latest_version` as the
    /// snapshot this transaction will validate against at commit time.
    pub fn begin(log: &'a TableLog) -> Result<Self> {
        let initial_version = log.latest_version()?;
        Ok(Self {
            log,
            initial_version,
            actions: Vec::new(),
            state: TxnState::New,
            committed_version: None,
        })
    }

    pub fn initial_version(&self) -> i64 {
        self.initial_version
    }

    pub fn state(&self) -> TxnState {
        self.state
    }

    /// The version this transaction committed as, once `commit()` has
    /// succeeded.
    pub fn committed_version(&self) -> Option<u64> {
        self.committed_version
    }

    fn require_new(&self) -> Result<()> {
        if self.state != TxnState::New {
            return Err(DeltaliteError::NotSupported {
                what: format!("transaction already in terminal state {:?}", self.state),
            });
        }
        Ok(())
    }

    pub fn add_action(&mut self, action: Action) -> Result<()> {
        self.require_new()?;
        self.actions.push(action);
        Ok(())
    }

    pub fn abort(&mut self) -> Result<()> {
        self.require_new()?;
        self.state = TxnState::Aborted;
        Ok(())
    }

    fn commit_lock_path(&self) -> std::path::PathBuf {
        self.log.log_dir().join(".commit_lock")
    }

    /// Attempt to commit. `operation` and `operation_parameters` populate
    /// the trailing `CommitInfo` action.
    ///
    /// Retries up to 3 times with exponential backoff (100ms, 200ms,
    /// 400ms) on transient I/O errors; `ConcurrentModification` is never
    /// retried here and leaves the transaction in `New` so the caller can
    /// decide whether to re-prepare a fresh transaction. `cancel`, when
    /// set, is checked between backoff sleeps and aborts promptly with
    /// `Interrupted`.
    pub fn commit(
        &mut self,
        operation: &str,
        operation_parameters: BTreeMap<String, String>,
        cancel: Option<&AtomicBool>,
    ) -> Result<u64> {
        self.require_new()?;
        self.log.ensure_layout()?;

        let mut backoff = INITIAL_BACKOFF;
        for attempt in 1..=MAX_ATTEMPTS {
            match self.try_commit_once(operation, &operation_parameters) {
                Ok(version) => {
                    self.state = TxnState::Committed;
                    self.committed_version = Some(version);
                    return Ok(version);
                }
                Err(err @ DeltaliteError::ConcurrentModification { .. }) => {
                    // Stays New: the caller decides whether to re-prepare.
                    return Err(err);
                }
                Err(DeltaliteError::Io(io_err)) if attempt < MAX_ATTEMPTS => {
                    warn!(
                        "transient I/O error on commit attempt {attempt}/{MAX_ATTEMPTS}: {io_err}"
                    );
                    if let Some(flag) = cancel {
                        if flag.load(Ordering::SeqCst) {
                            return Err(DeltaliteError::Interrupted);
                        }
                    }
                    thread::sleep(backoff);
                    backoff *= 2;
                }
                Err(other) => return Err(other),
            }
        }
        unreachable!("loop above always returns by the final attempt");
    }

    fn try_commit_once(
        &mut self,
        operation: &str,
        operation_parameters: &BTreeMap<String, String>,
    ) -> Result<u64> {
        // In-process commits serialize on this mutex first; the `fs2`
        // exclusive lock below additionally guards against another OS
        // process touching the same `_delta_log/` directory.
        let _in_process_guard = self.log.commit_mutex.lock().unwrap();

        let lock_file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(self.commit_lock_path())?;
        lock_file.lock_exclusive()?;
        let result = (|| -> Result<u64> {
            let current = self.log.latest_version()?;
            if current != self.initial_version {
                return Err(DeltaliteError::ConcurrentModification {
                    expected: self.initial_version,
                    found: current,
                });
            }
            let next_version = (self.initial_version + 1) as u64;
            let mut actions = self.actions.clone();
            actions.push(Action::CommitInfo {
                timestamp: now_millis(),
                operation: operation.to_string(),
                operation_parameters: operation_parameters.clone(),
                operation_metrics: BTreeMap::new(),
            });
            self.log.write_version(next_version, &actions)?;
            debug!("committed table log version {next_version} ({} actions)", actions.len());
            Ok(next_version)
        })();
        let _ = FileExt::unlock(&lock_file);
        result
    }
}

fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn first_commit_against_empty_table_succeeds_at_version_zero() {
        let dir = tempdir().unwrap();
        let log = TableLog::for_table(dir.path().join("t"));
        let mut txn = Transaction::begin(&log).unwrap();
        assert_eq!(txn.initial_version(), -1);
        txn.add_action(Action::AddFile {
            path: "a".into(),
            size: 1000,
            modification_time: 1,
            data_change: true,
        })
        .unwrap();
        let v = txn.commit("WRITE", BTreeMap::new(), None).unwrap();
        assert_eq!(v, 0);
        assert_eq!(txn.state(), TxnState::Committed);

        let actions = log.read_version(0).unwrap();
        assert_eq!(actions.len(), 2); // AddFile + CommitInfo
    }

    #[test]
    fn second_committer_against_stale_version_sees_concurrent_modification() {
        let dir = tempdir().unwrap();
        let log = TableLog::for_table(dir.path().join("t"));

        let mut t1 = Transaction::begin(&log).unwrap();
        t1.add_action(Action::AddFile {
            path: "a".into(),
            size: 1000,
            modification_time: 1,
            data_change: true,
        })
        .unwrap();

        let mut t2 = Transaction::begin(&log).unwrap();
        t2.add_action(Action::AddFile {
            path: "a".into(),
            size: 2000,
            modification_time: 2,
            data_change: true,
        })
        .unwrap();

        assert_eq!(t1.commit("WRITE", BTreeMap::new(), None).unwrap(), 0);

        let err = t2.commit("WRITE", BTreeMap::new(), None).unwrap_err();
        match err {
            DeltaliteError::ConcurrentModification { expected, found } => {
                assert_eq!(expected, -1);
                assert_eq!(found, 0);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(t2.state(), TxnState::New);
    }

    #[test]
    fn abort_moves_to_terminal_state_and_blocks_further_actions() {
        let dir = tempdir().unwrap();
        let log = TableLog::for_table(dir.path().join("t"));
        let mut txn = Transaction::begin(&log).unwrap();
        txn.abort().unwrap();
        assert_eq!(txn.state(), TxnState::Aborted);
        let err = txn
            .add_action(Action::RemoveFile {
                path: "a".into(),
                deletion_timestamp: 1,
            })
            .unwrap_err();
        assert!(matches!(err, DeltaliteError::NotSupported { .. }));
    }
}

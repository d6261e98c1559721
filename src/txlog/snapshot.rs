//! txlog/snapshot — a materialized, immutable view of a table at one
//! version.
//!
//! Holds a borrow of the `TableLog` it was read from rather than an owned
//! copy or a reference cycle: the log owns its path, the snapshot
//! borrows it for its lifetime and owns nothing but the version and the
//! materialized actions.

use crate::error::Result;
use crate::txlog::action::Action;
use crate::txlog::log::TableLog;

#[derive(Debug, Clone)]
pub struct Snapshot<'a> {
    log: &'a TableLog,
    version: i64,
    actions: Vec<Action>,
}

impl<'a> Snapshot<'a> {
    /// Materialize the latest version recorded in `log`. `version == -1`
    /// means the table has no committed versions yet.
    pub fn latest(log: &'a TableLog) -> Result<Self> {
        let version = log.latest_version()?;
        let actions = if version < 0 {
            Vec::new()
        } else {
            log.read_version(version as u64)?
        };
        Ok(Self { log, version, actions })
    }

    pub fn at_version(log: &'a TableLog, version: u64) -> Result<Self> {
        let actions = log.read_version(version)?;
        Ok(Self {
            log,
            version: version as i64,
            actions,
        })
    }

    /// The log this snapshot was read from, e.g. to re-checkout a fresher
    /// one after a conflicting commit.
    pub fn log(&self) -> &'a TableLog {
        self.log
    }

    pub fn version(&self) -> i64 {
        self.version
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn latest_on_empty_table_is_version_negative_one() {
        let dir = tempdir().unwrap();
        let log = TableLog::for_table(dir.path().join("t"));
        let snap = Snapshot::latest(&log).unwrap();
        assert_eq!(snap.version(), -1);
        assert!(snap.actions().is_empty());
    }

    #[test]
    fn latest_after_write_reflects_that_version() {
        let dir = tempdir().unwrap();
        let log = TableLog::for_table(dir.path().join("t"));
        log.write_version(
            0,
            &[Action::AddFile {
                path: "a".into(),
                size: 1,
                modification_time: 1,
                data_change: true,
            }],
        )
        .unwrap();
        let snap = Snapshot::latest(&log).unwrap();
        assert_eq!(snap.version(), 0);
        assert_eq!(snap.actions().len(), 1);
    }
}

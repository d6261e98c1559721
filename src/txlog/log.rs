//! txlog/log — the versioned `_delta_log/` directory.
//!
//! Write path is write-to-temp-then-rename so a reader never observes a
//! partially written version file.

use std::fs::{self, File};
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use log::debug;

use crate::error::{DeltaliteError, Result};
use crate::txlog::action::Action;
use crate::txlog::snapshot::Snapshot;

const VERSION_DIGITS: usize = 20;

fn version_filename(version: u64) -> String {
    format!("{version:0width$}.json", width = VERSION_DIGITS)
}

fn parse_version_filename(name: &str) -> Option<u64> {
    let stem = name.strip_suffix(".json")?;
    if stem.len() != VERSION_DIGITS || !stem.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    stem.parse::<u64>().ok()
}

/// A table's on-disk log directory layout: `<table>/_delta_log/` and
/// `<table>/_data/`.
pub struct TableLog {
    table_path: PathBuf,
    /// Serializes commits from `Transaction`s sharing this `TableLog`
    /// instance in-process, ahead of the `fs2` lock that also guards
    /// against other OS processes touching the same directory.
    pub(crate) commit_mutex: Mutex<()>,
}

impl TableLog {
    pub fn for_table(table_path: impl Into<PathBuf>) -> Self {
        Self {
            table_path: table_path.into(),
            commit_mutex: Mutex::new(()),
        }
    }

    /// Materialize the latest snapshot in one step: construct and read.
    pub fn checkout(&self) -> Result<Snapshot<'_>> {
        Snapshot::latest(self)
    }

    pub fn table_path(&self) -> &Path {
        &self.table_path
    }

    pub fn log_dir(&self) -> PathBuf {
        self.table_path.join("_delta_log")
    }

    pub fn data_dir(&self) -> PathBuf {
        self.table_path.join("_data")
    }

    fn ensure_dirs(&self) -> Result<()> {
        fs::create_dir_all(self.log_dir())?;
        fs::create_dir_all(self.data_dir())?;
        Ok(())
    }

    /// Create `_delta_log/` and `_data/` if absent. Exposed so a
    /// `Transaction` can take its commit lock inside `_delta_log/` before
    /// the first version has ever been written.
    pub fn ensure_layout(&self) -> Result<()> {
        self.ensure_dirs()
    }

    /// Ascending list of every version present in `_delta_log/`, filtered
    /// to exactly `^[0-9]{20}\.json$`.
    pub fn list_versions(&self) -> Result<Vec<u64>> {
        let dir = self.log_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut versions = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            if let Some(name) = entry.file_name().to_str() {
                if let Some(v) = parse_version_filename(name) {
                    versions.push(v);
                }
            }
        }
        versions.sort_unstable();
        Ok(versions)
    }

    /// Highest committed version, or -1 if the log is empty.
    pub fn latest_version(&self) -> Result<i64> {
        Ok(self
            .list_versions()?
            .last()
            .map(|v| *v as i64)
            .unwrap_or(-1))
    }

    /// Parse the actions recorded in version `v`. A missing file is an
    /// empty table at that version, not an error; malformed JSON is
    /// `CorruptLog`.
    pub fn read_version(&self, v: u64) -> Result<Vec<Action>> {
        let path = self.log_dir().join(version_filename(v));
        let bytes = match fs::read(&path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(DeltaliteError::Io(e)),
        };
        serde_json::from_slice(&bytes).map_err(|e| DeltaliteError::CorruptLog {
            version: v,
            reason: e.to_string(),
        })
    }

    /// Write version `v`'s full action array atomically: both directories
    /// are created if absent, the JSON array is produced in full, then
    /// written to a temp file and renamed into place so readers never
    /// observe a partial array.
    pub fn write_version(&self, v: u64, actions: &[Action]) -> Result<()> {
        self.ensure_dirs()?;
        let final_path = self.log_dir().join(version_filename(v));
        let tmp_path = self.log_dir().join(format!("{}.tmp", version_filename(v)));

        let json = serde_json::to_vec_pretty(actions)?;
        {
            let mut f = File::create(&tmp_path)?;
            f.write_all(&json)?;
            f.sync_all()?;
        }
        fs::rename(&tmp_path, &final_path)?;
        debug!("wrote table log version {v} ({} actions)", actions.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn empty_table_has_no_versions() {
        let dir = tempdir().unwrap();
        let log = TableLog::for_table(dir.path().join("t"));
        assert_eq!(log.list_versions().unwrap(), Vec::<u64>::new());
        assert_eq!(log.latest_version().unwrap(), -1);
    }

    #[test]
    fn write_then_read_round_trips_and_creates_directories() {
        let dir = tempdir().unwrap();
        let log = TableLog::for_table(dir.path().join("t"));
        let actions = vec![Action::AddFile {
            path: "a".into(),
            size: 1000,
            modification_time: 1,
            data_change: true,
        }];
        log.write_version(0, &actions).unwrap();

        assert!(log.log_dir().exists());
        assert!(log.data_dir().exists());
        assert_eq!(log.list_versions().unwrap(), vec![0]);
        assert_eq!(log.latest_version().unwrap(), 0);

        let back = log.read_version(0).unwrap();
        assert_eq!(back.len(), 1);
    }

    #[test]
    fn missing_version_reads_as_empty() {
        let dir = tempdir().unwrap();
        let log = TableLog::for_table(dir.path().join("t"));
        assert_eq!(log.read_version(5).unwrap().len(), 0);
    }

    #[test]
    fn malformed_version_file_is_corrupt_log() {
        let dir = tempdir().unwrap();
        let log = TableLog::for_table(dir.path().join("t"));
        fs::create_dir_all(log.log_dir()).unwrap();
        fs::write(log.log_dir().join(version_filename(0)), b"not json").unwrap();
        let err = log.read_version(0).unwrap_err();
        assert!(matches!(err, DeltaliteError::CorruptLog { version: 0, .. }));
    }

    #[test]
    fn filenames_outside_the_strict_pattern_are_ignored() {
        let dir = tempdir().unwrap();
        let log = TableLog::for_table(dir.path().join("t"));
        fs::create_dir_all(log.log_dir()).unwrap();
        fs::write(log.log_dir().join("not-a-version.json"), b"[]").unwrap();
        fs::write(log.log_dir().join(version_filename(3)), b"[]").unwrap();
        assert_eq!(log.list_versions().unwrap(), vec![3]);
    }
}

//! JSON journal so an open position survives a restart.
//!
//! Writes go to a sibling temp file that is renamed over the journal, so a
//! crash mid-write leaves the previous snapshot intact. A missing journal
//! loads as an empty ledger; one that exists but cannot be read is an error.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use ratio_spread_core::{ClosedPosition, Position, StrategyError};

#[derive(Error, Debug)]
pub enum JournalError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<JournalError> for StrategyError {
    fn from(e: JournalError) -> Self {
        Self::Journal(e.to_string())
    }
}

/// On-disk ledger contents.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub open: BTreeMap<String, Position>,
    pub archive: Vec<ClosedPosition>,
    pub saved_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone)]
pub struct LedgerJournal {
    path: PathBuf,
}

impl LedgerJournal {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// Writes the snapshot atomically, creating parent directories if needed.
    pub fn save(&self, snapshot: &LedgerSnapshot) -> Result<(), JournalError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }
        let temp = self.temp_path();
        let mut writer = BufWriter::new(File::create(&temp)?);
        serde_json::to_writer_pretty(&mut writer, snapshot)?;
        writer.flush()?;
        writer.into_inner().map_err(io::Error::from)?.sync_all()?;
        fs::rename(&temp, &self.path)?;
        debug!(
            path = %self.path.display(),
            open = snapshot.open.len(),
            archived = snapshot.archive.len(),
            "Ledger journal saved"
        );
        Ok(())
    }

    /// Reads the snapshot. A missing file yields an empty one.
    ///
    /// # Errors
    ///
    /// [`JournalError`] if the file exists but cannot be read or parsed.
    pub fn load(&self) -> Result<LedgerSnapshot, JournalError> {
        if !self.path.exists() {
            info!(path = %self.path.display(), "No ledger journal found, starting fresh");
            return Ok(LedgerSnapshot::default());
        }
        let snapshot = self.load_raw()?;
        info!(
            path = %self.path.display(),
            open = snapshot.open.len(),
            archived = snapshot.archive.len(),
            "Ledger journal loaded"
        );
        Ok(snapshot)
    }

    pub fn load_raw(&self) -> Result<LedgerSnapshot, JournalError> {
        let reader = BufReader::new(File::open(&self.path)?);
        Ok(serde_json::from_reader(reader)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn temp_journal() -> (TempDir, LedgerJournal) {
        let dir = TempDir::new().unwrap();
        let journal = LedgerJournal::new(dir.path().join("state").join("ledger.json"));
        (dir, journal)
    }

    #[test]
    fn missing_file_loads_empty() {
        let (_dir, journal) = temp_journal();
        assert_eq!(journal.load().unwrap(), LedgerSnapshot::default());
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let (_dir, journal) = temp_journal();
        fs::create_dir_all(journal.path().parent().unwrap()).unwrap();
        let mut file = File::create(journal.path()).unwrap();
        file.write_all(b"{ \"open\": { \"NIFTY\": ").unwrap();

        assert!(matches!(journal.load(), Err(JournalError::Json(_))));
    }

    #[test]
    fn save_replaces_file_without_leaving_temp() {
        let (_dir, journal) = temp_journal();
        journal.save(&LedgerSnapshot::default()).unwrap();
        let later = LedgerSnapshot {
            saved_at: chrono::NaiveDate::from_ymd_opt(2026, 10, 12)
                .unwrap()
                .and_hms_opt(15, 30, 0),
            ..LedgerSnapshot::default()
        };
        journal.save(&later).unwrap();

        assert_eq!(journal.load().unwrap(), later);
        assert!(!journal.temp_path().exists());
        let entries = fs::read_dir(journal.path().parent().unwrap()).unwrap().count();
        assert_eq!(entries, 1);
    }
}

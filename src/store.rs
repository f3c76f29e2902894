// 💾 Streak State Store - CSV tables with backup-before-write
//
// Every save follows the same discipline:
//   1. copy the live file to backups/<stem>_<UTC timestamp>.csv (checksum verified)
//   2. serialise all rows in memory
//   3. write <dir>/.<file>.tmp, fsync, rename over the live file
//
// A failure at any step leaves the live file untouched; a failure after step 1
// also leaves a byte-identical copy in the backup directory. Nothing is ever
// partially committed.

use crate::entities::{PlayerStreakRecord, ReferralRecord, ReferralRow, StreakBook};
use crate::error::{TrackerError, TrackerResult};
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

pub const LOCK_FILE_NAME: &str = ".streaks.lock";

// ============================================================================
// TABLE ROWS
// ============================================================================

/// A row type that can live in a CSV table.
pub trait TableRow: Serialize + DeserializeOwned {
    /// Header row written on every save, in column order.
    const HEADERS: &'static [&'static str];
}

impl TableRow for PlayerStreakRecord {
    const HEADERS: &'static [&'static str] = &[
        "Username",
        "Streak",
        "HighestStreak",
        "LastStatus",
        "LastUpdate",
        "UpdateDate",
    ];
}

impl TableRow for ReferralRow {
    const HEADERS: &'static [&'static str] =
        &["ReferredPlayer", "HandsPlayed", "ReferrerPlayer", "BonusEarned"];
}

#[derive(Debug, Clone, Serialize)]
pub struct SaveReceipt {
    pub path: PathBuf,
    /// None when there was no previous state to back up
    pub backup: Option<PathBuf>,
    /// SHA-256 of the bytes now on disk
    pub checksum: String,
    pub rows: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct BackupInfo {
    pub path: PathBuf,
    pub table: String,
    pub size_bytes: u64,
    pub modified: Option<DateTime<Utc>>,
}

// ============================================================================
// CSV TABLE
// ============================================================================

pub struct CsvTable {
    path: PathBuf,
    backup_dir: PathBuf,
}

impl CsvTable {
    pub fn new(path: impl Into<PathBuf>, backup_dir: impl Into<PathBuf>) -> Self {
        CsvTable {
            path: path.into(),
            backup_dir: backup_dir.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    /// Table name used as the backup file prefix ("master_streak", "referrals").
    pub fn stem(&self) -> String {
        self.path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("table")
            .to_string()
    }

    /// Read every row. A table that was never written reads as empty.
    pub fn read_rows<R: TableRow>(&self) -> TrackerResult<Vec<R>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        read_rows_from(&self.path)
            .map_err(|e| TrackerError::store(format!("read {}", self.path.display()), e))
    }

    /// Back up the current state, then atomically replace it with `rows`.
    pub fn write_rows<R: TableRow>(&self, rows: &[R]) -> TrackerResult<SaveReceipt> {
        let bytes = serialize_rows(rows)
            .map_err(|e| TrackerError::store(format!("serialise {}", self.stem()), e))?;

        let backup = self.backup()?;

        let checksum = replace_atomically(&self.path, &bytes)
            .map_err(|e| TrackerError::store(format!("write {}", self.path.display()), e))?;

        tracing::info!(
            table = %self.stem(),
            rows = rows.len(),
            backup = ?backup,
            "table saved"
        );

        Ok(SaveReceipt {
            path: self.path.clone(),
            backup,
            checksum,
            rows: rows.len(),
        })
    }

    /// Copy the live file into the backup directory and verify the copy.
    ///
    /// Returns `None` when there is nothing to back up yet.
    pub fn backup(&self) -> TrackerResult<Option<PathBuf>> {
        if !self.path.exists() {
            return Ok(None);
        }

        self.copy_to_backup()
            .map(Some)
            .map_err(|e| TrackerError::store(format!("back up {}", self.path.display()), e))
    }

    fn copy_to_backup(&self) -> Result<PathBuf> {
        fs::create_dir_all(&self.backup_dir)
            .with_context(|| format!("create backup dir {:?}", self.backup_dir))?;

        let stamp = Utc::now().format("%Y%m%dT%H%M%S%6fZ").to_string();
        let mut target = self.backup_dir.join(format!("{}_{}.csv", self.stem(), stamp));
        let mut n = 1;
        while target.exists() {
            target = self
                .backup_dir
                .join(format!("{}_{}_{}.csv", self.stem(), stamp, n));
            n += 1;
        }

        fs::copy(&self.path, &target)
            .with_context(|| format!("copy {:?} -> {:?}", self.path, target))?;
        File::open(&target)
            .and_then(|f| f.sync_all())
            .with_context(|| format!("fsync {:?}", target))?;

        let original = file_checksum(&self.path)?;
        let copied = file_checksum(&target)?;
        if original != copied {
            bail!("backup checksum mismatch for {:?}", target);
        }

        Ok(target)
    }

    /// Put the bytes of `backup` back in place without taking a new backup.
    ///
    /// `None` means the table did not exist before, so the live file is removed.
    /// Used to undo the first half of a two-table commit.
    pub fn roll_back(&self, backup: Option<&Path>) -> TrackerResult<()> {
        let result = match backup {
            Some(b) => fs::read(b)
                .with_context(|| format!("read backup {:?}", b))
                .and_then(|bytes| replace_atomically(&self.path, &bytes).map(|_| ())),
            None if self.path.exists() => {
                fs::remove_file(&self.path).with_context(|| format!("remove {:?}", self.path))
            }
            None => Ok(()),
        };

        result.map_err(|e| TrackerError::store(format!("roll back {}", self.path.display()), e))
    }

    /// Replace the live state with a backup file (the live state is backed up first).
    pub fn restore<R: TableRow>(&self, backup: &Path) -> TrackerResult<SaveReceipt> {
        if !backup.exists() {
            return Err(TrackerError::FileNotFound(backup.to_path_buf()));
        }
        if !self.owns_backup(backup) {
            return Err(TrackerError::InvalidConfig(format!(
                "{} is not a backup of {}",
                backup.display(),
                self.stem()
            )));
        }

        // refuse to restore something that would not load
        let rows: Vec<R> = read_rows_from(backup)
            .map_err(|e| TrackerError::store(format!("read backup {}", backup.display()), e))?;
        let bytes = fs::read(backup)
            .map_err(|e| TrackerError::store(format!("read backup {}", backup.display()), e))?;

        let previous = self.backup()?;
        let checksum = replace_atomically(&self.path, &bytes)
            .map_err(|e| TrackerError::store(format!("restore {}", self.path.display()), e))?;

        tracing::warn!(table = %self.stem(), from = %backup.display(), "table restored from backup");

        Ok(SaveReceipt {
            path: self.path.clone(),
            backup: previous,
            checksum,
            rows: rows.len(),
        })
    }

    /// True when `path` is a backup file this table wrote.
    pub fn owns_backup(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        let prefix = format!("{}_", self.stem());
        name.strip_prefix(&prefix)
            .map(|rest| rest.starts_with(|c: char| c.is_ascii_digit()) && rest.ends_with(".csv"))
            .unwrap_or(false)
    }

    /// Backups of this table, newest first.
    pub fn list_backups(&self) -> TrackerResult<Vec<BackupInfo>> {
        if !self.backup_dir.exists() {
            return Ok(Vec::new());
        }

        let entries = fs::read_dir(&self.backup_dir).map_err(|e| {
            TrackerError::store(format!("list {}", self.backup_dir.display()), e)
        })?;

        let mut backups = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| {
                TrackerError::store(format!("list {}", self.backup_dir.display()), e)
            })?;
            let path = entry.path();
            if !self.owns_backup(&path) {
                continue;
            }

            let meta = entry.metadata().ok();
            backups.push(BackupInfo {
                table: self.stem(),
                size_bytes: meta.as_ref().map(|m| m.len()).unwrap_or(0),
                modified: meta
                    .and_then(|m| m.modified().ok())
                    .map(DateTime::<Utc>::from),
                path,
            });
        }

        // timestamped names sort chronologically
        backups.sort_by(|a, b| b.path.cmp(&a.path));
        Ok(backups)
    }

    /// Delete all but the newest `keep` backups. Returns how many were removed.
    pub fn prune_backups(&self, keep: usize) -> TrackerResult<usize> {
        let backups = self.list_backups()?;
        let mut removed = 0;

        for stale in backups.iter().skip(keep) {
            fs::remove_file(&stale.path).map_err(|e| {
                TrackerError::store(format!("prune {}", stale.path.display()), e)
            })?;
            removed += 1;
        }

        if removed > 0 {
            tracing::debug!(table = %self.stem(), removed, "pruned old backups");
        }
        Ok(removed)
    }
}

// ============================================================================
// STREAK STATE STORE
// ============================================================================

/// Master streak table.
pub struct StreakStateStore {
    table: CsvTable,
}

impl StreakStateStore {
    pub fn new(master_path: impl Into<PathBuf>, backup_dir: impl Into<PathBuf>) -> Self {
        StreakStateStore {
            table: CsvTable::new(master_path, backup_dir),
        }
    }

    pub fn table(&self) -> &CsvTable {
        &self.table
    }

    pub fn load(&self) -> TrackerResult<StreakBook> {
        let rows: Vec<PlayerStreakRecord> = self.table.read_rows()?;
        let mut book = StreakBook::new();

        for row in rows {
            let record = row.normalized();
            if record.username.is_empty() {
                continue;
            }
            if book.contains_key(&record.username) {
                tracing::warn!(
                    username = %record.username,
                    "duplicate username in master table, keeping first occurrence"
                );
                continue;
            }
            book.insert(record.username.clone(), record);
        }

        Ok(book)
    }

    pub fn save(&self, book: &StreakBook) -> TrackerResult<SaveReceipt> {
        if let Some(bad) = book.values().find(|r| !r.is_consistent()) {
            return Err(TrackerError::InvalidValue(format!(
                "{}: streak {} exceeds highest {}",
                bad.username, bad.current_streak, bad.highest_streak
            )));
        }

        let rows: Vec<PlayerStreakRecord> = book.values().cloned().collect();
        self.table.write_rows(&rows)
    }
}

// ============================================================================
// REFERRAL STORE
// ============================================================================

/// "Referrals" table.
pub struct ReferralStore {
    table: CsvTable,
}

impl ReferralStore {
    pub fn new(path: impl Into<PathBuf>, backup_dir: impl Into<PathBuf>) -> Self {
        ReferralStore {
            table: CsvTable::new(path, backup_dir),
        }
    }

    pub fn table(&self) -> &CsvTable {
        &self.table
    }

    /// Load in file order; `milestone` derives the bonus flag for legacy rows.
    pub fn load(&self, milestone: u64) -> TrackerResult<Vec<ReferralRecord>> {
        let rows: Vec<ReferralRow> = self.table.read_rows()?;
        let mut seen = HashSet::new();
        let mut records = Vec::with_capacity(rows.len());

        for row in rows {
            let record = row.into_record(milestone);
            if record.referred_player.is_empty() {
                continue;
            }
            if !seen.insert(record.referred_player.clone()) {
                tracing::warn!(
                    referred = %record.referred_player,
                    "duplicate referral target in referrals table, keeping first occurrence"
                );
                continue;
            }
            records.push(record);
        }

        Ok(records)
    }

    pub fn save(&self, records: &[ReferralRecord]) -> TrackerResult<SaveReceipt> {
        let rows: Vec<ReferralRow> = records.iter().map(ReferralRow::from).collect();
        self.table.write_rows(&rows)
    }
}

// ============================================================================
// ADVISORY LOCK
// ============================================================================

/// Exclusive advisory lock on the data directory for one load-modify-save.
pub struct StoreLock {
    file: File,
    path: PathBuf,
}

impl StoreLock {
    /// Fails fast (no waiting) when another process holds the lock.
    pub fn acquire(dir: &Path) -> TrackerResult<Self> {
        let path = dir.join(LOCK_FILE_NAME);

        let file = fs::create_dir_all(dir)
            .and_then(|_| {
                OpenOptions::new()
                    .create(true)
                    .truncate(false)
                    .write(true)
                    .open(&path)
            })
            .map_err(|e| TrackerError::store(format!("open lock {}", path.display()), e))?;

        file.try_lock_exclusive().map_err(|e| {
            TrackerError::store(
                format!("data directory {} is locked by another process", dir.display()),
                e,
            )
        })?;

        Ok(StoreLock { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

// ============================================================================
// HELPERS
// ============================================================================

fn read_rows_from<R: DeserializeOwned>(path: &Path) -> Result<Vec<R>> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("open {:?}", path))?;

    let mut rows = Vec::new();
    for result in rdr.deserialize() {
        let row: R = result.with_context(|| format!("parse row in {:?}", path))?;
        rows.push(row);
    }
    Ok(rows)
}

fn serialize_rows<R: TableRow>(rows: &[R]) -> Result<Vec<u8>> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());

    wtr.write_record(R::HEADERS).context("write header row")?;
    for row in rows {
        wtr.serialize(row).context("serialise row")?;
    }

    wtr.into_inner().context("flush csv buffer")
}

/// Write to a sibling temp file, fsync, then rename over `path`.
fn replace_atomically(path: &Path, bytes: &[u8]) -> Result<String> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir).with_context(|| format!("create dir {:?}", dir))?;

    let tmp = temp_path_for(path);
    let written = write_and_sync(&tmp, bytes).and_then(|_| {
        fs::rename(&tmp, path).with_context(|| format!("rename {:?} -> {:?}", tmp, path))
    });

    if let Err(e) = written {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }

    #[cfg(unix)]
    {
        if let Ok(d) = File::open(&dir) {
            let _ = d.sync_all();
        }
    }

    Ok(bytes_checksum(bytes))
}

/// Deterministic temp name next to the live file: `<dir>/.<name>.tmp`.
pub fn temp_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("table.csv");
    path.with_file_name(format!(".{}.tmp", name))
}

fn write_and_sync(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut file = File::create(path).with_context(|| format!("create {:?}", path))?;
    file.write_all(bytes).with_context(|| format!("write {:?}", path))?;
    file.sync_all().with_context(|| format!("fsync {:?}", path))?;
    Ok(())
}

fn bytes_checksum(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

pub fn file_checksum(path: &Path) -> Result<String> {
    let bytes = fs::read(path).with_context(|| format!("read {:?}", path))?;
    Ok(bytes_checksum(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::StreakStatus;
    use crate::error::ErrorKind;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn record(name: &str, streak: u32) -> PlayerStreakRecord {
        let mut r = PlayerStreakRecord::new(name);
        r.set_streak(
            streak,
            StreakStatus::Increased,
            format!("Currently on a {} day streak", streak),
            NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
        );
        r
    }

    fn book(entries: &[(&str, u32)]) -> StreakBook {
        entries
            .iter()
            .map(|(n, s)| (n.to_string(), record(n, *s)))
            .collect()
    }

    fn store_in(dir: &TempDir) -> StreakStateStore {
        StreakStateStore::new(dir.path().join("master_streak.csv"), dir.path().join("backups"))
    }

    #[test]
    fn test_missing_master_loads_empty() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        let receipt = store.save(&book(&[("alice", 3), ("bob", 0)])).unwrap();
        assert!(receipt.backup.is_none(), "first save has nothing to back up");
        assert_eq!(receipt.rows, 2);
        assert_eq!(receipt.checksum.len(), 64);

        let loaded = store.load().unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded["alice"].current_streak, 3);
        assert_eq!(loaded["alice"].highest_streak, 3);
        assert_eq!(loaded["alice"].last_status, StreakStatus::Increased);
    }

    #[test]
    fn test_second_save_backs_up_previous_bytes() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        store.save(&book(&[("alice", 3)])).unwrap();
        let before = fs::read(store.table().path()).unwrap();

        let receipt = store.save(&book(&[("alice", 4)])).unwrap();
        let backup = receipt.backup.expect("second save must back up");
        assert_eq!(fs::read(&backup).unwrap(), before);
        assert!(store.table().owns_backup(&backup));
    }

    #[test]
    fn test_failed_write_leaves_state_recoverable() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        store.save(&book(&[("alice", 3), ("bob", 1)])).unwrap();
        let before = fs::read(store.table().path()).unwrap();

        // a directory squatting on the temp path makes the write fail
        fs::create_dir(temp_path_for(store.table().path())).unwrap();

        let err = store.save(&book(&[("alice", 99)])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StoreUnavailable);

        // live file untouched
        assert_eq!(fs::read(store.table().path()).unwrap(), before);

        // and a byte-identical backup exists
        let backups = store.table().list_backups().unwrap();
        assert_eq!(backups.len(), 1);
        assert_eq!(fs::read(&backups[0].path).unwrap(), before);
    }

    #[test]
    fn test_legacy_two_column_master_loads() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("master_streak.csv");
        fs::write(&path, "Username,Streak\nAlice,5\nbob,0\nALICE,9\n").unwrap();

        let store = StreakStateStore::new(&path, dir.path().join("backups"));
        let loaded = store.load().unwrap();

        assert_eq!(loaded.len(), 2, "duplicate keeps first occurrence");
        assert_eq!(loaded["alice"].current_streak, 5);
        assert_eq!(loaded["alice"].highest_streak, 5);
        assert_eq!(loaded["bob"].last_status, StreakStatus::Unchanged);
    }

    #[test]
    fn test_spreadsheet_edited_master_loads() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("master_streak.csv");
        fs::write(&path, "Username,Streak,HighestStreak,LastStatus\nalice,3.0,5,\nbob,1,1.0,INCREASED\n").unwrap();

        let loaded = StreakStateStore::new(&path, dir.path().join("backups")).load().unwrap();

        assert_eq!(loaded["alice"].current_streak, 3);
        assert_eq!(loaded["alice"].last_status, StreakStatus::Unchanged);
        assert_eq!(loaded["bob"].highest_streak, 1);
    }

    #[test]
    fn test_corrupt_master_is_store_unavailable() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("master_streak.csv");
        fs::write(&path, "Username,Streak\nalice,lots\n").unwrap();

        let err = StreakStateStore::new(&path, dir.path().join("backups"))
            .load()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StoreUnavailable);

        let message = err.to_string();
        assert!(message.contains("line: 2"), "{message}");
        assert!(message.contains("invalid streak value 'lots'"), "{message}");
    }

    #[test]
    fn test_restore_and_roll_back() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        store.save(&book(&[("alice", 1)])).unwrap();
        let receipt = store.save(&book(&[("alice", 2)])).unwrap();
        let first = receipt.backup.unwrap();

        store
            .table()
            .restore::<PlayerStreakRecord>(&first)
            .unwrap();
        assert_eq!(store.load().unwrap()["alice"].current_streak, 1);

        // roll back to "never existed"
        store.table().roll_back(None).unwrap();
        assert!(!store.table().path().exists());
    }

    #[test]
    fn test_restore_rejects_foreign_backup() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let foreign = dir.path().join("referrals_20250101T000000000000Z.csv");
        fs::write(&foreign, "ReferredPlayer,HandsPlayed,ReferrerPlayer\n").unwrap();

        let err = store
            .table()
            .restore::<PlayerStreakRecord>(&foreign)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_prune_keeps_newest() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        for streak in 0..5 {
            store.save(&book(&[("alice", streak)])).unwrap();
        }
        assert_eq!(store.table().list_backups().unwrap().len(), 4);

        let removed = store.table().prune_backups(2).unwrap();
        assert_eq!(removed, 2);

        let left = store.table().list_backups().unwrap();
        assert_eq!(left.len(), 2);
        // newest backup holds streak 3
        let newest: Vec<PlayerStreakRecord> = read_rows_from(&left[0].path).unwrap();
        assert_eq!(newest[0].current_streak, 3);
    }

    #[test]
    fn test_referral_store_round_trip_keeps_order() {
        let dir = TempDir::new().unwrap();
        let store = ReferralStore::new(dir.path().join("referrals.csv"), dir.path().join("backups"));

        let mut records = vec![
            ReferralRecord::new("zed", 10, "amy"),
            ReferralRecord::new("bob", 260, "amy"),
        ];
        records[1].bonus_earned = true;
        store.save(&records).unwrap();

        let loaded = store.load(250).unwrap();
        assert_eq!(loaded, records);
    }

    #[test]
    fn test_lock_is_exclusive() {
        let dir = TempDir::new().unwrap();
        let first = StoreLock::acquire(dir.path()).unwrap();

        let err = StoreLock::acquire(dir.path()).err().expect("second lock must fail");
        assert_eq!(err.kind(), ErrorKind::StoreUnavailable);

        drop(first);
        assert!(StoreLock::acquire(dir.path()).is_ok());
    }
}

use std::collections::{BTreeMap, HashSet};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;

use crate::error::{Result, SudsError};
use crate::models::{Purchase, RawEntry, RawKey};

// ---------------------------------------------------------------------------
// Atomic JSON files
// ---------------------------------------------------------------------------

/// Writes `value` as pretty JSON next to `path` and renames it into place, so
/// readers only ever see the old file or the complete new one.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(&mut tmp, value)?;
    tmp.write_all(b"\n")?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| SudsError::Io(e.error))?;
    Ok(())
}

/// `Ok(None)` when the file does not exist; a present but malformed file is an error.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path)?;
    Ok(Some(serde_json::from_str(&content)?))
}

fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

pub fn file_checksum(path: &Path) -> Result<String> {
    Ok(sha256_hex(&std::fs::read(path)?))
}

/// Checksum of a batch as it would be written to disk, so a batch taken
/// straight from a file hashes the same as the file itself.
pub fn records_checksum<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    let mut data = serde_json::to_vec_pretty(value)?;
    data.push(b'\n');
    Ok(sha256_hex(&data))
}

// ---------------------------------------------------------------------------
// Artifact locations
// ---------------------------------------------------------------------------

/// Where each durable pipeline artifact lives.
#[derive(Debug, Clone)]
pub struct Artifacts {
    pub raw: PathBuf,
    pub cleaned: PathBuf,
    pub delta: PathBuf,
}

impl Artifacts {
    pub fn in_dir(data_dir: &Path) -> Self {
        Self {
            raw: data_dir.join("raw_history.json"),
            cleaned: data_dir.join("cleaned.json"),
            delta: data_dir.join("cleaned_delta.json"),
        }
    }

    pub fn load_raw(&self) -> Result<Option<RawHistory>> {
        Ok(read_json::<Vec<RawEntry>>(&self.raw)?.map(RawHistory::from_entries))
    }

    pub fn save_raw(&self, history: &RawHistory) -> Result<()> {
        write_json_atomic(&self.raw, &history.entries)
    }

    pub fn load_cleaned(&self) -> Result<Option<Vec<Purchase>>> {
        read_json(&self.cleaned)
    }

    /// `Some(vec![])` means a clean run found nothing new; `None` means no
    /// clean run has written a delta yet.
    pub fn load_delta(&self) -> Result<Option<Vec<Purchase>>> {
        read_json(&self.delta)
    }

    /// Replaces the delta first and the full history second. If the process
    /// dies in between, the next clean run still sees the old watermark and
    /// recomputes the same delta.
    pub fn save_clean(&self, history: &[Purchase], delta: &[Purchase]) -> Result<()> {
        write_json_atomic(&self.delta, delta)?;
        write_json_atomic(&self.cleaned, history)
    }
}

// ---------------------------------------------------------------------------
// Raw history
// ---------------------------------------------------------------------------

/// Raw source entries, newest first, unique by composite key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawHistory {
    pub entries: Vec<RawEntry>,
}

impl RawHistory {
    pub fn from_entries(entries: Vec<RawEntry>) -> Self {
        let mut history = Self::default();
        history.merge_new(entries);
        history
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Transaction id at the head, i.e. the newest entry we have.
    pub fn latest_id(&self) -> Option<&str> {
        self.entries
            .first()
            .map(|e| e.transaction_id.trim())
            .filter(|id| !id.is_empty())
    }

    /// Puts freshly fetched entries (newest first) in front of the existing
    /// ones, dropping any whose composite key is already present. Returns how
    /// many were added.
    pub fn merge_new(&mut self, fresh: Vec<RawEntry>) -> usize {
        let mut known: HashSet<RawKey> = self.entries.iter().map(RawEntry::key).collect();
        let mut added = Vec::with_capacity(fresh.len());
        for entry in fresh {
            if known.insert(entry.key()) {
                added.push(entry);
            } else {
                tracing::debug!(transaction_id = %entry.transaction_id, "dropping duplicate raw entry");
            }
        }
        let count = added.len();
        added.append(&mut self.entries);
        self.entries = added;
        count
    }

    /// Ids that appear on more than one entry, with every entry carrying them.
    pub fn duplicate_ids(&self) -> BTreeMap<String, Vec<&RawEntry>> {
        let mut by_id: BTreeMap<String, Vec<&RawEntry>> = BTreeMap::new();
        for entry in &self.entries {
            let id = entry.transaction_id.trim();
            if !id.is_empty() {
                by_id.entry(id.to_string()).or_default().push(entry);
            }
        }
        by_id.retain(|_, entries| entries.len() > 1);
        by_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, total: &str) -> RawEntry {
        RawEntry {
            transaction_id: id.into(),
            datetime: "11/26/2025, 9:32 PM".into(),
            cardholder: "EMV-TAP (0420)".into(),
            total: total.into(),
            details_text: "Vac\t(vacuum 1)\t$1.00".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_merge_prepends_newest_first() {
        let mut history = RawHistory::from_entries(vec![entry("2", "$1.00"), entry("1", "$1.00")]);
        let added = history.merge_new(vec![entry("4", "$1.00"), entry("3", "$1.00")]);
        assert_eq!(added, 2);
        let ids: Vec<&str> = history.entries.iter().map(|e| e.transaction_id.as_str()).collect();
        assert_eq!(ids, ["4", "3", "2", "1"]);
        assert_eq!(history.latest_id(), Some("4"));
    }

    #[test]
    fn test_duplicate_safety_net() {
        let mut history = RawHistory::default();
        let added = history.merge_new(vec![
            entry("9", "$1.00"),
            entry("9", "$2.00"),
            entry("9", "$1.00"),
        ]);
        assert_eq!(added, 2);
        assert_eq!(history.len(), 2);
        let dupes = history.duplicate_ids();
        assert_eq!(dupes.len(), 1);
        assert_eq!(dupes["9"].len(), 2);
    }

    #[test]
    fn test_merge_skips_already_stored() {
        let mut history = RawHistory::from_entries(vec![entry("1", "$1.00")]);
        assert_eq!(history.merge_new(vec![entry("1", "$1.00")]), 0);
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn test_latest_id_ignores_blank() {
        let history = RawHistory::from_entries(vec![entry("  ", "$1.00")]);
        assert_eq!(history.latest_id(), None);
        assert_eq!(RawHistory::default().latest_id(), None);
    }

    #[test]
    fn test_atomic_write_and_read() {
        let dir = tempfile::tempdir().unwrap();
        let artifacts = Artifacts::in_dir(dir.path());
        assert!(artifacts.load_raw().unwrap().is_none());

        let history = RawHistory::from_entries(vec![entry("5", "$1.00")]);
        artifacts.save_raw(&history).unwrap();
        let loaded = artifacts.load_raw().unwrap().unwrap();
        assert_eq!(loaded, history);

        // No stray temp files left behind.
        let files = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(files, 1);
    }

    #[test]
    fn test_empty_delta_distinct_from_absent() {
        let dir = tempfile::tempdir().unwrap();
        let artifacts = Artifacts::in_dir(dir.path());
        assert!(artifacts.load_delta().unwrap().is_none());
        artifacts.save_clean(&[], &[]).unwrap();
        assert_eq!(artifacts.load_delta().unwrap(), Some(vec![]));
    }

    #[test]
    fn test_records_checksum_matches_written_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raw.json");
        let entries = vec![entry("2", "$1.00"), entry("1", "$1.00")];
        write_json_atomic(&path, &entries).unwrap();
        assert_eq!(file_checksum(&path).unwrap(), records_checksum(&entries).unwrap());
        assert_ne!(
            records_checksum(&entries[..1]).unwrap(),
            records_checksum(&entries).unwrap()
        );
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let artifacts = Artifacts::in_dir(dir.path());
        std::fs::write(&artifacts.raw, "{not json").unwrap();
        assert!(artifacts.load_raw().is_err());
    }
}

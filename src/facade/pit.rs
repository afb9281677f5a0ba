//! PIT Store (C4).
//!
//! Append-only, content-addressed snapshot store for reproducible
//! replays. Grounded on `backtest_v2/artifact_store.rs`'s
//! immutable-once-persisted discipline and `backtest_v2/fingerprint.rs`'s
//! content-hashing idiom, adapted from that SQLite-blob storage to the
//! file-based `{family}/{yyyymmdd}/{id}` directory layout spec.md §6
//! prescribes, with atomic temp-then-rename writes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PitStoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("manifest corrupt: {0}")]
    ManifestCorrupt(String),
    #[error("snapshot {0} not found")]
    NotFound(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotMeta {
    pub id: String,
    pub family: String,
    pub venue: String,
    pub symbol: String,
    pub data_type: String,
    pub timestamp: DateTime<Utc>,
    pub run_id: String,
}

/// Content-addressed id: SHA-256 over the canonical bytes.
pub fn content_id(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

pub struct PitStore {
    root: PathBuf,
}

impl PitStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, PitStoreError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn family_day_dir(&self, family: &str, timestamp: DateTime<Utc>) -> PathBuf {
        self.root.join(family).join(timestamp.format("%Y%m%d").to_string())
    }

    fn manifest_path(&self) -> PathBuf {
        self.root.join("manifest.jsonl")
    }

    /// Atomically persist a snapshot: write to `.tmp`, then rename into
    /// place. Snapshots already written are never rewritten (spec.md §4.4).
    pub fn put_snapshot(
        &self,
        family: &str,
        venue: &str,
        symbol: &str,
        data_type: &str,
        timestamp: DateTime<Utc>,
        run_id: &str,
        bytes: &[u8],
    ) -> Result<SnapshotMeta, PitStoreError> {
        let id = content_id(bytes);
        let dir = self.family_day_dir(family, timestamp);
        fs::create_dir_all(&dir)?;
        let final_path = dir.join(&id);

        if !final_path.exists() {
            let tmp_path = dir.join(format!("{id}.tmp"));
            {
                let mut f = fs::File::create(&tmp_path)?;
                f.write_all(bytes)?;
                f.sync_all()?;
            }
            fs::rename(&tmp_path, &final_path)?;
        }

        let meta = SnapshotMeta {
            id: id.clone(),
            family: family.to_string(),
            venue: venue.to_string(),
            symbol: symbol.to_string(),
            data_type: data_type.to_string(),
            timestamp,
            run_id: run_id.to_string(),
        };
        self.append_manifest(&meta)?;
        Ok(meta)
    }

    fn append_manifest(&self, meta: &SnapshotMeta) -> Result<(), PitStoreError> {
        let line = serde_json::to_string(meta).map_err(|e| PitStoreError::ManifestCorrupt(e.to_string()))?;
        let mut f = fs::OpenOptions::new().create(true).append(true).open(self.manifest_path())?;
        writeln!(f, "{line}")?;
        Ok(())
    }

    pub fn load_by_id(&self, family: &str, timestamp: DateTime<Utc>, id: &str) -> Result<Vec<u8>, PitStoreError> {
        let path = self.family_day_dir(family, timestamp).join(id);
        if !path.exists() {
            return Err(PitStoreError::NotFound(id.to_string()));
        }
        Ok(fs::read(path)?)
    }

    pub fn list(&self, filter: impl Fn(&SnapshotMeta) -> bool) -> Result<Vec<SnapshotMeta>, PitStoreError> {
        if !self.manifest_path().exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(self.manifest_path())?;
        let mut out = Vec::new();
        for line in content.lines() {
            if line.trim().is_empty() {
                continue;
            }
            let meta: SnapshotMeta =
                serde_json::from_str(line).map_err(|e| PitStoreError::ManifestCorrupt(e.to_string()))?;
            if filter(&meta) {
                out.push(meta);
            }
        }
        Ok(out)
    }

    /// Drop snapshots (and their manifest entries) older than `max_age`,
    /// measured from `now`. Returns the number of files removed.
    pub fn retain_younger_than(&self, now: DateTime<Utc>, max_age: chrono::Duration) -> Result<usize, PitStoreError> {
        let all = self.list(|_| true)?;
        let mut removed = 0;
        let mut kept = Vec::new();
        for meta in all {
            if now - meta.timestamp > max_age {
                let path = self.family_day_dir(&meta.family, meta.timestamp).join(&meta.id);
                if path.exists() {
                    fs::remove_file(path)?;
                    removed += 1;
                }
            } else {
                kept.push(meta);
            }
        }
        let mut f = fs::File::create(self.manifest_path())?;
        for meta in &kept {
            let line = serde_json::to_string(meta).map_err(|e| PitStoreError::ManifestCorrupt(e.to_string()))?;
            writeln!(f, "{line}")?;
        }
        Ok(removed)
    }
}

/// Groups the snapshot ids a scan cycle consumed, for the orchestrator's
/// audit record (spec.md §4.11).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CycleAuditRecord {
    pub run_id: String,
    pub snapshot_ids: HashMap<String, Vec<String>>, // symbol -> snapshot ids
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn snapshots_are_immutable_across_rereads() {
        let dir = tempdir().unwrap();
        let store = PitStore::open(dir.path()).unwrap();
        let ts = Utc::now();
        let meta = store.put_snapshot("bars", "binance", "BTCUSD", "kline", ts, "run1", b"hello").unwrap();
        let a = store.load_by_id("bars", ts, &meta.id).unwrap();
        let b = store.load_by_id("bars", ts, &meta.id).unwrap();
        assert_eq!(a, b);
        assert_eq!(a, b"hello");
    }

    #[test]
    fn content_addressing_dedupes_identical_bytes() {
        let dir = tempdir().unwrap();
        let store = PitStore::open(dir.path()).unwrap();
        let ts = Utc::now();
        let m1 = store.put_snapshot("bars", "binance", "BTCUSD", "kline", ts, "run1", b"same").unwrap();
        let m2 = store.put_snapshot("bars", "binance", "BTCUSD", "kline", ts, "run2", b"same").unwrap();
        assert_eq!(m1.id, m2.id);
    }

    #[test]
    fn list_filters_by_family() {
        let dir = tempdir().unwrap();
        let store = PitStore::open(dir.path()).unwrap();
        let ts = Utc::now();
        store.put_snapshot("bars", "binance", "BTCUSD", "kline", ts, "run1", b"a").unwrap();
        store.put_snapshot("books", "binance", "BTCUSD", "l2", ts, "run1", b"b").unwrap();
        let bars = store.list(|m| m.family == "bars").unwrap();
        assert_eq!(bars.len(), 1);
    }
}

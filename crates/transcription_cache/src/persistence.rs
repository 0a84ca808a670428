use crate::cache::TranscriptionCache;
use crate::entry::CacheEntry;
use crate::fingerprint::AudioFingerprint;
use crate::signature::AudioSignature;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

/// Serializable image of the cache for the optional durable-store
/// collaborator. The pipeline only ever needs get/put/find-similar; what
/// medium holds this between runs is the host's business.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSnapshot {
	pub records: Vec<SnapshotRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotRecord {
	pub fingerprint: AudioFingerprint,
	pub entry: CacheEntry,
	pub signature: AudioSignature,
}

#[derive(Debug, Error)]
pub enum SnapshotError {
	#[error("snapshot io failed: {0}")]
	Io(#[from] std::io::Error),
	#[error("snapshot encoding failed: {0}")]
	Encoding(#[from] serde_json::Error),
}

impl TranscriptionCache {
	/// Capture every entry with its signature. Usage counters travel with
	/// the entries so a restored cache keeps its history.
	#[must_use]
	pub fn snapshot(&self) -> CacheSnapshot {
		CacheSnapshot {
			records: self
				.iter_records()
				.map(|(fingerprint, entry, signature)| SnapshotRecord { fingerprint, entry, signature })
				.collect(),
		}
	}

	/// Load entries from a snapshot. Existing fingerprints are replaced;
	/// confidence gating already happened when the snapshot was taken.
	pub fn restore(&self, snapshot: CacheSnapshot) {
		let count = snapshot.records.len();
		for record in snapshot.records {
			self.insert_record(record.fingerprint, record.entry, record.signature);
		}
		info!(entries = count, "cache snapshot restored");
	}
}

/// JSON-file persistence for cache snapshots. Writes go through a
/// sibling temp file and a rename so a crash never leaves a torn file.
#[derive(Debug, Clone)]
pub struct JsonSnapshotStore {
	path: PathBuf,
}

impl JsonSnapshotStore {
	#[must_use]
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	#[must_use]
	pub fn path(&self) -> &Path {
		&self.path
	}

	#[must_use]
	pub fn exists(&self) -> bool {
		self.path.exists()
	}

	/// # Errors
	/// Returns an error if the snapshot cannot be encoded or written.
	pub fn save(&self, cache: &TranscriptionCache) -> Result<(), SnapshotError> {
		let snapshot = cache.snapshot();
		let bytes = serde_json::to_vec_pretty(&snapshot)?;

		let tmp = self.path.with_extension("tmp");
		fs::write(&tmp, bytes)?;
		fs::rename(&tmp, &self.path)?;

		info!(entries = snapshot.records.len(), path = %self.path.display(), "cache snapshot saved");
		Ok(())
	}

	/// # Errors
	/// Returns an error if the file cannot be read or decoded.
	pub fn load(&self) -> Result<CacheSnapshot, SnapshotError> {
		let bytes = fs::read(&self.path)?;
		Ok(serde_json::from_slice(&bytes)?)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn snapshot_round_trips_entries_and_usage() {
		let dir = tempfile::tempdir().unwrap();
		let store = JsonSnapshotStore::new(dir.path().join("cache.json"));

		let cache = TranscriptionCache::with_defaults();
		let fp = TranscriptionCache::fingerprint(b"large fries");
		let _ = cache.put(fp.clone(), TranscriptionCache::signature(b"large fries"), "large fries".into(), 0.93);
		let _ = cache.get(&fp);

		store.save(&cache).unwrap();
		assert!(store.exists());

		let restored = TranscriptionCache::with_defaults();
		restored.restore(store.load().unwrap());

		let entry = restored.get(&fp).unwrap();
		assert_eq!(entry.transcript, "large fries");
		// 1 from creation + 1 pre-snapshot hit + 1 post-restore hit
		assert_eq!(entry.usage_count, 3);
	}

	#[test]
	fn load_fails_cleanly_when_the_file_is_missing() {
		let dir = tempfile::tempdir().unwrap();
		let store = JsonSnapshotStore::new(dir.path().join("nope.json"));
		assert!(matches!(store.load(), Err(SnapshotError::Io(_))));
	}
}

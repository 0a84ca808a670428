use crate::entry::CacheEntry;
use crate::fingerprint::AudioFingerprint;
use crate::signature::AudioSignature;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Acceptance policy for the cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
	/// Transcriptions below this confidence are never cached.
	pub min_confidence: f64,
	/// Similarity scores below this are not reported by `find_similar`.
	pub similarity_threshold: f32,
}

impl Default for CacheConfig {
	fn default() -> Self {
		Self {
			min_confidence: 0.8,
			similarity_threshold: 0.92,
		}
	}
}

/// Result of a `put`. Rejection is policy, not an error: the transcript
/// still goes back to the caller, it just never becomes retrievable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum PutOutcome {
	Stored,
	RejectedLowConfidence,
}

impl PutOutcome {
	#[must_use]
	pub const fn is_stored(self) -> bool {
		matches!(self, Self::Stored)
	}
}

/// A near-duplicate candidate returned by `find_similar`, best first.
#[derive(Debug, Clone)]
pub struct SimilarEntry {
	pub fingerprint: AudioFingerprint,
	pub score: f32,
	pub entry: CacheEntry,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheStats {
	pub entry_count: usize,
	pub hits: u64,
	pub misses: u64,
	pub hit_rate: f64,
	pub total_cost_savings: f64,
}

/// Shared fingerprint → transcript store. Safe under concurrent access
/// from all workers; two simultaneous misses on the same fingerprint at
/// worst duplicate one external call and the second `put` is a no-op.
pub struct TranscriptionCache {
	config: CacheConfig,
	entries: DashMap<AudioFingerprint, CacheEntry>,
	signatures: DashMap<AudioFingerprint, AudioSignature>,
	hits: AtomicU64,
	misses: AtomicU64,
	// f64 savings accumulated as integer milli-units so the counter stays atomic
	cost_savings_milli: AtomicU64,
}

impl TranscriptionCache {
	#[must_use]
	pub fn new(config: CacheConfig) -> Self {
		Self {
			config,
			entries: DashMap::new(),
			signatures: DashMap::new(),
			hits: AtomicU64::new(0),
			misses: AtomicU64::new(0),
			cost_savings_milli: AtomicU64::new(0),
		}
	}

	#[must_use]
	pub fn with_defaults() -> Self {
		Self::new(CacheConfig::default())
	}

	#[must_use]
	pub fn config(&self) -> &CacheConfig {
		&self.config
	}

	/// Exact-byte identity of a payload. Pure function of content.
	#[must_use]
	pub fn fingerprint(bytes: &[u8]) -> AudioFingerprint {
		AudioFingerprint::of(bytes)
	}

	/// Coarse representation of a payload for the similarity index.
	#[must_use]
	pub fn signature(bytes: &[u8]) -> AudioSignature {
		AudioSignature::of(bytes)
	}

	/// Exact lookup. A hit observably bumps `usage_count` and
	/// `last_used_at`; a miss creates nothing.
	#[must_use]
	pub fn get(&self, fingerprint: &AudioFingerprint) -> Option<CacheEntry> {
		match self.entries.get_mut(fingerprint) {
			Some(mut entry) => {
				entry.touch();
				self.hits.fetch_add(1, Ordering::Relaxed);
				Some(entry.clone())
			}
			None => {
				self.misses.fetch_add(1, Ordering::Relaxed);
				None
			}
		}
	}

	/// Store an accepted transcription. Below-threshold confidence is a
	/// no-op; an already-present fingerprint keeps its usage history.
	pub fn put(&self, fingerprint: AudioFingerprint, signature: AudioSignature, transcript: String, confidence: f64) -> PutOutcome {
		if confidence < self.config.min_confidence {
			debug!(%fingerprint, confidence, min_confidence = self.config.min_confidence, "transcription below acceptance threshold, not cached");
			return PutOutcome::RejectedLowConfidence;
		}

		self.signatures.entry(fingerprint.clone()).or_insert(signature);
		self.entries.entry(fingerprint).or_insert_with(|| CacheEntry::new(transcript, confidence));
		PutOutcome::Stored
	}

	/// Near-duplicate candidates for `bytes`, closest first, capped at
	/// `max_candidates`. Advisory only — this never replaces the exact
	/// lookup path and does not count as a hit or miss.
	#[must_use]
	pub fn find_similar(&self, bytes: &[u8], max_candidates: usize) -> Vec<SimilarEntry> {
		if max_candidates == 0 || self.entries.is_empty() {
			return Vec::new();
		}

		let probe = AudioSignature::of(bytes);
		let mut candidates: Vec<SimilarEntry> = self
			.signatures
			.iter()
			.filter_map(|kv| {
				let score = probe.similarity(kv.value());
				if score < self.config.similarity_threshold {
					return None;
				}
				let entry = self.entries.get(kv.key())?.clone();
				Some(SimilarEntry {
					fingerprint: kv.key().clone(),
					score,
					entry,
				})
			})
			.collect();

		candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
		candidates.truncate(max_candidates);
		candidates
	}

	/// Credit avoided external spend to the cache. The processor knows
	/// the cost it skipped; the cache only accumulates it.
	pub fn record_cost_saving(&self, units: f64) {
		if units <= 0.0 {
			return;
		}
		self.cost_savings_milli.fetch_add((units * 1000.0).round() as u64, Ordering::Relaxed);
	}

	#[must_use]
	pub fn stats(&self) -> CacheStats {
		let hits = self.hits.load(Ordering::Relaxed);
		let misses = self.misses.load(Ordering::Relaxed);
		let lookups = hits + misses;
		CacheStats {
			entry_count: self.entries.len(),
			hits,
			misses,
			hit_rate: if lookups == 0 { 0.0 } else { hits as f64 / lookups as f64 },
			total_cost_savings: self.cost_savings_milli.load(Ordering::Relaxed) as f64 / 1000.0,
		}
	}

	/// Zero the hit/miss/savings counters; entries stay.
	pub fn reset_stats(&self) {
		self.hits.store(0, Ordering::Relaxed);
		self.misses.store(0, Ordering::Relaxed);
		self.cost_savings_milli.store(0, Ordering::Relaxed);
	}

	pub(crate) fn iter_records(&self) -> impl Iterator<Item = (AudioFingerprint, CacheEntry, AudioSignature)> + '_ {
		self.entries.iter().map(|kv| {
			let fingerprint = kv.key().clone();
			let signature = self.signatures.get(&fingerprint).map_or_else(|| AudioSignature::of(&[]), |s| s.value().clone());
			(fingerprint, kv.value().clone(), signature)
		})
	}

	pub(crate) fn insert_record(&self, fingerprint: AudioFingerprint, entry: CacheEntry, signature: AudioSignature) {
		self.signatures.insert(fingerprint.clone(), signature);
		self.entries.insert(fingerprint, entry);
	}
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One cached transcription. Created only for results at or above the
/// confidence acceptance threshold; never deleted by the pipeline itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
	pub transcript: String,
	pub confidence: f64,
	pub usage_count: u64,
	pub created_at: DateTime<Utc>,
	pub last_used_at: DateTime<Utc>,
}

impl CacheEntry {
	pub(crate) fn new(transcript: String, confidence: f64) -> Self {
		let now = Utc::now();
		Self {
			transcript,
			confidence,
			usage_count: 1,
			created_at: now,
			last_used_at: now,
		}
	}

	/// Record a hit: bump usage and refresh the last-used timestamp.
	pub(crate) fn touch(&mut self) {
		self.usage_count += 1;
		self.last_used_at = Utc::now();
	}
}

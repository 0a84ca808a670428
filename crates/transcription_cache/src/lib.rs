//! Content-addressed transcript cache: byte-exact fingerprints map audio
//! to previously obtained transcripts, a coarse signature index answers
//! near-duplicate queries, and hit/miss accounting backs the pipeline's
//! cost reporting.

mod cache;
mod entry;
mod fingerprint;
mod persistence;
mod signature;

pub use cache::{CacheConfig, CacheStats, PutOutcome, SimilarEntry, TranscriptionCache};
pub use entry::CacheEntry;
pub use fingerprint::AudioFingerprint;
pub use persistence::{CacheSnapshot, JsonSnapshotStore, SnapshotError, SnapshotRecord};
pub use signature::{AudioSignature, SIGNATURE_BUCKETS};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Deterministic identity of an audio payload: the lowercase-hex SHA-256
/// digest of its exact bytes. No metadata, no timestamps — identical
/// bytes always fingerprint identically, wherever computed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AudioFingerprint(String);

impl AudioFingerprint {
	#[must_use]
	pub fn of(bytes: &[u8]) -> Self {
		let mut hasher = Sha256::new();
		hasher.update(bytes);
		Self(format!("{:x}", hasher.finalize()))
	}

	#[must_use]
	pub fn as_hex(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for AudioFingerprint {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn identical_bytes_fingerprint_identically() {
		let a = AudioFingerprint::of(b"the same clip");
		let b = AudioFingerprint::of(b"the same clip");
		assert_eq!(a, b);
	}

	#[test]
	fn a_single_byte_difference_changes_the_digest() {
		let a = AudioFingerprint::of(b"clip v1");
		let b = AudioFingerprint::of(b"clip v2");
		assert_ne!(a, b);
	}

	#[test]
	fn digest_is_fixed_length_hex() {
		let fp = AudioFingerprint::of(b"");
		assert_eq!(fp.as_hex().len(), 64);
		assert!(fp.as_hex().chars().all(|c| c.is_ascii_hexdigit()));
	}
}

use serde::{Deserialize, Serialize};

/// Number of coarse energy buckets in a signature.
pub const SIGNATURE_BUCKETS: usize = 32;

/// Coarse, encoding-tolerant representation of a clip used for
/// near-duplicate search: per-bucket mean absolute deviation from the
/// byte midpoint, L2-normalized. Deliberately much blurrier than the
/// exact fingerprint — two renditions of the same order with different
/// noise or framing should land close together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioSignature(Vec<f32>);

impl AudioSignature {
	#[must_use]
	pub fn of(bytes: &[u8]) -> Self {
		let mut buckets = vec![0.0f32; SIGNATURE_BUCKETS];
		if bytes.is_empty() {
			return Self(buckets);
		}

		let bucket_len = bytes.len().div_ceil(SIGNATURE_BUCKETS);
		for (bucket, chunk) in buckets.iter_mut().zip(bytes.chunks(bucket_len)) {
			let sum: u64 = chunk.iter().map(|&b| u64::from(b.abs_diff(128))).sum();
			*bucket = sum as f32 / chunk.len() as f32;
		}

		let norm = buckets.iter().map(|v| v * v).sum::<f32>().sqrt();
		if norm > f32::EPSILON {
			for value in &mut buckets {
				*value /= norm;
			}
		}

		Self(buckets)
	}

	/// Cosine similarity in `[0, 1]` (bucket values are non-negative).
	#[must_use]
	pub fn similarity(&self, other: &Self) -> f32 {
		self.0.iter().zip(&other.0).map(|(a, b)| a * b).sum()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use approx::assert_relative_eq;

	#[test]
	fn identical_content_scores_one() {
		let sig = AudioSignature::of(b"some pcm-ish payload with structure 0123456789");
		assert_relative_eq!(sig.similarity(&sig.clone()), 1.0, epsilon = 1e-5);
	}

	#[test]
	fn mild_noise_stays_close_while_different_content_drifts() {
		let base: Vec<u8> = (0..4096u32).map(|i| ((i % 251) ^ (i / 7)) as u8).collect();
		let mut noisy = base.clone();
		for value in noisy.iter_mut().step_by(97) {
			*value = value.wrapping_add(3);
		}
		let other: Vec<u8> = (0..4096u32).map(|i| (i * 31 % 256) as u8).collect();

		let base_sig = AudioSignature::of(&base);
		let near = base_sig.similarity(&AudioSignature::of(&noisy));
		let far = base_sig.similarity(&AudioSignature::of(&other));
		assert!(near > far);
		assert!(near > 0.99);
	}

	#[test]
	fn empty_input_yields_a_zero_signature() {
		let sig = AudioSignature::of(&[]);
		assert_relative_eq!(sig.similarity(&sig.clone()), 0.0);
	}
}

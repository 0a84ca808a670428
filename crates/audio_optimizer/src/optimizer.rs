use crate::analysis::{cost_units, AudioAnalysis};
use crate::format::AudioFormat;
use crate::wav;
use crate::AudioBlob;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Thresholds and knobs for the optimization pass.
#[derive(Debug, Clone)]
pub struct OptimizerConfig {
	/// Blobs larger than this always qualify for optimization.
	pub max_size_bytes: usize,
	/// Formats the transcription service ingests cheaply as-is.
	pub preferred_formats: Vec<AudioFormat>,
	/// Sample rate speech is downconverted to.
	pub target_sample_rate: u32,
	/// Per-frame RMS level below which a frame counts as silence.
	pub silence_rms_threshold: f32,
	/// Frame length used by the silence gate.
	pub silence_frame_ms: u32,
	/// Ratios above this must survive re-decoding the optimized payload.
	pub max_plausible_ratio: f64,
}

impl Default for OptimizerConfig {
	fn default() -> Self {
		Self {
			max_size_bytes: 1024 * 1024,
			preferred_formats: vec![AudioFormat::Mp3, AudioFormat::Ogg, AudioFormat::Webm, AudioFormat::M4a],
			target_sample_rate: 16_000,
			silence_rms_threshold: 0.01,
			silence_frame_ms: 30,
			max_plausible_ratio: 10.0,
		}
	}
}

/// Transformation steps applied to a blob, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OptimizationTag {
	FormatConversion,
	Compression,
	NoOptimizationNeeded,
	OptimizationFailed,
}

impl OptimizationTag {
	#[must_use]
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::FormatConversion => "format-conversion",
			Self::Compression => "compression",
			Self::NoOptimizationNeeded => "no-optimization-needed",
			Self::OptimizationFailed => "optimization-failed",
		}
	}
}

impl fmt::Display for OptimizationTag {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Outcome of an optimization pass over one blob.
///
/// Invariants are enforced by the constructors: a transformation tag
/// implies the optimized payload is no larger than the original, a
/// failure hands back the original allocation untouched, and the ratio
/// never drops below 1.
#[derive(Debug, Clone)]
pub struct OptimizationResult {
	original: AudioBlob,
	optimized: AudioBlob,
	compression_ratio: f64,
	cost_savings_units: f64,
	applied: Vec<OptimizationTag>,
}

impl OptimizationResult {
	fn unchanged(blob: &AudioBlob) -> Self {
		Self {
			original: Arc::clone(blob),
			optimized: Arc::clone(blob),
			compression_ratio: 1.0,
			cost_savings_units: 0.0,
			applied: vec![OptimizationTag::NoOptimizationNeeded],
		}
	}

	fn failed(blob: &AudioBlob) -> Self {
		Self {
			original: Arc::clone(blob),
			optimized: Arc::clone(blob),
			compression_ratio: 1.0,
			cost_savings_units: 0.0,
			applied: vec![OptimizationTag::OptimizationFailed],
		}
	}

	fn transformed(original: &AudioBlob, optimized: Vec<u8>, cost_savings_units: f64, applied: Vec<OptimizationTag>) -> Self {
		debug_assert!(!applied.is_empty());
		debug_assert!(optimized.len() <= original.len());
		let compression_ratio = original.len() as f64 / optimized.len().max(1) as f64;
		Self {
			original: Arc::clone(original),
			optimized: Arc::new(optimized),
			compression_ratio,
			cost_savings_units: cost_savings_units.max(0.0),
			applied,
		}
	}

	#[must_use]
	pub fn original(&self) -> &AudioBlob {
		&self.original
	}

	/// Payload to fingerprint and send onward. Same allocation as
	/// `original` when nothing was applied.
	#[must_use]
	pub fn optimized(&self) -> &AudioBlob {
		&self.optimized
	}

	#[must_use]
	pub fn compression_ratio(&self) -> f64 {
		self.compression_ratio
	}

	#[must_use]
	pub fn cost_savings_units(&self) -> f64 {
		self.cost_savings_units
	}

	#[must_use]
	pub fn applied(&self) -> &[OptimizationTag] {
		&self.applied
	}

	/// True when at least one transformation actually fired.
	#[must_use]
	pub fn was_modified(&self) -> bool {
		self.applied.iter().any(|tag| matches!(tag, OptimizationTag::FormatConversion | OptimizationTag::Compression))
	}
}

#[derive(Debug, Error)]
enum TransformError {
	#[error("no transform available for {0} input")]
	Unsupported(AudioFormat),
	#[error("wav decode failed: {0}")]
	Decode(#[from] hound::Error),
	#[error("{ratio:.1}x compression failed verification")]
	ImplausibleRatio { ratio: f64 },
}

/// Decides whether a clip is worth transforming before transcription and
/// applies the cheap transformations we can do in-process.
#[derive(Debug, Clone)]
pub struct AudioOptimizer {
	config: OptimizerConfig,
}

impl AudioOptimizer {
	#[must_use]
	pub fn new(config: OptimizerConfig) -> Self {
		Self { config }
	}

	#[must_use]
	pub fn with_defaults() -> Self {
		Self::new(OptimizerConfig::default())
	}

	#[must_use]
	pub fn config(&self) -> &OptimizerConfig {
		&self.config
	}

	/// Inspect a blob without touching its bytes.
	#[must_use]
	pub fn analyze(&self, bytes: &[u8]) -> AudioAnalysis {
		AudioAnalysis::of(bytes, &self.config)
	}

	/// Produce the cheapest equivalent of `blob` we can.
	///
	/// Never raises: a failing transformation step hands the original
	/// blob back tagged `optimization-failed` and the pipeline proceeds
	/// with the unmodified bytes.
	#[must_use]
	pub fn optimize(&self, blob: &AudioBlob) -> OptimizationResult {
		let analysis = self.analyze(blob);
		if !analysis.needs_optimization {
			debug!(size_bytes = analysis.size_bytes, format = %analysis.format, "blob already optimal");
			return OptimizationResult::unchanged(blob);
		}

		match self.transform(blob, &analysis) {
			Ok(result) => result,
			Err(error) => {
				warn!(format = %analysis.format, size_bytes = analysis.size_bytes, %error, "optimization failed, passing original through");
				OptimizationResult::failed(blob)
			}
		}
	}

	fn transform(&self, blob: &AudioBlob, analysis: &AudioAnalysis) -> Result<OptimizationResult, TransformError> {
		if analysis.format != AudioFormat::Wav {
			return Err(TransformError::Unsupported(analysis.format));
		}

		let decoded = wav::decode(blob)?;
		let mut applied = Vec::new();

		// Step 1: format-conversion — mono, target rate, 16-bit PCM.
		let needs_conversion = decoded.channels > 1 || decoded.sample_rate != self.config.target_sample_rate || decoded.bits_per_sample != 16;
		let mut samples = wav::downmix(&decoded.samples, decoded.channels);
		let mut sample_rate = decoded.sample_rate;
		if sample_rate != self.config.target_sample_rate {
			samples = wav::resample(&samples, sample_rate, self.config.target_sample_rate);
			sample_rate = self.config.target_sample_rate;
		}
		if needs_conversion {
			applied.push(OptimizationTag::FormatConversion);
		}

		// Step 2: compression — drop leading/trailing silence.
		if let Some(range) = wav::voiced_range(&samples, sample_rate, self.config.silence_frame_ms, self.config.silence_rms_threshold) {
			if range.len() < samples.len() {
				samples = samples[range].to_vec();
				applied.push(OptimizationTag::Compression);
			}
		}

		let encoded = wav::encode_mono16(&samples, sample_rate)?;
		if applied.is_empty() || encoded.len() >= blob.len() {
			// Nothing fired, or the rewrite did not actually shrink the
			// payload; keep the original so the ratio invariant holds.
			return Ok(OptimizationResult::unchanged(blob));
		}

		let ratio = blob.len() as f64 / encoded.len() as f64;
		if ratio > self.config.max_plausible_ratio {
			wav::decode(&encoded).map_err(|_| TransformError::ImplausibleRatio { ratio })?;
		}

		let optimized_cost = cost_units(samples.len() as f64 / f64::from(sample_rate), encoded.len());
		let savings = analysis.estimated_cost_units - optimized_cost;

		debug!(
			original_bytes = blob.len(),
			optimized_bytes = encoded.len(),
			ratio = format!("{ratio:.2}"),
			steps = applied.len(),
			"blob optimized"
		);

		Ok(OptimizationResult::transformed(blob, encoded, savings, applied))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::wav::tests::{encode_pcm16, sine_i16};

	fn blob(bytes: Vec<u8>) -> AudioBlob {
		Arc::new(bytes)
	}

	#[test]
	fn preferred_small_blob_is_left_alone() {
		let mut bytes = b"ID3\x03\x00\x00\x00".to_vec();
		bytes.resize(4_000, 0);
		let blob = blob(bytes);

		let result = AudioOptimizer::with_defaults().optimize(&blob);

		assert_eq!(result.applied(), &[OptimizationTag::NoOptimizationNeeded]);
		assert!((result.compression_ratio() - 1.0).abs() < f64::EPSILON);
		assert!(Arc::ptr_eq(result.original(), result.optimized()));
	}

	#[test]
	fn oversized_stereo_wav_is_converted_and_shrinks() {
		// ~2 MB: 44.1 kHz stereo PCM16, mostly tone
		let tone = sine_i16(11.0, 44_100, 0.5);
		let stereo: Vec<i16> = tone.iter().flat_map(|&s| [s, s]).collect();
		let blob = blob(encode_pcm16(&stereo, 2, 44_100));
		assert!(blob.len() > 1024 * 1024);

		let result = AudioOptimizer::with_defaults().optimize(&blob);

		assert!(result.was_modified());
		assert!(result.applied().contains(&OptimizationTag::FormatConversion));
		assert!(result.compression_ratio() > 1.0);
		assert!(result.cost_savings_units() > 0.0);
		assert!(result.optimized().len() < result.original().len());
	}

	#[test]
	fn silence_padding_triggers_the_compression_step() {
		let rate = 16_000;
		let mut samples = vec![0i16; rate as usize * 2];
		samples.extend(sine_i16(1.0, rate, 0.5));
		samples.extend(vec![0i16; rate as usize * 2]);
		let blob = blob(encode_pcm16(&samples, 1, rate));

		let result = AudioOptimizer::with_defaults().optimize(&blob);

		assert!(result.applied().contains(&OptimizationTag::Compression));
		assert!(result.compression_ratio() > 1.0);
	}

	#[test]
	fn corrupt_wav_falls_back_to_the_original_allocation() {
		let mut bytes = encode_pcm16(&sine_i16(0.2, 16_000, 0.5), 1, 16_000);
		bytes.truncate(30); // valid magic, broken body
		bytes.resize(3 * 1024 * 1024, 0xAB); // and over the size threshold
		let blob = blob(bytes);

		let result = AudioOptimizer::with_defaults().optimize(&blob);

		assert_eq!(result.applied(), &[OptimizationTag::OptimizationFailed]);
		assert!(Arc::ptr_eq(result.original(), result.optimized()));
		assert!((result.compression_ratio() - 1.0).abs() < f64::EPSILON);
	}

	#[test]
	fn non_wav_unpreferred_input_cannot_be_transcoded() {
		let mut bytes = b"fLaC\x00\x00\x00\x22".to_vec();
		bytes.resize(2 * 1024 * 1024, 1);
		let blob = blob(bytes);

		let result = AudioOptimizer::with_defaults().optimize(&blob);

		assert_eq!(result.applied(), &[OptimizationTag::OptimizationFailed]);
		assert!(Arc::ptr_eq(result.original(), result.optimized()));
	}

	#[test]
	fn implausible_ratio_is_accepted_when_the_payload_verifies() {
		// Nearly all silence: the trim alone shrinks the clip far past 10x,
		// which must pass because the optimized payload still decodes.
		let rate = 16_000;
		let mut samples = vec![0i16; rate as usize * 20];
		samples.extend(sine_i16(0.5, rate, 0.5));
		samples.extend(vec![0i16; rate as usize * 20]);
		let blob = blob(encode_pcm16(&samples, 1, rate));

		let result = AudioOptimizer::with_defaults().optimize(&blob);

		assert!(result.compression_ratio() > 10.0);
		assert!(result.applied().contains(&OptimizationTag::Compression));
	}
}

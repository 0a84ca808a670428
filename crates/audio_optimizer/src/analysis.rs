use crate::format::AudioFormat;
use crate::optimizer::OptimizerConfig;
use crate::wav;
use serde::{Deserialize, Serialize};

/// Billing weight per second of audio sent to the transcription service.
pub const COST_UNITS_PER_SECOND: f64 = 1.0;

/// Billing weight per megabyte of payload transferred.
pub const COST_UNITS_PER_MEGABYTE: f64 = 0.25;

/// Fallback byte rate for clips whose duration cannot be derived from
/// headers or a bitrate assumption.
const DEFAULT_BYTES_PER_SECOND: f64 = 32_000.0;

const BYTES_PER_MEGABYTE: f64 = 1024.0 * 1024.0;

/// One-shot inspection of a submitted clip. Created per submission,
/// never mutated, discarded after use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioAnalysis {
	pub size_bytes: usize,
	pub format: AudioFormat,
	pub duration_seconds: f64,
	pub estimated_cost_units: f64,
	pub needs_optimization: bool,
}

impl AudioAnalysis {
	/// Inspect `bytes` against the optimizer's thresholds.
	///
	/// Never fails: corrupt or unrecognized input degrades to
	/// `AudioFormat::Unknown` with a conservative duration estimate.
	#[must_use]
	pub fn of(bytes: &[u8], config: &OptimizerConfig) -> Self {
		let format = AudioFormat::detect(bytes);
		let duration_seconds = estimate_duration(bytes, format);
		let estimated_cost_units = cost_units(duration_seconds, bytes.len());
		let needs_optimization = bytes.len() > config.max_size_bytes || !config.preferred_formats.contains(&format);

		Self {
			size_bytes: bytes.len(),
			format,
			duration_seconds,
			estimated_cost_units,
			needs_optimization,
		}
	}
}

/// Estimated service charge for a clip of this duration and size.
#[must_use]
pub(crate) fn cost_units(duration_seconds: f64, size_bytes: usize) -> f64 {
	duration_seconds.max(0.0) * COST_UNITS_PER_SECOND + (size_bytes as f64 / BYTES_PER_MEGABYTE) * COST_UNITS_PER_MEGABYTE
}

fn estimate_duration(bytes: &[u8], format: AudioFormat) -> f64 {
	match format {
		AudioFormat::Wav => wav::duration_seconds(bytes).unwrap_or_else(|| bytes.len() as f64 / DEFAULT_BYTES_PER_SECOND),
		_ => match format.assumed_bitrate() {
			Some(bitrate) => (bytes.len() as f64 * 8.0) / f64::from(bitrate),
			None => bytes.len() as f64 / DEFAULT_BYTES_PER_SECOND,
		},
	}
}

use std::io::Cursor;
use std::ops::Range;

/// PCM payload of a decoded WAV container, interleaved when multi-channel.
pub(crate) struct DecodedWav {
	pub samples: Vec<f32>,
	pub channels: u16,
	pub sample_rate: u32,
	pub bits_per_sample: u16,
}

/// Clip length in seconds, straight from the container header.
/// `None` when the header does not parse.
pub(crate) fn duration_seconds(bytes: &[u8]) -> Option<f64> {
	let reader = hound::WavReader::new(Cursor::new(bytes)).ok()?;
	let spec = reader.spec();
	if spec.sample_rate == 0 {
		return None;
	}
	Some(f64::from(reader.duration()) / f64::from(spec.sample_rate))
}

pub(crate) fn decode(bytes: &[u8]) -> Result<DecodedWav, hound::Error> {
	let mut reader = hound::WavReader::new(Cursor::new(bytes))?;
	let spec = reader.spec();

	let samples = match spec.sample_format {
		hound::SampleFormat::Float => reader.samples::<f32>().collect::<Result<Vec<_>, _>>()?,
		hound::SampleFormat::Int => {
			let scale = (1_i64 << (spec.bits_per_sample - 1)) as f32;
			reader
				.samples::<i32>()
				.map(|s| s.map(|v| v as f32 / scale))
				.collect::<Result<Vec<_>, _>>()?
		}
	};

	Ok(DecodedWav {
		samples,
		channels: spec.channels,
		sample_rate: spec.sample_rate,
		bits_per_sample: spec.bits_per_sample,
	})
}

/// Encode mono samples as 16-bit PCM, the cheapest representation the
/// transcription service accepts.
pub(crate) fn encode_mono16(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>, hound::Error> {
	let spec = hound::WavSpec {
		channels: 1,
		sample_rate,
		bits_per_sample: 16,
		sample_format: hound::SampleFormat::Int,
	};

	let mut bytes = Vec::new();
	let mut writer = hound::WavWriter::new(Cursor::new(&mut bytes), spec)?;
	for &sample in samples {
		writer.write_sample((sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16)?;
	}
	writer.finalize()?;

	Ok(bytes)
}

/// Collapse interleaved channels into mono by averaging each frame.
pub(crate) fn downmix(interleaved: &[f32], channels: u16) -> Vec<f32> {
	if channels <= 1 {
		return interleaved.to_vec();
	}
	let channels = usize::from(channels);
	interleaved
		.chunks_exact(channels)
		.map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
		.collect()
}

/// Nearest-neighbor resampler. Good enough for speech headed to a
/// transcription model; anything fancier buys nothing here.
pub(crate) fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
	if from_rate == to_rate || samples.is_empty() {
		return samples.to_vec();
	}

	let step = f64::from(from_rate) / f64::from(to_rate);
	let output_len = (samples.len() as f64 / step) as usize;

	(0..output_len)
		.map(|i| {
			let source = (i as f64 * step) as usize;
			samples.get(source).copied().unwrap_or(0.0)
		})
		.collect()
}

/// Sample range that carries signal, judged by per-frame RMS energy
/// against `rms_threshold`, padded by one frame on each side.
///
/// `None` when no frame clears the threshold (all-silence clips are left
/// alone rather than trimmed to nothing).
pub(crate) fn voiced_range(samples: &[f32], sample_rate: u32, frame_ms: u32, rms_threshold: f32) -> Option<Range<usize>> {
	let frame_len = (sample_rate as usize * frame_ms as usize) / 1000;
	if frame_len == 0 || samples.is_empty() {
		return None;
	}

	let mut first = None;
	let mut last = None;
	for (index, frame) in samples.chunks(frame_len).enumerate() {
		let energy = (frame.iter().map(|s| f64::from(*s) * f64::from(*s)).sum::<f64>() / frame.len() as f64).sqrt();
		if energy >= f64::from(rms_threshold) {
			if first.is_none() {
				first = Some(index);
			}
			last = Some(index);
		}
	}

	let (first, last) = (first?, last?);
	let start = first.saturating_sub(1) * frame_len;
	let end = ((last + 2) * frame_len).min(samples.len());
	Some(start..end)
}

use serde::{Deserialize, Serialize};
use std::fmt;

/// Container format of a submitted clip, detected from magic bytes only.
///
/// Anything we cannot positively identify is `Unknown`; callers branch on
/// that instead of special-casing every concrete format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
	Wav,
	Mp3,
	Webm,
	Ogg,
	Flac,
	M4a,
	Unknown,
}

impl AudioFormat {
	/// Identify the container from its leading bytes.
	#[must_use]
	pub fn detect(bytes: &[u8]) -> Self {
		if bytes.len() >= 12 && bytes.starts_with(b"RIFF") && &bytes[8..12] == b"WAVE" {
			return Self::Wav;
		}
		if bytes.starts_with(b"ID3") || bytes.starts_with(&[0xFF, 0xFB]) || bytes.starts_with(&[0xFF, 0xF3]) {
			return Self::Mp3;
		}
		if bytes.starts_with(b"fLaC") {
			return Self::Flac;
		}
		if bytes.starts_with(b"OggS") {
			return Self::Ogg;
		}
		if bytes.starts_with(&[0x1A, 0x45, 0xDF, 0xA3]) {
			return Self::Webm;
		}
		if bytes.len() >= 8 && &bytes[4..8] == b"ftyp" {
			return Self::M4a;
		}
		Self::Unknown
	}

	/// Typical encoded bitrate in bits per second, used to estimate the
	/// duration of compressed clips whose headers we do not parse.
	#[must_use]
	pub const fn assumed_bitrate(self) -> Option<u32> {
		match self {
			Self::Mp3 | Self::M4a => Some(128_000),
			Self::Ogg => Some(96_000),
			Self::Webm => Some(64_000),
			Self::Flac => Some(900_000),
			Self::Wav | Self::Unknown => None,
		}
	}

	#[must_use]
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Wav => "wav",
			Self::Mp3 => "mp3",
			Self::Webm => "webm",
			Self::Ogg => "ogg",
			Self::Flac => "flac",
			Self::M4a => "m4a",
			Self::Unknown => "unknown",
		}
	}
}

impl fmt::Display for AudioFormat {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

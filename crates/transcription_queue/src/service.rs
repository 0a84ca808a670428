use async_trait::async_trait;
use audio_optimizer::AudioFormat;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;

/// Successful response from the external transcription service.
#[derive(Debug, Clone, PartialEq)]
pub struct Transcription {
	pub transcript: String,
	pub confidence: f64,
}

/// Failure taxonomy of the external service. Transient failures are
/// retried with backoff; `InvalidAudio` fails fast so a bad clip never
/// burns the retry budget.
#[derive(Error, Debug)]
pub enum ServiceError {
	#[error("network failure: {0}")]
	Network(String),
	#[error("service backend failure: {0}")]
	Backend(String),
	#[error("rate limited by the transcription service")]
	RateLimited,
	#[error("unsupported or corrupt audio: {0}")]
	InvalidAudio(String),
}

impl ServiceError {
	#[must_use]
	pub const fn is_transient(&self) -> bool {
		!matches!(self, Self::InvalidAudio(_))
	}
}

/// The external transcription collaborator: one audio payload in,
/// transcript and confidence out. Slow, rate-limited and costed — the
/// batch processor is responsible for calling it as rarely as possible.
#[async_trait]
pub trait TranscriptionService: Send + Sync {
	async fn transcribe(&self, audio: &[u8], format_hint: AudioFormat) -> Result<Transcription, ServiceError>;
}

/// Scripted behavior for one `SimulatedService` call.
#[derive(Debug, Clone, Copy)]
pub enum SimulatedOutcome {
	Succeed,
	SucceedWith { confidence: f64 },
	FailTransient,
	FailPermanent,
	/// Never respond within any sane deadline; exercises the timeout path.
	Stall,
}

/// Deterministic stand-in for the remote service, used by tests and the
/// demo binary. Behavior is driven by a script of outcomes (exhausted
/// script means plain success) and every call is recorded so tests can
/// assert exact call counts, payload sizes and the concurrency ceiling.
pub struct SimulatedService {
	latency: Duration,
	confidence: f64,
	script: Mutex<VecDeque<SimulatedOutcome>>,
	calls: AtomicU64,
	in_flight: AtomicU64,
	max_in_flight: AtomicU64,
	payload_sizes: Mutex<Vec<usize>>,
}

impl SimulatedService {
	#[must_use]
	pub fn new(latency: Duration, confidence: f64) -> Self {
		Self {
			latency,
			confidence,
			script: Mutex::new(VecDeque::new()),
			calls: AtomicU64::new(0),
			in_flight: AtomicU64::new(0),
			max_in_flight: AtomicU64::new(0),
			payload_sizes: Mutex::new(Vec::new()),
		}
	}

	#[must_use]
	pub fn with_script(latency: Duration, confidence: f64, steps: impl IntoIterator<Item = SimulatedOutcome>) -> Self {
		let service = Self::new(latency, confidence);
		service.script.lock().unwrap().extend(steps);
		service
	}

	/// Total calls received so far.
	#[must_use]
	pub fn calls(&self) -> u64 {
		self.calls.load(Ordering::Relaxed)
	}

	/// Highest number of simultaneously in-flight calls observed.
	#[must_use]
	pub fn max_in_flight(&self) -> u64 {
		self.max_in_flight.load(Ordering::Relaxed)
	}

	/// Payload sizes in call order.
	#[must_use]
	pub fn payload_sizes(&self) -> Vec<usize> {
		self.payload_sizes.lock().unwrap().clone()
	}
}

/// Decrements the in-flight gauge even when the caller's timeout drops
/// the future mid-call.
struct InFlightGuard<'a>(&'a AtomicU64);

impl Drop for InFlightGuard<'_> {
	fn drop(&mut self) {
		self.0.fetch_sub(1, Ordering::Relaxed);
	}
}

fn transcript_for(audio: &[u8]) -> String {
	let mut acc: u64 = 17;
	for &byte in audio {
		acc = acc.wrapping_mul(31).wrapping_add(u64::from(byte));
	}
	format!("simulated order {:08x} ({} bytes)", acc as u32, audio.len())
}

#[async_trait]
impl TranscriptionService for SimulatedService {
	async fn transcribe(&self, audio: &[u8], _format_hint: AudioFormat) -> Result<Transcription, ServiceError> {
		self.calls.fetch_add(1, Ordering::Relaxed);
		let current = self.in_flight.fetch_add(1, Ordering::Relaxed) + 1;
		self.max_in_flight.fetch_max(current, Ordering::Relaxed);
		let _guard = InFlightGuard(&self.in_flight);

		self.payload_sizes.lock().unwrap().push(audio.len());
		let step = self.script.lock().unwrap().pop_front().unwrap_or(SimulatedOutcome::Succeed);

		match step {
			SimulatedOutcome::Stall => {
				tokio::time::sleep(Duration::from_secs(3600)).await;
				Err(ServiceError::Network("stalled call finally gave up".into()))
			}
			SimulatedOutcome::Succeed => {
				tokio::time::sleep(self.latency).await;
				Ok(Transcription {
					transcript: transcript_for(audio),
					confidence: self.confidence,
				})
			}
			SimulatedOutcome::SucceedWith { confidence } => {
				tokio::time::sleep(self.latency).await;
				Ok(Transcription {
					transcript: transcript_for(audio),
					confidence,
				})
			}
			SimulatedOutcome::FailTransient => {
				tokio::time::sleep(self.latency).await;
				Err(ServiceError::Backend("simulated transient failure".into()))
			}
			SimulatedOutcome::FailPermanent => {
				tokio::time::sleep(self.latency).await;
				Err(ServiceError::InvalidAudio("simulated unsupported input".into()))
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn invalid_audio_is_the_only_permanent_kind() {
		assert!(ServiceError::Network("n".into()).is_transient());
		assert!(ServiceError::Backend("b".into()).is_transient());
		assert!(ServiceError::RateLimited.is_transient());
		assert!(!ServiceError::InvalidAudio("bad".into()).is_transient());
	}

	#[tokio::test]
	async fn simulated_transcripts_are_stable_per_payload() {
		let service = SimulatedService::new(Duration::ZERO, 0.95);
		let first = service.transcribe(b"clip", AudioFormat::Wav).await.unwrap();
		let second = service.transcribe(b"clip", AudioFormat::Wav).await.unwrap();
		let other = service.transcribe(b"other clip", AudioFormat::Wav).await.unwrap();

		assert_eq!(first.transcript, second.transcript);
		assert_ne!(first.transcript, other.transcript);
		assert_eq!(service.calls(), 3);
		assert_eq!(service.payload_sizes(), vec![4, 4, 10]);
	}

	#[tokio::test]
	async fn script_steps_are_consumed_in_order() {
		let service = SimulatedService::with_script(Duration::ZERO, 0.95, [SimulatedOutcome::FailTransient, SimulatedOutcome::Succeed]);
		assert!(service.transcribe(b"clip", AudioFormat::Wav).await.is_err());
		assert!(service.transcribe(b"clip", AudioFormat::Wav).await.is_ok());
		// exhausted script falls back to success
		assert!(service.transcribe(b"clip", AudioFormat::Wav).await.is_ok());
	}
}

use crate::config::backoff_delay;
use crate::job::{JobId, JobOutcome, JobStatus};
use crate::pool::{Shared, REQUEST_OVERHEAD_UNITS};
use crate::queue::PendingJob;
use crate::service::ServiceError;
use audio_optimizer::{AudioBlob, AudioFormat, OptimizationResult};
use std::fmt;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use transcription_cache::{AudioFingerprint, TranscriptionCache};

/// One worker of the bounded pool. Claims a job, runs it through
/// optimize → fingerprint → cache → (external call), and parks on the
/// wakeup notifier when the queue is empty.
pub(crate) struct Worker {
	id: usize,
	shared: Arc<Shared>,
}

enum AttemptFailure {
	Timeout,
	Service(ServiceError),
}

impl fmt::Display for AttemptFailure {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Timeout => f.write_str("external call exceeded its deadline"),
			Self::Service(error) => error.fmt(f),
		}
	}
}

impl Worker {
	pub(crate) fn new(id: usize, shared: Arc<Shared>) -> Self {
		Self { id, shared }
	}

	pub(crate) async fn run(self, cancel: CancellationToken) {
		debug!(worker = self.id, "worker started");

		loop {
			if cancel.is_cancelled() {
				break;
			}

			match self.shared.claim_next() {
				Some(pending) => self.process(pending).await,
				None => {
					tokio::select! {
						() = cancel.cancelled() => break,
						() = self.shared.wakeup.notified() => {}
					}
				}
			}
		}

		debug!(worker = self.id, "worker stopped");
	}

	async fn process(&self, pending: PendingJob) {
		let id = pending.id;
		let Some((blob, format_hint)) = self.shared.job_inputs(id) else {
			return;
		};
		self.shared.mark_started(id);

		let optimization = self.shared.optimizer.optimize(&blob);
		let payload = Arc::clone(optimization.optimized());
		let fingerprint = TranscriptionCache::fingerprint(&payload);

		if let Some(entry) = self.shared.cache.get(&fingerprint) {
			let avoided = self.shared.optimizer.analyze(&payload).estimated_cost_units + REQUEST_OVERHEAD_UNITS;
			self.shared.cache.record_cost_saving(avoided);
			debug!(worker = self.id, job = %id, usage_count = entry.usage_count, "cache hit, external call skipped");

			self.shared.complete(
				id,
				JobOutcome {
					job_id: id,
					status: JobStatus::Succeeded,
					transcript: Some(entry.transcript),
					confidence: Some(entry.confidence),
					from_cache: true,
					optimization,
					cost_units: 0.0,
					attempts: 0,
					error: None,
				},
			);
			return;
		}

		// Advisory near-duplicate path: only when enabled, only when the
		// match clears the (stricter) acceptance score, and never in place
		// of the exact lookup above.
		if self.shared.config.accept_similar {
			if let Some(candidate) = self.shared.cache.find_similar(&payload, 1).into_iter().next() {
				if f64::from(candidate.score) >= self.shared.config.similarity_acceptance {
					let avoided = self.shared.optimizer.analyze(&payload).estimated_cost_units + REQUEST_OVERHEAD_UNITS;
					self.shared.cache.record_cost_saving(avoided);
					debug!(worker = self.id, job = %id, score = candidate.score, "near-duplicate accepted from cache");

					self.shared.complete(
						id,
						JobOutcome {
							job_id: id,
							status: JobStatus::Succeeded,
							transcript: Some(candidate.entry.transcript),
							confidence: Some(candidate.entry.confidence),
							from_cache: true,
							optimization,
							cost_units: 0.0,
							attempts: 0,
							error: None,
						},
					);
					return;
				}
			}
		}

		self.transcribe_with_retries(id, &payload, fingerprint, optimization, format_hint).await;
	}

	async fn transcribe_with_retries(&self, id: JobId, payload: &AudioBlob, fingerprint: AudioFingerprint, optimization: OptimizationResult, format_hint: AudioFormat) {
		let cost_per_call = self.shared.optimizer.analyze(payload).estimated_cost_units + REQUEST_OVERHEAD_UNITS;
		let max_attempts = self.shared.config.max_attempts;
		self.shared.totals.external_jobs.fetch_add(1, Ordering::Relaxed);

		let mut attempt = 0_u32;
		loop {
			attempt += 1;
			self.shared.record_attempt(id, attempt);
			self.shared.totals.external_calls.fetch_add(1, Ordering::Relaxed);

			// The deadline bounds only this call; dropping the future on
			// timeout cancels the in-flight request without touching any
			// other running job.
			let outcome = tokio::select! {
				() = sleep(self.shared.config.job_timeout) => Err(AttemptFailure::Timeout),
				result = self.shared.service.transcribe(payload, format_hint) => result.map_err(AttemptFailure::Service),
			};

			match outcome {
				Ok(transcription) => {
					let put = self.shared.cache.put(
						fingerprint.clone(),
						TranscriptionCache::signature(payload),
						transcription.transcript.clone(),
						transcription.confidence,
					);
					if !put.is_stored() {
						debug!(job = %id, confidence = transcription.confidence, "transcript delivered but below cache acceptance threshold");
					}

					self.shared.complete(
						id,
						JobOutcome {
							job_id: id,
							status: JobStatus::Succeeded,
							transcript: Some(transcription.transcript),
							confidence: Some(transcription.confidence),
							from_cache: false,
							optimization,
							cost_units: cost_per_call,
							attempts: attempt,
							error: None,
						},
					);
					return;
				}
				Err(AttemptFailure::Service(error)) if !error.is_transient() => {
					// Bad input: fail fast, no retry budget spent on it.
					warn!(worker = self.id, job = %id, %error, "permanent input failure");
					self.shared.complete(
						id,
						JobOutcome {
							job_id: id,
							status: JobStatus::Failed,
							transcript: None,
							confidence: None,
							from_cache: false,
							optimization,
							cost_units: 0.0,
							attempts: attempt,
							error: Some(error.to_string()),
						},
					);
					return;
				}
				Err(failure) => {
					let error_text = failure.to_string();
					if attempt >= max_attempts {
						let status = if matches!(failure, AttemptFailure::Timeout) { JobStatus::TimedOut } else { JobStatus::Failed };
						warn!(worker = self.id, job = %id, attempts = attempt, %status, error = %error_text, "job exhausted its attempts");
						self.shared.complete(
							id,
							JobOutcome {
								job_id: id,
								status,
								transcript: None,
								confidence: None,
								from_cache: false,
								optimization,
								cost_units: 0.0,
								attempts: attempt,
								error: Some(error_text),
							},
						);
						return;
					}

					let delay = backoff_delay(self.shared.config.retry_initial_delay, self.shared.config.retry_max_delay, attempt);
					debug!(
						worker = self.id,
						job = %id,
						attempt,
						max_attempts,
						delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
						error = %error_text,
						"transient failure, backing off"
					);
					self.shared.note_error(id, &error_text);
					self.shared.transition(id, JobStatus::Retrying);
					sleep(delay).await;
					self.shared.transition(id, JobStatus::Running);
				}
			}
		}
	}
}

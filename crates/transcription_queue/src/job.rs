use audio_optimizer::{AudioBlob, AudioFormat, OptimizationResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Opaque handle returned by `submit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(Uuid);

impl JobId {
	pub(crate) fn new() -> Self {
		Self(Uuid::new_v4())
	}
}

impl fmt::Display for JobId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		self.0.fmt(f)
	}
}

/// Lifecycle of a job. Transitions are one-directional except the
/// `Running -> Retrying -> Running` cycle, bounded by the attempt limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobStatus {
	Queued,
	Running,
	Retrying,
	Succeeded,
	Failed,
	TimedOut,
}

impl JobStatus {
	#[must_use]
	pub const fn is_terminal(self) -> bool {
		matches!(self, Self::Succeeded | Self::Failed | Self::TimedOut)
	}

	#[must_use]
	pub const fn can_transition_to(self, next: Self) -> bool {
		matches!(
			(self, next),
			(Self::Queued, Self::Running)
				| (Self::Running, Self::Retrying | Self::Succeeded | Self::Failed | Self::TimedOut)
				| (Self::Retrying, Self::Running)
		)
	}

	#[must_use]
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Queued => "queued",
			Self::Running => "running",
			Self::Retrying => "retrying",
			Self::Succeeded => "succeeded",
			Self::Failed => "failed",
			Self::TimedOut => "timed-out",
		}
	}
}

impl fmt::Display for JobStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Per-submission options. Scheduling mode is a processor-wide choice;
/// the hint only spares the service a second format sniff.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubmitOptions {
	pub format_hint: Option<AudioFormat>,
}

/// What `await_result` hands back once a job is terminal.
#[derive(Debug, Clone)]
pub struct JobOutcome {
	pub job_id: JobId,
	pub status: JobStatus,
	pub transcript: Option<String>,
	pub confidence: Option<f64>,
	pub from_cache: bool,
	pub optimization: OptimizationResult,
	pub cost_units: f64,
	pub attempts: u32,
	pub error: Option<String>,
}

/// Processor-internal bookkeeping for one submission. Owned exclusively
/// by the batch processor for the job's lifetime.
pub(crate) struct BatchJob {
	pub(crate) id: JobId,
	pub(crate) blob: AudioBlob,
	pub(crate) seq: u64,
	pub(crate) estimated_duration: Duration,
	pub(crate) format_hint: AudioFormat,
	pub(crate) status: JobStatus,
	pub(crate) attempts: u32,
	pub(crate) error: Option<String>,
	#[allow(dead_code)]
	pub(crate) submitted_at: DateTime<Utc>,
	pub(crate) started_at: Option<Instant>,
	pub(crate) finished_at: Option<Instant>,
	pub(crate) outcome: Option<JobOutcome>,
}

impl BatchJob {
	pub(crate) fn new(id: JobId, blob: AudioBlob, seq: u64, estimated_duration: Duration, format_hint: AudioFormat) -> Self {
		Self {
			id,
			blob,
			seq,
			estimated_duration,
			format_hint,
			status: JobStatus::Queued,
			attempts: 0,
			error: None,
			submitted_at: Utc::now(),
			started_at: None,
			finished_at: None,
			outcome: None,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn terminal_states_accept_no_transitions() {
		for terminal in [JobStatus::Succeeded, JobStatus::Failed, JobStatus::TimedOut] {
			assert!(terminal.is_terminal());
			for next in [JobStatus::Queued, JobStatus::Running, JobStatus::Retrying, JobStatus::Succeeded] {
				assert!(!terminal.can_transition_to(next));
			}
		}
	}

	#[test]
	fn retry_cycle_is_the_only_loop() {
		assert!(JobStatus::Running.can_transition_to(JobStatus::Retrying));
		assert!(JobStatus::Retrying.can_transition_to(JobStatus::Running));
		assert!(!JobStatus::Retrying.can_transition_to(JobStatus::Failed));
		assert!(!JobStatus::Queued.can_transition_to(JobStatus::Retrying));
	}

	#[test]
	fn timed_out_is_distinguishable_from_failed() {
		assert_ne!(JobStatus::TimedOut, JobStatus::Failed);
		assert_eq!(JobStatus::TimedOut.as_str(), "timed-out");
	}
}

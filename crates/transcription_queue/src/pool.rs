use crate::config::Config;
use crate::error::QueueError;
use crate::job::{BatchJob, JobId, JobOutcome, JobStatus, SubmitOptions};
use crate::queue::{PendingJob, PendingQueue};
use crate::service::TranscriptionService;
use crate::worker::Worker;
use audio_optimizer::{AudioBlob, AudioFormat, AudioOptimizer};
use dashmap::DashMap;
use prometheus::{Counter, Gauge, Registry};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{watch, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use transcription_cache::TranscriptionCache;

/// Fixed service overhead charged per external request (connection setup,
/// auth, request framing), independent of clip length. Jobs resolved from
/// the cache skip it entirely, which is what the overhead-reduction
/// estimate in `stats()` measures.
pub const REQUEST_OVERHEAD_UNITS: f64 = 0.05;

/// Point-in-time view of the queue for callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
	pub queued: u64,
	pub running: u64,
	pub succeeded: u64,
	pub failed: u64,
	pub timed_out: u64,
	pub estimated_time_remaining: Duration,
}

/// Cumulative cost-efficiency numbers since the processor was built.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineStats {
	pub total_processed: u64,
	pub cache_hit_count: u64,
	pub external_calls: u64,
	pub total_cost_units: f64,
	pub overhead_reduction_estimate: f64,
}

pub(crate) struct PoolMetrics {
	pub(crate) active_workers: Counter,
	pub(crate) queue_size: Gauge,
	pub(crate) tasks_processed: Counter,
	pub(crate) task_errors: Counter,
	pub(crate) cache_hits: Counter,
}

impl PoolMetrics {
	fn new(registry: &Registry) -> Self {
		let active_workers = Counter::new("transcription_pool_active_workers", "Number of active workers").unwrap();
		let queue_size = Gauge::new("transcription_pool_queue_size", "Current pending queue size").unwrap();
		let tasks_processed = Counter::new("transcription_pool_jobs_processed", "Total jobs driven to a terminal state").unwrap();
		let task_errors = Counter::new("transcription_pool_job_errors", "Total jobs that failed or timed out").unwrap();
		let cache_hits = Counter::new("transcription_pool_cache_hits", "Jobs resolved from the transcript cache").unwrap();

		registry.register(Box::new(active_workers.clone())).unwrap();
		registry.register(Box::new(queue_size.clone())).unwrap();
		registry.register(Box::new(tasks_processed.clone())).unwrap();
		registry.register(Box::new(task_errors.clone())).unwrap();
		registry.register(Box::new(cache_hits.clone())).unwrap();

		Self {
			active_workers,
			queue_size,
			tasks_processed,
			task_errors,
			cache_hits,
		}
	}
}

/// Per-status occupancy counters backing `progress()`.
#[derive(Default)]
pub(crate) struct StatusCounters {
	queued: AtomicU64,
	running: AtomicU64,
	succeeded: AtomicU64,
	failed: AtomicU64,
	timed_out: AtomicU64,
}

impl StatusCounters {
	fn bucket(&self, status: JobStatus) -> &AtomicU64 {
		match status {
			JobStatus::Queued => &self.queued,
			// a retrying job still occupies its worker slot
			JobStatus::Running | JobStatus::Retrying => &self.running,
			JobStatus::Succeeded => &self.succeeded,
			JobStatus::Failed => &self.failed,
			JobStatus::TimedOut => &self.timed_out,
		}
	}

	fn move_job(&self, from: JobStatus, to: JobStatus) {
		let from_bucket = self.bucket(from);
		let to_bucket = self.bucket(to);
		if std::ptr::eq(from_bucket, to_bucket) {
			return;
		}
		from_bucket.fetch_sub(1, Ordering::Relaxed);
		to_bucket.fetch_add(1, Ordering::Relaxed);
	}
}

#[derive(Default)]
pub(crate) struct Totals {
	pub(crate) processed: AtomicU64,
	pub(crate) cache_hits: AtomicU64,
	pub(crate) external_calls: AtomicU64,
	// jobs that needed at least one external call, for overhead accounting
	pub(crate) external_jobs: AtomicU64,
	// f64 cost kept as integer milli-units so the counter stays atomic
	cost_milli_units: AtomicU64,
}

impl Totals {
	pub(crate) fn add_cost(&self, units: f64) {
		if units > 0.0 {
			self.cost_milli_units.fetch_add((units * 1000.0).round() as u64, Ordering::Relaxed);
		}
	}

	fn cost_units(&self) -> f64 {
		self.cost_milli_units.load(Ordering::Relaxed) as f64 / 1000.0
	}
}

pub(crate) struct JobRecord {
	pub(crate) job: BatchJob,
	status_tx: watch::Sender<JobStatus>,
	status_rx: watch::Receiver<JobStatus>,
}

/// State shared between the processor facade and its workers.
pub(crate) struct Shared {
	pub(crate) config: Config,
	pub(crate) optimizer: AudioOptimizer,
	pub(crate) cache: Arc<TranscriptionCache>,
	pub(crate) service: Arc<dyn TranscriptionService>,
	pending: Mutex<PendingQueue>,
	pub(crate) wakeup: Notify,
	jobs: DashMap<JobId, JobRecord>,
	seq: AtomicU64,
	counters: StatusCounters,
	pub(crate) totals: Totals,
	recent_durations: Mutex<VecDeque<Duration>>,
	metrics: PoolMetrics,
}

impl Shared {
	/// Atomically take the next eligible job. Two workers can never claim
	/// the same entry because pop happens under the queue mutex.
	pub(crate) fn claim_next(&self) -> Option<PendingJob> {
		let mut pending = self.pending.lock().unwrap();
		let claimed = pending.pop();
		self.metrics.queue_size.set(pending.len() as f64);
		claimed
	}

	pub(crate) fn job_inputs(&self, id: JobId) -> Option<(AudioBlob, AudioFormat)> {
		let record = self.jobs.get(&id)?;
		Some((Arc::clone(&record.job.blob), record.job.format_hint))
	}

	pub(crate) fn mark_started(&self, id: JobId) {
		if let Some(mut record) = self.jobs.get_mut(&id) {
			if record.job.started_at.is_none() {
				record.job.started_at = Some(Instant::now());
			}
		}
		self.transition(id, JobStatus::Running);
	}

	pub(crate) fn transition(&self, id: JobId, next: JobStatus) {
		if let Some(mut record) = self.jobs.get_mut(&id) {
			let previous = record.job.status;
			debug_assert!(previous.can_transition_to(next), "invalid transition {previous} -> {next}");
			record.job.status = next;
			self.counters.move_job(previous, next);
			let _ = record.status_tx.send_replace(next);
		}
	}

	pub(crate) fn record_attempt(&self, id: JobId, attempt: u32) {
		if let Some(mut record) = self.jobs.get_mut(&id) {
			record.job.attempts = attempt;
		}
	}

	pub(crate) fn note_error(&self, id: JobId, text: &str) {
		if let Some(mut record) = self.jobs.get_mut(&id) {
			record.job.error = Some(text.to_string());
		}
	}

	/// Finish a job: persist its outcome, settle the counters, then flip
	/// the watch channel so `await_result` callers observe a fully
	/// populated record.
	pub(crate) fn complete(&self, id: JobId, outcome: JobOutcome) {
		let status = outcome.status;
		debug_assert!(status.is_terminal());

		let elapsed = {
			let Some(mut record) = self.jobs.get_mut(&id) else { return };
			let now = Instant::now();
			record.job.finished_at = Some(now);
			record.job.error = outcome.error.clone();
			record.job.outcome = Some(outcome.clone());
			record.job.started_at.map(|started| now.duration_since(started))
		};

		if let Some(elapsed) = elapsed {
			let mut window = self.recent_durations.lock().unwrap();
			if window.len() >= self.config.eta_window {
				window.pop_front();
			}
			window.push_back(elapsed);
		}

		self.totals.processed.fetch_add(1, Ordering::Relaxed);
		self.totals.add_cost(outcome.cost_units);
		self.metrics.tasks_processed.inc();
		if outcome.from_cache {
			self.totals.cache_hits.fetch_add(1, Ordering::Relaxed);
			self.metrics.cache_hits.inc();
		}
		if status != JobStatus::Succeeded {
			self.metrics.task_errors.inc();
		}

		self.transition(id, status);
	}
}

/// The batch processor: submissions in, terminal outcomes out, with a
/// bounded pool of workers in between.
pub struct BatchProcessor {
	shared: Arc<Shared>,
	cancel: CancellationToken,
	started: AtomicBool,
}

impl BatchProcessor {
	#[must_use]
	pub fn new(config: Config, optimizer: AudioOptimizer, cache: Arc<TranscriptionCache>, service: Arc<dyn TranscriptionService>, registry: &Registry) -> Self {
		let metrics = PoolMetrics::new(registry);
		let pending = Mutex::new(PendingQueue::new(config.scheduling));

		Self {
			shared: Arc::new(Shared {
				config,
				optimizer,
				cache,
				service,
				pending,
				wakeup: Notify::new(),
				jobs: DashMap::new(),
				seq: AtomicU64::new(0),
				counters: StatusCounters::default(),
				totals: Totals::default(),
				recent_durations: Mutex::new(VecDeque::new()),
				metrics,
			}),
			cancel: CancellationToken::new(),
			started: AtomicBool::new(false),
		}
	}

	/// Spawn the worker pool. Calling it again is a no-op; the pool size
	/// never exceeds `max_concurrency`.
	pub fn start(&self) {
		if self.started.swap(true, Ordering::SeqCst) {
			return;
		}

		info!(
			workers = self.shared.config.max_concurrency,
			scheduling = ?self.shared.config.scheduling,
			"starting transcription worker pool"
		);

		for id in 0..self.shared.config.max_concurrency {
			let worker = Worker::new(id, Arc::clone(&self.shared));
			let token = self.cancel.child_token();
			tokio::spawn(worker.run(token));
			self.shared.metrics.active_workers.inc();
		}
	}

	/// Enqueue a clip. Never blocks on processing; returns immediately
	/// with the job handle.
	pub fn submit(&self, blob: AudioBlob) -> JobId {
		self.submit_with_options(blob, SubmitOptions::default())
	}

	pub fn submit_with_options(&self, blob: AudioBlob, options: SubmitOptions) -> JobId {
		let analysis = self.shared.optimizer.analyze(&blob);
		let id = JobId::new();
		let seq = self.shared.seq.fetch_add(1, Ordering::Relaxed);
		let estimated_duration = Duration::from_secs_f64(analysis.duration_seconds.max(0.0));
		let format_hint = options.format_hint.unwrap_or(analysis.format);

		let (status_tx, status_rx) = watch::channel(JobStatus::Queued);
		let job = BatchJob::new(id, blob, seq, estimated_duration, format_hint);
		self.shared.jobs.insert(id, JobRecord { job, status_tx, status_rx });

		{
			let mut pending = self.shared.pending.lock().unwrap();
			pending.push(PendingJob {
				id,
				seq,
				est_duration_ms: u64::try_from(estimated_duration.as_millis()).unwrap_or(u64::MAX),
			});
			self.shared.metrics.queue_size.set(pending.len() as f64);
		}
		self.shared.counters.queued.fetch_add(1, Ordering::Relaxed);
		self.shared.wakeup.notify_one();

		debug!(job = %id, seq, est_duration_secs = format!("{:.1}", analysis.duration_seconds), format = %analysis.format, "job submitted");
		id
	}

	/// Wait for a job to reach a terminal state and return its outcome.
	///
	/// # Errors
	/// Returns `JobNotFound` for an unknown id, `ResultChannelClosed` if
	/// the processor dropped the job before finishing it.
	pub async fn await_result(&self, job_id: JobId) -> Result<JobOutcome, QueueError> {
		let mut status_rx = {
			let record = self.shared.jobs.get(&job_id).ok_or(QueueError::JobNotFound(job_id))?;
			record.status_rx.clone()
		};

		status_rx.wait_for(|status| status.is_terminal()).await.map_err(|_| QueueError::ResultChannelClosed)?;

		let record = self.shared.jobs.get(&job_id).ok_or(QueueError::JobNotFound(job_id))?;
		record
			.job
			.outcome
			.clone()
			.ok_or_else(|| QueueError::Internal(format!("job {job_id} is terminal but has no outcome")))
	}

	#[must_use]
	pub fn progress(&self) -> Progress {
		let counters = &self.shared.counters;
		let queued = counters.queued.load(Ordering::Relaxed);

		let average = {
			let window = self.shared.recent_durations.lock().unwrap();
			if window.is_empty() {
				Duration::ZERO
			} else {
				window.iter().sum::<Duration>() / u32::try_from(window.len()).unwrap_or(1)
			}
		};
		let estimated_time_remaining = average.mul_f64(queued as f64 / self.shared.config.max_concurrency as f64);

		Progress {
			queued,
			running: counters.running.load(Ordering::Relaxed),
			succeeded: counters.succeeded.load(Ordering::Relaxed),
			failed: counters.failed.load(Ordering::Relaxed),
			timed_out: counters.timed_out.load(Ordering::Relaxed),
			estimated_time_remaining,
		}
	}

	#[must_use]
	pub fn stats(&self) -> PipelineStats {
		let totals = &self.shared.totals;
		let processed = totals.processed.load(Ordering::Relaxed);
		let external_jobs = totals.external_jobs.load(Ordering::Relaxed);
		let overhead_reduction_estimate = if processed == 0 {
			0.0
		} else {
			(processed.saturating_sub(external_jobs)) as f64 / processed as f64
		};

		PipelineStats {
			total_processed: processed,
			cache_hit_count: totals.cache_hits.load(Ordering::Relaxed),
			external_calls: totals.external_calls.load(Ordering::Relaxed),
			total_cost_units: totals.cost_units(),
			overhead_reduction_estimate,
		}
	}

	/// The cache this processor reads and writes, for host-level
	/// statistics and snapshotting.
	#[must_use]
	pub fn cache(&self) -> &Arc<TranscriptionCache> {
		&self.shared.cache
	}

	/// Stop workers after their current job. Queued jobs stay queued.
	pub fn shutdown(&self) {
		info!("shutting down transcription worker pool");
		self.cancel.cancel();
	}
}

impl Drop for BatchProcessor {
	fn drop(&mut self) {
		self.cancel.cancel();
	}
}

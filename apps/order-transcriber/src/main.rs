mod config;
mod observability;

use anyhow::{Context, Result};
use audio_optimizer::{AudioBlob, AudioOptimizer};
use clap::Parser;
use prometheus::Registry;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use transcription_cache::{CacheConfig, JsonSnapshotStore, TranscriptionCache};
use transcription_queue::{BatchProcessor, JobId, JobOutcome, JobStatus, SimulatedService};

use config::Config;

const CLIP_EXTENSIONS: [&str; 6] = ["wav", "mp3", "webm", "ogg", "flac", "m4a"];

#[tokio::main]
async fn main() -> Result<()> {
	let config = Config::parse();
	config.validate().map_err(|e| anyhow::anyhow!(e))?;

	observability::init_tracing();

	info!(
		clips_dir = %config.clips_dir.display(),
		workers = config.queue.max_concurrency,
		scheduling = ?config.queue.scheduling,
		"🎯 Starting order transcriber"
	);

	let cache = Arc::new(TranscriptionCache::new(CacheConfig {
		min_confidence: config.min_confidence,
		..CacheConfig::default()
	}));

	let store = config.cache_snapshot.clone().map(JsonSnapshotStore::new);
	if let Some(store) = &store {
		if store.exists() {
			cache.restore(store.load().context("failed to load cache snapshot")?);
			info!(path = %store.path().display(), entries = cache.stats().entry_count, "♻️  Cache snapshot restored");
		}
	}

	let service = Arc::new(SimulatedService::new(Duration::from_millis(config.sim_latency_ms), config.sim_confidence));
	let registry = Registry::new();
	let processor = Arc::new(BatchProcessor::new(
		config.queue.clone(),
		AudioOptimizer::with_defaults(),
		Arc::clone(&cache),
		service,
		&registry,
	));
	processor.start();

	let clips = load_clips(&config.clips_dir)?;
	anyhow::ensure!(!clips.is_empty(), "no audio clips found in {}", config.clips_dir.display());

	let mut clip_names: HashMap<JobId, String> = HashMap::new();
	let mut job_ids = Vec::new();
	for round in 0..config.submit_rounds {
		for (name, blob) in &clips {
			let id = processor.submit(Arc::clone(blob));
			debug!(job = %id, clip = %name, round, "submitted");
			clip_names.insert(id, name.clone());
			job_ids.push(id);
		}
	}
	info!(jobs = job_ids.len(), clips = clips.len(), rounds = config.submit_rounds, "📨 All clips submitted");

	let heartbeat_token = CancellationToken::new();
	let heartbeat = tokio::spawn(heartbeat_loop(
		Arc::clone(&processor),
		Duration::from_secs(config.heartbeat_interval_secs),
		heartbeat_token.clone(),
	));

	let outcomes = tokio::select! {
		outcomes = collect_outcomes(&processor, &job_ids, &clip_names) => outcomes?,
		() = wait_for_shutdown_signal() => {
			info!("🛑 Shutdown signal received");
			processor.shutdown();
			heartbeat_token.cancel();
			return Ok(());
		}
	};

	heartbeat_token.cancel();
	let _ = heartbeat.await;

	summarize(&processor, &cache, &outcomes);

	if let Some(store) = &store {
		store.save(&cache).context("failed to save cache snapshot")?;
		info!(path = %store.path().display(), "💾 Cache snapshot saved");
	}

	Ok(())
}

fn load_clips(dir: &Path) -> Result<Vec<(String, AudioBlob)>> {
	let mut clips = Vec::new();
	for entry in std::fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))? {
		let path = entry?.path();
		let is_clip = path
			.extension()
			.and_then(|ext| ext.to_str())
			.is_some_and(|ext| CLIP_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()));
		if !is_clip {
			continue;
		}

		let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
		let bytes = std::fs::read(&path).with_context(|| format!("failed to read {}", path.display()))?;
		clips.push((name, Arc::new(bytes)));
	}

	clips.sort_by(|a, b| a.0.cmp(&b.0));
	Ok(clips)
}

async fn collect_outcomes(processor: &BatchProcessor, job_ids: &[JobId], clip_names: &HashMap<JobId, String>) -> Result<Vec<JobOutcome>> {
	let mut outcomes = Vec::with_capacity(job_ids.len());
	for &id in job_ids {
		let outcome = processor.await_result(id).await?;
		let clip = clip_names.get(&id).map_or("?", String::as_str);
		match outcome.status {
			JobStatus::Succeeded => debug!(
				job = %id,
				clip,
				from_cache = outcome.from_cache,
				attempts = outcome.attempts,
				cost_units = format!("{:.3}", outcome.cost_units),
				"job succeeded"
			),
			status => warn!(job = %id, clip, %status, error = outcome.error.as_deref().unwrap_or("-"), "job did not succeed"),
		}
		outcomes.push(outcome);
	}
	Ok(outcomes)
}

async fn heartbeat_loop(processor: Arc<BatchProcessor>, interval: Duration, token: CancellationToken) {
	let mut ticker = tokio::time::interval(interval);
	ticker.tick().await; // the first tick fires immediately

	loop {
		tokio::select! {
			() = token.cancelled() => break,
			_ = ticker.tick() => {
				let progress = processor.progress();
				info!(
					queued = progress.queued,
					running = progress.running,
					succeeded = progress.succeeded,
					failed = progress.failed,
					timed_out = progress.timed_out,
					eta_secs = format!("{:.1}", progress.estimated_time_remaining.as_secs_f64()),
					"💓 Heartbeat"
				);
			}
		}
	}
}

fn summarize(processor: &BatchProcessor, cache: &TranscriptionCache, outcomes: &[JobOutcome]) {
	let succeeded = outcomes.iter().filter(|o| o.status == JobStatus::Succeeded).count();
	let stats = processor.stats();
	let cache_stats = cache.stats();

	info!(
		jobs = outcomes.len(),
		succeeded,
		failed = outcomes.len() - succeeded,
		external_calls = stats.external_calls,
		cache_hits = stats.cache_hit_count,
		total_cost_units = format!("{:.3}", stats.total_cost_units),
		overhead_reduction = format!("{:.0}%", stats.overhead_reduction_estimate * 100.0),
		"✅ Batch complete"
	);

	info!(
		entries = cache_stats.entry_count,
		hit_rate = format!("{:.2}", cache_stats.hit_rate),
		cost_savings_units = format!("{:.3}", cache_stats.total_cost_savings),
		"📦 Cache statistics"
	);
}

async fn wait_for_shutdown_signal() {
	let ctrl_c = async {
		signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
	};

	#[cfg(unix)]
	let terminate = async {
		signal::unix::signal(signal::unix::SignalKind::terminate())
			.expect("failed to install SIGTERM handler")
			.recv()
			.await;
	};

	#[cfg(not(unix))]
	let terminate = std::future::pending::<()>();

	tokio::select! {
		() = ctrl_c => {},
		() = terminate => {},
	}
}

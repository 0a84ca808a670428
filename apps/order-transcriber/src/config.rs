use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(name = "order-transcriber")]
#[command(about = "Batch transcription harness for recorded voice orders", long_about = None)]
pub struct Config {
	/// Directory of recorded clips to submit
	#[arg(long, env = "CLIPS_DIR", default_value = "clips")]
	pub clips_dir: PathBuf,

	/// Submit every clip this many times (the repeats exercise the cache)
	#[arg(long, env = "SUBMIT_ROUNDS", default_value = "2")]
	pub submit_rounds: usize,

	/// Latency of the simulated transcription backend in milliseconds
	#[arg(long, env = "SIM_LATENCY_MS", default_value = "250")]
	pub sim_latency_ms: u64,

	/// Confidence reported by the simulated backend
	#[arg(long, env = "SIM_CONFIDENCE", default_value = "0.94")]
	pub sim_confidence: f64,

	/// Transcriptions below this confidence are never cached
	#[arg(long, env = "MIN_CONFIDENCE", default_value = "0.8")]
	pub min_confidence: f64,

	/// Optional path for loading and saving the cache snapshot
	#[arg(long, env = "CACHE_SNAPSHOT")]
	pub cache_snapshot: Option<PathBuf>,

	/// Heartbeat interval in seconds
	#[arg(long, env = "HEARTBEAT_INTERVAL", default_value = "5")]
	pub heartbeat_interval_secs: u64,

	#[command(flatten)]
	pub queue: transcription_queue::Config,
}

impl Config {
	/// Validate configuration values
	pub fn validate(&self) -> Result<(), String> {
		if self.submit_rounds == 0 {
			return Err("submit_rounds must be at least 1".to_string());
		}

		if !(0.0..=1.0).contains(&self.sim_confidence) {
			return Err("sim_confidence must be between 0 and 1".to_string());
		}

		if !(0.0..=1.0).contains(&self.min_confidence) {
			return Err("min_confidence must be between 0 and 1".to_string());
		}

		if self.heartbeat_interval_secs == 0 {
			return Err("heartbeat_interval_secs must be greater than 0".to_string());
		}

		self.queue.validate()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn defaults_parse_and_validate() {
		let config = Config::try_parse_from(["order-transcriber"]).unwrap();
		assert!(config.validate().is_ok());
		assert_eq!(config.submit_rounds, 2);
		assert_eq!(config.queue.max_concurrency, 4);
	}

	#[test]
	fn flattened_queue_flags_are_reachable() {
		let config = Config::try_parse_from(["order-transcriber", "--scheduling", "shortest-first", "--max-concurrency", "2"]).unwrap();
		assert_eq!(config.queue.max_concurrency, 2);
	}

	#[test]
	fn zero_rounds_is_rejected() {
		let config = Config::try_parse_from(["order-transcriber", "--submit-rounds", "0"]).unwrap();
		assert!(config.validate().is_err());
	}
}

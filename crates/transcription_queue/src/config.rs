use crate::queue::SchedulingMode;
use clap::Parser;
use std::time::Duration;

#[derive(Parser, Clone, Debug)]
#[command(author, version, about, long_about = None)]
#[group(id = "queue_config")]
pub struct Config {
	#[arg(long, env = "MAX_CONCURRENCY", default_value = "4", help = "Size of the transcription worker pool")]
	pub max_concurrency: usize,

	#[arg(long, env = "MAX_ATTEMPTS", default_value = "3", help = "Maximum external-call attempts per job")]
	pub max_attempts: u32,

	#[arg(
        long,
        env = "JOB_TIMEOUT_SECS",
        default_value = "30",
        value_parser = parse_duration,
        help = "Deadline for a single external transcription call in seconds"
    )]
	pub job_timeout: Duration,

	#[arg(
        long,
        env = "RETRY_INITIAL_DELAY_SECS",
        default_value = "1",
        value_parser = parse_duration,
        help = "Backoff before the first retry in seconds; doubles per attempt"
    )]
	pub retry_initial_delay: Duration,

	#[arg(
        long,
        env = "RETRY_MAX_DELAY_SECS",
        default_value = "30",
        value_parser = parse_duration,
        help = "Upper bound on the backoff delay in seconds"
    )]
	pub retry_max_delay: Duration,

	#[arg(long, env = "SCHEDULING_MODE", value_enum, default_value = "fifo", help = "Dequeue order for pending jobs")]
	pub scheduling: SchedulingMode,

	#[arg(long, env = "ETA_WINDOW", default_value = "20", help = "Completed jobs averaged for the ETA estimate")]
	pub eta_window: usize,

	#[arg(long, env = "ACCEPT_SIMILAR", help = "Serve near-duplicate cache matches instead of calling the service")]
	pub accept_similar: bool,

	#[arg(
        long,
        env = "SIMILARITY_ACCEPTANCE",
        default_value = "0.97",
        help = "Minimum similarity score for serving a near-duplicate match"
    )]
	pub similarity_acceptance: f64,
}

impl Config {
	pub fn new() -> Self {
		Self::parse()
	}

	#[must_use]
	pub fn default_config() -> Self {
		Self {
			max_concurrency: 4,
			max_attempts: 3,
			job_timeout: Duration::from_secs(30),
			retry_initial_delay: Duration::from_secs(1),
			retry_max_delay: Duration::from_secs(30),
			scheduling: SchedulingMode::Fifo,
			eta_window: 20,
			accept_similar: false,
			similarity_acceptance: 0.97,
		}
	}

	/// Validate configuration values
	///
	/// # Errors
	/// Returns a message naming the first invalid field.
	pub fn validate(&self) -> Result<(), String> {
		if self.max_concurrency == 0 {
			return Err("max_concurrency must be at least 1".to_string());
		}

		if self.max_attempts == 0 {
			return Err("max_attempts must be at least 1".to_string());
		}

		if self.eta_window == 0 {
			return Err("eta_window must be at least 1".to_string());
		}

		if self.retry_max_delay < self.retry_initial_delay {
			return Err("retry_max_delay must not be below retry_initial_delay".to_string());
		}

		if !(0.0..=1.0).contains(&self.similarity_acceptance) {
			return Err("similarity_acceptance must be between 0 and 1".to_string());
		}

		Ok(())
	}

	#[cfg(test)]
	pub(crate) fn test() -> Self {
		Self {
			max_concurrency: 2,
			max_attempts: 3,
			job_timeout: Duration::from_secs(1),
			retry_initial_delay: Duration::from_millis(10),
			retry_max_delay: Duration::from_millis(80),
			scheduling: SchedulingMode::Fifo,
			eta_window: 4,
			accept_similar: false,
			similarity_acceptance: 0.97,
		}
	}
}

fn parse_duration(s: &str) -> Result<Duration, std::num::ParseIntError> {
	s.parse::<u64>().map(Duration::from_secs)
}

/// Exponential backoff: `initial * 2^(attempt - 1)`, capped at `max`.
#[must_use]
pub(crate) fn backoff_delay(initial: Duration, max: Duration, attempt: u32) -> Duration {
	let factor = 2_u32.saturating_pow(attempt.saturating_sub(1));
	initial.saturating_mul(factor).min(max)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_default_config() {
		let config = Config::default_config();
		assert_eq!(config.max_concurrency, 4);
		assert_eq!(config.max_attempts, 3);
		assert_eq!(config.job_timeout, Duration::from_secs(30));
		assert_eq!(config.scheduling, SchedulingMode::Fifo);
		assert!(config.validate().is_ok());
	}

	#[test]
	fn test_parse_duration() {
		assert_eq!(parse_duration("60").unwrap(), Duration::from_secs(60));
		assert!(parse_duration("invalid").is_err());
	}

	#[test]
	fn test_config_parser() {
		let args = vec![
			"program",
			"--max-concurrency",
			"8",
			"--max-attempts",
			"5",
			"--job-timeout-secs",
			"120",
			"--retry-initial-delay-secs",
			"2",
			"--retry-max-delay-secs",
			"60",
			"--scheduling",
			"shortest-first",
		];

		let config = Config::try_parse_from(args).unwrap();
		assert_eq!(config.max_concurrency, 8);
		assert_eq!(config.max_attempts, 5);
		assert_eq!(config.job_timeout, Duration::from_secs(120));
		assert_eq!(config.retry_initial_delay, Duration::from_secs(2));
		assert_eq!(config.retry_max_delay, Duration::from_secs(60));
		assert_eq!(config.scheduling, SchedulingMode::ShortestFirst);
	}

	#[test]
	fn validation_rejects_zero_concurrency() {
		let config = Config {
			max_concurrency: 0,
			..Config::default_config()
		};
		assert!(config.validate().is_err());
	}

	#[test]
	fn validation_rejects_inverted_backoff_bounds() {
		let config = Config {
			retry_initial_delay: Duration::from_secs(60),
			retry_max_delay: Duration::from_secs(1),
			..Config::default_config()
		};
		assert!(config.validate().is_err());
	}

	#[test]
	fn test_profile_is_valid() {
		let config = Config::test();
		assert!(config.validate().is_ok());
		assert!(config.retry_initial_delay < config.retry_max_delay);
	}

	#[test]
	fn backoff_grows_and_caps() {
		let initial = Duration::from_millis(100);
		let max = Duration::from_millis(500);
		assert_eq!(backoff_delay(initial, max, 1), Duration::from_millis(100));
		assert_eq!(backoff_delay(initial, max, 2), Duration::from_millis(200));
		assert_eq!(backoff_delay(initial, max, 3), Duration::from_millis(400));
		assert_eq!(backoff_delay(initial, max, 4), Duration::from_millis(500));
		assert_eq!(backoff_delay(initial, max, 12), Duration::from_millis(500));
	}
}

//! Batch processor for the transcription pipeline: accepts submissions,
//! queues them FIFO or shortest-first, and drives a bounded pool of
//! workers that optimize, fingerprint, consult the cache, and only call
//! the external transcription service on a miss.

pub mod config;
pub mod error;
pub mod job;
pub mod queue;
pub mod service;

mod pool;
mod worker;

pub use config::Config;
pub use error::QueueError;
pub use job::{JobId, JobOutcome, JobStatus, SubmitOptions};
pub use pool::{BatchProcessor, PipelineStats, Progress, REQUEST_OVERHEAD_UNITS};
pub use queue::SchedulingMode;
pub use service::{ServiceError, SimulatedOutcome, SimulatedService, Transcription, TranscriptionService};

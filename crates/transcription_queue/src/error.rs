use crate::job::JobId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum QueueError {
	#[error("unknown job id: {0}")]
	JobNotFound(JobId),
	#[error("job status channel closed before reaching a terminal state")]
	ResultChannelClosed,
	#[error("internal error: {0}")]
	Internal(String),
}

//! Pre-processing for voice-order clips: inspect a raw audio buffer,
//! decide whether it is worth transforming, and produce a smaller
//! equivalent before it is fingerprinted and sent for transcription.

pub mod analysis;
pub mod format;
mod optimizer;
mod wav;

use std::sync::Arc;

pub use analysis::{AudioAnalysis, COST_UNITS_PER_MEGABYTE, COST_UNITS_PER_SECOND};
pub use format::AudioFormat;
pub use optimizer::{AudioOptimizer, OptimizationResult, OptimizationTag, OptimizerConfig};

/// Raw audio bytes as submitted by a caller.
///
/// Shared by reference between the queue, the optimizer and the cache;
/// "optimized equals original" is literal `Arc` identity.
pub type AudioBlob = Arc<Vec<u8>>;

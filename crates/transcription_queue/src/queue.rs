use crate::job::JobId;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Dequeue-eligibility policy for pending jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SchedulingMode {
	/// Submission order preserved.
	Fifo,
	/// Ascending estimated audio duration, ties broken by submission order.
	ShortestFirst,
}

/// A queued job waiting for a worker slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PendingJob {
	pub(crate) id: JobId,
	pub(crate) seq: u64,
	pub(crate) est_duration_ms: u64,
}

impl PendingJob {
	const fn key(&self) -> (u64, u64) {
		(self.est_duration_ms, self.seq)
	}
}

/// Binary min-heap keyed by (estimated duration, submission sequence).
///
/// Sifting keeps the next-shortest job at the root, so the ordering is
/// re-derived on every insert and a later-submitted short job overtakes
/// queued long ones that have not started yet.
struct ShortestFirstHeap {
	heap: Vec<PendingJob>,
}

impl ShortestFirstHeap {
	const fn new() -> Self {
		Self { heap: Vec::new() }
	}

	const fn parent(index: usize) -> usize {
		(index - 1) / 2
	}

	const fn left_child(index: usize) -> usize {
		2 * index + 1
	}

	const fn right_child(index: usize) -> usize {
		2 * index + 2
	}

	fn sift_up(&mut self, mut index: usize) {
		while index > 0 {
			let parent = Self::parent(index);
			if self.heap[parent].key() <= self.heap[index].key() {
				break;
			}
			self.heap.swap(parent, index);
			index = parent;
		}
	}

	fn sift_down(&mut self, mut index: usize) {
		loop {
			let left = Self::left_child(index);
			let right = Self::right_child(index);
			let mut smallest = index;

			if left < self.heap.len() && self.heap[left].key() < self.heap[smallest].key() {
				smallest = left;
			}
			if right < self.heap.len() && self.heap[right].key() < self.heap[smallest].key() {
				smallest = right;
			}

			if smallest == index {
				break;
			}

			self.heap.swap(index, smallest);
			index = smallest;
		}
	}

	fn push(&mut self, job: PendingJob) {
		self.heap.push(job);
		let new_index = self.heap.len() - 1;
		self.sift_up(new_index);
	}

	fn pop(&mut self) -> Option<PendingJob> {
		if self.heap.is_empty() {
			return None;
		}
		let last = self.heap.len() - 1;
		self.heap.swap(0, last);
		let job = self.heap.pop();
		if !self.heap.is_empty() {
			self.sift_down(0);
		}
		job
	}

	fn len(&self) -> usize {
		self.heap.len()
	}
}

/// The processor's pending queue. Enqueue never blocks; dequeue-and-claim
/// happens under the caller's lock so two workers can never take the
/// same job.
pub(crate) struct PendingQueue {
	mode: SchedulingMode,
	fifo: VecDeque<PendingJob>,
	heap: ShortestFirstHeap,
}

impl PendingQueue {
	pub(crate) const fn new(mode: SchedulingMode) -> Self {
		Self {
			mode,
			fifo: VecDeque::new(),
			heap: ShortestFirstHeap::new(),
		}
	}

	pub(crate) fn push(&mut self, job: PendingJob) {
		match self.mode {
			SchedulingMode::Fifo => self.fifo.push_back(job),
			SchedulingMode::ShortestFirst => self.heap.push(job),
		}
	}

	pub(crate) fn pop(&mut self) -> Option<PendingJob> {
		match self.mode {
			SchedulingMode::Fifo => self.fifo.pop_front(),
			SchedulingMode::ShortestFirst => self.heap.pop(),
		}
	}

	pub(crate) fn len(&self) -> usize {
		match self.mode {
			SchedulingMode::Fifo => self.fifo.len(),
			SchedulingMode::ShortestFirst => self.heap.len(),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn pending(seq: u64, est_duration_ms: u64) -> PendingJob {
		PendingJob {
			id: JobId::new(),
			seq,
			est_duration_ms,
		}
	}

	#[test]
	fn fifo_preserves_submission_order() {
		let mut queue = PendingQueue::new(SchedulingMode::Fifo);
		queue.push(pending(0, 30_000));
		queue.push(pending(1, 1_000));
		queue.push(pending(2, 10_000));

		let order: Vec<u64> = std::iter::from_fn(|| queue.pop()).map(|j| j.seq).collect();
		assert_eq!(order, vec![0, 1, 2]);
	}

	#[test]
	fn shortest_first_orders_by_ascending_duration() {
		let mut queue = PendingQueue::new(SchedulingMode::ShortestFirst);
		queue.push(pending(0, 10_000));
		queue.push(pending(1, 2_000));
		queue.push(pending(2, 30_000));

		let order: Vec<u64> = std::iter::from_fn(|| queue.pop()).map(|j| j.est_duration_ms).collect();
		assert_eq!(order, vec![2_000, 10_000, 30_000]);
	}

	#[test]
	fn shortest_first_ties_break_by_submission_order() {
		let mut queue = PendingQueue::new(SchedulingMode::ShortestFirst);
		queue.push(pending(5, 4_000));
		queue.push(pending(3, 4_000));
		queue.push(pending(9, 4_000));

		let order: Vec<u64> = std::iter::from_fn(|| queue.pop()).map(|j| j.seq).collect();
		assert_eq!(order, vec![3, 5, 9]);
	}

	#[test]
	fn a_late_short_job_overtakes_waiting_long_ones() {
		let mut queue = PendingQueue::new(SchedulingMode::ShortestFirst);
		queue.push(pending(0, 60_000));
		queue.push(pending(1, 45_000));
		// the short clip arrives last but must start first
		queue.push(pending(2, 500));

		assert_eq!(queue.pop().unwrap().seq, 2);
		assert_eq!(queue.pop().unwrap().seq, 1);
		assert_eq!(queue.pop().unwrap().seq, 0);
	}

	#[test]
	fn heap_survives_interleaved_push_and_pop() {
		let mut queue = PendingQueue::new(SchedulingMode::ShortestFirst);
		queue.push(pending(0, 8_000));
		queue.push(pending(1, 3_000));
		assert_eq!(queue.pop().unwrap().seq, 1);
		queue.push(pending(2, 1_000));
		queue.push(pending(3, 20_000));
		assert_eq!(queue.pop().unwrap().seq, 2);
		assert_eq!(queue.pop().unwrap().seq, 0);
		assert_eq!(queue.pop().unwrap().seq, 3);
		assert!(queue.pop().is_none());
		assert_eq!(queue.len(), 0);
	}
}

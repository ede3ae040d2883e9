//! Batch orchestration records (spec.md §4.6).

use crate::ids::{BatchId, QuoteRequestId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchStatus {
	Processing,
	Completed,
	PartiallyCompleted,
}

/// One batch job: a fixed list of child `QuoteRequest`s plus running
/// counters, recomputed atomically as each child reaches a terminal status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch {
	pub id: BatchId,
	pub created_at: chrono::DateTime<chrono::Utc>,
	pub children: Vec<QuoteRequestId>,
	pub completed: u32,
	pub failed: u32,
	pub status: BatchStatus,
}

impl Batch {
	pub fn new(children: Vec<QuoteRequestId>) -> Self {
		Self {
			id: BatchId::new(),
			created_at: chrono::Utc::now(),
			children,
			completed: 0,
			failed: 0,
			status: BatchStatus::Processing,
		}
	}

	pub fn total(&self) -> usize {
		self.children.len()
	}

	/// Whether every child has reached a terminal transition and the batch
	/// status can be finalized (spec.md §4.6 "completed+failed = total").
	pub fn is_settled(&self) -> bool {
		(self.completed + self.failed) as usize >= self.total()
	}

	pub fn finalize_status(&mut self) {
		if !self.is_settled() {
			return;
		}
		self.status = if self.failed == 0 { BatchStatus::Completed } else { BatchStatus::PartiallyCompleted };
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn no_failures_finalizes_completed() {
		let mut batch = Batch::new(vec![QuoteRequestId::new(), QuoteRequestId::new()]);
		batch.completed = 2;
		batch.finalize_status();
		assert_eq!(batch.status, BatchStatus::Completed);
	}

	#[test]
	fn any_failure_finalizes_partially_completed() {
		let mut batch = Batch::new(vec![QuoteRequestId::new(), QuoteRequestId::new()]);
		batch.completed = 1;
		batch.failed = 1;
		batch.finalize_status();
		assert_eq!(batch.status, BatchStatus::PartiallyCompleted);
	}

	#[test]
	fn unsettled_batch_keeps_processing_status() {
		let mut batch = Batch::new(vec![QuoteRequestId::new(), QuoteRequestId::new()]);
		batch.completed = 1;
		batch.finalize_status();
		assert_eq!(batch.status, BatchStatus::Processing);
	}
}

//! Thin multiplexer dispatching a batch's child `QuoteRequest`s onto the
//! same worker pool the single-request path uses (spec.md §4.6). Adds no
//! business logic beyond counter recomputation and the resume rule.

use crate::coordinator::Coordinator;
use quote_storage::StorageService;
use quote_types::{Batch, BatchId, BatchStatus, QuoteRequest, QuoteRequestId, QuoteRequestStatus, StorageKey};
use std::sync::Arc;
use thiserror::Error;
use tracing::instrument;

#[derive(Debug, Error)]
pub enum BatchError {
	#[error("storage error: {0}")]
	Storage(#[from] quote_storage::StorageError),
	#[error("batch {0} not found")]
	NotFound(BatchId),
}

pub struct BatchCoordinator {
	storage: Arc<StorageService>,
	coordinator: Arc<Coordinator>,
}

impl BatchCoordinator {
	pub fn new(storage: Arc<StorageService>, coordinator: Arc<Coordinator>) -> Self {
		Self { storage, coordinator }
	}

	async fn load(&self, batch_id: BatchId) -> Result<Batch, BatchError> {
		self.storage.retrieve(StorageKey::Batches.as_str(), &batch_id.to_string()).await.map_err(|e| match e {
			quote_storage::StorageError::NotFound => BatchError::NotFound(batch_id),
			other => BatchError::Storage(other),
		})
	}

	async fn save(&self, batch: &Batch) -> Result<(), BatchError> {
		Ok(self.storage.store(StorageKey::Batches.as_str(), &batch.id.to_string(), batch, None).await?)
	}

	/// Dispatches every child of `batch_id` as an independent worker task,
	/// then waits for all of them and recomputes the batch's counters once
	/// (spec.md §4.6 "recomputes the batch's counters ... atomically").
	#[instrument(skip(self))]
	pub async fn run(&self, batch_id: BatchId) -> Result<Batch, BatchError> {
		let batch = self.load(batch_id).await?;
		self.dispatch(&batch.children).await;
		self.settle(batch_id).await
	}

	/// Resumes a batch after a crash: re-dispatches only the children still
	/// `Processing` (spec.md §4.6 "resume: re-dispatch children whose status
	/// is PROCESSING at resume time").
	#[instrument(skip(self))]
	pub async fn resume(&self, batch_id: BatchId) -> Result<Batch, BatchError> {
		let batch = self.load(batch_id).await?;
		let mut to_resume = Vec::new();
		for &child_id in &batch.children {
			let request: QuoteRequest = self.storage.retrieve(StorageKey::QuoteRequests.as_str(), &child_id.to_string()).await?;
			if request.status == QuoteRequestStatus::Processing {
				to_resume.push(child_id);
			}
		}
		self.dispatch(&to_resume).await;
		self.settle(batch_id).await
	}

	async fn dispatch(&self, children: &[QuoteRequestId]) {
		let mut handles = Vec::with_capacity(children.len());
		for &child_id in children {
			let coordinator = Arc::clone(&self.coordinator);
			handles.push(tokio::spawn(async move {
				if let Err(e) = coordinator.process(child_id).await {
					tracing::warn!(request_id = %child_id, error = %e, "batch child failed");
				}
			}));
		}
		for handle in handles {
			let _ = handle.await;
		}
	}

	/// Reloads every child's terminal status and writes the batch's final
	/// counters and status in one pass.
	async fn settle(&self, batch_id: BatchId) -> Result<Batch, BatchError> {
		let mut batch = self.load(batch_id).await?;
		let mut completed = 0u32;
		let mut failed = 0u32;

		for &child_id in &batch.children {
			let request: QuoteRequest = self.storage.retrieve(StorageKey::QuoteRequests.as_str(), &child_id.to_string()).await?;
			match request.status {
				QuoteRequestStatus::Done | QuoteRequestStatus::AwaitingReview => completed += 1,
				QuoteRequestStatus::Error | QuoteRequestStatus::Cancelled => failed += 1,
				QuoteRequestStatus::Processing => {}
			}
		}

		batch.completed = completed;
		batch.failed = failed;
		batch.finalize_status();
		self.save(&batch).await?;
		Ok(batch)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn batch_status_variants_are_distinct() {
		assert_ne!(BatchStatus::Completed, BatchStatus::PartiallyCompleted);
	}
}

//! Crash recovery: finds `QuoteRequest`s stuck with an expired claim and
//! re-dispatches them into a `Coordinator`, which resumes from whatever
//! `CheckpointPayload` fields survived the crash (spec.md §5 "claim and
//! crash recovery").

use crate::coordinator::Coordinator;
use quote_storage::StorageService;
use quote_types::{QuoteRequest, StorageKey};
use std::sync::Arc;
use thiserror::Error;
use tracing::instrument;

#[derive(Debug, Error)]
pub enum RecoveryError {
	#[error("storage error: {0}")]
	Storage(#[from] quote_storage::StorageError),
}

/// Summary of one recovery pass, logged and returned for the caller to
/// surface in its own startup diagnostics.
#[derive(Debug, Default)]
pub struct RecoveryReport {
	pub total_requests: usize,
	pub stuck_requests: usize,
	pub redispatched: usize,
	pub failed_to_redispatch: usize,
}

pub struct RecoveryService {
	storage: Arc<StorageService>,
	liveness: chrono::Duration,
}

impl RecoveryService {
	pub fn new(storage: Arc<StorageService>, liveness: chrono::Duration) -> Self {
		Self { storage, liveness }
	}

	/// Lists ids eligible for claim right now: not terminal, and either
	/// never claimed or claimed by a worker whose heartbeat has gone stale.
	/// A freshly submitted request (`Checkpoint::pending`, see
	/// `ClaimLease::unclaimed`) is eligible on the very first scan, the same
	/// as a crashed worker's stuck request — the worker pool uses this to
	/// dispatch concurrently instead of the serial `recover` pass below.
	/// `try_claim`'s compare-and-set makes it safe for more than one scan to
	/// list the same id; only one dispatch wins the claim.
	pub async fn eligible_ids(&self) -> Result<Vec<quote_types::QuoteRequestId>, RecoveryError> {
		let all: Vec<(String, QuoteRequest)> = self.storage.retrieve_all(StorageKey::QuoteRequests.as_str()).await?;
		Ok(all
			.into_iter()
			.filter(|(_, r)| !r.is_terminal() && !r.checkpoint.claim.is_live(self.liveness))
			.map(|(_, r)| r.id)
			.collect())
	}

	/// Scans every stored `QuoteRequest`, finds the ones left `Processing`
	/// with a claim whose heartbeat has gone stale, and re-dispatches each
	/// through `coordinator`. Requests with a live claim are left alone —
	/// another worker is actively driving them.
	#[instrument(skip(self, coordinator))]
	pub async fn recover(&self, coordinator: &Coordinator) -> Result<RecoveryReport, RecoveryError> {
		let mut report = RecoveryReport::default();

		let all: Vec<(String, QuoteRequest)> = self.storage.retrieve_all(StorageKey::QuoteRequests.as_str()).await?;
		report.total_requests = all.len();

		for (_, request) in all {
			if request.is_terminal() {
				continue;
			}
			if request.checkpoint.claim.is_live(self.liveness) {
				continue;
			}

			report.stuck_requests += 1;
			tracing::info!(request_id = %request.id, tag = ?request.checkpoint.tag, "recovering stuck quote request");

			match coordinator.process(request.id).await {
				Ok(()) => report.redispatched += 1,
				Err(e) => {
					report.failed_to_redispatch += 1;
					tracing::warn!(request_id = %request.id, error = %e, "failed to redispatch stuck request");
				}
			}
		}

		tracing::info!(
			total = report.total_requests,
			stuck = report.stuck_requests,
			redispatched = report.redispatched,
			failed = report.failed_to_redispatch,
			"recovery pass complete"
		);

		Ok(report)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use quote_storage::implementations::memory::MemoryStorage;
	use quote_types::checkpoint::ClaimLease;
	use quote_types::{ConfigVersionId, InputType, QuoteRequestStatus};

	#[test]
	fn empty_report_has_zero_counts() {
		let report = RecoveryReport::default();
		assert_eq!(report.total_requests, 0);
		assert_eq!(report.stuck_requests, 0);
	}

	async fn store(storage: &StorageService, request: &QuoteRequest) {
		storage.store(StorageKey::QuoteRequests.as_str(), &request.id.to_string(), request, None).await.unwrap();
	}

	/// S5: a request left `Processing` by a worker whose heartbeat has gone
	/// stale is eligible again; a live claim or a terminal status are not.
	#[tokio::test]
	async fn eligible_ids_selects_only_stuck_non_terminal_requests() {
		let storage = Arc::new(StorageService::new(Box::new(MemoryStorage::new())));
		let service = RecoveryService::new(Arc::clone(&storage), chrono::Duration::seconds(60));

		let mut stuck = QuoteRequest::new(Some("notebook dell".into()), Vec::new(), InputType::Text, None, ConfigVersionId::new(), None);
		stuck.checkpoint.claim = ClaimLease::unclaimed();
		store(&storage, &stuck).await;

		let mut live = QuoteRequest::new(Some("tv samsung".into()), Vec::new(), InputType::Text, None, ConfigVersionId::new(), None);
		live.checkpoint.claim = ClaimLease::new("worker-a".into());
		store(&storage, &live).await;

		let mut done = QuoteRequest::new(Some("geladeira".into()), Vec::new(), InputType::Text, None, ConfigVersionId::new(), None);
		done.status = QuoteRequestStatus::Done;
		done.checkpoint.claim = ClaimLease::unclaimed();
		store(&storage, &done).await;

		let ids = service.eligible_ids().await.unwrap();
		assert_eq!(ids, vec![stuck.id]);
	}
}

//! Claim protocol: single-writer lease acquisition and stealing on an
//! expired heartbeat (spec.md §4.1 "claim protocol", §5 "claim and crash
//! recovery"). Built on `StorageService::try_claim`, which provides the
//! load-transform-write primitive but is explicitly "not a retry loop" —
//! this module narrows the race to one optimistic attempt per caller, same
//! as every other writer in this pipeline.

use crate::error::CoordinatorError;
use quote_storage::{StorageError, StorageService};
use quote_types::checkpoint::ClaimLease;
use quote_types::{QuoteRequest, QuoteRequestId, QuoteRequestStatus, StorageKey};

/// Default liveness window: a claim older than this may be stolen by
/// another worker (spec.md §5 "T_liveness").
pub const DEFAULT_LIVENESS_SECONDS: i64 = 60;

pub fn liveness_window(seconds: i64) -> chrono::Duration {
	chrono::Duration::seconds(seconds)
}

/// Attempts to claim `request_id` for `worker_id`. Refuses if the request is
/// already terminal, cancelled, or has a live claim held by someone else
/// (spec.md "Claim proceeds only if the previous worker's claim is truly
/// expired").
pub async fn try_claim(storage: &StorageService, request_id: QuoteRequestId, worker_id: &str, liveness: chrono::Duration) -> Result<QuoteRequest, CoordinatorError> {
	let worker_id = worker_id.to_string();
	let key = request_id.to_string();
	let claimed = storage
		.try_claim::<QuoteRequest, _>(StorageKey::QuoteRequests.as_str(), &key, move |mut request| {
			if request.status == QuoteRequestStatus::Cancelled || request.is_terminal() {
				return Err(StorageError::Backend("request is already terminal".to_string()));
			}
			if request.checkpoint.claim.is_live(liveness) {
				return Err(StorageError::Backend("request has a live claim held by another worker".to_string()));
			}
			request.checkpoint.claim = ClaimLease::new(worker_id.clone());
			request.status = QuoteRequestStatus::Processing;
			if request.started_at.is_none() {
				request.started_at = Some(chrono::Utc::now());
			}
			request.updated_at = chrono::Utc::now();
			Ok(request)
		})
		.await?;
	Ok(claimed)
}

/// Refreshes the claim's heartbeat without altering any other field,
/// called periodically by a long-running worker task and before every
/// external call inside the block search (spec.md §5 "claim and crash
/// recovery").
pub async fn heartbeat(storage: &StorageService, request_id: QuoteRequestId) -> Result<(), CoordinatorError> {
	let key = request_id.to_string();
	storage
		.try_claim::<QuoteRequest, _>(StorageKey::QuoteRequests.as_str(), &key, |mut request| {
			request.checkpoint.claim.refresh_heartbeat();
			request.updated_at = chrono::Utc::now();
			Ok(request)
		})
		.await?;
	Ok(())
}

/// Whether a request can be cooperatively stopped at its next checkpoint,
/// i.e. has already been marked `Cancelled` by a user action (spec.md §5
/// "Cancellation and timeouts").
pub fn is_cancelled(request: &QuoteRequest) -> bool {
	request.status == QuoteRequestStatus::Cancelled
}

/// Reloads `request_id` and either refreshes its heartbeat or reports that it
/// has been cancelled, for callers that need to check cancellation on every
/// iteration of a long-running loop (spec.md §5 "checks for cancellation at
/// every checkpoint and every candidate iteration"). Returns `Ok(true)` if
/// the caller should keep going, `Ok(false)` if it was cancelled.
pub async fn heartbeat_or_cancelled(storage: &StorageService, request_id: QuoteRequestId) -> Result<bool, CoordinatorError> {
	let request: QuoteRequest = storage
		.retrieve(StorageKey::QuoteRequests.as_str(), &request_id.to_string())
		.await?;
	if is_cancelled(&request) {
		return Ok(false);
	}
	heartbeat(storage, request_id).await?;
	Ok(true)
}

#[cfg(test)]
mod tests {
	use super::*;
	use quote_storage::implementations::memory::MemoryStorage;
	use quote_types::{ConfigVersionId, InputType};

	#[test]
	fn liveness_window_converts_seconds() {
		assert_eq!(liveness_window(60), chrono::Duration::seconds(60));
	}

	async fn store_request(storage: &StorageService, request: &QuoteRequest) {
		storage.store(StorageKey::QuoteRequests.as_str(), &request.id.to_string(), request, None).await.unwrap();
	}

	/// Worker A's expired heartbeat must not block Worker B (S5: crash
	/// between checkpoints, claim stolen after T_liveness).
	#[tokio::test]
	async fn try_claim_steals_request_with_expired_lease() {
		let storage = StorageService::new(Box::new(MemoryStorage::new()));
		let mut request = QuoteRequest::new(Some("notebook dell".into()), Vec::new(), InputType::Text, None, ConfigVersionId::new(), None);
		request.checkpoint.claim = ClaimLease::unclaimed();
		store_request(&storage, &request).await;

		let claimed = try_claim(&storage, request.id, "worker-b", liveness_window(60)).await.unwrap();
		assert_eq!(claimed.checkpoint.claim.worker_id, "worker-b");
	}

	/// A live claim held by another worker must not be stolen.
	#[tokio::test]
	async fn try_claim_refuses_request_with_live_lease() {
		let storage = StorageService::new(Box::new(MemoryStorage::new()));
		let mut request = QuoteRequest::new(Some("notebook dell".into()), Vec::new(), InputType::Text, None, ConfigVersionId::new(), None);
		request.checkpoint.claim = ClaimLease::new("worker-a".into());
		store_request(&storage, &request).await;

		let result = try_claim(&storage, request.id, "worker-b", liveness_window(60)).await;
		assert!(result.is_err());
	}

	/// A terminal request (e.g. cancelled by the user mid-run, S6) must
	/// never be re-claimed, regardless of lease state.
	#[tokio::test]
	async fn try_claim_refuses_cancelled_request() {
		let storage = StorageService::new(Box::new(MemoryStorage::new()));
		let mut request = QuoteRequest::new(Some("notebook dell".into()), Vec::new(), InputType::Text, None, ConfigVersionId::new(), None);
		request.status = QuoteRequestStatus::Cancelled;
		request.checkpoint.claim = ClaimLease::unclaimed();
		store_request(&storage, &request).await;

		let result = try_claim(&storage, request.id, "worker-b", liveness_window(60)).await;
		assert!(result.is_err());
	}

	#[tokio::test]
	async fn heartbeat_or_cancelled_refreshes_lease_on_active_request() {
		let storage = StorageService::new(Box::new(MemoryStorage::new()));
		let mut request = QuoteRequest::new(Some("notebook dell".into()), Vec::new(), InputType::Text, None, ConfigVersionId::new(), None);
		request.checkpoint.claim = ClaimLease::new("worker-a".into());
		let old_heartbeat = request.checkpoint.claim.last_heartbeat;
		store_request(&storage, &request).await;

		let still_live = heartbeat_or_cancelled(&storage, request.id).await.unwrap();
		assert!(still_live);

		let reloaded: QuoteRequest = storage.retrieve(StorageKey::QuoteRequests.as_str(), &request.id.to_string()).await.unwrap();
		assert!(reloaded.checkpoint.claim.last_heartbeat >= old_heartbeat);
	}

	/// S6: a request cancelled mid-run must stop the heartbeat from reporting
	/// "still live" on the very next check.
	#[tokio::test]
	async fn heartbeat_or_cancelled_reports_false_once_cancelled() {
		let storage = StorageService::new(Box::new(MemoryStorage::new()));
		let mut request = QuoteRequest::new(Some("notebook dell".into()), Vec::new(), InputType::Text, None, ConfigVersionId::new(), None);
		request.status = QuoteRequestStatus::Cancelled;
		request.checkpoint.claim = ClaimLease::new("worker-a".into());
		store_request(&storage, &request).await;

		let still_live = heartbeat_or_cancelled(&storage, request.id).await.unwrap();
		assert!(!still_live);
	}
}

//! Worker-pool main loop: periodically lists claimable quote requests and
//! drives each through the coordinator, bounded by a semaphore
//! (`tokio::select!` between a periodic tick and `ctrl_c()`,
//! acquire-permit-then-spawn dispatch). A freshly submitted request and a
//! crashed worker's stuck request are indistinguishable from the scan's
//! point of view (see `quote_types::checkpoint::ClaimLease::unclaimed`), so
//! one poll loop over `RecoveryService` handles both.

use quote_core::{Coordinator, RecoveryService};
use quote_storage::StorageService;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

pub struct WorkerPool {
	coordinator: Arc<Coordinator>,
	recovery: Arc<RecoveryService>,
	storage: Arc<StorageService>,
	semaphore: Arc<Semaphore>,
	scan_interval: Duration,
	cleanup_interval: Duration,
}

impl WorkerPool {
	pub fn new(coordinator: Arc<Coordinator>, recovery: Arc<RecoveryService>, storage: Arc<StorageService>, pool_size: usize, scan_interval: Duration, cleanup_interval: Duration) -> Self {
		Self {
			coordinator,
			recovery,
			storage,
			semaphore: Arc::new(Semaphore::new(pool_size.max(1))),
			scan_interval,
			cleanup_interval,
		}
	}

	/// Runs the claim-scan loop and a periodic storage cleanup task until
	/// ctrl-c is received.
	pub async fn run(self: Arc<Self>) -> Result<(), Box<dyn std::error::Error>> {
		let cleanup_storage = Arc::clone(&self.storage);
		let cleanup_interval = self.cleanup_interval;
		let cleanup_task = tokio::spawn(async move {
			let mut ticker = tokio::time::interval(cleanup_interval);
			loop {
				ticker.tick().await;
				match cleanup_storage.cleanup_expired().await {
					Ok(removed) if removed > 0 => tracing::info!(removed, "cleaned up expired storage entries"),
					Ok(_) => {}
					Err(e) => tracing::warn!(error = %e, "storage cleanup failed"),
				}
			}
		});

		// One named recovery pass up front, with its own summary log, before
		// the steady-state scan loop below takes over (try_claim's
		// compare-and-set makes any overlap between the two harmless).
		match self.recovery.recover(&self.coordinator).await {
			Ok(report) => tracing::info!(total = report.total_requests, stuck = report.stuck_requests, redispatched = report.redispatched, "startup recovery complete"),
			Err(e) => tracing::error!(error = %e, "startup recovery pass failed"),
		}

		let mut scan_ticker = tokio::time::interval(self.scan_interval);
		loop {
			tokio::select! {
				_ = scan_ticker.tick() => {
					if let Err(e) = self.scan_once().await {
						tracing::warn!(error = %e, "claim scan failed");
					}
				}
				_ = tokio::signal::ctrl_c() => {
					tracing::info!("shutdown signal received, stopping worker pool");
					break;
				}
			}
		}

		cleanup_task.abort();
		Ok(())
	}

	/// One claim-scan pass: lists every currently eligible request and
	/// dispatches each through the semaphore-bounded pool. Losing a race for
	/// a claim is a normal, silent outcome here (another worker, or another
	/// slot from the same scan, got there first).
	async fn scan_once(&self) -> Result<(), quote_core::RecoveryError> {
		let ids = self.recovery.eligible_ids().await?;
		for id in ids {
			let permit = match Arc::clone(&self.semaphore).try_acquire_owned() {
				Ok(permit) => permit,
				Err(_) => break, // pool saturated; remaining ids pick up next tick
			};
			let coordinator = Arc::clone(&self.coordinator);
			tokio::spawn(async move {
				let _permit = permit;
				if let Err(e) = coordinator.process(id).await {
					tracing::debug!(request_id = %id, error = %e, "worker did not process quote request");
				}
			});
		}
		Ok(())
	}
}

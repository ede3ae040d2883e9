//! Consolidated checkpoint representation.
//!
//! Collapses the source system's scattered `current_step` /
//! `progress_percentage` / `step_details` / `google_shopping_response_json` /
//! `claude_payload_json` / `resume_data` / `processing_checkpoint` /
//! `last_heartbeat` / `worker_id` fields into one `{tag, progress, claim,
//! payload}` value, per SPEC_FULL.md §3.

use crate::analysis::{CanonicalAnalysis, ShoppingSearchResponse};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Linear checkpoint tags, in the order a healthy run passes through them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CheckpointTag {
	Init,
	AiAnalysisStart,
	AiAnalysisDone,
	ShoppingSearchStart,
	ShoppingSearchDone,
	PriceExtractionStart,
	Finalization,
	Completed,
	Failed,
}

impl CheckpointTag {
	pub fn is_terminal(&self) -> bool {
		matches!(self, CheckpointTag::Completed | CheckpointTag::Failed)
	}
}

/// Progress reported at well-known percentages; see spec.md §4.1 "Progress
/// contract". Callers must only ever move `percentage` forward (the
/// monotone-progress invariant, spec.md §8.3) — enforced by
/// `Checkpoint::advance`, not by this struct alone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Progress {
	pub percentage: u8,
	pub step_tag: String,
	pub detail: String,
}

/// Single-writer lease. A worker is "live" if `last_heartbeat` is within
/// `T_liveness` (default 60s) of now; see `quote_storage`'s claim helper for
/// the compare-and-set that enforces this.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimLease {
	pub worker_id: String,
	pub started_at: chrono::DateTime<chrono::Utc>,
	pub last_heartbeat: chrono::DateTime<chrono::Utc>,
}

impl ClaimLease {
	pub fn new(worker_id: String) -> Self {
		let now = chrono::Utc::now();
		Self {
			worker_id,
			started_at: now,
			last_heartbeat: now,
		}
	}

	pub fn is_live(&self, liveness: chrono::Duration) -> bool {
		chrono::Utc::now() - self.last_heartbeat <= liveness
	}

	pub fn refresh_heartbeat(&mut self) {
		self.last_heartbeat = chrono::Utc::now();
	}

	/// A lease nobody holds yet: `is_live` is false for any liveness window,
	/// so a freshly submitted request is claimed on the worker's first scan,
	/// the same way a stuck request with an expired heartbeat is.
	pub fn unclaimed() -> Self {
		let distant_past = chrono::Utc::now() - chrono::Duration::days(365);
		Self {
			worker_id: String::new(),
			started_at: distant_past,
			last_heartbeat: distant_past,
		}
	}
}

/// Per-iteration record of one block-search attempt, kept for the reserve/
/// alternative tie-break (spec.md §4.1.1 "Tie-break subtlety") and for
/// diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockHistoryEntry {
	pub block_min_price: Decimal,
	pub block_size: usize,
	pub valid_count: usize,
	pub epsilon: Decimal,
}

/// The four explicit sets the block-search loop threads through its
/// iterations, plus history, replacing captured-closure state (spec.md §9
/// "Per-candidate state as explicit sets, not captured closures").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BlockSearchScratch {
	pub validated_keys: HashSet<String>,
	pub failed_keys: HashSet<String>,
	pub urls_seen: HashSet<String>,
	pub domains_in_block: HashSet<String>,
	/// Current variation fraction; escalated by 0.05 up to 5 times.
	pub current_epsilon: Decimal,
	pub tolerance_increases: u8,
	pub block_history: Vec<BlockHistoryEntry>,
	/// Saved validated set from a block that exhausted its untried
	/// candidates before reaching N; restored if the alternative block fails.
	pub reserve_validated_keys: Option<HashSet<String>>,
	pub reserve_attempted: bool,
}

impl BlockSearchScratch {
	pub fn new(epsilon0: Decimal) -> Self {
		Self {
			current_epsilon: epsilon0,
			..Default::default()
		}
	}
}

/// Data attached at each checkpoint milestone. Only the variant matching the
/// current `CheckpointTag` carries meaningful data; earlier-stage payloads
/// are retained for audit, never re-derived.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointPayload {
	pub analysis: Option<CanonicalAnalysis>,
	pub shopping_response: Option<ShoppingSearchResponse>,
	pub block_search: Option<BlockSearchScratch>,
}

impl Default for CheckpointPayload {
	fn default() -> Self {
		Self {
			analysis: None,
			shopping_response: None,
			block_search: None,
		}
	}
}

/// The consolidated checkpoint column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
	pub tag: CheckpointTag,
	pub progress: Progress,
	pub claim: ClaimLease,
	pub payload: CheckpointPayload,
}

impl Checkpoint {
	/// The checkpoint written by a successful claim, before any work starts.
	pub fn init(worker_id: String) -> Self {
		Self {
			tag: CheckpointTag::Init,
			progress: Progress {
				percentage: 5,
				step_tag: "init".into(),
				detail: String::new(),
			},
			claim: ClaimLease::new(worker_id),
			payload: CheckpointPayload::default(),
		}
	}

	/// The checkpoint written for a newly submitted request, before any
	/// worker has claimed it.
	pub fn pending() -> Self {
		Self {
			tag: CheckpointTag::Init,
			progress: Progress {
				percentage: 0,
				step_tag: "submitted".into(),
				detail: String::new(),
			},
			claim: ClaimLease::unclaimed(),
			payload: CheckpointPayload::default(),
		}
	}

	/// Whether the LLM call can be skipped on resume (spec.md §4.1 "reads the
	/// latest checkpoint and skips any prefix that is provably complete").
	pub fn analysis_cached(&self) -> bool {
		self.payload.analysis.is_some()
	}

	/// Whether the aggregator search call can be skipped on resume.
	pub fn shopping_search_cached(&self) -> bool {
		self.payload.shopping_response.is_some()
	}

	/// Moves to a new tag/progress step. `percentage` never moves the
	/// reported progress backwards (spec.md §8 "monotone progress").
	pub fn advance(&mut self, tag: CheckpointTag, percentage: u8, step_tag: impl Into<String>, detail: impl Into<String>) {
		self.tag = tag;
		self.progress = Progress {
			percentage: percentage.max(self.progress.percentage),
			step_tag: step_tag.into(),
			detail: detail.into(),
		};
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn init_checkpoint_has_no_cached_work() {
		let cp = Checkpoint::init("w1".into());
		assert!(!cp.analysis_cached());
		assert!(!cp.shopping_search_cached());
		assert_eq!(cp.tag, CheckpointTag::Init);
	}

	#[test]
	fn claim_is_live_within_liveness_window() {
		let lease = ClaimLease::new("w1".into());
		assert!(lease.is_live(chrono::Duration::seconds(60)));
	}

	#[test]
	fn terminal_tags_are_flagged() {
		assert!(CheckpointTag::Completed.is_terminal());
		assert!(CheckpointTag::Failed.is_terminal());
		assert!(!CheckpointTag::Init.is_terminal());
	}

	#[test]
	fn advance_never_moves_progress_backwards() {
		let mut cp = Checkpoint::init("w1".into());
		cp.advance(CheckpointTag::AiAnalysisStart, 10, "ai_analysis_start", "");
		cp.advance(CheckpointTag::AiAnalysisDone, 5, "regressed", "");
		assert_eq!(cp.progress.percentage, 10);
		assert_eq!(cp.tag, CheckpointTag::AiAnalysisDone);
	}
}

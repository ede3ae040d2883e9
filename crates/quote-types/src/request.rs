//! `QuoteRequest`: the unit of work driven by the quotation coordinator.

use crate::checkpoint::Checkpoint;
use crate::ids::{BatchId, ConfigVersionId, QuoteRequestId};
use crate::money::Money;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// How the request's input was supplied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputType {
	Text,
	Image,
	GoogleLens,
	TextBatch,
	ImageBatch,
	FileBatch,
}

/// Terminal and in-flight states of a `QuoteRequest`.
///
/// `Processing` is the only non-terminal state; once a request reaches any of
/// the others it is never re-executed (see `request.rs`'s invariant note on
/// `QuoteRequest::is_terminal`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuoteRequestStatus {
	Processing,
	Done,
	Error,
	Cancelled,
	AwaitingReview,
}

impl QuoteRequestStatus {
	pub fn is_terminal(&self) -> bool {
		!matches!(self, QuoteRequestStatus::Processing)
	}
}

/// Free-form progress reported to pollers: a percentage, a short step tag,
/// and a free-text detail. See `checkpoint::Progress` for the monotonicity
/// contract this value must uphold across a request's lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressReport {
	pub percentage: u8,
	pub step_tag: String,
	pub detail: String,
}

/// Aggregate statistics computed strictly from `is_accepted=true` sources.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AggregateResult {
	pub mean: Money,
	pub min: Money,
	pub max: Money,
	/// `(max/min - 1) * 100`.
	pub spread_percent: rust_decimal::Decimal,
}

/// The unit of work driven by the quotation coordinator, from claim through
/// terminal status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteRequest {
	pub id: QuoteRequestId,
	pub created_at: chrono::DateTime<chrono::Utc>,
	pub updated_at: chrono::DateTime<chrono::Utc>,
	pub started_at: Option<chrono::DateTime<chrono::Utc>>,
	pub completed_at: Option<chrono::DateTime<chrono::Utc>>,

	pub input_text: Option<String>,
	pub input_image_file_ids: Vec<crate::ids::FileId>,
	pub input_type: InputType,

	pub project_id: Option<String>,
	pub config_version_id: ConfigVersionId,
	pub parent_quote_id: Option<QuoteRequestId>,
	pub batch_id: Option<BatchId>,

	pub status: QuoteRequestStatus,
	pub progress: ProgressReport,

	pub checkpoint: Checkpoint,

	pub aggregate: Option<AggregateResult>,

	/// Re-quote chain bookkeeping: collapsed to the chain root, never the
	/// immediate parent (spec.md §9 "Re-quote chain collapse").
	pub original_quote_id: Option<QuoteRequestId>,
	pub attempt_number: u32,

	pub error_message: Option<String>,

	/// Research/analyst attribution carried from intake, opaque to the core.
	pub extra: HashMap<String, serde_json::Value>,
}

impl QuoteRequest {
	/// Builds a freshly submitted request: `PROCESSING`, unclaimed, with no
	/// checkpoint progress yet (spec.md §3 "QuoteRequest created PROCESSING
	/// by intake"). Intake concerns (auth, multipart parsing, rate limiting)
	/// stop at the caller; this just produces the record a worker will pick
	/// up on its next scan.
	#[allow(clippy::too_many_arguments)]
	pub fn new(
		input_text: Option<String>,
		input_image_file_ids: Vec<crate::ids::FileId>,
		input_type: InputType,
		project_id: Option<String>,
		config_version_id: ConfigVersionId,
		batch_id: Option<BatchId>,
	) -> Self {
		let now = chrono::Utc::now();
		Self {
			id: QuoteRequestId::new(),
			created_at: now,
			updated_at: now,
			started_at: None,
			completed_at: None,
			input_text,
			input_image_file_ids,
			input_type,
			project_id,
			config_version_id,
			parent_quote_id: None,
			batch_id,
			status: QuoteRequestStatus::Processing,
			progress: ProgressReport {
				percentage: 0,
				step_tag: "submitted".into(),
				detail: String::new(),
			},
			checkpoint: Checkpoint::pending(),
			aggregate: None,
			original_quote_id: None,
			attempt_number: 0,
			error_message: None,
			extra: HashMap::new(),
		}
	}

	/// Builds a re-quote of a terminal (`CANCELLED`/`ERROR`) request: copies
	/// the input, links to the chain root via `original_quote_id`, and
	/// increments `attempt_number` (spec.md §3 "Re-quote").
	pub fn requote(&self, config_version_id: ConfigVersionId) -> Self {
		let mut next = Self::new(
			self.input_text.clone(),
			self.input_image_file_ids.clone(),
			self.input_type,
			self.project_id.clone(),
			config_version_id,
			self.batch_id,
		);
		next.original_quote_id = Some(self.chain_root());
		next.attempt_number = self.attempt_number + 1;
		next
	}

	/// The re-quote chain root: `original_quote_id` if set, else `self.id`.
	/// A simple one-hop relation — never recurse through ancestors.
	pub fn chain_root(&self) -> QuoteRequestId {
		self.original_quote_id.unwrap_or(self.id)
	}

	pub fn is_terminal(&self) -> bool {
		self.status.is_terminal()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn chain_root_is_self_without_parent() {
		let id = QuoteRequestId::new();
		let req = sample_request(id, None);
		assert_eq!(req.chain_root(), id);
	}

	#[test]
	fn chain_root_collapses_to_original() {
		let root = QuoteRequestId::new();
		let req = sample_request(QuoteRequestId::new(), Some(root));
		assert_eq!(req.chain_root(), root);
	}

	#[test]
	fn new_request_is_unclaimed_and_processing() {
		let req = QuoteRequest::new(Some("notebook dell".into()), Vec::new(), InputType::Text, None, ConfigVersionId::new(), None);
		assert_eq!(req.status, QuoteRequestStatus::Processing);
		assert!(!req.checkpoint.claim.is_live(chrono::Duration::seconds(60)));
	}

	#[test]
	fn requote_collapses_to_chain_root_and_increments_attempt() {
		let root = QuoteRequest::new(Some("notebook dell".into()), Vec::new(), InputType::Text, None, ConfigVersionId::new(), None);
		let mut child = root.requote(ConfigVersionId::new());
		child.attempt_number = 1;
		let grandchild = child.requote(ConfigVersionId::new());

		assert_eq!(grandchild.original_quote_id, Some(root.id));
		assert_eq!(grandchild.attempt_number, 2);
	}

	fn sample_request(id: QuoteRequestId, original: Option<QuoteRequestId>) -> QuoteRequest {
		QuoteRequest {
			id,
			created_at: chrono::Utc::now(),
			updated_at: chrono::Utc::now(),
			started_at: None,
			completed_at: None,
			input_text: Some("notebook dell".into()),
			input_image_file_ids: Vec::new(),
			input_type: InputType::Text,
			project_id: None,
			config_version_id: ConfigVersionId::new(),
			parent_quote_id: None,
			batch_id: None,
			status: QuoteRequestStatus::Processing,
			progress: ProgressReport {
				percentage: 5,
				step_tag: "init".into(),
				detail: String::new(),
			},
			checkpoint: Checkpoint::init("worker-1".into()),
			aggregate: None,
			original_quote_id: original,
			attempt_number: 0,
			error_message: None,
			extra: HashMap::new(),
		}
	}
}

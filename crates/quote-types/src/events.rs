//! Event types for inter-component communication.
//!
//! One top-level enum, one variant group per producing component, flowing
//! through the coordinator's event bus.

use crate::ids::{FileId, QuoteRequestId, QuoteSourceId};
use crate::source::FailureReason;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum QuoteEvent {
	Shopping(ShoppingEvent),
	Extraction(ExtractionEvent),
	Analysis(AnalysisEvent),
	Vehicle(VehicleEvent),
	Lifecycle(LifecycleEvent),
}

/// Events from the shopping search provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ShoppingEvent {
	SearchStarted {
		quote_request_id: QuoteRequestId,
		query: String,
	},
	SearchCompleted {
		quote_request_id: QuoteRequestId,
		candidate_count: usize,
	},
	StoreLinkResolutionFailed {
		quote_request_id: QuoteRequestId,
		candidate_title: String,
	},
}

/// Events from the price extractor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ExtractionEvent {
	CandidateAccepted {
		quote_request_id: QuoteRequestId,
		source_id: QuoteSourceId,
	},
	CandidateRejected {
		quote_request_id: QuoteRequestId,
		reason: FailureReason,
	},
	ScreenshotCaptured {
		quote_request_id: QuoteRequestId,
		file_id: FileId,
	},
}

/// Events from the LLM analysis client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AnalysisEvent {
	Started {
		quote_request_id: QuoteRequestId,
	},
	Completed {
		quote_request_id: QuoteRequestId,
		total_tokens: u64,
	},
	QueryEmpty {
		quote_request_id: QuoteRequestId,
	},
}

/// Events from the vehicle sub-pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum VehicleEvent {
	CacheHit {
		quote_request_id: QuoteRequestId,
		codigo_fipe: String,
	},
	ResolutionFailed {
		quote_request_id: QuoteRequestId,
		reason: String,
	},
	FallenBackToShopping {
		quote_request_id: QuoteRequestId,
	},
}

/// Coordinator-level lifecycle transitions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LifecycleEvent {
	Claimed {
		quote_request_id: QuoteRequestId,
		worker_id: String,
	},
	Cancelled {
		quote_request_id: QuoteRequestId,
	},
	Terminal {
		quote_request_id: QuoteRequestId,
		status: crate::request::QuoteRequestStatus,
	},
}

//! Accepted and discarded price observations.

use crate::ids::{FileId, QuoteRequestId, QuoteSourceId};
use crate::money::Money;
use serde::{Deserialize, Serialize};

/// How a `QuoteSource`'s price was obtained.
///
/// `Regex` replaces the source system's `LLM` label for the currency-regex
/// fallback scan — see DESIGN.md's Open Question decision #1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExtractionMethod {
	JsonLd,
	Meta,
	Dom,
	Regex,
	ApiFipe,
	GoogleShopping,
}

/// Why a candidate was discarded instead of accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureReason {
	NoStoreLink,
	BlockedDomain,
	ForeignDomain,
	ListingUrl,
	DuplicateUrl,
	PriceMismatch,
	InvalidPrice,
	ScreenshotError,
	Other,
}

/// One accepted price observation belonging to a `QuoteRequest`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteSource {
	pub id: QuoteSourceId,
	pub quote_request_id: QuoteRequestId,
	pub final_url: String,
	/// eTLD+1, e.g. "magazineluiza.com.br".
	pub domain: String,
	pub page_title: String,
	pub price: Money,
	pub extraction_method: ExtractionMethod,
	pub screenshot_file_id: Option<FileId>,
	pub captured_at: chrono::DateTime<chrono::Utc>,
	/// Reserved, always `false` — see DESIGN.md's Open Question decision #2.
	pub is_outlier: bool,
	pub is_accepted: bool,
	/// Set only on the late pass that may flip `is_accepted` to `false` when
	/// reassembling the final block (spec.md §3 "Lifecycle").
	pub failure_reason: Option<FailureReason>,
}

/// Every discarded candidate, recorded for audit even though it never
/// becomes a `QuoteSource`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteSourceFailure {
	pub id: QuoteSourceId,
	pub quote_request_id: QuoteRequestId,
	pub url: Option<String>,
	pub domain: Option<String>,
	pub product_title: String,
	pub aggregator_price: Option<Money>,
	pub reason: FailureReason,
	pub message: String,
	pub recorded_at: chrono::DateTime<chrono::Utc>,
}

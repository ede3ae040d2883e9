//! Parsed forms of the LLM and aggregator payloads.
//!
//! The source system stores `claude_payload_json` and
//! `google_shopping_response_json` as opaque dynamic dicts. Per SPEC_FULL.md
//! §3, this defines a narrow parsed struct for the fields the core reads,
//! keeping the original response as an uninterpreted `serde_json::Value`
//! alongside for audit — never reparsed from storage.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Which sub-pipeline a request should follow after LLM analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessingType {
	Fipe,
	GoogleShopping,
}

/// Vehicle identification fields produced by the LLM for the FIPE path.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VehicleIdentification {
	pub brand: Option<String>,
	pub model: Option<String>,
	pub year: Option<String>,
	pub fuel: Option<String>,
	/// Fallback Google-Shopping query if FIPE resolution fails (spec.md §4.5
	/// "Fallback").
	pub shopping_fallback_query: Option<String>,
}

/// Token usage for a single LLM call; summed across calls on
/// `CanonicalAnalysis::total_tokens`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
	pub input_tokens: u64,
	pub output_tokens: u64,
}

impl TokenUsage {
	pub fn total(&self) -> u64 {
		self.input_tokens + self.output_tokens
	}
}

/// One LLM call's accounting record: activity label, tokens, and the prompt
/// text actually sent (spec.md §4.4 "Accounting").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallAccounting {
	pub activity_label: String,
	pub usage: TokenUsage,
	pub prompt_text: String,
}

/// The narrow, core-readable form of `claude_payload_json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalAnalysis {
	pub canonical_name: String,
	pub brand: Option<String>,
	pub model: Option<String>,
	pub processing_type: ProcessingType,
	pub extracted_specs: Vec<String>,

	/// Mandatory and non-empty for the shopping path; the coordinator fails
	/// the request before touching the aggregator if empty (spec.md §4.4
	/// "Query quality contract").
	pub primary_query: String,
	pub alternative_queries: Vec<String>,
	pub exclude_terms: Vec<String>,

	pub vehicle: Option<VehicleIdentification>,

	pub calls: Vec<CallAccounting>,

	/// Original LLM response body, kept for audit; never reparsed.
	pub raw: serde_json::Value,
}

impl CanonicalAnalysis {
	pub fn total_tokens(&self) -> u64 {
		self.calls.iter().map(|c| c.usage.total()).sum()
	}

	/// spec.md §4.4 "Query quality contract": mandatory, non-empty primary
	/// query for the shopping path.
	pub fn has_usable_query(&self) -> bool {
		!self.primary_query.trim().is_empty()
	}
}

/// One product returned by the aggregator's initial search, before any
/// per-product API call (spec.md GLOSSARY "Candidate").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShoppingCandidate {
	pub title: String,
	/// The aggregator's human-readable price text, e.g. "R$ 1.234,56".
	pub price_text: Option<String>,
	/// The aggregator's numeric price.
	pub extracted_price: Option<Decimal>,
	/// Free-text store name from the aggregator, e.g. "Mercado Livre".
	pub source: Option<String>,
	pub immersive_link: Option<String>,
	pub product_link: Option<String>,
	pub link: Option<String>,
}

impl ShoppingCandidate {
	/// Stable key used by the block-search sets (`validated_keys`,
	/// `failed_keys`): `(title, price)`, matching spec.md §4.1.1.
	pub fn key(&self) -> String {
		format!(
			"{}|{}",
			self.title,
			self.extracted_price
				.map(|p| p.to_string())
				.unwrap_or_default()
		)
	}
}

/// Structured log of the initial candidate filtering pass (spec.md §4.2
/// "Return both the filtered candidate list and a structured log").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterLog {
	pub raw_count: usize,
	pub dropped_blocked_source: usize,
	pub dropped_invalid_price: usize,
	pub dropped_global_cap: usize,
}

/// The narrow, core-readable form of `google_shopping_response_json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShoppingSearchResponse {
	pub candidates: Vec<ShoppingCandidate>,
	pub filter_log: FilterLog,
	/// Original aggregator response body, kept for audit; never reparsed.
	pub raw: serde_json::Value,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn empty_primary_query_is_unusable() {
		let analysis = CanonicalAnalysis {
			canonical_name: "x".into(),
			brand: None,
			model: None,
			processing_type: ProcessingType::GoogleShopping,
			extracted_specs: Vec::new(),
			primary_query: "   ".into(),
			alternative_queries: Vec::new(),
			exclude_terms: Vec::new(),
			vehicle: None,
			calls: Vec::new(),
			raw: serde_json::Value::Null,
		};
		assert!(!analysis.has_usable_query());
	}

	#[test]
	fn candidate_key_combines_title_and_price() {
		let c = ShoppingCandidate {
			title: "Notebook".into(),
			price_text: Some("R$ 100,00".into()),
			extracted_price: Some(Decimal::new(10000, 2)),
			source: Some("Loja X".into()),
			immersive_link: None,
			product_link: None,
			link: None,
		};
		assert_eq!(c.key(), "Notebook|100.00");
	}
}

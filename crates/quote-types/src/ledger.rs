//! Append-only audit of external calls and their cost.

use crate::ids::QuoteRequestId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Which external collaborator a logged call went to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallKind {
	Llm,
	Aggregator,
	Fipe,
}

impl CallKind {
	/// Lowercase key used for config lookups (e.g. `ledger.cost_rates.llm`).
	pub fn as_str(&self) -> &'static str {
		match self {
			CallKind::Llm => "llm",
			CallKind::Aggregator => "aggregator",
			CallKind::Fipe => "fipe",
		}
	}
}

/// One row per external HTTP call, written regardless of whether the call
/// was ultimately costed (spec.md §4.2 "Cost accounting": "Every HTTP call is
/// registered on an internal 'API calls' list").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrationLog {
	pub id: String,
	pub quote_request_id: QuoteRequestId,
	pub kind: CallKind,
	/// URL with the API key stripped before logging (spec.md §4.2:
	/// "the sanitized URL (API key redacted)").
	pub sanitized_url: String,
	pub product_title: Option<String>,
	pub resolved_store_link: Option<String>,
	pub recorded_at: chrono::DateTime<chrono::Utc>,
}

/// Per-provider BRL rate, looked up to convert a call's units (tokens or
/// call count) into cost. SPEC_FULL.md §10: grounded on `_register_anthropic_
/// cost`/`_register_serpapi_cost`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CostRate {
	pub per_unit_brl: Decimal,
}

/// One immutable ledger row per external *call batch* (not per HTTP
/// request — SPEC_FULL.md §10), written once and never updated
/// (spec.md §3 "Invariants": "Financial transactions, once written, are
/// immutable").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinancialTransaction {
	pub id: String,
	pub quote_request_id: QuoteRequestId,
	pub client_id: Option<String>,
	pub project_id: Option<String>,
	pub kind: CallKind,
	pub units: u64,
	pub per_unit_brl: Decimal,
	pub total_cost_brl: Decimal,
	pub recorded_at: chrono::DateTime<chrono::Utc>,
}

impl FinancialTransaction {
	pub fn new(
		quote_request_id: QuoteRequestId,
		client_id: Option<String>,
		project_id: Option<String>,
		kind: CallKind,
		units: u64,
		rate: CostRate,
	) -> Self {
		let total_cost_brl = rate.per_unit_brl * Decimal::from(units);
		Self {
			id: uuid::Uuid::new_v4().to_string(),
			quote_request_id,
			client_id,
			project_id,
			kind,
			units,
			per_unit_brl: rate.per_unit_brl,
			total_cost_brl,
			recorded_at: chrono::Utc::now(),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rust_decimal_macros::dec;

	#[test]
	fn total_cost_is_units_times_rate() {
		let tx = FinancialTransaction::new(
			QuoteRequestId::new(),
			None,
			None,
			CallKind::Llm,
			1200,
			CostRate {
				per_unit_brl: dec!(0.00005),
			},
		);
		assert_eq!(tx.total_cost_brl, dec!(0.06000));
	}
}

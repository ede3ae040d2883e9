//! Frozen parameter snapshot referenced by each `QuoteRequest`.
//!
//! Each tunable mirrors the source's `_get_parameter(key, default)` resolution
//! (SPEC_FULL.md §10): a value absent from the stored snapshot falls back to
//! the same hardcoded default the source used, expressed here as
//! `#[serde(default = ...)]` rather than a runtime lookup.

use crate::ids::ConfigVersionId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

fn default_number_of_quotes() -> u32 {
	3
}

fn default_max_variation_percent() -> Decimal {
	Decimal::new(25, 0)
}

fn default_vigency_months() -> u32 {
	6
}

fn default_location() -> String {
	"Brazil".to_string()
}

fn default_language() -> String {
	"pt-br".to_string()
}

fn default_country() -> String {
	"br".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfigVersion {
	pub id: ConfigVersionId,
	pub project_id: Option<String>,
	pub created_at: chrono::DateTime<chrono::Utc>,

	#[serde(default = "default_number_of_quotes")]
	pub number_of_quotes: u32,

	/// Initial variation fraction, expressed as a whole-number percent
	/// (e.g. `25` meaning ε₀ = 0.25), per spec.md §4.1.1.
	#[serde(default = "default_max_variation_percent")]
	pub max_variation_percent: Decimal,

	/// Whether per-candidate price-mismatch validation is enabled
	/// (spec.md §4.1.2 step 4).
	#[serde(default)]
	pub enable_price_mismatch: bool,

	#[serde(default = "default_location")]
	pub aggregator_location: String,
	#[serde(default = "default_language")]
	pub aggregator_language: String,
	#[serde(default = "default_country")]
	pub aggregator_country: String,

	/// FIPE cache freshness window, in months (spec.md §4.5 "Cache lookup").
	#[serde(default = "default_vigency_months")]
	pub fipe_vigency_months: u32,

	/// v2 feature flags, threaded through but inert — see DESIGN.md's Open
	/// Question decision #3.
	#[serde(default)]
	pub enable_spec_extraction: bool,
	#[serde(default)]
	pub enable_spec_validation: bool,
	#[serde(default)]
	pub enable_linear_meter: bool,
}

impl ProjectConfigVersion {
	/// ε₀ as a fraction (e.g. `0.25`), as the block-search algorithm consumes it.
	pub fn epsilon0(&self) -> Decimal {
		self.max_variation_percent / Decimal::new(100, 0)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn defaults_deserialize_from_empty_object() {
		let cfg: ProjectConfigVersion = serde_json::from_str(&format!(
			r#"{{"id":"{}","project_id":null,"created_at":"2026-01-01T00:00:00Z"}}"#,
			ConfigVersionId::new()
		))
		.unwrap();
		assert_eq!(cfg.number_of_quotes, 3);
		assert_eq!(cfg.max_variation_percent, Decimal::new(25, 0));
		assert!(!cfg.enable_price_mismatch);
	}

	#[test]
	fn epsilon0_converts_percent_to_fraction() {
		let cfg = ProjectConfigVersion {
			id: ConfigVersionId::new(),
			project_id: None,
			created_at: chrono::Utc::now(),
			number_of_quotes: 3,
			max_variation_percent: Decimal::new(25, 0),
			enable_price_mismatch: false,
			aggregator_location: default_location(),
			aggregator_language: default_language(),
			aggregator_country: default_country(),
			fipe_vigency_months: 6,
			enable_spec_extraction: false,
			enable_spec_validation: false,
			enable_linear_meter: false,
		};
		assert_eq!(cfg.epsilon0(), Decimal::new(25, 2));
	}
}

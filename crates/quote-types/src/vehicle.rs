//! FIPE vehicle sub-pipeline types.

use crate::ids::FileId;
use crate::money::Money;
use serde::{Deserialize, Serialize};

/// Deduplicated by `(codigo_fipe, year_id)`, enforced by UPSERT
/// (spec.md §3 "Invariants").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VehiclePriceBank {
	pub codigo_fipe: String,
	pub year_id: String,
	pub brand: String,
	pub model: String,
	pub year: String,
	pub fuel: String,
	pub price: Money,
	pub reference_month: String,
	pub screenshot_file_id: Option<FileId>,
	pub last_api_call: chrono::DateTime<chrono::Utc>,
	pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl VehiclePriceBank {
	/// Whether this cached row is still fresh enough to reuse without
	/// re-querying the FIPE API (spec.md §4.5 "Cache lookup").
	pub fn is_fresh(&self, now: chrono::DateTime<chrono::Utc>, vigency_months: u32) -> bool {
		let vigency = chrono::Duration::days(30 * vigency_months as i64);
		now - self.updated_at <= vigency
	}
}

/// Query parameters the coordinator passes into the vehicle sub-pipeline,
/// derived from `CanonicalAnalysis::vehicle`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FipeVehicleQuery {
	pub brand_hint: String,
	pub model_hint: String,
	pub year_hint: String,
	pub fuel_hint: Option<String>,
}

/// Outcome of the fragile evidence-capture driver, isolated behind
/// `FipeEvidenceCapture` (spec.md §9 "FIPE site automation is fragile").
/// `Unavailable` implements the spec's "degraded completion": the price is
/// still published, only the screenshot is missing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EvidenceOutcome {
	Captured(FileId),
	Unavailable { reason: String },
}

#[cfg(test)]
mod tests {
	use super::*;
	use rust_decimal_macros::dec;

	fn sample(updated_at: chrono::DateTime<chrono::Utc>) -> VehiclePriceBank {
		VehiclePriceBank {
			codigo_fipe: "022140-6".into(),
			year_id: "2020-1".into(),
			brand: "Volkswagen".into(),
			model: "Gol".into(),
			year: "2020".into(),
			fuel: "Flex".into(),
			price: crate::money::Money::new(dec!(45000)).unwrap(),
			reference_month: "julho de 2026".into(),
			screenshot_file_id: None,
			last_api_call: updated_at,
			updated_at,
		}
	}

	#[test]
	fn row_within_vigency_is_fresh() {
		let now = chrono::Utc::now();
		let row = sample(now - chrono::Duration::days(60));
		assert!(row.is_fresh(now, 6));
	}

	#[test]
	fn row_past_vigency_is_stale() {
		let now = chrono::Utc::now();
		let row = sample(now - chrono::Duration::days(200));
		assert!(!row.is_fresh(now, 6));
	}
}

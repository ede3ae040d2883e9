//! FIPE vehicle sub-pipeline module for the quotation processing pipeline.
//!
//! This module resolves a brand/model/year/fuel hint to a FIPE table price,
//! checking the local price bank first and falling back to the Parallelum
//! FIPE API's "optimized flow" (spec.md §4.5). A single narrow trait,
//! `FipeEvidenceCapture`, isolates the fragile headless-browser screenshot
//! driver from the rest of the crate (spec.md §9).

use async_trait::async_trait;
use quote_storage::StorageService;
use quote_types::vehicle::{EvidenceOutcome, FipeVehicleQuery, VehiclePriceBank};
use quote_types::{ConfigSchema, ImplementationRegistry, Money, StorageKey};
use thiserror::Error;

pub mod aliases;
pub mod evidence;
pub mod matching;

pub use evidence::{FipeEvidenceCapture, FipeEvidenceParams, VehicleKind, WebDriverFipeCapture};

/// Re-export implementations.
pub mod implementations {
	pub mod fipe_api;
}

/// Errors that can occur during FIPE resolution.
#[derive(Debug, Error)]
pub enum FipeError {
	#[error("FIPE provider error: {0}")]
	Provider(String),
	#[error("failed to parse FIPE response: {0}")]
	Parse(String),
	#[error("invalid configuration: {0}")]
	InvalidConfig(String),
	#[error("no matching brand/model/year found for query")]
	NoMatch,
	#[error("evidence capture failed: {0}")]
	Evidence(String),
	#[error("storage error: {0}")]
	Storage(#[from] quote_storage::StorageError),
}

#[derive(Debug, Clone)]
pub struct FipeBrand {
	pub code: String,
	pub name: String,
}

#[derive(Debug, Clone)]
pub struct FipeModel {
	pub code: String,
	pub name: String,
}

#[derive(Debug, Clone)]
pub struct FipeYear {
	pub code: String,
	pub name: String,
}

/// One priced FIPE table entry, as returned by the API's price endpoint.
#[derive(Debug, Clone)]
pub struct FipePriceResult {
	pub price: Money,
	pub brand: String,
	pub model: String,
	pub model_year: i32,
	pub fuel: String,
	pub codigo_fipe: String,
	pub reference_month: String,
}

/// Trait defining the interface for FIPE table data providers.
///
/// This trait must be implemented by any backend that wants to serve
/// brand/model/year hierarchies and priced lookups from the FIPE table.
#[async_trait]
pub trait FipeProvider: Send + Sync {
	/// Returns the configuration schema for this provider implementation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	async fn list_brands(&self, kind: VehicleKind) -> Result<Vec<FipeBrand>, FipeError>;
	async fn list_years_by_brand(&self, kind: VehicleKind, brand_code: &str) -> Result<Vec<FipeYear>, FipeError>;
	async fn list_models_by_brand_year(
		&self,
		kind: VehicleKind,
		brand_code: &str,
		year_code: &str,
	) -> Result<Vec<FipeModel>, FipeError>;
	async fn list_models_by_brand(&self, kind: VehicleKind, brand_code: &str) -> Result<Vec<FipeModel>, FipeError>;
	async fn list_years_by_model(
		&self,
		kind: VehicleKind,
		brand_code: &str,
		model_code: &str,
	) -> Result<Vec<FipeYear>, FipeError>;
	async fn get_price(
		&self,
		kind: VehicleKind,
		brand_code: &str,
		model_code: &str,
		year_code: &str,
	) -> Result<FipePriceResult, FipeError>;
	async fn get_price_by_codigo_fipe(
		&self,
		kind: VehicleKind,
		codigo_fipe: &str,
		year_code: &str,
	) -> Result<FipePriceResult, FipeError>;
}

/// Type alias for FIPE provider factory functions.
pub type FipeFactory = fn(&toml::Value) -> Result<Box<dyn FipeProvider>, FipeError>;

/// Registry trait for FIPE provider implementations.
pub trait FipeRegistry: ImplementationRegistry<Factory = FipeFactory> {}

/// Get all registered FIPE provider implementations.
pub fn get_all_implementations() -> Vec<(&'static str, FipeFactory)> {
	use implementations::fipe_api;

	vec![(fipe_api::Registry::NAME, fipe_api::Registry::factory())]
}

/// The outcome of resolving one vehicle query: the priced result plus
/// whether evidence was captured, and whether the price came from the
/// cache or a fresh API call (spec.md §4.5).
#[derive(Debug, Clone)]
pub struct VehicleResolution {
	pub row: VehiclePriceBank,
	pub evidence: EvidenceOutcome,
	pub from_cache: bool,
}

/// Service orchestrating the cache-then-API FIPE resolution flow, wrapping
/// one configured `FipeProvider` and the evidence-capture driver.
pub struct VehicleService {
	provider: Box<dyn FipeProvider>,
	capture: Box<dyn FipeEvidenceCapture>,
	vehicle_kind: VehicleKind,
	vigency_months: u32,
}

impl VehicleService {
	pub fn new(
		provider: Box<dyn FipeProvider>,
		capture: Box<dyn FipeEvidenceCapture>,
		vehicle_kind: VehicleKind,
		vigency_months: u32,
	) -> Self {
		Self {
			provider,
			capture,
			vehicle_kind,
			vigency_months,
		}
	}

	/// Resolves a vehicle query to a priced FIPE row, checking the local
	/// bank first (spec.md §4.5 "Cache lookup") and falling back to the
	/// FIPE API's optimized flow plus evidence capture on a miss or stale
	/// hit (spec.md §4.5 "API resolution" / "Evidence screenshot").
	pub async fn resolve(
		&self,
		storage: &StorageService,
		query: &FipeVehicleQuery,
		storage_dir: &std::path::Path,
	) -> Result<VehicleResolution, FipeError> {
		let now = chrono::Utc::now();

		if let Some(row) = self.cache_lookup(storage, query).await? {
			if row.is_fresh(now, self.vigency_months) {
				let evidence = match row.screenshot_file_id {
					Some(id) => EvidenceOutcome::Captured(id),
					None => EvidenceOutcome::Unavailable {
						reason: "cached row has no screenshot on file".to_string(),
					},
				};
				return Ok(VehicleResolution {
					row,
					evidence,
					from_cache: true,
				});
			}
		}

		let (price, year_code) = self.resolve_via_api(query).await?;

		let file_id = quote_types::FileId::new();
		let evidence_params = FipeEvidenceParams {
			file_id,
			storage_dir: storage_dir.to_path_buf(),
			vehicle_kind: self.vehicle_kind,
			codigo_fipe: price.codigo_fipe.clone(),
			year_label: format!("{} {}", price.model_year, price.fuel),
		};

		let (evidence, screenshot_file_id) = match self.capture.capture_evidence(&evidence_params).await {
			Ok(file) => (EvidenceOutcome::Captured(file.id), Some(file.id)),
			Err(e) => (EvidenceOutcome::Unavailable { reason: e.to_string() }, None),
		};

		let row = VehiclePriceBank {
			codigo_fipe: price.codigo_fipe.clone(),
			year_id: year_code,
			brand: price.brand.clone(),
			model: price.model.clone(),
			year: price.model_year.to_string(),
			fuel: price.fuel.clone(),
			price: price.price,
			reference_month: price.reference_month.clone(),
			screenshot_file_id,
			last_api_call: now,
			updated_at: now,
		};

		self.cache_write(storage, &row).await?;

		Ok(VehicleResolution {
			row,
			evidence,
			from_cache: false,
		})
	}

	/// Scans the price bank namespace for a row matching the query's brand
	/// substring, model keywords, exact year and optional fuel substring,
	/// returning the most recently updated match (spec.md §4.5 "Cache
	/// lookup"). `StorageService` only exposes equality/membership filters,
	/// so this does the fuzzier matching locally over a full namespace scan.
	async fn cache_lookup(&self, storage: &StorageService, query: &FipeVehicleQuery) -> Result<Option<VehiclePriceBank>, FipeError> {
		let rows: Vec<(String, VehiclePriceBank)> = storage.retrieve_all(StorageKey::VehiclePriceBank.as_str()).await?;

		let brand_lower = query.brand_hint.to_lowercase();
		let model_words: Vec<String> = query
			.model_hint
			.to_lowercase()
			.split_whitespace()
			.filter(|w| w.len() >= 2)
			.map(|w| w.to_string())
			.collect();
		let fuel_lower = query.fuel_hint.as_ref().map(|f| f.to_lowercase());

		let mut candidates: Vec<VehiclePriceBank> = rows
			.into_iter()
			.map(|(_, row)| row)
			.filter(|row| {
				let row_brand = row.brand.to_lowercase();
				let row_model = row.model.to_lowercase();
				let brand_ok = row_brand.contains(&brand_lower) || brand_lower.contains(&row_brand);
				let model_ok = model_words.is_empty() || model_words.iter().all(|w| row_model.contains(w.as_str()));
				let year_ok = row.year == query.year_hint;
				let fuel_ok = match &fuel_lower {
					Some(fuel) => row.fuel.to_lowercase().contains(fuel.as_str()),
					None => true,
				};
				brand_ok && model_ok && year_ok && fuel_ok
			})
			.collect();

		candidates.sort_by_key(|row| row.updated_at);
		Ok(candidates.pop())
	}

	/// UPSERT by `(codigo_fipe, year_id)` (spec.md §3 "Invariants"). `store`
	/// always creates-or-overwrites, which is exactly the upsert semantics
	/// this needs — no read-modify-write dance required.
	async fn cache_write(&self, storage: &StorageService, row: &VehiclePriceBank) -> Result<(), FipeError> {
		let key = format!("{}_{}", row.codigo_fipe, row.year_id);
		storage.store(StorageKey::VehiclePriceBank.as_str(), &key, row, None).await?;
		Ok(())
	}

	/// The "optimized flow" (spec.md §4.5 "API resolution"): brand, then
	/// year-by-brand, then model-by-brand-year with a fallback to
	/// model-by-brand when no year-scoped model matches, then price.
	/// Returns the matched year's code alongside the price so the caller
	/// can use it as the cache row's `year_id` (distinct from the vehicle's
	/// `codigo_fipe`).
	async fn resolve_via_api(&self, query: &FipeVehicleQuery) -> Result<(FipePriceResult, String), FipeError> {
		let kind = self.vehicle_kind;

		let brands = self.provider.list_brands(kind).await?;
		let brand = matching::match_brand(&brands, &query.brand_hint, &[]).ok_or(FipeError::NoMatch)?.clone();

		let years = self.provider.list_years_by_brand(kind, &brand.code).await?;
		let year = matching::match_year(&years, &query.year_hint, query.fuel_hint.as_deref()).ok_or(FipeError::NoMatch)?.clone();

		let models_by_year = self.provider.list_models_by_brand_year(kind, &brand.code, &year.code).await?;
		let matched_model = matching::match_model(&models_by_year, &query.model_hint, &[], &[]).cloned();

		let (model, year) = match matched_model {
			Some(model) => (model, year),
			None => {
				let all_models = self.provider.list_models_by_brand(kind, &brand.code).await?;
				let model = matching::match_model(&all_models, &query.model_hint, &[], &[])
					.ok_or(FipeError::NoMatch)?
					.clone();
				let years_by_model = self.provider.list_years_by_model(kind, &brand.code, &model.code).await?;
				let year = matching::match_year(&years_by_model, &query.year_hint, query.fuel_hint.as_deref())
					.ok_or(FipeError::NoMatch)?
					.clone();
				(model, year)
			}
		};

		let price = self.provider.get_price(kind, &brand.code, &model.code, &year.code).await?;
		Ok((price, year.code))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn make_query() -> FipeVehicleQuery {
		FipeVehicleQuery {
			brand_hint: "Volkswagen".to_string(),
			model_hint: "Gol".to_string(),
			year_hint: "2020".to_string(),
			fuel_hint: Some("Flex".to_string()),
		}
	}

	#[test]
	fn fipe_error_wraps_storage_error() {
		let storage_err = quote_storage::StorageError::NotFound;
		let err: FipeError = storage_err.into();
		assert!(matches!(err, FipeError::Storage(_)));
	}

	#[test]
	fn query_construction_round_trips_fields() {
		let q = make_query();
		assert_eq!(q.brand_hint, "Volkswagen");
		assert_eq!(q.fuel_hint.as_deref(), Some("Flex"));
	}
}

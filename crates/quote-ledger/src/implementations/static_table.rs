//! Static, config-driven cost-rate table.
//!
//! Reads one BRL-per-unit rate per `CallKind` from TOML configuration. This
//! is the only provider shipped today; the trait exists so a future
//! provider (e.g. one that re-reads rates from a remote pricing table
//! on an interval) can be swapped in without touching `LedgerService`.

use crate::{CostRateProvider, LedgerError};
use async_trait::async_trait;
use quote_types::{CallKind, ConfigSchema, CostRate, Field, FieldType, Schema, ValidationError};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::str::FromStr;

/// Cost-rate provider backed by a fixed table loaded once at startup.
pub struct StaticRateTable {
	rates: HashMap<&'static str, Decimal>,
}

impl StaticRateTable {
	/// Builds a table from a `cost_rates` TOML table mapping `CallKind::as_str`
	/// keys to decimal-string rates.
	fn from_config(config: &toml::Value) -> Result<Self, LedgerError> {
		let mut rates = HashMap::new();

		if let Some(table) = config.get("cost_rates").and_then(|v| v.as_table()) {
			for kind in [CallKind::Llm, CallKind::Aggregator, CallKind::Fipe] {
				if let Some(value) = table.get(kind.as_str()) {
					let s = value.as_str().ok_or_else(|| {
						LedgerError::Implementation(format!(
							"cost_rates.{} must be a decimal string",
							kind.as_str()
						))
					})?;
					let decimal =
						Decimal::from_str(s).map_err(|e| LedgerError::Implementation(e.to_string()))?;
					rates.insert(kind.as_str(), decimal);
				}
			}
		}

		Ok(Self { rates })
	}
}

#[async_trait]
impl CostRateProvider for StaticRateTable {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(StaticRateTableSchema)
	}

	async fn rate(&self, kind: CallKind) -> Result<CostRate, LedgerError> {
		self.rates
			.get(kind.as_str())
			.copied()
			.map(|per_unit_brl| CostRate { per_unit_brl })
			.ok_or(LedgerError::RateNotFound(kind))
	}
}

/// Configuration schema for StaticRateTable.
pub struct StaticRateTableSchema;

impl ConfigSchema for StaticRateTableSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let rate_fields = [CallKind::Llm, CallKind::Aggregator, CallKind::Fipe]
			.into_iter()
			.map(|kind| Field::new(kind.as_str(), FieldType::String))
			.collect();
		let rates_schema = Schema::new(vec![], rate_fields);
		let schema = Schema::new(vec![], vec![Field::new("cost_rates", FieldType::Table(rates_schema))]);
		schema.validate(config)
	}
}

/// Factory function to create a cost-rate provider from configuration.
pub fn create_provider(config: &toml::Value) -> Result<Box<dyn CostRateProvider>, LedgerError> {
	Ok(Box::new(StaticRateTable::from_config(config)?))
}

/// Registry for the static cost-rate table implementation.
pub struct Registry;

impl quote_types::ImplementationRegistry for Registry {
	const NAME: &'static str = "static";
	type Factory = crate::CostRateFactory;

	fn factory() -> Self::Factory {
		create_provider
	}
}

impl crate::CostRateRegistry for Registry {}

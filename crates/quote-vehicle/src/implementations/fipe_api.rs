//! Parallelum FIPE API backend.
//!
//! Default (and currently only) `FipeProvider` implementation, grounded on
//! `fipe_client.py`'s `FipeClient`: thin HTTP GETs against the public
//! Parallelum mirror of the FIPE table, no API key required.

use crate::{FipeBrand, FipeError, FipeModel, FipePriceResult, FipeProvider, FipeYear};
use crate::evidence::VehicleKind;
use async_trait::async_trait;
use quote_types::{ConfigSchema, Field, FieldType, Schema, ValidationError};
use rust_decimal::Decimal;

const DEFAULT_BASE_URL: &str = "https://fipe.parallelum.com.br/api/v2";

struct ParallelumConfig {
	base_url: String,
}

impl ParallelumConfig {
	fn from_toml(config: &toml::Value) -> Result<Self, FipeError> {
		let base_url = config
			.get("base_url")
			.and_then(|v| v.as_str())
			.unwrap_or(DEFAULT_BASE_URL)
			.to_string();
		Ok(Self { base_url })
	}
}

pub struct ParallelumProvider {
	client: reqwest::Client,
	config: ParallelumConfig,
}

impl ParallelumProvider {
	fn new(config: ParallelumConfig) -> Self {
		Self {
			client: reqwest::Client::new(),
			config,
		}
	}

	fn url(&self, kind: VehicleKind, path: &str) -> String {
		format!("{}/{}{}", self.config.base_url, kind.api_segment(), path)
	}

	async fn get_json(&self, url: &str) -> Result<serde_json::Value, FipeError> {
		let response = self.client.get(url).send().await.map_err(|e| FipeError::Provider(e.to_string()))?;
		if !response.status().is_success() {
			return Err(FipeError::Provider(format!("{} returned {}", url, response.status())));
		}
		response.json().await.map_err(|e| FipeError::Parse(e.to_string()))
	}
}

#[async_trait]
impl FipeProvider for ParallelumProvider {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(ParallelumConfigSchema)
	}

	async fn list_brands(&self, kind: VehicleKind) -> Result<Vec<FipeBrand>, FipeError> {
		let url = self.url(kind, "/brands");
		let raw = self.get_json(&url).await?;
		parse_brands(&raw)
	}

	async fn list_years_by_brand(&self, kind: VehicleKind, brand_code: &str) -> Result<Vec<FipeYear>, FipeError> {
		let url = self.url(kind, &format!("/brands/{brand_code}/years"));
		let raw = self.get_json(&url).await?;
		parse_years(&raw)
	}

	async fn list_models_by_brand_year(
		&self,
		kind: VehicleKind,
		brand_code: &str,
		year_code: &str,
	) -> Result<Vec<FipeModel>, FipeError> {
		let url = self.url(kind, &format!("/brands/{brand_code}/years/{year_code}/models"));
		let raw = self.get_json(&url).await?;
		parse_models(&raw)
	}

	async fn list_models_by_brand(&self, kind: VehicleKind, brand_code: &str) -> Result<Vec<FipeModel>, FipeError> {
		let url = self.url(kind, &format!("/brands/{brand_code}/models"));
		let raw = self.get_json(&url).await?;
		parse_models(&raw)
	}

	async fn list_years_by_model(
		&self,
		kind: VehicleKind,
		brand_code: &str,
		model_code: &str,
	) -> Result<Vec<FipeYear>, FipeError> {
		let url = self.url(kind, &format!("/brands/{brand_code}/models/{model_code}/years"));
		let raw = self.get_json(&url).await?;
		parse_years(&raw)
	}

	async fn get_price(
		&self,
		kind: VehicleKind,
		brand_code: &str,
		model_code: &str,
		year_code: &str,
	) -> Result<FipePriceResult, FipeError> {
		let url = self.url(kind, &format!("/brands/{brand_code}/models/{model_code}/years/{year_code}"));
		let raw = self.get_json(&url).await?;
		parse_price(&raw)
	}

	async fn get_price_by_codigo_fipe(
		&self,
		kind: VehicleKind,
		codigo_fipe: &str,
		year_code: &str,
	) -> Result<FipePriceResult, FipeError> {
		let url = self.url(kind, &format!("/fipe-codes/{codigo_fipe}/years/{year_code}"));
		let raw = self.get_json(&url).await?;
		parse_price(&raw)
	}
}

fn parse_brands(raw: &serde_json::Value) -> Result<Vec<FipeBrand>, FipeError> {
	let array = raw.as_array().ok_or_else(|| FipeError::Parse("expected array of brands".to_string()))?;
	array
		.iter()
		.map(|item| {
			Ok(FipeBrand {
				code: str_field(item, "code")?,
				name: str_field(item, "name")?,
			})
		})
		.collect()
}

fn parse_models(raw: &serde_json::Value) -> Result<Vec<FipeModel>, FipeError> {
	let array = raw.as_array().ok_or_else(|| FipeError::Parse("expected array of models".to_string()))?;
	array
		.iter()
		.map(|item| {
			Ok(FipeModel {
				code: str_field(item, "code")?,
				name: str_field(item, "name")?,
			})
		})
		.collect()
}

fn parse_years(raw: &serde_json::Value) -> Result<Vec<FipeYear>, FipeError> {
	let array = raw.as_array().ok_or_else(|| FipeError::Parse("expected array of years".to_string()))?;
	array
		.iter()
		.map(|item| {
			Ok(FipeYear {
				code: str_field(item, "code")?,
				name: str_field(item, "name")?,
			})
		})
		.collect()
}

fn parse_price(raw: &serde_json::Value) -> Result<FipePriceResult, FipeError> {
	let price_text = raw
		.get("price")
		.and_then(|v| v.as_str())
		.ok_or_else(|| FipeError::Parse("missing price field".to_string()))?;
	let price = quote_types::Money::parse_brl(price_text).map_err(|e| FipeError::Parse(e.to_string()))?;

	Ok(FipePriceResult {
		price,
		brand: str_field(raw, "brand")?,
		model: str_field(raw, "model")?,
		model_year: raw.get("modelYear").and_then(|v| v.as_i64()).unwrap_or_default() as i32,
		fuel: str_field(raw, "fuel")?,
		codigo_fipe: str_field(raw, "codeFipe")?,
		reference_month: str_field(raw, "referenceMonth")?,
	})
}

fn str_field(item: &serde_json::Value, name: &str) -> Result<String, FipeError> {
	item.get(name)
		.and_then(|v| v.as_str())
		.map(|s| s.to_string())
		.ok_or_else(|| FipeError::Parse(format!("missing field {name}")))
}

struct ParallelumConfigSchema;

impl ConfigSchema for ParallelumConfigSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(vec![], vec![Field::new("base_url", FieldType::String)]);
		schema.validate(config)
	}
}

/// Factory function to create a Parallelum FIPE API provider from configuration.
pub fn create_provider(config: &toml::Value) -> Result<Box<dyn FipeProvider>, FipeError> {
	Ok(Box::new(ParallelumProvider::new(ParallelumConfig::from_toml(config)?)))
}

/// Registry for the Parallelum backend.
pub struct Registry;

impl quote_types::ImplementationRegistry for Registry {
	const NAME: &'static str = "parallelum";
	type Factory = crate::FipeFactory;

	fn factory() -> Self::Factory {
		create_provider
	}
}

impl crate::FipeRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_price_response() {
		let raw = serde_json::json!({
			"price": "R$ 45.000,00",
			"brand": "Volkswagen",
			"model": "Gol",
			"modelYear": 2020,
			"fuel": "Flex",
			"codeFipe": "005340-6",
			"referenceMonth": "julho de 2026"
		});
		let price = parse_price(&raw).unwrap();
		assert_eq!(price.codigo_fipe, "005340-6");
		assert_eq!(price.model_year, 2020);
	}
}

//! SerpApi Google Shopping backend.
//!
//! Default (and currently only) `ShoppingProvider` implementation, grounded
//! on `search_provider.py`'s `SerpApiProvider`: one broad `google_shopping`
//! engine call for the initial candidate pool, then a per-candidate call to
//! the "immersive product" endpoint to resolve a concrete store link.

use crate::{url as urlutil, AggregatorResolution, AggregatorSearch, ShoppingError, ShoppingProvider, StoreResolution};
use async_trait::async_trait;
use quote_types::{ConfigSchema, Field, FieldType, Schema, ShoppingCandidate, ValidationError};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

const DEFAULT_BASE_URL: &str = "https://serpapi.com/search";
const DEFAULT_ENGINE: &str = "google_shopping";
const DEFAULT_LOCATION: &str = "Brazil";

struct SerpApiConfig {
	api_key: String,
	base_url: String,
	engine: String,
	location: String,
}

impl SerpApiConfig {
	fn from_toml(config: &toml::Value) -> Result<Self, ShoppingError> {
		let api_key = config
			.get("api_key")
			.and_then(|v| v.as_str())
			.ok_or_else(|| ShoppingError::InvalidConfig("missing api_key".to_string()))?
			.to_string();
		let base_url = config
			.get("base_url")
			.and_then(|v| v.as_str())
			.unwrap_or(DEFAULT_BASE_URL)
			.to_string();
		let engine = config
			.get("engine")
			.and_then(|v| v.as_str())
			.unwrap_or(DEFAULT_ENGINE)
			.to_string();
		let location = config
			.get("location")
			.and_then(|v| v.as_str())
			.unwrap_or(DEFAULT_LOCATION)
			.to_string();
		Ok(Self {
			api_key,
			base_url,
			engine,
			location,
		})
	}
}

pub struct SerpApiProvider {
	client: reqwest::Client,
	config: SerpApiConfig,
}

impl SerpApiProvider {
	fn new(config: SerpApiConfig) -> Self {
		Self {
			client: reqwest::Client::new(),
			config,
		}
	}

	fn candidate_from_item(item: &serde_json::Value, immersive_link: Option<String>) -> ShoppingCandidate {
		ShoppingCandidate {
			title: item.get("title").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
			price_text: item.get("price").and_then(|v| v.as_str()).map(|s| s.to_string()),
			extracted_price: item
				.get("extracted_price")
				.and_then(|v| v.as_f64())
				.and_then(Decimal::from_f64_retain),
			source: item.get("source").and_then(|v| v.as_str()).map(|s| s.to_string()),
			immersive_link,
			product_link: item.get("product_link").and_then(|v| v.as_str()).map(|s| s.to_string()),
			link: item.get("link").and_then(|v| v.as_str()).map(|s| s.to_string()),
		}
	}

	/// Picks the first seller (from `stores`, then `online_sellers`, then the
	/// bare `product_results.link`) that isn't a Google redirect and passes
	/// the price-sanity check against the candidate's aggregator price.
	fn pick_seller(data: &serde_json::Value, candidate_price: Option<Decimal>) -> Option<(String, Option<String>, Option<Decimal>)> {
		let product_results = data.get("product_results");

		let stores = product_results.and_then(|p| p.get("stores")).and_then(|s| s.as_array());
		if let Some(stores) = stores {
			for store in stores {
				if let Some(picked) = Self::seller_from_entry(store, "link", "name", "extracted_price", "price", candidate_price) {
					return Some(picked);
				}
			}
		}

		let sellers = data.get("online_sellers").and_then(|s| s.as_array());
		if let Some(sellers) = sellers {
			for seller in sellers {
				if let Some(picked) = Self::seller_from_entry(seller, "link", "name", "extracted_price", "base_price", candidate_price) {
					return Some(picked);
				}
			}
		}

		let direct = product_results.and_then(|p| p.get("link")).and_then(|v| v.as_str());
		if let Some(direct) = direct {
			if !direct.is_empty() && !direct.contains("google.com") {
				return Some((direct.to_string(), None, candidate_price));
			}
		}

		None
	}

	fn seller_from_entry(
		entry: &serde_json::Value,
		link_field: &str,
		name_field: &str,
		price_field: &str,
		fallback_price_field: &str,
		candidate_price: Option<Decimal>,
	) -> Option<(String, Option<String>, Option<Decimal>)> {
		let link = entry.get(link_field).and_then(|v| v.as_str())?;
		if link.is_empty() || link.contains("google.com") {
			return None;
		}
		let name = entry.get(name_field).and_then(|v| v.as_str()).map(|s| s.to_string());
		let seller_price = entry
			.get(price_field)
			.and_then(|v| v.as_f64())
			.or_else(|| entry.get(fallback_price_field).and_then(|v| v.as_f64()))
			.and_then(Decimal::from_f64_retain);

		if let (Some(seller_price), Some(candidate_price)) = (seller_price, candidate_price) {
			let diff = (seller_price - candidate_price).abs() / candidate_price;
			if diff > dec!(0.05) {
				return None;
			}
		}

		Some((link.to_string(), name, seller_price.or(candidate_price)))
	}
}

#[async_trait]
impl ShoppingProvider for SerpApiProvider {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(SerpApiConfigSchema)
	}

	async fn search(&self, query: &str) -> Result<AggregatorSearch, ShoppingError> {
		let params = [
			("engine", self.config.engine.as_str()),
			("q", query),
			("api_key", self.config.api_key.as_str()),
			("gl", "br"),
			("hl", "pt-br"),
			("google_domain", "google.com.br"),
			("location", self.config.location.as_str()),
			("num", "100"),
		];

		let sanitized_url = format!(
			"{}?engine={}&q={}&gl=br&hl=pt-br&google_domain=google.com.br&location={}&num=100",
			self.config.base_url, self.config.engine, query, self.config.location
		);

		let response = self
			.client
			.get(&self.config.base_url)
			.query(&params)
			.send()
			.await
			.map_err(|e| ShoppingError::Provider(e.to_string()))?;

		if response.status().as_u16() == 429 {
			return Err(ShoppingError::RateLimited);
		}
		let response = response.error_for_status().map_err(|e| ShoppingError::Provider(e.to_string()))?;
		let raw: serde_json::Value = response.json().await.map_err(|e| ShoppingError::Parse(e.to_string()))?;

		let mut candidates = Vec::new();
		if let Some(items) = raw.get("shopping_results").and_then(|v| v.as_array()) {
			for item in items {
				let immersive = item.get("serpapi_immersive_product_api").and_then(|v| v.as_str()).map(|s| s.to_string());
				candidates.push(Self::candidate_from_item(item, immersive));
			}
		}
		if let Some(items) = raw.get("inline_shopping_results").and_then(|v| v.as_array()) {
			for item in items {
				candidates.push(Self::candidate_from_item(item, None));
			}
		}

		Ok(AggregatorSearch {
			sanitized_url,
			candidates,
			raw,
		})
	}

	async fn resolve_store(&self, candidate: &ShoppingCandidate) -> Result<AggregatorResolution, ShoppingError> {
		if let Some(immersive_url) = &candidate.immersive_link {
			let separator = if immersive_url.contains('?') { "&" } else { "?" };
			let call_url = format!("{immersive_url}{separator}api_key={}", self.config.api_key);
			let sanitized_url = format!("{immersive_url}{separator}api_key=***");

			let response = self
				.client
				.get(&call_url)
				.send()
				.await
				.map_err(|e| ShoppingError::Provider(e.to_string()))?;

			if response.status().as_u16() == 429 {
				return Err(ShoppingError::RateLimited);
			}
			let response = response.error_for_status().map_err(|e| ShoppingError::Provider(e.to_string()))?;
			let data: serde_json::Value = response.json().await.map_err(|e| ShoppingError::Parse(e.to_string()))?;

			if let Some((link, store_name, price)) = Self::pick_seller(&data, candidate.extracted_price) {
				let cleaned = urlutil::strip_tracking_params(&link);
				let domain = urlutil::extract_domain(&cleaned);
				return Ok(AggregatorResolution {
					sanitized_url: Some(sanitized_url),
					resolution: Some(StoreResolution {
						url: cleaned,
						domain,
						store_name,
						extracted_price: price,
					}),
				});
			}

			return Ok(AggregatorResolution {
				sanitized_url: Some(sanitized_url),
				resolution: None,
			});
		}

		let direct_link = candidate.product_link.as_deref().or(candidate.link.as_deref());
		if let Some(direct_link) = direct_link {
			if !direct_link.is_empty() && !direct_link.contains("google.com") {
				let cleaned = urlutil::strip_tracking_params(direct_link);
				let domain = urlutil::extract_domain(&cleaned);
				return Ok(AggregatorResolution {
					sanitized_url: None,
					resolution: Some(StoreResolution {
						url: cleaned,
						domain,
						store_name: candidate.source.clone(),
						extracted_price: candidate.extracted_price,
					}),
				});
			}
		}

		Ok(AggregatorResolution {
			sanitized_url: None,
			resolution: None,
		})
	}
}

struct SerpApiConfigSchema;

impl ConfigSchema for SerpApiConfigSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![Field::new("api_key", FieldType::String)],
			vec![
				Field::new("base_url", FieldType::String),
				Field::new("engine", FieldType::String),
				Field::new("location", FieldType::String),
			],
		);
		schema.validate(config)
	}
}

/// Factory function to create a SerpApi provider from configuration.
pub fn create_provider(config: &toml::Value) -> Result<Box<dyn ShoppingProvider>, ShoppingError> {
	Ok(Box::new(SerpApiProvider::new(SerpApiConfig::from_toml(config)?)))
}

/// Registry for the SerpApi backend.
pub struct Registry;

impl quote_types::ImplementationRegistry for Registry {
	const NAME: &'static str = "serpapi";
	type Factory = crate::ShoppingFactory;

	fn factory() -> Self::Factory {
		create_provider
	}
}

impl crate::ShoppingRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn pick_seller_rejects_price_mismatch_over_5_percent() {
		let data = serde_json::json!({
			"product_results": {
				"stores": [
					{"link": "https://loja.com.br/p/1", "name": "Loja A", "extracted_price": 130.0}
				]
			}
		});
		let picked = SerpApiProvider::pick_seller(&data, Some(Decimal::new(10000, 2)));
		assert!(picked.is_none());
	}

	#[test]
	fn pick_seller_accepts_within_tolerance_and_skips_google_links() {
		let data = serde_json::json!({
			"product_results": {
				"stores": [
					{"link": "https://google.com/redirect", "name": "Google", "extracted_price": 100.0},
					{"link": "https://loja.com.br/p/1", "name": "Loja A", "extracted_price": 103.0}
				]
			}
		});
		let picked = SerpApiProvider::pick_seller(&data, Some(Decimal::new(10000, 2)));
		let (link, name, _price) = picked.expect("a seller should be picked");
		assert_eq!(link, "https://loja.com.br/p/1");
		assert_eq!(name.as_deref(), Some("Loja A"));
	}
}

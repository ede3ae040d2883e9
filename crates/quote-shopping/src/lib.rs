//! Shopping aggregator module for the quotation processing pipeline.
//!
//! This module handles querying a shopping aggregator API for candidate
//! retail offers and resolving a single candidate down to a concrete store
//! link. It provides abstractions for different aggregator implementations
//! (currently SerpApi's Google Shopping engine).
//!
//! The constraint-satisfaction search that selects a coherent block of N
//! accepted sources from the candidates this module returns lives in the
//! coordinator, not here (spec.md §4.1).

use async_trait::async_trait;
use quote_types::{ConfigSchema, FilterLog, ImplementationRegistry, ShoppingCandidate};
use rust_decimal::Decimal;
use thiserror::Error;

pub mod url;

/// Re-export implementations.
pub mod implementations {
	pub mod serpapi;
}

/// Maximum number of price-valid candidates kept after filtering
/// (spec.md §4.2 "Global cap").
const MAX_VALID_CANDIDATES: usize = 150;

/// Errors that can occur during aggregator operations.
#[derive(Debug, Error)]
pub enum ShoppingError {
	#[error("rate limited")]
	RateLimited,
	#[error("aggregator error: {0}")]
	Provider(String),
	#[error("failed to parse aggregator response: {0}")]
	Parse(String),
	#[error("invalid configuration: {0}")]
	InvalidConfig(String),
}

/// The raw result of one initial-search call: every parsed candidate and the
/// sanitized URL actually called, before any filtering.
pub struct AggregatorSearch {
	pub sanitized_url: String,
	pub candidates: Vec<ShoppingCandidate>,
	pub raw: serde_json::Value,
}

/// A concrete store link resolved for one candidate.
#[derive(Debug, Clone)]
pub struct StoreResolution {
	pub url: String,
	pub domain: String,
	pub store_name: Option<String>,
	pub extracted_price: Option<Decimal>,
}

/// The result of one per-candidate store-resolution call.
pub struct AggregatorResolution {
	/// `None` when resolution fell back to the candidate's direct link
	/// without an additional HTTP call.
	pub sanitized_url: Option<String>,
	pub resolution: Option<StoreResolution>,
}

/// Trait defining the interface for shopping-aggregator implementations.
///
/// This trait must be implemented by any aggregator backend that wants to
/// integrate with the quotation pipeline. It provides methods for the
/// initial broad search and for resolving one candidate to a store link.
#[async_trait]
pub trait ShoppingProvider: Send + Sync {
	/// Returns the configuration schema for this aggregator implementation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Runs the single initial search call (spec.md §4.2 "one aggregator
	/// call... union the two result arrays"). Returns every candidate
	/// unfiltered; filtering is the caller's job (see `filter_candidates`).
	async fn search(&self, query: &str) -> Result<AggregatorSearch, ShoppingError>;

	/// Resolves one candidate to a concrete store link via the aggregator's
	/// per-product endpoint, applying the aggregator's own seller-level
	/// price-sanity check (spec.md §4.2 "Per-candidate store resolution").
	/// Falls back to the candidate's direct link when no seller passes.
	async fn resolve_store(&self, candidate: &ShoppingCandidate) -> Result<AggregatorResolution, ShoppingError>;
}

/// Type alias for aggregator factory functions.
pub type ShoppingFactory = fn(&toml::Value) -> Result<Box<dyn ShoppingProvider>, ShoppingError>;

/// Registry trait for aggregator implementations.
pub trait ShoppingRegistry: ImplementationRegistry<Factory = ShoppingFactory> {}

/// Get all registered aggregator implementations.
pub fn get_all_implementations() -> Vec<(&'static str, ShoppingFactory)> {
	use implementations::serpapi;

	vec![(serpapi::Registry::NAME, serpapi::Registry::factory())]
}

/// Applies the three ordered filters from spec.md §4.2 to a raw candidate
/// list: blocked source, valid price, global cap (after ascending-price
/// sort). Returns the filtered, price-sorted list and the structured log.
pub fn filter_candidates(
	candidates: Vec<ShoppingCandidate>,
	blocked: &[quote_types::BlockedDomain],
) -> (Vec<ShoppingCandidate>, FilterLog) {
	let mut log = FilterLog {
		raw_count: candidates.len(),
		..Default::default()
	};

	let after_source: Vec<ShoppingCandidate> = candidates
		.into_iter()
		.filter(|c| {
			let keep = !c.source.as_deref().map(|s| url::is_blocked_source(s, blocked)).unwrap_or(false);
			if !keep {
				log.dropped_blocked_source += 1;
			}
			keep
		})
		.collect();

	let mut after_price: Vec<ShoppingCandidate> = after_source
		.into_iter()
		.filter(|c| {
			let keep = c.extracted_price.map(|p| p > Decimal::ZERO).unwrap_or(false);
			if !keep {
				log.dropped_invalid_price += 1;
			}
			keep
		})
		.collect();

	after_price.sort_by(|a, b| a.extracted_price.cmp(&b.extracted_price));

	if after_price.len() > MAX_VALID_CANDIDATES {
		log.dropped_global_cap = after_price.len() - MAX_VALID_CANDIDATES;
		after_price.truncate(MAX_VALID_CANDIDATES);
	}

	(after_price, log)
}

/// Service wrapping a single configured aggregator backend with the retry
/// policy from spec.md §4.2 ("HTTP 429, up to 3 retries, exponential
/// backoff"). Plain sleep-and-retry loop, matching the coordinator-facing
/// crates' established retry idiom rather than the unused `backoff` crate.
pub struct ShoppingService {
	provider: Box<dyn ShoppingProvider>,
	retry: quote_config::RetryTable,
}

impl ShoppingService {
	pub fn new(provider: Box<dyn ShoppingProvider>, retry: quote_config::RetryTable) -> Self {
		Self { provider, retry }
	}

	/// Runs the initial search with retry-on-429, then applies the three
	/// candidate filters.
	pub async fn initial_candidates(
		&self,
		query: &str,
		blocked: &[quote_types::BlockedDomain],
	) -> Result<(Vec<ShoppingCandidate>, FilterLog, String, serde_json::Value), ShoppingError> {
		let search = self.search_with_retry(query).await?;
		let (candidates, log) = filter_candidates(search.candidates, blocked);
		Ok((candidates, log, search.sanitized_url, search.raw))
	}

	async fn search_with_retry(&self, query: &str) -> Result<AggregatorSearch, ShoppingError> {
		let mut attempt = 0usize;
		loop {
			match self.provider.search(query).await {
				Ok(search) => return Ok(search),
				Err(ShoppingError::RateLimited) => {
					let Some(delay) = self.retry.schedule.get(attempt) else {
						return Err(ShoppingError::RateLimited);
					};
					tracing::warn!(attempt, delay_seconds = delay, "aggregator rate limited, retrying");
					tokio::time::sleep(std::time::Duration::from_secs(*delay)).await;
					attempt += 1;
				}
				Err(e) => return Err(e),
			}
		}
	}

	/// Resolves a single candidate to a concrete store link, with the same
	/// 429 retry policy as the initial search.
	pub async fn resolve_store_link(&self, candidate: &ShoppingCandidate) -> Result<AggregatorResolution, ShoppingError> {
		let mut attempt = 0usize;
		loop {
			match self.provider.resolve_store(candidate).await {
				Ok(resolution) => return Ok(resolution),
				Err(ShoppingError::RateLimited) => {
					let Some(delay) = self.retry.schedule.get(attempt) else {
						return Err(ShoppingError::RateLimited);
					};
					tracing::warn!(attempt, delay_seconds = delay, "aggregator rate limited, retrying");
					tokio::time::sleep(std::time::Duration::from_secs(*delay)).await;
					attempt += 1;
				}
				Err(e) => return Err(e),
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use quote_types::BlockedDomain;

	fn candidate(title: &str, price: Option<Decimal>, source: &str) -> ShoppingCandidate {
		ShoppingCandidate {
			title: title.to_string(),
			price_text: price.map(|p| format!("R$ {p}")),
			extracted_price: price,
			source: Some(source.to_string()),
			immersive_link: None,
			product_link: None,
			link: None,
		}
	}

	#[test]
	fn filters_blocked_source_then_invalid_price_then_caps() {
		let blocked = vec![BlockedDomain {
			etld_plus_one: "mercadolivre.com.br".into(),
			known_source_names: vec!["mercado livre".into()],
		}];
		let candidates = vec![
			candidate("A", Some(Decimal::new(10000, 2)), "Mercado Livre"),
			candidate("B", None, "Loja B"),
			candidate("C", Some(Decimal::new(5000, 2)), "Loja C"),
			candidate("D", Some(Decimal::new(7500, 2)), "Loja D"),
		];

		let (filtered, log) = filter_candidates(candidates, &blocked);

		assert_eq!(log.raw_count, 4);
		assert_eq!(log.dropped_blocked_source, 1);
		assert_eq!(log.dropped_invalid_price, 1);
		assert_eq!(log.dropped_global_cap, 0);
		assert_eq!(filtered.len(), 2);
		assert_eq!(filtered[0].title, "C");
		assert_eq!(filtered[1].title, "D");
	}

	#[test]
	fn global_cap_keeps_cheapest_150() {
		let candidates: Vec<ShoppingCandidate> = (0..160)
			.map(|i| candidate(&format!("P{i}"), Some(Decimal::new((i + 1) * 100, 2)), "Loja"))
			.collect();

		let (filtered, log) = filter_candidates(candidates, &[]);

		assert_eq!(filtered.len(), MAX_VALID_CANDIDATES);
		assert_eq!(log.dropped_global_cap, 10);
		assert_eq!(filtered[0].title, "P0");
	}
}

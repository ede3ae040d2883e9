//! Headless-browser price extraction module for the quotation pipeline.
//!
//! This module handles navigating to a candidate store URL with a headless
//! browser, extracting its price through a cascade of methods, and
//! capturing screenshot evidence. It provides the same
//! trait/factory/registry abstraction as every other pluggable collaborator
//! in this workspace, though currently only one concrete browser backend
//! (WebDriver via `fantoccini`) is registered.

use async_trait::async_trait;
use quote_types::{ConfigSchema, ExtractionMethod, ImplementationRegistry, Money, MoneyError};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;

pub mod cascade;

/// Re-export implementations.
pub mod implementations {
	pub mod webdriver;
}

/// Price floor below which an extracted value is treated as a parsing
/// artifact rather than a real price (spec.md §4.3 "Price sanitization").
pub const MIN_PRICE: &str = "1.00";
/// Price ceiling above which an extracted value is rejected for the same
/// reason.
pub const MAX_PRICE: &str = "10000000.00";

/// Errors that can occur during price-extraction operations.
#[derive(Debug, Error)]
pub enum ExtractorError {
	#[error("navigation failed: {0}")]
	Navigation(String),
	#[error("extraction timed out")]
	Timeout,
	#[error("no price found on page")]
	NoPriceFound,
	#[error("extracted price out of bounds: {0}")]
	InvalidPrice(String),
	#[error("screenshot capture failed: {0}")]
	Screenshot(String),
	#[error("invalid configuration: {0}")]
	InvalidConfig(String),
}

impl From<MoneyError> for ExtractorError {
	fn from(e: MoneyError) -> Self {
		ExtractorError::InvalidPrice(e.to_string())
	}
}

/// Whether the extractor should read the page's own price (the normal,
/// "validated" path) or only capture evidence and trust the aggregator's
/// price (spec.md §4.3 "Screenshot... mandatory in google-only mode").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionMode {
	Validated,
	GoogleOnly,
}

/// The result of one successful extraction.
pub struct ExtractionOutcome {
	/// `None` only in `GoogleOnly` mode, where the page's own price is never
	/// read.
	pub price: Option<Money>,
	pub method: Option<ExtractionMethod>,
	pub final_url: String,
	pub page_title: String,
	pub screenshot_png: Vec<u8>,
}

/// Trait defining the interface for headless-browser extraction backends.
#[async_trait]
pub trait ExtractorProvider: Send + Sync {
	/// Returns the configuration schema for this extraction backend.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Navigates to `url` in a fresh browser context, extracts a price (in
	/// `Validated` mode) and always captures a full-page screenshot.
	async fn extract(&self, url: &str, mode: ExtractionMode) -> Result<ExtractionOutcome, ExtractorError>;
}

/// Type alias for extractor factory functions.
pub type ExtractorFactory = fn(&toml::Value) -> Result<Box<dyn ExtractorProvider>, ExtractorError>;

/// Registry trait for extractor implementations.
pub trait ExtractorRegistry: ImplementationRegistry<Factory = ExtractorFactory> {}

/// Get all registered extractor implementations.
pub fn get_all_implementations() -> Vec<(&'static str, ExtractorFactory)> {
	use implementations::webdriver;

	vec![(webdriver::Registry::NAME, webdriver::Registry::factory())]
}

/// Service bounding parallel browser contexts behind a fixed-size semaphore.
/// Acquires a permit and awaits the extraction inline, rather than
/// spawning it fire-and-forget, since the coordinator needs this
/// candidate's result before moving to the next.
pub struct ExtractorService {
	provider: Arc<dyn ExtractorProvider>,
	semaphore: Arc<Semaphore>,
	page_timeout: Duration,
}

impl ExtractorService {
	pub fn new(provider: Box<dyn ExtractorProvider>, pool_size: usize, page_timeout_seconds: u64) -> Self {
		Self {
			provider: Arc::from(provider),
			semaphore: Arc::new(Semaphore::new(pool_size.max(1))),
			page_timeout: Duration::from_secs(page_timeout_seconds),
		}
	}

	/// Extracts one candidate's price, bounded by the pool size and the
	/// per-page timeout. A timed-out candidate is reported as
	/// `ExtractorError::Timeout`; the caller is expected to record it as a
	/// local failure and move on (spec.md §4.3 "A candidate that blows its
	/// timeout is abandoned, its failure recorded, and the slot returned to
	/// the pool").
	pub async fn extract(&self, url: &str, mode: ExtractionMode) -> Result<ExtractionOutcome, ExtractorError> {
		let _permit = self
			.semaphore
			.acquire()
			.await
			.map_err(|e| ExtractorError::Navigation(e.to_string()))?;

		match tokio::time::timeout(self.page_timeout, self.provider.extract(url, mode)).await {
			Ok(result) => result,
			Err(_) => Err(ExtractorError::Timeout),
		}
	}

	/// Sanitizes a raw extracted decimal amount into `Money`, enforcing the
	/// bounds from spec.md §4.3.
	pub fn sanitize_price(raw: rust_decimal::Decimal) -> Result<Money, ExtractorError> {
		let min: rust_decimal::Decimal = MIN_PRICE.parse().expect("MIN_PRICE is a valid decimal literal");
		let max: rust_decimal::Decimal = MAX_PRICE.parse().expect("MAX_PRICE is a valid decimal literal");
		if raw < min || raw > max {
			return Err(ExtractorError::InvalidPrice(raw.to_string()));
		}
		Ok(Money::new(raw)?)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rust_decimal_macros::dec;

	#[test]
	fn sanitize_price_rejects_below_minimum() {
		assert!(matches!(
			ExtractorService::sanitize_price(dec!(0.50)),
			Err(ExtractorError::InvalidPrice(_))
		));
	}

	#[test]
	fn sanitize_price_rejects_above_maximum() {
		assert!(matches!(
			ExtractorService::sanitize_price(dec!(10000001)),
			Err(ExtractorError::InvalidPrice(_))
		));
	}

	#[test]
	fn sanitize_price_accepts_in_range() {
		let money = ExtractorService::sanitize_price(dec!(1234.56)).unwrap();
		assert_eq!(money.amount(), dec!(1234.56));
	}
}

//! Configuration builder for creating test and development configurations.
//!
//! This module provides utilities for constructing Config instances with
//! sensible defaults, particularly useful for testing scenarios.

use crate::{
	ApiConfig, Config, ExtractorConfig, LedgerConfig, LlmConfig, RetryTable, ServiceConfig,
	ShoppingConfig, StorageConfig, VehicleConfig,
};
use std::collections::HashMap;

/// Builder for creating `Config` instances with a fluent API.
///
/// Provides an easy way to create test configurations with sensible defaults.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
	service_id: String,
	monitoring_timeout_minutes: u64,
	worker_pool_size: usize,
	browser_pool_size: usize,
	storage_primary: String,
	storage_cleanup_interval_seconds: u64,
	llm_primary: String,
	shopping_primary: String,
	webdriver_url: String,
	api: Option<ApiConfig>,
}

impl Default for ConfigBuilder {
	fn default() -> Self {
		Self::new()
	}
}

impl ConfigBuilder {
	/// Creates a new `ConfigBuilder` with default values suitable for testing.
	pub fn new() -> Self {
		Self {
			service_id: "test-worker".to_string(),
			monitoring_timeout_minutes: 1,
			worker_pool_size: 2,
			browser_pool_size: 1,
			storage_primary: "memory".to_string(),
			storage_cleanup_interval_seconds: 60,
			llm_primary: "test".to_string(),
			shopping_primary: "test".to_string(),
			webdriver_url: "http://localhost:4444".to_string(),
			api: None,
		}
	}

	/// Sets the service ID.
	pub fn service_id(mut self, id: String) -> Self {
		self.service_id = id;
		self
	}

	/// Sets the monitoring timeout in minutes.
	pub fn monitoring_timeout_minutes(mut self, timeout: u64) -> Self {
		self.monitoring_timeout_minutes = timeout;
		self
	}

	/// Sets the worker pool size.
	pub fn worker_pool_size(mut self, size: usize) -> Self {
		self.worker_pool_size = size;
		self
	}

	/// Sets the browser pool size.
	pub fn browser_pool_size(mut self, size: usize) -> Self {
		self.browser_pool_size = size;
		self
	}

	/// Sets the primary storage implementation.
	pub fn storage_primary(mut self, primary: String) -> Self {
		self.storage_primary = primary;
		self
	}

	/// Sets the storage cleanup interval in seconds.
	pub fn storage_cleanup_interval_seconds(mut self, interval: u64) -> Self {
		self.storage_cleanup_interval_seconds = interval;
		self
	}

	/// Sets the primary LLM implementation.
	pub fn llm_primary(mut self, primary: String) -> Self {
		self.llm_primary = primary;
		self
	}

	/// Sets the primary shopping aggregator implementation.
	pub fn shopping_primary(mut self, primary: String) -> Self {
		self.shopping_primary = primary;
		self
	}

	/// Sets the API configuration.
	pub fn api(mut self, api: Option<ApiConfig>) -> Self {
		self.api = api;
		self
	}

	/// Builds the `Config` with the configured values.
	///
	/// Each pluggable section gets exactly one implementation entry (an empty
	/// TOML table) named after its `primary` field, so the result passes
	/// `Config::validate` without further setup.
	pub fn build(self) -> Config {
		let mut storage_implementations = HashMap::new();
		storage_implementations.insert(self.storage_primary.clone(), toml::Value::Table(Default::default()));

		let mut llm_implementations = HashMap::new();
		llm_implementations.insert(self.llm_primary.clone(), toml::Value::Table(Default::default()));

		let mut shopping_implementations = HashMap::new();
		shopping_implementations.insert(
			self.shopping_primary.clone(),
			toml::Value::Table(Default::default()),
		);

		Config {
			service: ServiceConfig {
				id: self.service_id,
				monitoring_timeout_minutes: self.monitoring_timeout_minutes,
				worker_pool_size: self.worker_pool_size,
				browser_pool_size: self.browser_pool_size,
			},
			storage: StorageConfig {
				primary: self.storage_primary,
				implementations: storage_implementations,
				cleanup_interval_seconds: self.storage_cleanup_interval_seconds,
			},
			llm: LlmConfig {
				primary: self.llm_primary,
				implementations: llm_implementations,
				rate_limit_retry: RetryTable::default(),
				overload_retry: RetryTable::default(),
			},
			shopping: ShoppingConfig {
				primary: self.shopping_primary,
				implementations: shopping_implementations,
				retry: RetryTable::default(),
			},
			extractor: ExtractorConfig {
				page_load_timeout_seconds: 30,
				webdriver_url: self.webdriver_url,
				pool_size: 3,
			},
			vehicle: VehicleConfig {
				fipe_vigency_months: 6,
				capture_timeout_seconds: 30,
				vehicle_kind: "cars".to_string(),
			},
			ledger: LedgerConfig::default(),
			api: self.api,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn default_builder_produces_valid_config() {
		let config = ConfigBuilder::new().build();
		assert_eq!(config.service.id, "test-worker");
		assert!(config.storage.implementations.contains_key("memory"));
	}
}

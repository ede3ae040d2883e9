//! Configuration module for the quotation processing pipeline.
//!
//! This module provides structures and utilities for managing pipeline
//! configuration. It supports loading configuration from TOML files and
//! provides validation to ensure all required configuration values are
//! properly set.

use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use thiserror::Error;

pub mod builders;
pub mod loader;

pub use loader::ConfigLoader;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error that occurs during file I/O operations.
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	/// Error that occurs when parsing TOML configuration.
	#[error("Configuration error: {0}")]
	Parse(String),
	/// Error that occurs when configuration validation fails.
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		let message = err.message().to_string();
		ConfigError::Parse(message)
	}
}

/// Main configuration structure for the quotation pipeline.
///
/// Contains every section required for a worker process to run the
/// coordinator, its collaborators, and the optional status API.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	/// Identity and concurrency bounds for this worker process.
	pub service: ServiceConfig,
	/// Configuration for the checkpoint/ledger storage backend.
	pub storage: StorageConfig,
	/// Configuration for the LLM analysis provider(s).
	pub llm: LlmConfig,
	/// Configuration for the shopping-aggregator provider(s).
	pub shopping: ShoppingConfig,
	/// Configuration for the headless-browser price extractor.
	pub extractor: ExtractorConfig,
	/// Configuration for the FIPE vehicle sub-pipeline.
	pub vehicle: VehicleConfig,
	/// Per-provider cost rates for financial bookkeeping.
	pub ledger: LedgerConfig,
	/// Configuration for the optional HTTP status API.
	pub api: Option<ApiConfig>,
}

/// Identity and concurrency configuration for a worker process.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
	/// Unique identifier for this worker instance.
	pub id: String,
	/// Timeout duration in minutes for monitoring operations.
	#[serde(default = "default_monitoring_timeout_minutes")]
	pub monitoring_timeout_minutes: u64,
	/// Maximum number of quote requests processed concurrently.
	#[serde(default = "default_worker_pool_size")]
	pub worker_pool_size: usize,
	/// Maximum number of concurrent browser contexts held by the extractor.
	#[serde(default = "default_browser_pool_size")]
	pub browser_pool_size: usize,
}

fn default_monitoring_timeout_minutes() -> u64 {
	480 // Default to 8 hours
}

fn default_worker_pool_size() -> usize {
	4
}

fn default_browser_pool_size() -> usize {
	3
}

/// Configuration for the storage backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
	/// Which implementation to use as primary.
	pub primary: String,
	/// Map of storage implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
	/// Interval in seconds for cleaning up expired storage entries.
	pub cleanup_interval_seconds: u64,
}

/// A data-driven retry schedule: one delay in seconds per retry attempt.
///
/// Shared between the LLM client (rate-limit/overload backoff) and the
/// shopping aggregator (HTTP 429 backoff) so both read from one shape.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryTable {
	/// Delay in seconds before each successive retry.
	#[serde(default = "default_retry_schedule")]
	pub schedule: Vec<u64>,
}

impl Default for RetryTable {
	fn default() -> Self {
		Self {
			schedule: default_retry_schedule(),
		}
	}
}

fn default_retry_schedule() -> Vec<u64> {
	vec![2, 4, 8]
}

/// Configuration for the LLM analysis provider(s).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmConfig {
	/// Which implementation to use as primary.
	pub primary: String,
	/// Map of provider names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
	/// Backoff schedule applied to rate-limit errors (429) (spec.md §4.4 "Retry").
	#[serde(default = "default_llm_rate_limit_retry")]
	pub rate_limit_retry: RetryTable,
	/// Backoff schedule applied to provider-overload errors (529/503/502).
	#[serde(default = "default_llm_overload_retry")]
	pub overload_retry: RetryTable,
}

fn default_llm_rate_limit_retry() -> RetryTable {
	RetryTable {
		schedule: vec![1, 2, 4, 8, 16],
	}
}

fn default_llm_overload_retry() -> RetryTable {
	RetryTable {
		schedule: vec![5, 10, 15, 20, 25],
	}
}

/// Configuration for the shopping-aggregator provider(s).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ShoppingConfig {
	/// Which implementation to use as primary.
	pub primary: String,
	/// Map of provider names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
	/// Retry schedule applied on HTTP 429 responses.
	#[serde(default)]
	pub retry: RetryTable,
}

/// Configuration for the headless-browser price extractor.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExtractorConfig {
	/// Page-load timeout in seconds before a candidate is abandoned.
	#[serde(default = "default_page_load_timeout_seconds")]
	pub page_load_timeout_seconds: u64,
	/// WebDriver endpoint used to drive the headless browser.
	pub webdriver_url: String,
	/// Maximum number of browser contexts extracted in parallel (spec.md §5
	/// "the extractor pool bounds parallel browser contexts (default 3)").
	#[serde(default = "default_extractor_pool_size")]
	pub pool_size: usize,
}

fn default_page_load_timeout_seconds() -> u64 {
	30
}

fn default_extractor_pool_size() -> usize {
	3
}

/// Configuration for the FIPE vehicle sub-pipeline.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VehicleConfig {
	/// Fallback vigency window in months, used when a project's
	/// `ProjectConfigVersion` omits `fipe_vigency_months`.
	#[serde(default = "default_fipe_vigency_months")]
	pub fipe_vigency_months: u32,
	/// Timeout in seconds for capturing FIPE evidence screenshots.
	#[serde(default = "default_capture_timeout_seconds")]
	pub capture_timeout_seconds: u64,
	/// Which FIPE category ("cars", "motorcycles", "trucks") this worker
	/// resolves vehicle queries against. A worker process serves one
	/// category at a time, matching how FIPE itself partitions its tables.
	#[serde(default = "default_vehicle_kind")]
	pub vehicle_kind: String,
}

fn default_fipe_vigency_months() -> u32 {
	6
}

fn default_capture_timeout_seconds() -> u64 {
	30
}

fn default_vehicle_kind() -> String {
	"cars".to_string()
}

/// Per-provider cost rates used to write `FinancialTransaction` rows.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct LedgerConfig {
	/// Provider name (matching `quote_types::ledger::CallKind::as_str`-style
	/// keys) to the BRL cost charged per unit of that call.
	#[serde(default)]
	pub cost_rates: HashMap<String, Decimal>,
}

/// Configuration for the optional HTTP status API.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
	/// Whether the API server is enabled.
	#[serde(default)]
	pub enabled: bool,
	/// Host address to bind the server to.
	#[serde(default = "default_api_host")]
	pub host: String,
	/// Port to bind the server to.
	#[serde(default = "default_api_port")]
	pub port: u16,
	/// Request timeout in seconds.
	#[serde(default = "default_api_timeout")]
	pub timeout_seconds: u64,
	/// Maximum request size in bytes.
	#[serde(default = "default_max_request_size")]
	pub max_request_size: usize,
	/// Rate limiting configuration.
	pub rate_limiting: Option<RateLimitConfig>,
	/// CORS configuration.
	pub cors: Option<CorsConfig>,
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
	/// Maximum requests per minute per IP.
	pub requests_per_minute: u32,
	/// Burst allowance for requests.
	pub burst_size: u32,
}

/// CORS configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CorsConfig {
	/// Allowed origins for CORS.
	pub allowed_origins: Vec<String>,
	/// Allowed headers for CORS.
	pub allowed_headers: Vec<String>,
	/// Allowed methods for CORS.
	pub allowed_methods: Vec<String>,
}

fn default_api_host() -> String {
	"127.0.0.1".to_string()
}

fn default_api_port() -> u16 {
	3000
}

fn default_api_timeout() -> u64 {
	30
}

fn default_max_request_size() -> usize {
	1024 * 1024 // 1MB
}

/// Resolves environment variables in a string.
///
/// Replaces ${VAR_NAME} with the value of the environment variable VAR_NAME.
/// Supports default values with ${VAR_NAME:-default_value}.
///
/// Input strings are limited to 1MB to prevent ReDoS attacks.
pub fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	const MAX_INPUT_SIZE: usize = 1024 * 1024; // 1MB
	if input.len() > MAX_INPUT_SIZE {
		return Err(ConfigError::Validation(format!(
			"Configuration file too large: {} bytes (max: {} bytes)",
			input.len(),
			MAX_INPUT_SIZE
		)));
	}

	let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]{0,127})(?::-([^}]{0,256}))?\}")
		.map_err(|e| ConfigError::Parse(format!("Regex error: {}", e)))?;

	let mut result = input.to_string();
	let mut replacements = Vec::new();

	for cap in re.captures_iter(input) {
		let full_match = cap.get(0).unwrap();
		let var_name = cap.get(1).unwrap().as_str();
		let default_value = cap.get(2).map(|m| m.as_str());

		let value = match std::env::var(var_name) {
			Ok(v) => v,
			Err(_) => {
				if let Some(default) = default_value {
					default.to_string()
				} else {
					return Err(ConfigError::Validation(format!(
						"Environment variable '{}' not found",
						var_name
					)));
				}
			}
		};

		replacements.push((full_match.start(), full_match.end(), value));
	}

	for (start, end, value) in replacements.iter().rev() {
		result.replace_range(start..end, value);
	}

	Ok(result)
}

impl Config {
	/// Loads configuration from a file at the specified path.
	///
	/// Environment variables can be referenced using:
	/// - `${VAR_NAME}` - Required environment variable
	/// - `${VAR_NAME:-default}` - With default value if not set
	pub fn from_file(path: &str) -> Result<Self, ConfigError> {
		let content = std::fs::read_to_string(path)?;
		let resolved = resolve_env_vars(&content)?;
		resolved.parse()
	}

	/// Loads configuration from a file with async environment variable resolution.
	///
	/// Async-ready for future extensions that might need an async secret
	/// resolver (e.g. from Vault, AWS KMS).
	pub async fn from_file_async(path: &str) -> Result<Self, ConfigError> {
		Self::from_file(path)
	}

	/// Validates the configuration to ensure all required fields are properly set.
	fn validate(&self) -> Result<(), ConfigError> {
		if self.service.id.is_empty() {
			return Err(ConfigError::Validation(
				"Service ID cannot be empty".into(),
			));
		}
		if self.service.worker_pool_size == 0 {
			return Err(ConfigError::Validation(
				"worker_pool_size must be at least 1".into(),
			));
		}
		if self.service.browser_pool_size == 0 {
			return Err(ConfigError::Validation(
				"browser_pool_size must be at least 1".into(),
			));
		}

		if self.storage.implementations.is_empty() {
			return Err(ConfigError::Validation(
				"At least one storage implementation must be configured".into(),
			));
		}
		if self.storage.primary.is_empty() {
			return Err(ConfigError::Validation(
				"Storage primary implementation cannot be empty".into(),
			));
		}
		if !self
			.storage
			.implementations
			.contains_key(&self.storage.primary)
		{
			return Err(ConfigError::Validation(format!(
				"Primary storage '{}' not found in implementations",
				self.storage.primary
			)));
		}
		if self.storage.cleanup_interval_seconds == 0 {
			return Err(ConfigError::Validation(
				"Storage cleanup_interval_seconds must be greater than 0".into(),
			));
		}
		if self.storage.cleanup_interval_seconds > 86400 {
			return Err(ConfigError::Validation(
				"Storage cleanup_interval_seconds cannot exceed 86400 (24 hours)".into(),
			));
		}

		if self.llm.implementations.is_empty() {
			return Err(ConfigError::Validation(
				"At least one LLM implementation must be configured".into(),
			));
		}
		if !self.llm.implementations.contains_key(&self.llm.primary) {
			return Err(ConfigError::Validation(format!(
				"Primary LLM provider '{}' not found in implementations",
				self.llm.primary
			)));
		}

		if self.shopping.implementations.is_empty() {
			return Err(ConfigError::Validation(
				"At least one shopping aggregator implementation must be configured".into(),
			));
		}
		if !self
			.shopping
			.implementations
			.contains_key(&self.shopping.primary)
		{
			return Err(ConfigError::Validation(format!(
				"Primary shopping provider '{}' not found in implementations",
				self.shopping.primary
			)));
		}

		if self.extractor.webdriver_url.is_empty() {
			return Err(ConfigError::Validation(
				"extractor.webdriver_url cannot be empty".into(),
			));
		}

		Ok(())
	}
}

/// Implementation of FromStr trait for Config to enable parsing from string.
///
/// Environment variables are resolved and the configuration is automatically
/// validated after parsing.
impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let resolved = resolve_env_vars(s)?;
		let config: Config = toml::from_str(&resolved)?;
		config.validate()?;
		Ok(config)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_env_var_resolution() {
		std::env::set_var("TEST_HOST", "localhost");
		std::env::set_var("TEST_PORT", "5432");

		let input = "host = \"${TEST_HOST}:${TEST_PORT}\"";
		let result = resolve_env_vars(input).unwrap();
		assert_eq!(result, "host = \"localhost:5432\"");

		std::env::remove_var("TEST_HOST");
		std::env::remove_var("TEST_PORT");
	}

	#[test]
	fn test_env_var_with_default() {
		let input = "value = \"${MISSING_VAR:-default_value}\"";
		let result = resolve_env_vars(input).unwrap();
		assert_eq!(result, "value = \"default_value\"");
	}

	#[test]
	fn test_missing_env_var_error() {
		let input = "value = \"${MISSING_VAR}\"";
		let result = resolve_env_vars(input);
		assert!(result.is_err());
		assert!(result.unwrap_err().to_string().contains("MISSING_VAR"));
	}

	fn sample_config(id: &str) -> String {
		format!(
			r#"
[service]
id = "{id}"
monitoring_timeout_minutes = 5
worker_pool_size = 2
browser_pool_size = 2

[storage]
primary = "memory"
cleanup_interval_seconds = 3600
[storage.implementations.memory]

[llm]
primary = "anthropic"
[llm.implementations.anthropic]
api_key = "${{TEST_LLM_KEY:-dummy}}"

[shopping]
primary = "serpapi"
[shopping.implementations.serpapi]
api_key = "${{TEST_SHOPPING_KEY:-dummy}}"

[extractor]
webdriver_url = "http://localhost:4444"

[vehicle]

[ledger]
"#,
			id = id
		)
	}

	#[test]
	fn test_config_with_env_vars() {
		std::env::set_var("TEST_SERVICE_ID", "test-worker");

		let config_str = sample_config("${TEST_SERVICE_ID}");
		let config: Config = config_str.parse().unwrap();
		assert_eq!(config.service.id, "test-worker");
		assert_eq!(config.service.worker_pool_size, 2);

		std::env::remove_var("TEST_SERVICE_ID");
	}

	#[test]
	fn test_missing_primary_implementation_fails_validation() {
		let config_str = r#"
[service]
id = "test-worker"

[storage]
primary = "file"
cleanup_interval_seconds = 3600
[storage.implementations.memory]

[llm]
primary = "anthropic"
[llm.implementations.anthropic]

[shopping]
primary = "serpapi"
[shopping.implementations.serpapi]

[extractor]
webdriver_url = "http://localhost:4444"

[vehicle]

[ledger]
"#;
		let result: Result<Config, ConfigError> = config_str.parse();
		assert!(result.is_err());
		assert!(matches!(result, Err(ConfigError::Validation(_))));
	}
}

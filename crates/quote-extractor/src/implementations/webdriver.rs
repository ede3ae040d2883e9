//! WebDriver-backed extraction, driving a headless Chromium-compatible
//! browser through `fantoccini` (spec.md §4.3 "Browser contract").

use crate::{cascade, ExtractionMode, ExtractionOutcome, ExtractorError, ExtractorService};
use async_trait::async_trait;
use fantoccini::wd::Capabilities;
use fantoccini::ClientBuilder;
use quote_types::{ConfigSchema, Field, FieldType, Schema, ValidationError};

const VIEWPORT_WIDTH: u32 = 1920;
const VIEWPORT_HEIGHT: u32 = 1080;
const USER_AGENT: &str =
	"Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

fn chrome_capabilities() -> Capabilities {
	let mut caps = serde_json::Map::new();
	caps.insert(
		"goog:chromeOptions".to_string(),
		serde_json::json!({
			"args": [
				"--headless=new",
				"--disable-blink-features=AutomationControlled",
				"--lang=pt-BR",
				format!("--user-agent={USER_AGENT}"),
				format!("--window-size={VIEWPORT_WIDTH},{VIEWPORT_HEIGHT}"),
			],
			"excludeSwitches": ["enable-automation"],
		}),
	);
	caps
}

struct WebDriverConfig {
	webdriver_url: String,
}

impl WebDriverConfig {
	fn from_toml(config: &toml::Value) -> Result<Self, ExtractorError> {
		let webdriver_url = config
			.get("webdriver_url")
			.and_then(|v| v.as_str())
			.ok_or_else(|| ExtractorError::InvalidConfig("missing webdriver_url".to_string()))?
			.to_string();
		Ok(Self { webdriver_url })
	}
}

pub struct WebDriverProvider {
	config: WebDriverConfig,
}

impl WebDriverProvider {
	fn new(config: WebDriverConfig) -> Self {
		Self { config }
	}
}

#[async_trait]
impl crate::ExtractorProvider for WebDriverProvider {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(WebDriverConfigSchema)
	}

	async fn extract(&self, url: &str, mode: ExtractionMode) -> Result<ExtractionOutcome, ExtractorError> {
		let client = ClientBuilder::native()
			.capabilities(chrome_capabilities())
			.connect(&self.config.webdriver_url)
			.await
			.map_err(|e| ExtractorError::Navigation(e.to_string()))?;

		let result = async {
			client
				.set_window_size(VIEWPORT_WIDTH, VIEWPORT_HEIGHT)
				.await
				.map_err(|e| ExtractorError::Navigation(e.to_string()))?;
			client.goto(url).await.map_err(|e| ExtractorError::Navigation(e.to_string()))?;

			// fantoccini's `goto` already waits for the WebDriver-reported page
			// load to finish; there is no raw CDP `networkidle` signal available
			// over the WebDriver protocol, so a short settle delay approximates
			// it for pages that fetch price data asynchronously.
			tokio::time::sleep(std::time::Duration::from_millis(500)).await;

			let final_url = client.current_url().await.map_err(|e| ExtractorError::Navigation(e.to_string()))?.to_string();
			let page_title = client.title().await.unwrap_or_default();
			let html = client.source().await.map_err(|e| ExtractorError::Navigation(e.to_string()))?;

			let screenshot_png = client.screenshot().await.map_err(|e| ExtractorError::Screenshot(e.to_string()))?;

			let (price, method) = match mode {
				ExtractionMode::GoogleOnly => (None, None),
				ExtractionMode::Validated => {
					let (raw, method) = cascade::extract_price(&html).ok_or(ExtractorError::NoPriceFound)?;
					let money = ExtractorService::sanitize_price(raw)?;
					(Some(money), Some(method))
				}
			};

			Ok(ExtractionOutcome {
				price,
				method,
				final_url,
				page_title,
				screenshot_png,
			})
		}
		.await;

		let _ = client.close().await;
		result
	}
}

struct WebDriverConfigSchema;

impl ConfigSchema for WebDriverConfigSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(vec![Field::new("webdriver_url", FieldType::String)], vec![]);
		schema.validate(config)
	}
}

/// Factory function to create a WebDriver-backed extractor from configuration.
pub fn create_provider(config: &toml::Value) -> Result<Box<dyn crate::ExtractorProvider>, ExtractorError> {
	Ok(Box::new(WebDriverProvider::new(WebDriverConfig::from_toml(config)?)))
}

/// Registry for the WebDriver backend.
pub struct Registry;

impl quote_types::ImplementationRegistry for Registry {
	const NAME: &'static str = "webdriver";
	type Factory = crate::ExtractorFactory;

	fn factory() -> Self::Factory {
		create_provider
	}
}

impl crate::ExtractorRegistry for Registry {}

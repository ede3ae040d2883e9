//! Anthropic Messages API backend.
//!
//! Default `AnalysisProvider` implementation. Supports vision (image
//! content blocks) and a server-side web-search tool, used for the
//! optional spec-lookup call in `AnalysisService::analyze_with_images`.

use crate::{AnalysisError, AnalysisProvider, Capabilities, CompletionRequest, CompletionResponse, ContentBlock, Role};
use async_trait::async_trait;
use quote_types::{ConfigSchema, Field, FieldType, Schema, TokenUsage, ValidationError};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MODEL: &str = "claude-sonnet-4-5";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic backend configuration.
struct AnthropicConfig {
	api_key: String,
	base_url: String,
	model: String,
}

impl AnthropicConfig {
	fn from_toml(config: &toml::Value) -> Result<Self, AnalysisError> {
		let api_key = config
			.get("api_key")
			.and_then(|v| v.as_str())
			.ok_or_else(|| AnalysisError::InvalidConfig("missing api_key".to_string()))?
			.to_string();
		let base_url = config
			.get("base_url")
			.and_then(|v| v.as_str())
			.unwrap_or(DEFAULT_BASE_URL)
			.to_string();
		let model = config
			.get("model")
			.and_then(|v| v.as_str())
			.unwrap_or(DEFAULT_MODEL)
			.to_string();
		Ok(Self {
			api_key,
			base_url,
			model,
		})
	}
}

pub struct AnthropicProvider {
	client: reqwest::Client,
	config: AnthropicConfig,
}

impl AnthropicProvider {
	fn new(config: AnthropicConfig) -> Self {
		Self {
			client: reqwest::Client::new(),
			config,
		}
	}

	fn build_body(&self, request: &CompletionRequest) -> serde_json::Value {
		let messages: Vec<serde_json::Value> = request
			.messages
			.iter()
			.filter(|m| m.role == Role::User)
			.map(|m| {
				let content: Vec<serde_json::Value> = m
					.content
					.iter()
					.map(|block| match block {
						ContentBlock::Text(text) => serde_json::json!({
							"type": "text",
							"text": text,
						}),
						ContentBlock::Image { media_type, base64_data } => serde_json::json!({
							"type": "image",
							"source": {
								"type": "base64",
								"media_type": media_type,
								"data": base64_data,
							},
						}),
					})
					.collect();
				serde_json::json!({ "role": "user", "content": content })
			})
			.collect();

		let mut body = serde_json::json!({
			"model": self.config.model,
			"max_tokens": 4096,
			"messages": messages,
		});
		if request.use_web_search {
			body["tools"] = serde_json::json!([{
				"type": "web_search_20250305",
				"name": "web_search",
			}]);
		}
		body
	}
}

#[async_trait]
impl AnalysisProvider for AnthropicProvider {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(AnthropicConfigSchema)
	}

	fn capabilities(&self) -> Capabilities {
		Capabilities {
			images_in_messages: true,
			web_search_tool: true,
		}
	}

	async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, AnalysisError> {
		let body = self.build_body(&request);
		let response = self
			.client
			.post(format!("{}/v1/messages", self.config.base_url))
			.header("x-api-key", &self.config.api_key)
			.header("anthropic-version", ANTHROPIC_VERSION)
			.json(&body)
			.send()
			.await
			.map_err(|e| AnalysisError::Provider(e.to_string()))?;

		match response.status().as_u16() {
			429 => return Err(AnalysisError::RateLimited),
			529 | 503 | 502 => return Err(AnalysisError::Overloaded),
			_ => {}
		}
		let response = response
			.error_for_status()
			.map_err(|e| AnalysisError::Provider(e.to_string()))?;

		let raw: serde_json::Value = response
			.json()
			.await
			.map_err(|e| AnalysisError::Provider(e.to_string()))?;

		let text = raw
			.get("content")
			.and_then(|c| c.as_array())
			.and_then(|blocks| blocks.iter().find_map(|b| b.get("text")).and_then(|t| t.as_str()))
			.ok_or_else(|| AnalysisError::Parse("no text content block in Anthropic response".to_string()))?
			.to_string();

		let usage = TokenUsage {
			input_tokens: raw
				.get("usage")
				.and_then(|u| u.get("input_tokens"))
				.and_then(|v| v.as_u64())
				.unwrap_or(0),
			output_tokens: raw
				.get("usage")
				.and_then(|u| u.get("output_tokens"))
				.and_then(|v| v.as_u64())
				.unwrap_or(0),
		};

		Ok(CompletionResponse { text, usage, raw })
	}
}

struct AnthropicConfigSchema;

impl ConfigSchema for AnthropicConfigSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![Field::new("api_key", FieldType::String)],
			vec![
				Field::new("base_url", FieldType::String),
				Field::new("model", FieldType::String),
			],
		);
		schema.validate(config)
	}
}

/// Factory function to create an Anthropic provider from configuration.
pub fn create_provider(config: &toml::Value) -> Result<Box<dyn AnalysisProvider>, AnalysisError> {
	Ok(Box::new(AnthropicProvider::new(AnthropicConfig::from_toml(config)?)))
}

/// Registry for the Anthropic backend.
pub struct Registry;

impl quote_types::ImplementationRegistry for Registry {
	const NAME: &'static str = "anthropic";
	type Factory = crate::AnalysisFactory;

	fn factory() -> Self::Factory {
		create_provider
	}
}

impl crate::AnalysisRegistry for Registry {}

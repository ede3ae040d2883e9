//! OpenAI Chat Completions API backend.
//!
//! Alternative `AnalysisProvider` implementation. Supports vision via
//! `image_url` content parts but has no server-side web-search tool, so
//! `Capabilities::web_search_tool` is `false` and the optional spec-lookup
//! call in `AnalysisService::analyze_with_images` is skipped when this
//! backend is selected.

use crate::{AnalysisError, AnalysisProvider, Capabilities, CompletionRequest, CompletionResponse, ContentBlock, Role};
use async_trait::async_trait;
use quote_types::{ConfigSchema, Field, FieldType, Schema, TokenUsage, ValidationError};

const DEFAULT_BASE_URL: &str = "https://api.openai.com";
const DEFAULT_MODEL: &str = "gpt-4o";

struct OpenAiConfig {
	api_key: String,
	base_url: String,
	model: String,
}

impl OpenAiConfig {
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

pub struct OpenAiProvider {
	client: reqwest::Client,
	config: OpenAiConfig,
}

impl OpenAiProvider {
	fn new(config: OpenAiConfig) -> Self {
		Self {
			client: reqwest::Client::new(),
			config,
		}
	}

	fn build_body(&self, request: &CompletionRequest) -> serde_json::Value {
		let messages: Vec<serde_json::Value> = request
			.messages
			.iter()
			.map(|m| {
				let role = match m.role {
					Role::System => "system",
					Role::User => "user",
				};
				let content: Vec<serde_json::Value> = m
					.content
					.iter()
					.map(|block| match block {
						ContentBlock::Text(text) => serde_json::json!({
							"type": "text",
							"text": text,
						}),
						ContentBlock::Image { media_type, base64_data } => serde_json::json!({
							"type": "image_url",
							"image_url": {
								"url": format!("data:{media_type};base64,{base64_data}"),
							},
						}),
					})
					.collect();
				serde_json::json!({ "role": role, "content": content })
			})
			.collect();

		serde_json::json!({
			"model": self.config.model,
			"messages": messages,
		})
	}
}

#[async_trait]
impl AnalysisProvider for OpenAiProvider {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(OpenAiConfigSchema)
	}

	fn capabilities(&self) -> Capabilities {
		Capabilities {
			images_in_messages: true,
			web_search_tool: false,
		}
	}

	async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, AnalysisError> {
		let body = self.build_body(&request);
		let response = self
			.client
			.post(format!("{}/v1/chat/completions", self.config.base_url))
			.bearer_auth(&self.config.api_key)
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
			.get("choices")
			.and_then(|c| c.as_array())
			.and_then(|choices| choices.first())
			.and_then(|choice| choice.get("message"))
			.and_then(|m| m.get("content"))
			.and_then(|c| c.as_str())
			.ok_or_else(|| AnalysisError::Parse("no message content in OpenAI response".to_string()))?
			.to_string();

		let usage = TokenUsage {
			input_tokens: raw
				.get("usage")
				.and_then(|u| u.get("prompt_tokens"))
				.and_then(|v| v.as_u64())
				.unwrap_or(0),
			output_tokens: raw
				.get("usage")
				.and_then(|u| u.get("completion_tokens"))
				.and_then(|v| v.as_u64())
				.unwrap_or(0),
		};

		Ok(CompletionResponse { text, usage, raw })
	}
}

struct OpenAiConfigSchema;

impl ConfigSchema for OpenAiConfigSchema {
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

/// Factory function to create an OpenAI provider from configuration.
pub fn create_provider(config: &toml::Value) -> Result<Box<dyn AnalysisProvider>, AnalysisError> {
	Ok(Box::new(OpenAiProvider::new(OpenAiConfig::from_toml(config)?)))
}

/// Registry for the OpenAI backend.
pub struct Registry;

impl quote_types::ImplementationRegistry for Registry {
	const NAME: &'static str = "openai";
	type Factory = crate::AnalysisFactory;

	fn factory() -> Self::Factory {
		create_provider
	}
}

impl crate::AnalysisRegistry for Registry {}

//! LLM analysis client for the quotation processing pipeline.
//!
//! Transforms `(text?, images?)` into a `CanonicalAnalysis`. Two backends
//! are supported behind one `AnalysisProvider` trait, selected via the same
//! registry/factory pattern every pluggable collaborator in this workspace
//! uses. The multi-call OCR → web-search → synthesis flow and the
//! retry/accounting wrapper live in `AnalysisService`, above the provider
//! seam.

use async_trait::async_trait;
use quote_config::RetryTable;
use quote_types::{
	CallAccounting, CanonicalAnalysis, ConfigSchema, ImplementationRegistry, ProcessingType,
	TokenUsage, VehicleIdentification,
};
use serde::Deserialize;
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod anthropic;
	pub mod openai;
}

/// Errors that can occur during LLM analysis operations.
#[derive(Debug, Error)]
pub enum AnalysisError {
	/// Backend returned HTTP 429.
	#[error("rate limited")]
	RateLimited,
	/// Backend returned 529/503/502.
	#[error("provider overloaded")]
	Overloaded,
	/// Any other backend error (network, auth, 4xx/5xx not covered above).
	#[error("provider error: {0}")]
	Provider(String),
	/// The backend's response text did not parse into the expected shape.
	#[error("failed to parse analysis response: {0}")]
	Parse(String),
	/// Configuration for the chosen backend was invalid.
	#[error("invalid configuration: {0}")]
	InvalidConfig(String),
}

/// Capability set the coordinator depends on (spec.md §4.4 "Provider
/// abstraction"). `messages` and `token_usage_reporting` are assumed of
/// every backend; the remaining two vary.
#[derive(Debug, Clone, Copy)]
pub struct Capabilities {
	pub images_in_messages: bool,
	pub web_search_tool: bool,
}

/// One message in a chat-style completion request.
#[derive(Debug, Clone)]
pub struct Message {
	pub role: Role,
	pub content: Vec<ContentBlock>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
	System,
	User,
}

#[derive(Debug, Clone)]
pub enum ContentBlock {
	Text(String),
	/// Base64-encoded image, used for the OCR call (spec.md §4.4 "Image
	/// present" flow).
	Image {
		media_type: String,
		base64_data: String,
	},
}

impl Message {
	pub fn text(role: Role, text: impl Into<String>) -> Self {
		Self {
			role,
			content: vec![ContentBlock::Text(text.into())],
		}
	}
}

/// A single call to an `AnalysisProvider`.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
	pub activity_label: String,
	pub messages: Vec<Message>,
	/// Ask the backend to use its web-search tool, if it has one
	/// (`Capabilities::web_search_tool`). Ignored otherwise.
	pub use_web_search: bool,
}

impl CompletionRequest {
	/// Concatenation of every text block sent, recorded verbatim on the
	/// resulting `CallAccounting` row (spec.md §4.4 "Accounting": "the prompt
	/// text").
	pub fn prompt_text(&self) -> String {
		self.messages
			.iter()
			.flat_map(|m| m.content.iter())
			.filter_map(|c| match c {
				ContentBlock::Text(t) => Some(t.as_str()),
				ContentBlock::Image { .. } => None,
			})
			.collect::<Vec<_>>()
			.join("\n")
	}
}

/// The backend's response to one `CompletionRequest`.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
	pub text: String,
	pub usage: TokenUsage,
	/// Raw wire response, kept for audit (mirrors `CanonicalAnalysis::raw`).
	pub raw: serde_json::Value,
}

/// Trait defining the interface for LLM backend implementations.
#[async_trait]
pub trait AnalysisProvider: Send + Sync {
	/// Returns the configuration schema for this backend implementation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// The capability set this backend provides.
	fn capabilities(&self) -> Capabilities;

	/// Sends one completion request and returns the raw text response plus
	/// token accounting. Implementations classify rate-limit/overload HTTP
	/// statuses into `AnalysisError::RateLimited`/`Overloaded` so the retry
	/// wrapper in `AnalysisService` can apply the right schedule.
	async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, AnalysisError>;
}

/// Type alias for analysis provider factory functions.
pub type AnalysisFactory = fn(&toml::Value) -> Result<Box<dyn AnalysisProvider>, AnalysisError>;

/// Registry trait for analysis provider implementations.
pub trait AnalysisRegistry: ImplementationRegistry<Factory = AnalysisFactory> {}

/// Get all registered analysis provider implementations.
pub fn get_all_implementations() -> Vec<(&'static str, AnalysisFactory)> {
	use implementations::{anthropic, openai};

	vec![
		(anthropic::Registry::NAME, anthropic::Registry::factory()),
		(openai::Registry::NAME, openai::Registry::factory()),
	]
}

/// One image the analysis is given, alongside any free text.
#[derive(Debug, Clone)]
pub struct ImageInput {
	pub media_type: String,
	pub base64_data: String,
}

/// Input to `AnalysisService::analyze`: the `(text?, images?)` pair from
/// spec.md §4.4 "Responsibility".
#[derive(Debug, Clone, Default)]
pub struct AnalysisInput {
	pub text: Option<String>,
	pub images: Vec<ImageInput>,
}

/// Structured output of the OCR + identifier-extraction call (spec.md §4.4
/// "Call 1"). Not persisted on its own; folded into `CanonicalAnalysis.calls`
/// and used to decide whether call 2 (web search) runs.
#[derive(Debug, Clone, Deserialize)]
struct OcrExtraction {
	brand: Option<String>,
	model: Option<String>,
	#[serde(default)]
	part_number: Option<String>,
	#[serde(default)]
	serial: Option<String>,
	#[serde(default)]
	visible_specs: Vec<String>,
	tem_specs_relevantes: bool,
}

/// Parsed shape of the final analysis JSON, whether produced by the
/// text-only single call or the image synthesis call.
#[derive(Debug, Clone, Deserialize)]
struct SynthesizedAnalysis {
	canonical_name: String,
	#[serde(default)]
	brand: Option<String>,
	#[serde(default)]
	model: Option<String>,
	processing_type: ProcessingType,
	#[serde(default)]
	extracted_specs: Vec<String>,
	primary_query: String,
	#[serde(default)]
	alternative_queries: Vec<String>,
	#[serde(default)]
	exclude_terms: Vec<String>,
	#[serde(default)]
	vehicle: Option<VehicleIdentification>,
}

fn parse_json<T: for<'de> Deserialize<'de>>(text: &str) -> Result<T, AnalysisError> {
	serde_json::from_str(text).map_err(|e| AnalysisError::Parse(e.to_string()))
}

/// Service that wraps an `AnalysisProvider` with the retry/backoff schedules
/// and the multi-call flow that produces a `CanonicalAnalysis`.
pub struct AnalysisService {
	provider: Box<dyn AnalysisProvider>,
	rate_limit_retry: RetryTable,
	overload_retry: RetryTable,
}

impl AnalysisService {
	pub fn new(
		provider: Box<dyn AnalysisProvider>,
		rate_limit_retry: RetryTable,
		overload_retry: RetryTable,
	) -> Self {
		Self {
			provider,
			rate_limit_retry,
			overload_retry,
		}
	}

	/// Runs one completion, retrying on `RateLimited`/`Overloaded` per the
	/// configured schedules (spec.md §4.4 "Retry"). Any other error
	/// propagates immediately.
	async fn complete_with_retry(
		&self,
		request: CompletionRequest,
	) -> Result<CompletionResponse, AnalysisError> {
		let mut rate_limit_attempt = 0usize;
		let mut overload_attempt = 0usize;

		loop {
			match self.provider.complete(request.clone()).await {
				Ok(response) => return Ok(response),
				Err(AnalysisError::RateLimited) => {
					let delay = self.rate_limit_retry.schedule.get(rate_limit_attempt).copied();
					match delay {
						Some(seconds) => {
							rate_limit_attempt += 1;
							tracing::warn!(attempt = rate_limit_attempt, seconds, "llm rate limited, retrying");
							tokio::time::sleep(std::time::Duration::from_secs(seconds)).await;
						}
						None => return Err(AnalysisError::RateLimited),
					}
				}
				Err(AnalysisError::Overloaded) => {
					let delay = self.overload_retry.schedule.get(overload_attempt).copied();
					match delay {
						Some(seconds) => {
							overload_attempt += 1;
							tracing::warn!(attempt = overload_attempt, seconds, "llm overloaded, retrying");
							tokio::time::sleep(std::time::Duration::from_secs(seconds)).await;
						}
						None => return Err(AnalysisError::Overloaded),
					}
				}
				Err(other) => return Err(other),
			}
		}
	}

	/// Runs the full `(text?, images?)` → `CanonicalAnalysis` flow
	/// (spec.md §4.4 "Flow").
	pub async fn analyze(&self, input: AnalysisInput) -> Result<CanonicalAnalysis, AnalysisError> {
		if input.images.is_empty() {
			self.analyze_text_only(input.text.unwrap_or_default()).await
		} else {
			self.analyze_with_images(input.text, input.images).await
		}
	}

	async fn analyze_text_only(&self, text: String) -> Result<CanonicalAnalysis, AnalysisError> {
		let request = CompletionRequest {
			activity_label: "full_analysis".to_string(),
			messages: vec![Message::text(Role::User, text)],
			use_web_search: false,
		};
		let response = self.complete_with_retry(request.clone()).await?;
		let synthesized: SynthesizedAnalysis = parse_json(&response.text)?;
		let call = CallAccounting {
			activity_label: request.activity_label,
			usage: response.usage,
			prompt_text: request.prompt_text(),
		};
		Ok(to_canonical_analysis(synthesized, vec![call], response.raw))
	}

	async fn analyze_with_images(
		&self,
		text: Option<String>,
		images: Vec<ImageInput>,
	) -> Result<CanonicalAnalysis, AnalysisError> {
		let mut calls = Vec::new();

		let ocr_request = ocr_request(text.as_deref(), &images);
		let ocr_response = self.complete_with_retry(ocr_request.clone()).await?;
		calls.push(CallAccounting {
			activity_label: ocr_request.activity_label.clone(),
			usage: ocr_response.usage,
			prompt_text: ocr_request.prompt_text(),
		});
		let ocr: OcrExtraction = parse_json(&ocr_response.text)?;

		let mut web_specs: Option<String> = None;
		if !ocr.tem_specs_relevantes {
			if let (Some(brand), Some(model)) = (&ocr.brand, &ocr.model) {
				if self.provider.capabilities().web_search_tool {
					let web_request = web_search_request(brand, model);
					let web_response = self.complete_with_retry(web_request.clone()).await?;
					calls.push(CallAccounting {
						activity_label: web_request.activity_label.clone(),
						usage: web_response.usage,
						prompt_text: web_request.prompt_text(),
					});
					web_specs = Some(web_response.text);
				}
			}
		}

		let synth_request = synthesis_request(&ocr, web_specs.as_deref());
		let synth_response = self.complete_with_retry(synth_request.clone()).await?;
		calls.push(CallAccounting {
			activity_label: synth_request.activity_label.clone(),
			usage: synth_response.usage,
			prompt_text: synth_request.prompt_text(),
		});
		let synthesized: SynthesizedAnalysis = parse_json(&synth_response.text)?;

		Ok(to_canonical_analysis(synthesized, calls, synth_response.raw))
	}
}

fn ocr_request(text: Option<&str>, images: &[ImageInput]) -> CompletionRequest {
	let mut content = Vec::new();
	if let Some(text) = text {
		content.push(ContentBlock::Text(text.to_string()));
	}
	content.push(ContentBlock::Text(
		"Extract brand, model, part number, serial and visible specs from the attached image(s). \
		 Respond as JSON with keys: brand, model, part_number, serial, visible_specs, tem_specs_relevantes."
			.to_string(),
	));
	for image in images {
		content.push(ContentBlock::Image {
			media_type: image.media_type.clone(),
			base64_data: image.base64_data.clone(),
		});
	}
	CompletionRequest {
		activity_label: "ocr_extraction".to_string(),
		messages: vec![Message { role: Role::User, content }],
		use_web_search: false,
	}
}

fn web_search_request(brand: &str, model: &str) -> CompletionRequest {
	CompletionRequest {
		activity_label: "web_search_specs".to_string(),
		messages: vec![Message::text(
			Role::User,
			format!("Find the key technical specifications for {brand} {model}."),
		)],
		use_web_search: true,
	}
}

fn synthesis_request(ocr: &OcrExtraction, web_specs: Option<&str>) -> CompletionRequest {
	let mut prompt = format!(
		"Synthesize the final analysis JSON from this OCR extraction: {}",
		serde_json::to_string(ocr).unwrap_or_default()
	);
	if let Some(web_specs) = web_specs {
		prompt.push_str("\nAdditional specs found via web search: ");
		prompt.push_str(web_specs);
	}
	prompt.push_str(
		"\nRespond as JSON with keys: canonical_name, brand, model, processing_type \
		 (\"Fipe\" or \"GoogleShopping\"), extracted_specs, primary_query, alternative_queries, \
		 exclude_terms, vehicle.",
	);
	CompletionRequest {
		activity_label: "synthesis".to_string(),
		messages: vec![Message::text(Role::User, prompt)],
		use_web_search: false,
	}
}

fn to_canonical_analysis(
	synthesized: SynthesizedAnalysis,
	calls: Vec<CallAccounting>,
	raw: serde_json::Value,
) -> CanonicalAnalysis {
	CanonicalAnalysis {
		canonical_name: synthesized.canonical_name,
		brand: synthesized.brand,
		model: synthesized.model,
		processing_type: synthesized.processing_type,
		extracted_specs: synthesized.extracted_specs,
		primary_query: synthesized.primary_query,
		alternative_queries: synthesized.alternative_queries,
		exclude_terms: synthesized.exclude_terms,
		vehicle: synthesized.vehicle,
		calls,
		raw,
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::atomic::{AtomicUsize, Ordering};
	use std::sync::Arc;

	struct FlakyProvider {
		attempts: Arc<AtomicUsize>,
		fail_times: usize,
		response_text: String,
	}

	#[async_trait]
	impl AnalysisProvider for FlakyProvider {
		fn config_schema(&self) -> Box<dyn ConfigSchema> {
			struct NoopSchema;
			#[async_trait]
			impl ConfigSchema for NoopSchema {
				fn validate(&self, _config: &toml::Value) -> Result<(), quote_types::ValidationError> {
					Ok(())
				}
			}
			Box::new(NoopSchema)
		}

		fn capabilities(&self) -> Capabilities {
			Capabilities {
				images_in_messages: true,
				web_search_tool: false,
			}
		}

		async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, AnalysisError> {
			let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
			if attempt < self.fail_times {
				return Err(AnalysisError::RateLimited);
			}
			Ok(CompletionResponse {
				text: self.response_text.clone(),
				usage: TokenUsage {
					input_tokens: 10,
					output_tokens: 20,
				},
				raw: serde_json::Value::Null,
			})
		}
	}

	fn fast_retry_table() -> RetryTable {
		RetryTable { schedule: vec![0, 0, 0] }
	}

	#[tokio::test]
	async fn text_only_analysis_succeeds_after_transient_rate_limit() {
		let attempts = Arc::new(AtomicUsize::new(0));
		let provider = FlakyProvider {
			attempts: attempts.clone(),
			fail_times: 2,
			response_text: r#"{"canonical_name":"Notebook X","processing_type":"GoogleShopping","primary_query":"notebook x"}"#.to_string(),
		};
		let service = AnalysisService::new(Box::new(provider), fast_retry_table(), fast_retry_table());

		let analysis = service
			.analyze(AnalysisInput {
				text: Some("some product description".to_string()),
				images: Vec::new(),
			})
			.await
			.unwrap();

		assert_eq!(analysis.canonical_name, "Notebook X");
		assert_eq!(analysis.calls.len(), 1);
		assert_eq!(attempts.load(Ordering::SeqCst), 3);
	}

	#[tokio::test]
	async fn exhausting_retry_schedule_propagates_error() {
		let attempts = Arc::new(AtomicUsize::new(0));
		let provider = FlakyProvider {
			attempts,
			fail_times: usize::MAX,
			response_text: String::new(),
		};
		let service = AnalysisService::new(Box::new(provider), fast_retry_table(), fast_retry_table());

		let result = service
			.analyze(AnalysisInput {
				text: Some("x".to_string()),
				images: Vec::new(),
			})
			.await;

		assert!(matches!(result, Err(AnalysisError::RateLimited)));
	}
}

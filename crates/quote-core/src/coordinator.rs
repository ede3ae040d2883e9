//! The quotation coordinator: drives one `QuoteRequest` from claim to a
//! terminal status, persisting a checkpoint after every externally
//! observable milestone (spec.md §4.1).

use crate::block_search;
use crate::candidate_probe::{self, ProbeDeps, ProbeSets};
use crate::claim;
use crate::error::CoordinatorError;
use crate::files;
use crate::sinks::{PdfSink, QuotePacket};
use base64::Engine as _;
use quote_ledger::LedgerService;
use quote_llm::{AnalysisInput, AnalysisService, ImageInput};
use quote_shopping::ShoppingService;
use quote_storage::StorageService;
use quote_types::checkpoint::{BlockSearchScratch, CheckpointTag};
use quote_types::{
	AggregateResult, BlockedDomain, CallKind, FailureReason, IntegrationLog, ManufacturerWhitelist, Money, ProjectConfigVersion, QuoteRequest, QuoteRequestId, QuoteRequestStatus, QuoteSource,
	QuoteSourceFailure, ShoppingSearchResponse, StorageKey,
};
use quote_vehicle::VehicleService;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::instrument;

/// Advances both the internal checkpoint and the poller-facing
/// `QuoteRequest.progress` mirror in one step; the two carry the same shape
/// but are read by different audiences (spec.md §4.1 "progress contract").
fn advance(request: &mut QuoteRequest, tag: CheckpointTag, percentage: u8, step_tag: impl Into<String>, detail: impl Into<String>) {
	let step_tag = step_tag.into();
	let detail = detail.into();
	request.checkpoint.advance(tag, percentage, step_tag.clone(), detail.clone());
	request.progress = quote_types::ProgressReport {
		percentage: request.checkpoint.progress.percentage,
		step_tag,
		detail,
	};
	request.updated_at = chrono::Utc::now();
}

/// One probe's concrete outcome, kept alongside the abstract verdict handed
/// to `block_search::run` so the coordinator can reconcile afterwards
/// (spec.md §3 "Lifecycle": a validated-but-not-winning candidate is still
/// persisted as a `QuoteSource`, just flipped to `is_accepted=false`).
enum ProbeRecord {
	Accepted(QuoteSource, Vec<u8>),
	Rejected(QuoteSourceFailure),
}

/// Bridges `block_search::CandidateProber` (abstract accept/reject, `&self`)
/// to `candidate_probe::probe` (concrete `QuoteSource`/`QuoteSourceFailure`
/// construction with the `urls_seen` side set). Interior mutability is
/// required because the search loop only ever holds `&self`.
struct LiveProber<'a> {
	deps: ProbeDeps<'a>,
	quote_request_id: QuoteRequestId,
	urls_seen: Mutex<std::collections::HashSet<String>>,
	records: Mutex<HashMap<String, ProbeRecord>>,
}

#[async_trait::async_trait]
impl block_search::CandidateProber for LiveProber<'_> {
	async fn probe(&self, candidate: &quote_types::ShoppingCandidate) -> block_search::ProbeOutcome {
		let outcome = {
			let mut urls_seen = self.urls_seen.lock().await;
			let mut sets = ProbeSets { urls_seen: &mut urls_seen };
			candidate_probe::probe(&self.deps, self.quote_request_id, candidate, &mut sets).await
		};

		let (verdict, record) = match outcome {
			candidate_probe::ProbeOutcome::Accepted { source, screenshot_png } => (block_search::ProbeOutcome::Accepted, ProbeRecord::Accepted(source, screenshot_png)),
			candidate_probe::ProbeOutcome::Rejected(failure) => (block_search::ProbeOutcome::Rejected, ProbeRecord::Rejected(failure)),
		};
		self.records.lock().await.insert(candidate.key(), record);
		verdict
	}
}

/// Everything the coordinator needs to drive one request, wired once per
/// worker process and shared across every request it claims.
pub struct Coordinator {
	pub storage: Arc<StorageService>,
	pub shopping: Arc<ShoppingService>,
	pub extractor: Arc<quote_extractor::ExtractorService>,
	pub analysis: Arc<AnalysisService>,
	pub vehicle: Arc<VehicleService>,
	pub ledger: Arc<LedgerService>,
	pub pdf_sink: Arc<dyn PdfSink>,
	pub worker_id: String,
	pub storage_dir: PathBuf,
	pub liveness: chrono::Duration,
}

impl Coordinator {
	/// Claims `request_id` and drives it to a terminal status. Returns
	/// `Ok(())` whether the request finished `Done`, `AwaitingReview`, or
	/// `Error` — only a failure to even begin (claim lost, request already
	/// terminal) is an `Err`.
	#[instrument(skip(self), fields(worker_id = %self.worker_id))]
	pub async fn process(&self, request_id: QuoteRequestId) -> Result<(), CoordinatorError> {
		let request = claim::try_claim(&self.storage, request_id, &self.worker_id, self.liveness).await?;
		tracing::info!(%request_id, "claimed quote request");

		match self.drive(request).await {
			Ok(()) => Ok(()),
			Err(e) => {
				self.mark_error(request_id, &e).await;
				Err(e)
			}
		}
	}

	async fn reload(&self, request_id: QuoteRequestId) -> Result<QuoteRequest, CoordinatorError> {
		Ok(self.storage.retrieve(StorageKey::QuoteRequests.as_str(), &request_id.to_string()).await?)
	}

	async fn save(&self, request: &QuoteRequest) -> Result<(), CoordinatorError> {
		self.storage.store(StorageKey::QuoteRequests.as_str(), &request.id.to_string(), request, None).await?;
        Ok(())
	}

	/// Re-reads the persisted status rather than trusting the in-memory
	/// copy, since a user cancel is written by a separate actor between
	/// checkpoints (spec.md §5 "checks cancellation at every checkpoint").
	async fn check_cancelled(&self, request: &QuoteRequest) -> Result<(), CoordinatorError> {
		let current = self.reload(request.id).await?;
		if claim::is_cancelled(&current) {
			return Err(CoordinatorError::Cancelled);
		}
		Ok(())
	}

	/// Writes a terminal `Error` status with a localized message, unless the
	/// request was cancelled in the meantime (cancellation is sticky,
	/// spec.md §4.1 "Terminal-status rule").
	async fn mark_error(&self, request_id: QuoteRequestId, error: &CoordinatorError) {
		if matches!(error, CoordinatorError::Cancelled) {
			return;
		}
		let Ok(mut request) = self.reload(request_id).await else {
			tracing::error!(%request_id, "failed to reload request to record error status");
			return;
		};
		if request.status == QuoteRequestStatus::Cancelled {
			return;
		}
		request.status = QuoteRequestStatus::Error;
		request.error_message = Some(error.user_message());
		request.completed_at = Some(chrono::Utc::now());
		advance(&mut request, CheckpointTag::Failed, 100, "failed", error.to_string());
		if let Err(e) = self.save(&request).await {
			tracing::error!(%request_id, error = %e, "failed to persist error status");
		}
	}

	async fn config_version(&self, request: &QuoteRequest) -> Result<ProjectConfigVersion, CoordinatorError> {
		Ok(self.storage.retrieve(StorageKey::ProjectConfigVersions.as_str(), &request.config_version_id.to_string()).await?)
	}

	async fn load_domain_tables(&self) -> Result<(Vec<BlockedDomain>, Vec<ManufacturerWhitelist>), CoordinatorError> {
		let blocked: Vec<(String, BlockedDomain)> = self.storage.retrieve_all(StorageKey::BlockedDomains.as_str()).await?;
		let whitelist: Vec<(String, ManufacturerWhitelist)> = self.storage.retrieve_all(StorageKey::ManufacturerWhitelist.as_str()).await?;
		Ok((blocked.into_iter().map(|(_, v)| v).collect(), whitelist.into_iter().map(|(_, v)| v).collect()))
	}

	async fn log_call(&self, request_id: QuoteRequestId, kind: CallKind, sanitized_url: String, product_title: Option<String>, resolved_store_link: Option<String>) {
		let log = IntegrationLog {
			id: uuid::Uuid::new_v4().to_string(),
			quote_request_id: request_id,
			kind,
			sanitized_url,
			product_title,
			resolved_store_link,
			recorded_at: chrono::Utc::now(),
		};
		if let Err(e) = self.ledger.record_call(log).await {
			tracing::warn!(%request_id, error = %e, "failed to record integration log");
		}
	}

	/// Reads an uploaded input image from disk and base64-encodes it for
	/// the LLM's multimodal message (spec.md §4.4 "image-present: OCR
	/// call").
	async fn load_image_input(&self, file_id: &quote_types::FileId) -> Result<ImageInput, CoordinatorError> {
		let file: quote_types::File = self.storage.retrieve(StorageKey::Files.as_str(), &file_id.to_string()).await?;
		let bytes = tokio::fs::read(&file.storage_path)
			.await
			.map_err(|e| CoordinatorError::Internal(format!("failed to read input image {}: {e}", file.storage_path)))?;
		Ok(ImageInput {
			media_type: file.mime,
			base64_data: base64::engine::general_purpose::STANDARD.encode(bytes),
		})
	}

	/// The checkpoint-driven state machine. Every externally observable
	/// milestone is persisted before the next one starts, so a crash
	/// between any two steps resumes without redoing paid work (spec.md
	/// §4.1 "On restart ... skips any prefix that is provably complete").
	async fn drive(&self, mut request: QuoteRequest) -> Result<(), CoordinatorError> {
		let config = self.config_version(&request).await?;
		let (blocked_domains, whitelist) = self.load_domain_tables().await?;
		self.check_cancelled(&request).await?;

		// --- LLM analysis ---
		let analysis = if let Some(analysis) = request.checkpoint.payload.analysis.clone() {
			analysis
		} else {
			advance(&mut request, CheckpointTag::AiAnalysisStart, 10, "ai_analysis_start", "calling LLM provider");
			self.save(&request).await?;

			let mut images = Vec::with_capacity(request.input_image_file_ids.len());
			for file_id in &request.input_image_file_ids {
				match self.load_image_input(file_id).await {
					Ok(image) => images.push(image),
					Err(e) => tracing::warn!(request_id = %request.id, %file_id, error = %e, "failed to load input image, skipping"),
				}
			}
			let input = AnalysisInput { text: request.input_text.clone(), images };
			let analysis = self.analysis.analyze(input).await?;

			self.log_call(request.id, CallKind::Llm, "llm://analysis".to_string(), None, None).await;
			let tokens = analysis.total_tokens();
			if let Err(e) = self.ledger.record_cost(request.id, None, request.project_id.clone(), CallKind::Llm, tokens).await {
				tracing::warn!(request_id = %request.id, error = %e, "failed to record llm cost");
			}

			request.checkpoint.payload.analysis = Some(analysis.clone());
			advance(&mut request, CheckpointTag::AiAnalysisDone, 30, "ai_analysis_done", "LLM analysis complete");
			self.save(&request).await?;
			analysis
		};

		self.check_cancelled(&request).await?;
		if !analysis.has_usable_query() && analysis.vehicle.as_ref().and_then(|v| v.brand.as_ref()).is_none() {
			return Err(CoordinatorError::QueryEmpty);
		}

		// --- Vehicle sub-pipeline or shopping query ---
		let mut query = analysis.primary_query.clone();
		if matches!(analysis.processing_type, quote_types::ProcessingType::Fipe) {
			if let Some(vehicle_id) = &analysis.vehicle {
				if vehicle_id.brand.is_some() && vehicle_id.model.is_some() {
					match self.try_vehicle(&mut request, vehicle_id, &config).await {
						Ok(Some(())) => return self.finalize(request, vec![], vec![]).await,
						Ok(None) => {}
						Err(fallback_query) => query = fallback_query,
					}
				}
			}
		}

		if query.trim().is_empty() {
			// vehicle path failed (or was never attempted) with no usable
			// shopping query to fall back to.
			return Err(CoordinatorError::FipeUnreachable);
		}

		// --- Shopping search ---
		let shopping_response = if let Some(cached) = request.checkpoint.payload.shopping_response.clone() {
			cached
		} else {
			self.check_cancelled(&request).await?;
			advance(&mut request, CheckpointTag::ShoppingSearchStart, 40, "shopping_search_start", "calling shopping aggregator");
			self.save(&request).await?;

			let (candidates, filter_log, sanitized_url, raw) = self.shopping.initial_candidates(&query, &blocked_domains).await?;
			self.log_call(request.id, CallKind::Aggregator, sanitized_url, None, None).await;
			if let Err(e) = self.ledger.record_cost(request.id, None, request.project_id.clone(), CallKind::Aggregator, 1).await {
				tracing::warn!(request_id = %request.id, error = %e, "failed to record aggregator cost");
			}

			if candidates.is_empty() {
				return Err(CoordinatorError::NoCandidates);
			}

			let response = ShoppingSearchResponse { candidates, filter_log, raw };
			request.checkpoint.payload.shopping_response = Some(response.clone());
			advance(&mut request, CheckpointTag::ShoppingSearchDone, 50, "shopping_search_done", "candidates filtered and stored");
			self.save(&request).await?;
			response
		};

		self.check_cancelled(&request).await?;

		// --- Block search ---
		advance(&mut request, CheckpointTag::PriceExtractionStart, 60, "price_extraction_start", "running block search");
		self.save(&request).await?;

		let n = config.number_of_quotes as usize;
		let epsilon0 = config.epsilon0();
		let scratch = request.checkpoint.payload.block_search.clone().unwrap_or_else(|| BlockSearchScratch::new(epsilon0));

		let prober = LiveProber {
			deps: ProbeDeps {
				shopping: &self.shopping,
				extractor: &self.extractor,
				blocked_domains: &blocked_domains,
				whitelist: &whitelist,
				enable_price_mismatch: config.enable_price_mismatch,
			},
			quote_request_id: request.id,
			urls_seen: Mutex::new(std::collections::HashSet::new()),
			records: Mutex::new(HashMap::new()),
		};

		let storage = Arc::clone(&self.storage);
		let heartbeat_request_id = request.id;
		let result = block_search::run(&shopping_response.candidates, n, epsilon0, &prober, scratch, move || {
			let storage = Arc::clone(&storage);
			async move { claim::heartbeat_or_cancelled(&storage, heartbeat_request_id).await.unwrap_or(false) }
		})
		.await;

		request.checkpoint.payload.block_search = Some(result.scratch.clone());
		self.save(&request).await?;

		if result.outcome == block_search::BlockSearchOutcome::Cancelled {
			// QuoteSources already probed before cancellation remain; no
			// finalization status is written, matching the sticky Cancelled
			// status the user action already set (spec.md §5 "cancellation").
			let records = prober.records.into_inner();
			for (_, record) in records {
				match record {
					ProbeRecord::Accepted(mut source, screenshot_png) => {
						if let Ok(file) = files::save_screenshot(&self.storage, &self.storage_dir, &request.id.to_string(), &screenshot_png).await {
							source.screenshot_file_id = Some(file.id);
						}
						self.persist_source(&source).await;
					}
					ProbeRecord::Rejected(failure) => self.persist_failure(&failure).await,
				}
			}
			return Err(CoordinatorError::Cancelled);
		}

		// --- Reconcile probe records against the final accepted set ---
		let accepted_keys: std::collections::HashSet<String> = result
			.accepted_indices
			.iter()
			.map(|&i| shopping_response.candidates[i].key())
			.collect();

		let mut accepted_sources = Vec::new();
		let records = prober.records.into_inner();
		for (key, record) in records {
			match record {
				ProbeRecord::Accepted(mut source, screenshot_png) => {
					if accepted_keys.contains(&key) {
						if let Ok(file) = files::save_screenshot(&self.storage, &self.storage_dir, &request.id.to_string(), &screenshot_png).await {
							source.screenshot_file_id = Some(file.id);
						}
						self.persist_source(&source).await;
						accepted_sources.push(source);
					} else {
						source.is_accepted = false;
						source.failure_reason = Some(FailureReason::Other);
						self.persist_source(&source).await;
					}
				}
				ProbeRecord::Rejected(failure) => self.persist_failure(&failure).await,
			}
		}

		self.finalize(request, accepted_sources, vec![]).await
	}

	/// Attempts the FIPE sub-pipeline. `Ok(Some(()))` means the request is
	/// fully satisfied by the vehicle price bank and finalization should run
	/// immediately; `Ok(None)` means the caller should fall through to the
	/// shopping path with the analysis's own query; `Err(query)` means FIPE
	/// failed but a fallback shopping query was derivable (spec.md §4.5
	/// "Fallback").
	async fn try_vehicle(&self, request: &mut QuoteRequest, vehicle_id: &quote_types::VehicleIdentification, config: &ProjectConfigVersion) -> Result<Option<()>, String> {
		let query = quote_types::vehicle::FipeVehicleQuery {
			brand_hint: vehicle_id.brand.clone().unwrap_or_default(),
			model_hint: vehicle_id.model.clone().unwrap_or_default(),
			year_hint: vehicle_id.year.clone().unwrap_or_default(),
			fuel_hint: vehicle_id.fuel.clone(),
		};

		match self.vehicle.resolve(&self.storage, &query, &self.storage_dir).await {
			Ok(resolution) => {
				if !resolution.from_cache {
					self.log_call(request.id, CallKind::Fipe, format!("fipe://{}/{}", query.brand_hint, query.model_hint), Some(format!("{} {}", query.brand_hint, query.model_hint)), None).await;
					if let Err(e) = self.ledger.record_cost(request.id, None, request.project_id.clone(), CallKind::Fipe, 1).await {
						tracing::warn!(request_id = %request.id, error = %e, "failed to record fipe cost");
					}
				}
				let source = QuoteSource {
					id: quote_types::QuoteSourceId::new(),
					quote_request_id: request.id,
					final_url: "https://veiculos.fipe.org.br/".to_string(),
					domain: "fipe.org.br".to_string(),
					page_title: format!("{} {} {}", resolution.row.brand, resolution.row.model, resolution.row.year),
					price: resolution.row.price,
					extraction_method: quote_types::ExtractionMethod::ApiFipe,
					screenshot_file_id: resolution.row.screenshot_file_id,
					captured_at: chrono::Utc::now(),
					is_outlier: false,
					is_accepted: true,
					failure_reason: None,
				};
				self.persist_source(&source).await;
				advance(request, CheckpointTag::PriceExtractionStart, 60, "fipe_resolved", "vehicle price resolved from FIPE");
				let _ = self.save(request).await;
				Ok(Some(()))
			}
			Err(e) => {
				tracing::warn!(request_id = %request.id, error = %e, "fipe resolution failed, considering shopping fallback");
				match vehicle_id.shopping_fallback_query.clone() {
					Some(q) if !q.trim().is_empty() => Err(q),
					_ if !vehicle_id.brand.clone().unwrap_or_default().is_empty() && !vehicle_id.model.clone().unwrap_or_default().is_empty() => {
						Err(format!("{} {}", vehicle_id.brand.clone().unwrap(), vehicle_id.model.clone().unwrap()))
					}
					_ => Ok(None),
				}
			}
		}
	}

	async fn persist_source(&self, source: &QuoteSource) {
		if let Err(e) = self.storage.store(StorageKey::QuoteSources.as_str(), &source.id.to_string(), source, None).await {
			tracing::error!(quote_source_id = %source.id, error = %e, "failed to persist quote source");
		}
	}

	async fn persist_failure(&self, failure: &QuoteSourceFailure) {
		if let Err(e) = self.storage.store(StorageKey::QuoteSourceFailures.as_str(), &failure.id.to_string(), failure, None).await {
			tracing::error!(quote_source_failure_id = %failure.id, error = %e, "failed to persist quote source failure");
		}
	}

	/// Computes the aggregate, applies the terminal-status rule (spec.md
	/// §4.1), calls the PDF sink, and writes the final request state.
	async fn finalize(&self, mut request: QuoteRequest, mut accepted_sources: Vec<QuoteSource>, vehicle_row: Vec<quote_types::vehicle::VehiclePriceBank>) -> Result<(), CoordinatorError> {
		if accepted_sources.is_empty() {
			if let Ok(loaded) = self.load_accepted_sources(request.id).await {
				accepted_sources = loaded;
			}
		}

		advance(&mut request, CheckpointTag::Finalization, 95, "finalization", "computing aggregate");
		self.save(&request).await?;

		let config = self.config_version(&request).await?;
		let n = config.number_of_quotes as usize;
		let k = accepted_sources.len();

		request.aggregate = aggregate_of(&accepted_sources);

		let packet = QuotePacket {
			request: &request,
			accepted_sources: &accepted_sources,
			vehicle_row: vehicle_row.first(),
		};
		if let Err(e) = self.pdf_sink.generate(packet).await {
			tracing::debug!(request_id = %request.id, error = %e, "pdf sink did not produce a document");
		}

		request.completed_at = Some(chrono::Utc::now());
		if request.status != QuoteRequestStatus::Cancelled {
			if k >= n && n > 0 {
				request.status = QuoteRequestStatus::Done;
			} else if k > 0 {
				request.status = QuoteRequestStatus::AwaitingReview;
			} else {
				request.status = QuoteRequestStatus::Error;
				request.error_message = Some(CoordinatorError::NoCandidates.user_message());
			}
		}
		advance(&mut request, CheckpointTag::Completed, 100, "completed", format!("{k} of {n} sources accepted"));
		self.save(&request).await?;
		Ok(())
	}

	async fn load_accepted_sources(&self, request_id: QuoteRequestId) -> Result<Vec<QuoteSource>, CoordinatorError> {
		let all: Vec<(String, QuoteSource)> = self.storage.retrieve_all(StorageKey::QuoteSources.as_str()).await?;
		Ok(all.into_iter().map(|(_, s)| s).filter(|s| s.quote_request_id == request_id && s.is_accepted).collect())
	}
}

fn aggregate_of(sources: &[QuoteSource]) -> Option<AggregateResult> {
	if sources.is_empty() {
		return None;
	}
	let prices: Vec<Decimal> = sources.iter().map(|s| s.price.amount()).collect();
	let min = *prices.iter().min()?;
	let max = *prices.iter().max()?;
	let sum: Decimal = prices.iter().sum();
	let mean = sum / Decimal::from(prices.len());
	let spread_percent = if min > Decimal::ZERO { (max / min - Decimal::ONE) * Decimal::from(100) } else { Decimal::ZERO };

	Some(AggregateResult {
		mean: Money::new(mean).ok()?,
		min: Money::new(min).ok()?,
		max: Money::new(max).ok()?,
		spread_percent,
	})
}

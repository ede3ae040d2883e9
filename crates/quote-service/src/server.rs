//! HTTP status API for the quote processing service.
//!
//! Exposes read and administrative operations over already-submitted
//! `QuoteRequest`s (status polling, cancel, re-quote). Raw request intake —
//! authentication, multipart parsing, rate-limit middleware — is out of
//! scope; requests reach storage through the CLI `submit`/`submit-batch`
//! subcommands or another system entirely.

use axum::{
	extract::{Path, State},
	http::StatusCode,
	response::{IntoResponse, Json},
	routing::{get, post},
	Router,
};
use quote_config::ApiConfig;
use quote_storage::{StorageError, StorageService};
use quote_types::{ConfigVersionId, QuoteRequest, QuoteRequestId, QuoteRequestStatus, StorageKey};
use serde::Serialize;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;

/// Shared application state for the API server.
#[derive(Clone)]
pub struct AppState {
	pub storage: Arc<StorageService>,
}

/// Errors surfaced to API callers, mapped to HTTP status codes.
pub enum ApiError {
	NotFound,
	Conflict(String),
	Internal(String),
}

impl From<StorageError> for ApiError {
	fn from(e: StorageError) -> Self {
		match e {
			StorageError::NotFound => ApiError::NotFound,
			other => ApiError::Internal(other.to_string()),
		}
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> axum::response::Response {
		let (status, message) = match self {
			ApiError::NotFound => (StatusCode::NOT_FOUND, "quote request not found".to_string()),
			ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
			ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
		};
		(status, Json(serde_json::json!({ "error": message }))).into_response()
	}
}

/// Poller-facing view of a `QuoteRequest`; omits internal checkpoint
/// payload fields (analysis/shopping/block-search scratch) that are an
/// implementation detail of resumption, not a status contract.
#[derive(Serialize)]
struct QuoteStatusResponse {
	id: QuoteRequestId,
	status: QuoteRequestStatus,
	percentage: u8,
	step_tag: String,
	detail: String,
	error_message: Option<String>,
	aggregate: Option<quote_types::AggregateResult>,
	original_quote_id: Option<QuoteRequestId>,
	attempt_number: u32,
}

impl From<QuoteRequest> for QuoteStatusResponse {
	fn from(request: QuoteRequest) -> Self {
		Self {
			id: request.id,
			status: request.status,
			percentage: request.progress.percentage,
			step_tag: request.progress.step_tag,
			detail: request.progress.detail,
			error_message: request.error_message,
			aggregate: request.aggregate,
			original_quote_id: request.original_quote_id,
			attempt_number: request.attempt_number,
		}
	}
}

/// Starts the HTTP status API.
pub async fn start_server(api_config: ApiConfig, storage: Arc<StorageService>) -> Result<(), Box<dyn std::error::Error>> {
	let app_state = AppState { storage };

	let app = Router::new()
		.nest(
			"/api",
			Router::new()
				.route("/quotes/{id}", get(handle_get_status))
				.route("/quotes/{id}/cancel", post(handle_cancel))
				.route("/quotes/{id}/requote", post(handle_requote)),
		)
		.layer(ServiceBuilder::new().layer(CorsLayer::permissive()))
		.with_state(app_state);

	let bind_address = format!("{}:{}", api_config.host, api_config.port);
	let listener = TcpListener::bind(&bind_address).await?;

	tracing::info!("quote status API listening on {}", bind_address);

	axum::serve(listener, app).await?;

	Ok(())
}

async fn load(storage: &StorageService, id: QuoteRequestId) -> Result<QuoteRequest, ApiError> {
	Ok(storage.retrieve(StorageKey::QuoteRequests.as_str(), &id.to_string()).await?)
}

fn parse_id(raw: &str) -> Result<QuoteRequestId, ApiError> {
	raw.parse().map_err(|_| ApiError::NotFound)
}

/// Handles GET /api/quotes/{id}.
async fn handle_get_status(Path(id): Path<String>, State(state): State<AppState>) -> Result<Json<QuoteStatusResponse>, ApiError> {
	let id = parse_id(&id)?;
	let request = load(&state.storage, id).await?;
	Ok(Json(request.into()))
}

/// Handles POST /api/quotes/{id}/cancel.
///
/// Cancellation is sticky: a request already in a terminal status is left
/// untouched, matching the coordinator's own terminal-status rule.
async fn handle_cancel(Path(id): Path<String>, State(state): State<AppState>) -> Result<Json<QuoteStatusResponse>, ApiError> {
	let id = parse_id(&id)?;
	let mut request = load(&state.storage, id).await?;

	if request.is_terminal() {
		return Err(ApiError::Conflict(format!("quote request {id} is already terminal")));
	}

	request.status = QuoteRequestStatus::Cancelled;
	request.updated_at = chrono::Utc::now();
	state.storage.update(StorageKey::QuoteRequests.as_str(), &id.to_string(), &request, None).await?;

	Ok(Json(request.into()))
}

/// Handles POST /api/quotes/{id}/requote.
///
/// Only terminal requests can be re-quoted; the new request starts fresh
/// and unclaimed, linked back to the re-quote chain's root.
async fn handle_requote(Path(id): Path<String>, State(state): State<AppState>) -> Result<Json<QuoteStatusResponse>, ApiError> {
	let id = parse_id(&id)?;
	let original = load(&state.storage, id).await?;

	if !original.is_terminal() {
		return Err(ApiError::Conflict(format!("quote request {id} is still processing")));
	}

	let next = original.requote(ConfigVersionId::new());
	state
		.storage
		.store(StorageKey::QuoteRequests.as_str(), &next.id.to_string(), &next, None)
		.await
		.map_err(ApiError::from)?;

	Ok(Json(next.into()))
}

//! Main entry point for the quote processing service.
//!
//! This binary loads one worker process's configuration, wires every
//! pluggable collaborator (storage, LLM, shopping aggregator, extractor,
//! FIPE vehicle lookup, cost ledger) behind the coordinator, then either
//! runs the claim-scan worker pool, submits a one-off request or batch, or
//! starts the optional status API, depending on the subcommand.

use clap::{Parser, Subcommand};
use quote_core::batch::BatchCoordinator;
use quote_core::coordinator::Coordinator;
use quote_core::recovery::RecoveryService;
use quote_core::sinks::NullPdfSink;
use quote_ledger::LedgerService;
use quote_llm::AnalysisService;
use quote_shopping::ShoppingService;
use quote_storage::StorageService;
use quote_types::{Batch, BatchId, InputType, QuoteRequest, QuoteRequestId, StorageKey};
use quote_vehicle::{VehicleKind, VehicleService, WebDriverFipeCapture};
use std::path::PathBuf;
use std::sync::Arc;

mod factory_registry;
mod server;
mod worker;

/// Command-line arguments for the quote processing service.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
	/// Path to configuration file
	#[arg(short, long, default_value = "config.toml")]
	config: PathBuf,

	/// Log level (trace, debug, info, warn, error)
	#[arg(short, long, default_value = "info")]
	log_level: String,

	#[command(subcommand)]
	command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Runs the worker pool (and status API, if configured) until interrupted.
	/// The default if no subcommand is given.
	Run,
	/// Submits a single text-input quote request and prints its id.
	Submit {
		/// Free-text description of the item to be quoted.
		#[arg(long)]
		text: String,
		/// Optional project identifier to attribute the request to.
		#[arg(long)]
		project_id: Option<String>,
	},
	/// Submits a batch of text-input quote requests and prints the batch id.
	SubmitBatch {
		/// One free-text description per line.
		#[arg(long)]
		file: PathBuf,
		#[arg(long)]
		project_id: Option<String>,
	},
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	use tracing_subscriber::{fmt, EnvFilter};
	let default_directive = args.log_level.to_string();
	let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
	fmt().with_env_filter(env_filter).with_thread_ids(true).with_target(true).init();

	tracing::info!("started quote processing service");

	let config = quote_config::Config::from_file(args.config.to_str().ok_or("config path is not valid UTF-8")?)?;
	tracing::info!(worker_id = %config.service.id, "loaded configuration");

	let storage = Arc::new(build_storage(&config)?);
	let coordinator = Arc::new(build_coordinator(&config, Arc::clone(&storage))?);
	let liveness = quote_core::claim::liveness_window(quote_core::claim::DEFAULT_LIVENESS_SECONDS);
	let recovery = Arc::new(RecoveryService::new(Arc::clone(&storage), liveness));
	let batch_coordinator = Arc::new(BatchCoordinator::new(Arc::clone(&storage), Arc::clone(&coordinator)));

	match args.command.unwrap_or(Command::Run) {
		Command::Run => run(config, coordinator, recovery, storage).await?,
		Command::Submit { text, project_id } => submit_one(&storage, text, project_id).await?,
		Command::SubmitBatch { file, project_id } => submit_batch(&storage, &batch_coordinator, file, project_id).await?,
	}

	tracing::info!("stopped quote processing service");
	Ok(())
}

/// Runs the worker pool, and the status API alongside it if configured,
/// concurrently via `tokio::select!`.
async fn run(config: quote_config::Config, coordinator: Arc<Coordinator>, recovery: Arc<RecoveryService>, storage: Arc<StorageService>) -> Result<(), Box<dyn std::error::Error>> {
	let pool = Arc::new(worker::WorkerPool::new(
		Arc::clone(&coordinator),
		Arc::clone(&recovery),
		Arc::clone(&storage),
		config.service.worker_pool_size,
		std::time::Duration::from_secs(5),
		std::time::Duration::from_secs(config.storage.cleanup_interval_seconds),
	));

	let api_enabled = config.api.as_ref().is_some_and(|api| api.enabled);

	if api_enabled {
		let api_config = config.api.as_ref().unwrap().clone();
		let worker_task = Arc::clone(&pool).run();
		let api_task = server::start_server(api_config, Arc::clone(&storage));

		tracing::info!("starting worker pool and status API");
		tokio::select! {
			result = worker_task => {
				tracing::info!("worker pool finished");
				result?;
			}
			result = api_task => {
				tracing::info!("status API finished");
				result?;
			}
		}
	} else {
		tracing::info!("starting worker pool only");
		pool.run().await?;
	}

	Ok(())
}

/// Builds the `StorageService` from the configured primary backend.
fn build_storage(config: &quote_config::Config) -> Result<StorageService, Box<dyn std::error::Error>> {
	let backend_config = config
		.storage
		.implementations
		.get(&config.storage.primary)
		.ok_or_else(|| format!("no configuration found for primary storage implementation '{}'", config.storage.primary))?;
	let factory = factory_registry::resolve_storage_factory(&config.storage.primary)?;
	Ok(StorageService::new(factory(backend_config)?))
}

/// A bare `toml::Value` table with a single string key, used to hand a
/// struct field down through a factory function that expects a full
/// `&toml::Value` configuration blob.
fn single_key_table(key: &str, value: String) -> toml::Value {
	let mut table = toml::map::Map::new();
	table.insert(key.to_string(), toml::Value::String(value));
	toml::Value::Table(table)
}

/// Wires every collaborator crate behind one `Coordinator`, sharing the
/// single `storage` instance across the coordinator and the ledger.
fn build_coordinator(config: &quote_config::Config, storage: Arc<StorageService>) -> Result<Coordinator, Box<dyn std::error::Error>> {
	let shopping = {
		let backend_config = config
			.shopping
			.implementations
			.get(&config.shopping.primary)
			.ok_or_else(|| format!("no configuration found for primary shopping implementation '{}'", config.shopping.primary))?;
		let factory = factory_registry::resolve_shopping_factory(&config.shopping.primary)?;
		ShoppingService::new(factory(backend_config)?, config.shopping.retry.clone())
	};

	let analysis = {
		let backend_config = config
			.llm
			.implementations
			.get(&config.llm.primary)
			.ok_or_else(|| format!("no configuration found for primary llm implementation '{}'", config.llm.primary))?;
		let factory = factory_registry::resolve_llm_factory(&config.llm.primary)?;
		AnalysisService::new(factory(backend_config)?, config.llm.rate_limit_retry.clone(), config.llm.overload_retry.clone())
	};

	let extractor_config = single_key_table("webdriver_url", config.extractor.webdriver_url.clone());
	let extractor_provider = quote_extractor::implementations::webdriver::create_provider(&extractor_config)?;
	let extractor = quote_extractor::ExtractorService::new(extractor_provider, config.extractor.pool_size, config.extractor.page_load_timeout_seconds);

	let vehicle_kind = match config.vehicle.vehicle_kind.as_str() {
		"motorcycles" => VehicleKind::Motorcycles,
		"trucks" => VehicleKind::Trucks,
		_ => VehicleKind::Cars,
	};
	let fipe_provider = quote_vehicle::implementations::fipe_api::create_provider(&toml::Value::Table(toml::map::Map::new()))?;
	let fipe_capture = Box::new(WebDriverFipeCapture::new(config.extractor.webdriver_url.clone()));
	let vehicle = VehicleService::new(fipe_provider, fipe_capture, vehicle_kind, config.vehicle.fipe_vigency_months);

	let cost_rates_toml = {
		let mut rates = toml::map::Map::new();
		for (kind, rate) in &config.ledger.cost_rates {
			rates.insert(kind.clone(), toml::Value::String(rate.to_string()));
		}
		let mut table = toml::map::Map::new();
		table.insert("cost_rates".to_string(), toml::Value::Table(rates));
		toml::Value::Table(table)
	};
	let ledger_provider = quote_ledger::implementations::static_table::create_provider(&cost_rates_toml)?;
	let ledger = LedgerService::new(ledger_provider, Arc::clone(&storage));

	Ok(Coordinator {
		storage,
		shopping: Arc::new(shopping),
		extractor: Arc::new(extractor),
		analysis: Arc::new(analysis),
		vehicle: Arc::new(vehicle),
		ledger: Arc::new(ledger),
		pdf_sink: Arc::new(NullPdfSink),
		worker_id: config.service.id.clone(),
		storage_dir: PathBuf::from("storage_data"),
		liveness: quote_core::claim::liveness_window(quote_core::claim::DEFAULT_LIVENESS_SECONDS),
	})
}

/// Builds and persists a fresh `QuoteRequest`, immediately eligible for the
/// worker pool's next claim scan; raw intake concerns (auth, multipart
/// parsing, rate limiting) are explicitly out of scope here.
async fn submit_one(storage: &StorageService, text: String, project_id: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
	let request = QuoteRequest::new(Some(text), Vec::new(), InputType::Text, project_id, quote_types::ConfigVersionId::new(), None);
	let id: QuoteRequestId = request.id;
	storage.store(StorageKey::QuoteRequests.as_str(), &id.to_string(), &request, None).await?;
	println!("{}", id);
	Ok(())
}

/// Builds a `Batch` of text-input requests, persists all of them, then
/// dispatches the batch through `BatchCoordinator::run` so its counters are
/// recomputed once every child finishes (spec.md §4.6).
async fn submit_batch(storage: &Arc<StorageService>, batch_coordinator: &Arc<BatchCoordinator>, file: PathBuf, project_id: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
	let contents = std::fs::read_to_string(file)?;
	let mut children = Vec::new();
	for line in contents.lines().filter(|l| !l.trim().is_empty()) {
		let request = QuoteRequest::new(Some(line.trim().to_string()), Vec::new(), InputType::TextBatch, project_id.clone(), quote_types::ConfigVersionId::new(), None);
		children.push(request.id);
		storage.store(StorageKey::QuoteRequests.as_str(), &request.id.to_string(), &request, None).await?;
	}

	let batch = Batch::new(children);
	let batch_id: BatchId = batch.id;
	storage.store(StorageKey::Batches.as_str(), &batch_id.to_string(), &batch, None).await?;
	println!("{}", batch_id);

	let batch_coordinator = Arc::clone(batch_coordinator);
	tokio::spawn(async move {
		if let Err(e) = batch_coordinator.run(batch_id).await {
			tracing::warn!(%batch_id, error = %e, "batch dispatch failed");
		}
	});
	Ok(())
}

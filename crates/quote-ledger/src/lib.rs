//! Cost-accounting module for the quotation processing pipeline.
//!
//! This module provides abstractions for looking up per-provider BRL cost
//! rates and persisting the financial ledger that results from external
//! calls made on behalf of a quote request. Pluggable per-provider rates
//! follow the same trait/registry/factory shape used by every other
//! collaborator in this workspace.

use async_trait::async_trait;
use quote_storage::{StorageError, StorageService};
use quote_types::{CallKind, ConfigSchema, CostRate, FinancialTransaction, ImplementationRegistry, IntegrationLog, StorageKey};
use std::sync::Arc;
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod static_table;
}

/// Errors that can occur during ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
	/// No cost rate configured for the requested call kind.
	#[error("no cost rate configured for {0:?}")]
	RateNotFound(CallKind),
	/// Error that occurs in the cost-rate provider implementation.
	#[error("implementation error: {0}")]
	Implementation(String),
	/// Error persisting a ledger row.
	#[error("storage error: {0}")]
	Storage(#[from] StorageError),
}

/// Trait defining the interface for cost-rate providers.
///
/// Implementations resolve the BRL rate charged per unit (tokens, API
/// calls) for a given external collaborator.
#[async_trait]
pub trait CostRateProvider: Send + Sync {
	/// Returns the configuration schema for this provider.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Resolves the current cost rate for the given call kind.
	async fn rate(&self, kind: CallKind) -> Result<CostRate, LedgerError>;
}

/// Type alias for cost-rate provider factory functions.
pub type CostRateFactory = fn(&toml::Value) -> Result<Box<dyn CostRateProvider>, LedgerError>;

/// Registry trait for cost-rate provider implementations.
pub trait CostRateRegistry: ImplementationRegistry<Factory = CostRateFactory> {}

/// Get all registered cost-rate provider implementations.
pub fn get_all_implementations() -> Vec<(&'static str, CostRateFactory)> {
	use implementations::static_table;

	vec![(static_table::Registry::NAME, static_table::Registry::factory())]
}

/// Service that manages cost-rate lookups and ledger persistence.
///
/// Wraps a `CostRateProvider` and a `quote-storage` backend to provide the
/// two operations the coordinator needs: logging every external call
/// (`record_call`), and, for calls that are costed, writing the resulting
/// `FinancialTransaction` (`record_cost`).
pub struct LedgerService {
	provider: Box<dyn CostRateProvider>,
	storage: Arc<StorageService>,
}

impl LedgerService {
	/// Creates a new LedgerService with the specified provider and storage.
	///
	/// `storage` is the same backend the coordinator uses for every other
	/// namespace, shared via `Arc` rather than a dedicated instance.
	pub fn new(provider: Box<dyn CostRateProvider>, storage: Arc<StorageService>) -> Self {
		Self { provider, storage }
	}

	/// Records one `IntegrationLog` row for an external call, regardless of
	/// whether the call is ultimately costed (spec.md §4.2: "Every HTTP call
	/// is registered on an internal 'API calls' list").
	pub async fn record_call(&self, log: IntegrationLog) -> Result<(), LedgerError> {
		self.storage
			.store(StorageKey::IntegrationLogs.as_str(), &log.id, &log, None)
			.await?;
		Ok(())
	}

	/// Resolves the cost rate for `kind`, builds the resulting
	/// `FinancialTransaction`, and persists it. Financial transactions are
	/// immutable once written (spec.md §3) — this never updates an existing
	/// row.
	pub async fn record_cost(
		&self,
		quote_request_id: quote_types::QuoteRequestId,
		client_id: Option<String>,
		project_id: Option<String>,
		kind: CallKind,
		units: u64,
	) -> Result<FinancialTransaction, LedgerError> {
		let rate = self.provider.rate(kind).await?;
		let tx = FinancialTransaction::new(quote_request_id, client_id, project_id, kind, units, rate);
		self.storage
			.store(StorageKey::FinancialTransactions.as_str(), &tx.id, &tx, None)
			.await?;
		Ok(tx)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use implementations::static_table;
	use quote_storage::implementations::memory::MemoryStorage;

	fn service_with_rates(rates_toml: &str) -> LedgerService {
		let config: toml::Value = rates_toml.parse().unwrap();
		let provider = static_table::create_provider(&config).unwrap();
		let storage = Arc::new(StorageService::new(Box::new(MemoryStorage::new())));
		LedgerService::new(provider, storage)
	}

	#[tokio::test]
	async fn record_cost_multiplies_units_by_configured_rate() {
		let service = service_with_rates(
			r#"
[cost_rates]
llm = "0.00005"
"#,
		);

		let tx = service
			.record_cost(quote_types::QuoteRequestId::new(), None, None, CallKind::Llm, 1000)
			.await
			.unwrap();

		assert_eq!(tx.units, 1000);
		assert_eq!(tx.total_cost_brl.to_string(), "0.05000");
	}

	#[tokio::test]
	async fn record_cost_fails_for_unconfigured_kind() {
		let service = service_with_rates(
			r#"
[cost_rates]
llm = "0.00005"
"#,
		);

		let result = service
			.record_cost(
				quote_types::QuoteRequestId::new(),
				None,
				None,
				CallKind::Aggregator,
				1,
			)
			.await;

		assert!(matches!(result, Err(LedgerError::RateNotFound(CallKind::Aggregator))));
	}
}

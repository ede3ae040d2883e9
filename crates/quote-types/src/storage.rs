//! Storage namespace types for the quotation pipeline.

/// Storage keys for different data collections.
///
/// This enum provides type safety for storage operations by replacing
/// string literals with strongly typed variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKey {
	/// Quote requests, keyed by `QuoteRequestId`.
	QuoteRequests,
	/// Candidate/validated quote sources, keyed by `QuoteSourceId`.
	QuoteSources,
	/// Discarded probe candidates, keyed by `QuoteSourceId`.
	QuoteSourceFailures,
	/// Captured evidence files (screenshots, OCR crops), keyed by `FileId`.
	Files,
	/// Project configuration versions, keyed by `ConfigVersionId`.
	ProjectConfigVersions,
	/// Cached FIPE vehicle price lookups, keyed by a normalized vehicle key.
	VehiclePriceBank,
	/// Immutable financial ledger rows, keyed by a synthetic transaction id.
	FinancialTransactions,
	/// Integration call log entries, keyed by a synthetic log id.
	IntegrationLogs,
	/// Domains excluded from shopping search candidates.
	BlockedDomains,
	/// Manufacturer alias table used by the vehicle sub-pipeline.
	ManufacturerWhitelist,
	/// Batch orchestration records, keyed by `BatchId`.
	Batches,
}

impl StorageKey {
	/// Returns the string representation of the storage key.
	pub fn as_str(&self) -> &'static str {
		match self {
			StorageKey::QuoteRequests => "quote_requests",
			StorageKey::QuoteSources => "quote_sources",
			StorageKey::QuoteSourceFailures => "quote_source_failures",
			StorageKey::Files => "files",
			StorageKey::ProjectConfigVersions => "project_config_versions",
			StorageKey::VehiclePriceBank => "vehicle_price_bank",
			StorageKey::FinancialTransactions => "financial_transactions",
			StorageKey::IntegrationLogs => "integration_logs",
			StorageKey::BlockedDomains => "blocked_domains",
			StorageKey::ManufacturerWhitelist => "manufacturer_whitelist",
			StorageKey::Batches => "batches",
		}
	}

	/// All variants, used to enumerate per-namespace TTL configuration keys.
	pub fn all() -> &'static [StorageKey] {
		&[
			StorageKey::QuoteRequests,
			StorageKey::QuoteSources,
			StorageKey::QuoteSourceFailures,
			StorageKey::Files,
			StorageKey::ProjectConfigVersions,
			StorageKey::VehiclePriceBank,
			StorageKey::FinancialTransactions,
			StorageKey::IntegrationLogs,
			StorageKey::BlockedDomains,
			StorageKey::ManufacturerWhitelist,
			StorageKey::Batches,
		]
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseStorageKeyError;

impl std::fmt::Display for ParseStorageKeyError {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "unrecognized storage key")
	}
}

impl std::error::Error for ParseStorageKeyError {}

impl std::str::FromStr for StorageKey {
	type Err = ParseStorageKeyError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		StorageKey::all()
			.iter()
			.copied()
			.find(|k| k.as_str() == s)
			.ok_or(ParseStorageKeyError)
	}
}

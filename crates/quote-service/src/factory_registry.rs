//! Dynamic factory registry for quote pipeline implementations.
//!
//! This module provides a centralized registry for all factory functions,
//! allowing dynamic instantiation of implementations based on configuration.
//! `quote-extractor`, `quote-vehicle`, and `quote-ledger` each expose a
//! single backend and are wired directly in `main.rs` without going through
//! this registry.

use quote_llm::AnalysisFactory;
use quote_shopping::ShoppingFactory;
use quote_storage::StorageFactory;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Global registry for all implementation factories
pub struct FactoryRegistry {
	pub storage: HashMap<String, StorageFactory>,
	pub llm: HashMap<String, AnalysisFactory>,
	pub shopping: HashMap<String, ShoppingFactory>,
}

impl FactoryRegistry {
	/// Create a new empty registry
	pub fn new() -> Self {
		Self {
			storage: HashMap::new(),
			llm: HashMap::new(),
			shopping: HashMap::new(),
		}
	}

	/// Register a storage implementation
	pub fn register_storage(&mut self, name: impl Into<String>, factory: StorageFactory) {
		self.storage.insert(name.into(), factory);
	}

	/// Register an LLM implementation
	pub fn register_llm(&mut self, name: impl Into<String>, factory: AnalysisFactory) {
		self.llm.insert(name.into(), factory);
	}

	/// Register a shopping-aggregator implementation
	pub fn register_shopping(&mut self, name: impl Into<String>, factory: ShoppingFactory) {
		self.shopping.insert(name.into(), factory);
	}
}

impl Default for FactoryRegistry {
	fn default() -> Self {
		Self::new()
	}
}

// Global registry instance
static REGISTRY: OnceLock<FactoryRegistry> = OnceLock::new();

/// Initialize the global registry with all available implementations
pub fn initialize_registry() -> &'static FactoryRegistry {
	REGISTRY.get_or_init(|| {
		let mut registry = FactoryRegistry::new();

		// Auto-register all storage implementations
		for (name, factory) in quote_storage::get_all_implementations() {
			tracing::debug!("Registering storage implementation: {}", name);
			registry.register_storage(name, factory);
		}

		// Auto-register all llm implementations
		for (name, factory) in quote_llm::get_all_implementations() {
			tracing::debug!("Registering llm implementation: {}", name);
			registry.register_llm(name, factory);
		}

		// Auto-register all shopping implementations
		for (name, factory) in quote_shopping::get_all_implementations() {
			tracing::debug!("Registering shopping implementation: {}", name);
			registry.register_shopping(name, factory);
		}

		registry
	})
}

/// Get the global factory registry
pub fn get_registry() -> &'static FactoryRegistry {
	initialize_registry()
}

/// Resolves `name` against one of `FactoryRegistry`'s maps, producing the
/// same "unknown implementation" diagnostic regardless of which
/// collaborator is being resolved.
macro_rules! resolve_factory {
	($registry:expr, $registry_field:ident, $name:expr, $type_name:literal) => {{
		match $registry.$registry_field.get($name) {
			Some(factory) => Ok(*factory),
			None => {
				let available: Vec<_> = $registry.$registry_field.keys().cloned().collect();
				Err(format!(
					"Unknown {} implementation '{}'. Available: [{}]",
					$type_name,
					$name,
					available.join(", ")
				))
			}
		}
	}};
}

/// Resolves the configured primary storage implementation by name.
pub fn resolve_storage_factory(name: &str) -> Result<StorageFactory, String> {
	resolve_factory!(get_registry(), storage, name, "storage")
}

/// Resolves the configured primary LLM implementation by name.
pub fn resolve_llm_factory(name: &str) -> Result<AnalysisFactory, String> {
	resolve_factory!(get_registry(), llm, name, "llm")
}

/// Resolves the configured primary shopping-aggregator implementation by name.
pub fn resolve_shopping_factory(name: &str) -> Result<ShoppingFactory, String> {
	resolve_factory!(get_registry(), shopping, name, "shopping")
}

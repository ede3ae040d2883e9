//! Domain-admission tables, loaded from storage at request start rather than
//! compiled into constants (spec.md §9 "Blocked-sources string matching").

use serde::{Deserialize, Serialize};

/// One excluded domain, plus the free-text aggregator `source` strings it is
/// known to be reachable from (spec.md §9: store-name matching is the
/// *primary* configuration, the domain list *secondary*).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockedDomain {
	pub etld_plus_one: String,
	pub known_source_names: Vec<String>,
}

/// A non-`.com.br`/`.br` domain that is nonetheless allowed because it
/// belongs to an equipment manufacturer (spec.md §4.1.2 step 2: "or be on
/// the manufacturer whitelist").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManufacturerWhitelist {
	pub domain: String,
	pub manufacturer_name: String,
}

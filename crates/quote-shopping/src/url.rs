//! URL classification and cleanup shared by the aggregator client and the
//! coordinator's per-candidate probe (spec.md §4.1.2, §4.2).
//!
//! SPEC_FULL.md §10: the tracking-parameter list and listing-URL patterns are
//! carried over verbatim from `search_provider.py`'s `_clean_tracking_params`
//! and `_is_listing_url`.

use quote_types::{BlockedDomain, ManufacturerWhitelist};

/// Query parameters that identify click-tracking redirects rather than the
/// product itself; stripping them avoids storing URLs that later 404 once
/// the tracking token expires.
const TRACKING_PARAMS: &[&str] = &[
	"srsltid",
	"utm_source",
	"utm_medium",
	"utm_campaign",
	"utm_term",
	"utm_content",
	"gclid",
	"fbclid",
	"msclkid",
];

/// Substrings that mark a URL as a search/category/listing page rather than
/// a single product page.
const LISTING_PATTERNS: &[&str] = &["/busca/", "?q=", "/category/", "/categoria/", "/search", "/s?", "/c/"];

/// Foreign top-level domains rejected unless the domain is on the
/// manufacturer whitelist or ends in `.com.br`/`.br` (original_source
/// `FOREIGN_DOMAIN_PATTERNS`).
const FOREIGN_TLD_SUFFIXES: &[&str] = &[
	".com", ".net", ".org", ".us", ".uk", ".de", ".fr", ".es", ".it", ".cn", ".jp", ".co.uk", ".eu",
];

/// Removes tracking query parameters from a URL, preserving the rest of the
/// query string and the overall structure. Returns the URL unchanged if it
/// fails to parse.
pub fn strip_tracking_params(url: &str) -> String {
	let Ok(mut parsed) = reqwest::Url::parse(url) else {
		return url.to_string();
	};
	let kept: Vec<(String, String)> = parsed
		.query_pairs()
		.filter(|(k, _)| !TRACKING_PARAMS.iter().any(|t| t.eq_ignore_ascii_case(k)))
		.map(|(k, v)| (k.into_owned(), v.into_owned()))
		.collect();

	if kept.is_empty() {
		parsed.set_query(None);
	} else {
		let mut serializer = parsed.query_pairs_mut();
		serializer.clear();
		for (k, v) in &kept {
			serializer.append_pair(k, v);
		}
		drop(serializer);
	}
	parsed.to_string()
}

/// Whether a URL looks like a search/category/listing page rather than a
/// single product page.
pub fn is_listing_url(url: &str) -> bool {
	if url.is_empty() {
		return true;
	}
	let lower = url.to_lowercase();
	LISTING_PATTERNS.iter().any(|p| lower.contains(p))
}

/// Extracts the host (registrable domain, including subdomain) from a URL.
/// Returns an empty string if the URL cannot be parsed or has no host.
pub fn extract_domain(url: &str) -> String {
	reqwest::Url::parse(url)
		.ok()
		.and_then(|u| u.host_str().map(|h| h.to_string()))
		.unwrap_or_default()
}

/// Whether `domain` (or a subdomain of it) matches an eTLD+1 on the blocked
/// list.
pub fn is_blocked_domain(domain: &str, blocked: &[BlockedDomain]) -> bool {
	if domain.is_empty() {
		return false;
	}
	let domain = domain.to_lowercase();
	blocked
		.iter()
		.any(|b| domain == b.etld_plus_one || domain.ends_with(&format!(".{}", b.etld_plus_one)))
}

/// Whether the aggregator's free-text `source` field (e.g. "Mercado Livre")
/// names a store known to map to a blocked domain. This is the *primary*
/// filter (spec.md §9); the domain list is secondary and used once a
/// concrete URL is known.
pub fn is_blocked_source(source: &str, blocked: &[BlockedDomain]) -> bool {
	if source.is_empty() {
		return false;
	}
	let source = source.to_lowercase();
	blocked
		.iter()
		.any(|b| b.known_source_names.iter().any(|name| source.contains(&name.to_lowercase())))
}

/// Whether `domain` is outside Brazil and not covered by the manufacturer
/// whitelist.
pub fn is_foreign_domain(domain: &str, whitelist: &[ManufacturerWhitelist]) -> bool {
	if domain.is_empty() {
		return false;
	}
	let domain = domain.to_lowercase();
	if domain.ends_with(".com.br") || domain.ends_with(".br") {
		return false;
	}
	if whitelist.iter().any(|w| w.domain.eq_ignore_ascii_case(&domain)) {
		return false;
	}
	FOREIGN_TLD_SUFFIXES.iter().any(|suffix| domain.ends_with(suffix) && !domain.ends_with(".com.br"))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn strips_known_tracking_params_but_keeps_others() {
		let url = "https://loja.com.br/produto?id=42&utm_source=google&srsltid=abc";
		let cleaned = strip_tracking_params(url);
		assert!(cleaned.contains("id=42"));
		assert!(!cleaned.contains("utm_source"));
		assert!(!cleaned.contains("srsltid"));
	}

	#[test]
	fn detects_listing_urls() {
		assert!(is_listing_url("https://loja.com.br/busca/notebook"));
		assert!(is_listing_url("https://loja.com.br/produtos?q=notebook"));
		assert!(!is_listing_url("https://loja.com.br/produto/notebook-dell-xyz"));
	}

	#[test]
	fn blocked_source_matches_known_store_names() {
		let blocked = vec![BlockedDomain {
			etld_plus_one: "mercadolivre.com.br".into(),
			known_source_names: vec!["mercado livre".into(), "mercadolivre".into()],
		}];
		assert!(is_blocked_source("Mercado Livre", &blocked));
		assert!(!is_blocked_source("Loja do João", &blocked));
	}

	#[test]
	fn foreign_domain_allows_br_and_whitelist() {
		let whitelist = vec![ManufacturerWhitelist {
			domain: "www.dell.com".into(),
			manufacturer_name: "Dell".into(),
		}];
		assert!(!is_foreign_domain("loja.com.br", &whitelist));
		assert!(!is_foreign_domain("www.dell.com", &whitelist));
		assert!(is_foreign_domain("store.example.com", &whitelist));
	}
}

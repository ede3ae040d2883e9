//! Per-candidate probe: the five-step pipeline that turns one shopping
//! candidate into either an accepted `QuoteSource` or a logged rejection
//! (spec.md §4.1.2). Domain validation reuses `quote_shopping::url` directly
//! rather than re-implementing it.

use quote_extractor::{ExtractionMode, ExtractorError, ExtractorService};
use quote_shopping::{url as urlutil, ShoppingService};
use quote_types::{BlockedDomain, ExtractionMethod, FailureReason, ManufacturerWhitelist, Money, QuoteRequestId, QuoteSource, QuoteSourceFailure, QuoteSourceId, ShoppingCandidate};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashSet;

/// Seller-level and page-level price mismatch tolerance (spec.md §4.1.2 step
/// 4, "≤5% mismatch rule").
const PRICE_MISMATCH_TOLERANCE: Decimal = dec!(0.05);

pub struct ProbeDeps<'a> {
	pub shopping: &'a ShoppingService,
	pub extractor: &'a ExtractorService,
	pub blocked_domains: &'a [BlockedDomain],
	pub whitelist: &'a [ManufacturerWhitelist],
	pub enable_price_mismatch: bool,
}

/// Sets that must be shared across every probe in one request so duplicate
/// URLs within the same block are caught (spec.md §4.1.2 step 3).
pub struct ProbeSets<'a> {
	pub urls_seen: &'a mut HashSet<String>,
}

pub enum ProbeOutcome {
	Accepted { source: QuoteSource, screenshot_png: Vec<u8> },
	Rejected(QuoteSourceFailure),
}

fn reject(quote_request_id: QuoteRequestId, candidate: &ShoppingCandidate, url: Option<String>, domain: Option<String>, reason: FailureReason, message: impl Into<String>) -> ProbeOutcome {
	ProbeOutcome::Rejected(QuoteSourceFailure {
		id: QuoteSourceId::new(),
		quote_request_id,
		url,
		domain,
		product_title: candidate.title.clone(),
		aggregator_price: candidate.extracted_price.and_then(|p| Money::new(p).ok()),
		reason,
		message: message.into(),
		recorded_at: chrono::Utc::now(),
	})
}

/// Runs the five-step probe for one candidate. Never returns an `Err`: every
/// failure mode is a `Rejected` outcome, matching spec.md §7's rule that
/// per-candidate failures are strictly local and never fail the request.
pub async fn probe(deps: &ProbeDeps<'_>, quote_request_id: QuoteRequestId, candidate: &ShoppingCandidate, sets: &mut ProbeSets<'_>) -> ProbeOutcome {
	// Step 1: resolve a concrete store URL.
	let resolution = match deps.shopping.resolve_store_link(candidate).await {
		Ok(r) => r,
		Err(e) => return reject(quote_request_id, candidate, None, None, FailureReason::NoStoreLink, e.to_string()),
	};
	let Some(store) = resolution.resolution else {
		return reject(quote_request_id, candidate, None, None, FailureReason::NoStoreLink, "aggregator returned no resolvable store link");
	};
	if store.url.is_empty() {
		return reject(quote_request_id, candidate, None, None, FailureReason::NoStoreLink, "resolved store URL is empty");
	}

	// Step 2: domain validation.
	if urlutil::is_blocked_domain(&store.domain, deps.blocked_domains) {
		return reject(quote_request_id, candidate, Some(store.url), Some(store.domain), FailureReason::BlockedDomain, "domain is on the blocked list");
	}
	if urlutil::is_foreign_domain(&store.domain, deps.whitelist) {
		return reject(quote_request_id, candidate, Some(store.url), Some(store.domain), FailureReason::ForeignDomain, "domain is not a Brazilian or whitelisted store");
	}
	if urlutil::is_listing_url(&store.url) {
		return reject(quote_request_id, candidate, Some(store.url), Some(store.domain), FailureReason::ListingUrl, "URL looks like a category/search listing page");
	}

	// Step 3: uniqueness within this request.
	if sets.urls_seen.contains(&store.url) {
		return reject(quote_request_id, candidate, Some(store.url), Some(store.domain), FailureReason::DuplicateUrl, "URL already accepted for this request");
	}

	// Step 4: extraction.
	let mode = if deps.enable_price_mismatch { ExtractionMode::Validated } else { ExtractionMode::GoogleOnly };
	let outcome = match deps.extractor.extract(&store.url, mode).await {
		Ok(o) => o,
		Err(e) => {
			let reason = match e {
				ExtractorError::InvalidPrice(_) | ExtractorError::NoPriceFound => FailureReason::InvalidPrice,
				ExtractorError::Screenshot(_) => FailureReason::ScreenshotError,
				ExtractorError::Navigation(_) | ExtractorError::Timeout | ExtractorError::InvalidConfig(_) => FailureReason::Other,
			};
			return reject(quote_request_id, candidate, Some(store.url), Some(store.domain), reason, e.to_string());
		}
	};

	let aggregator_price = store.extracted_price.or(candidate.extracted_price);

	// In GoogleOnly mode the extractor never reads the page's own price
	// (spec.md §4.1.2 step 4, "trust aggregator price"); in Validated mode
	// the cascade's own reading is authoritative, checked against the
	// aggregator price within a 5% tolerance.
	let (price, method) = if deps.enable_price_mismatch {
		let Some(price) = outcome.price else {
			return reject(quote_request_id, candidate, Some(store.url), Some(store.domain), FailureReason::InvalidPrice, "no price found on the store page");
		};
		let Some(method) = outcome.method else {
			return reject(quote_request_id, candidate, Some(store.url), Some(store.domain), FailureReason::InvalidPrice, "extractor reported a price with no method");
		};
		if let Some(agg) = aggregator_price {
			if agg > Decimal::ZERO {
				let diff = (price.amount() - agg).abs() / agg;
				if diff > PRICE_MISMATCH_TOLERANCE {
					return reject(
						quote_request_id,
						candidate,
						Some(store.url),
						Some(store.domain),
						FailureReason::PriceMismatch,
						format!("page price {price} differs from aggregator price by {diff:.2}, over the 5% tolerance"),
					);
				}
			}
		}
		(price, method)
	} else {
		let Some(agg) = aggregator_price else {
			return reject(quote_request_id, candidate, Some(store.url), Some(store.domain), FailureReason::InvalidPrice, "no aggregator price available to trust");
		};
		let Ok(price) = Money::new(agg) else {
			return reject(quote_request_id, candidate, Some(store.url), Some(store.domain), FailureReason::InvalidPrice, "aggregator price is non-positive");
		};
		(price, ExtractionMethod::GoogleShopping)
	};

	// Step 5: commit.
	sets.urls_seen.insert(store.url.clone());
	let source = QuoteSource {
		id: QuoteSourceId::new(),
		quote_request_id,
		final_url: outcome.final_url,
		domain: store.domain,
		page_title: outcome.page_title,
		price,
		extraction_method: method,
		screenshot_file_id: None,
		captured_at: chrono::Utc::now(),
		is_outlier: false,
		is_accepted: true,
		failure_reason: None,
	};

	ProbeOutcome::Accepted {
		source,
		screenshot_png: outcome.screenshot_png,
	}
}

/// The method a rejected/accepted source would have used purely from the
/// mode, for callers that need a best-guess label before extraction runs.
pub fn expected_method(enable_price_mismatch: bool) -> ExtractionMethod {
	if enable_price_mismatch {
		ExtractionMethod::Dom
	} else {
		ExtractionMethod::GoogleShopping
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn expected_method_reflects_mode() {
		assert_eq!(expected_method(false), ExtractionMethod::GoogleShopping);
		assert!(matches!(expected_method(true), ExtractionMethod::Dom));
	}
}

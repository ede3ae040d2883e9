//! Fuzzy brand/model/year matching for the FIPE "optimized flow" (spec.md
//! §4.5). Grounded on `fipe_client.py`'s `find_brand`, `_find_model_in_list`
//! and the year-selection logic in `search_vehicle_optimized` — ported from
//! `difflib.SequenceMatcher` ratios to `strsim::jaro_winkler`, which is the
//! closest equivalent in the ecosystem.

use crate::aliases::normalize_brand;
use crate::{FipeBrand, FipeModel, FipeYear};

const BRAND_SIMILARITY_THRESHOLD: f64 = 0.6;
const MODEL_SIMILARITY_THRESHOLD: f64 = 0.5;

/// Fuzzy-matches a brand name against the candidate list: direct substring
/// match wins immediately, otherwise falls back to the best similarity
/// score above the threshold (spec.md §4.5 step 1, "Similarity threshold
/// 0.6").
pub fn match_brand<'a>(brands: &'a [FipeBrand], term: &str, variations: &[String]) -> Option<&'a FipeBrand> {
	let search_terms: Vec<String> = std::iter::once(normalize_brand(term))
		.chain(variations.iter().map(|v| normalize_brand(v)))
		.collect();

	let mut best: Option<(&FipeBrand, f64)> = None;
	for brand in brands {
		let name_lower = brand.name.to_lowercase();
		for term in &search_terms {
			if term.is_empty() {
				continue;
			}
			if name_lower.contains(term.as_str()) || term.contains(name_lower.as_str()) {
				return Some(brand);
			}
			let score = strsim::jaro_winkler(term, &name_lower);
			if score > BRAND_SIMILARITY_THRESHOLD && best.map(|(_, s)| score > s).unwrap_or(true) {
				best = Some((brand, score));
			}
		}
	}
	best.map(|(brand, _)| brand)
}

/// Picks the year/fuel option whose visible label matches both the year
/// digits and the fuel text (spec.md §4.5 step 2: "never trust a
/// pre-computed fuel code... prefer the year string the API actually
/// returns"). Falls back to a year-digits-only match.
pub fn match_year<'a>(years: &'a [FipeYear], year_hint: &str, fuel_hint: Option<&str>) -> Option<&'a FipeYear> {
	let fuel_terms = fuel_search_terms(fuel_hint);

	if !fuel_terms.is_empty() {
		for year in years {
			let name_lower = year.name.to_lowercase();
			if !(year.code.contains(year_hint) || name_lower.contains(year_hint)) {
				continue;
			}
			if fuel_terms.iter().any(|term| name_lower.contains(term)) {
				return Some(year);
			}
		}
	}

	years.iter().find(|y| y.code.starts_with(year_hint) || y.name.contains(year_hint))
}

fn fuel_search_terms(fuel_hint: Option<&str>) -> Vec<&'static str> {
	let Some(fuel) = fuel_hint.map(|f| f.to_lowercase()) else {
		return Vec::new();
	};
	let table: &[(&str, &[&str])] = &[
		("flex", &["flex"]),
		("gasolina", &["gasolina"]),
		("diesel", &["diesel"]),
		("alcool", &["álcool", "alcool"]),
		("álcool", &["álcool", "alcool"]),
		("etanol", &["álcool", "alcool"]),
		("hibrido", &["híbrido", "hibrido"]),
		("híbrido", &["híbrido", "hibrido"]),
		("eletrico", &["elétrico", "eletrico"]),
		("elétrico", &["elétrico", "eletrico"]),
		("gnv", &["gnv", "gás"]),
	];
	table
		.iter()
		.find(|(key, _)| fuel.contains(key))
		.map(|(_, terms)| terms.to_vec())
		.unwrap_or_default()
}

/// Scores model candidates in priority order: exact keyword hit (all
/// present) wins immediately; otherwise the candidate with the highest
/// fraction of query words present wins, ties broken by string similarity;
/// with no word overlap at all, falls back to direct substring/similarity
/// match (spec.md §4.5 step 3).
pub fn match_model<'a>(
	models: &'a [FipeModel],
	term: &str,
	variations: &[String],
	keywords: &[String],
) -> Option<&'a FipeModel> {
	let search_terms: Vec<String> = std::iter::once(term.to_lowercase())
		.chain(variations.iter().map(|v| v.to_lowercase()))
		.collect();
	let term_lower = term.to_lowercase();
	let search_words: Vec<&str> = term_lower.split_whitespace().filter(|w| w.len() >= 2).collect();

	let mut best: Option<&FipeModel> = None;
	let mut best_word_count = 0usize;
	let mut best_score = 0.0f64;

	for model in models {
		let name_lower = model.name.to_lowercase();

		if !keywords.is_empty() && keywords.iter().all(|kw| name_lower.contains(&kw.to_lowercase())) {
			return Some(model);
		}

		let matching_words = search_words.iter().filter(|w| name_lower.contains(**w)).count();

		if matching_words > best_word_count {
			best_word_count = matching_words;
			best = Some(model);
			best_score = if search_words.is_empty() {
				0.0
			} else {
				matching_words as f64 / search_words.len() as f64
			};
		} else if matching_words == best_word_count && matching_words > 0 {
			for candidate_term in &search_terms {
				let score = strsim::jaro_winkler(candidate_term, &name_lower);
				if score > best_score {
					best_score = score;
					best = Some(model);
				}
			}
		} else if best_word_count == 0 {
			for candidate_term in &search_terms {
				if name_lower.contains(candidate_term.as_str()) || candidate_term.contains(name_lower.as_str()) {
					return Some(model);
				}
				let score = strsim::jaro_winkler(candidate_term, &name_lower);
				if score > best_score && score > MODEL_SIMILARITY_THRESHOLD {
					best_score = score;
					best = Some(model);
				}
			}
		}
	}

	best
}

#[cfg(test)]
mod tests {
	use super::*;

	fn brand(code: &str, name: &str) -> FipeBrand {
		FipeBrand { code: code.to_string(), name: name.to_string() }
	}
	fn model(code: &str, name: &str) -> FipeModel {
		FipeModel { code: code.to_string(), name: name.to_string() }
	}
	fn year(code: &str, name: &str) -> FipeYear {
		FipeYear { code: code.to_string(), name: name.to_string() }
	}

	#[test]
	fn match_brand_resolves_known_alias() {
		let brands = vec![brand("59", "VOLKSWAGEN"), brand("23", "FIAT")];
		let matched = match_brand(&brands, "vw", &[]).unwrap();
		assert_eq!(matched.code, "59");
	}

	#[test]
	fn match_brand_falls_back_to_similarity() {
		let brands = vec![brand("22", "Mercedes-Benz"), brand("23", "Fiat")];
		let matched = match_brand(&brands, "mercedez benz", &[]).unwrap();
		assert_eq!(matched.code, "22");
	}

	#[test]
	fn match_year_prefers_year_and_fuel_text() {
		let years = vec![year("2020-1", "2020 Gasolina"), year("2020-5", "2020 Flex")];
		let matched = match_year(&years, "2020", Some("Flex")).unwrap();
		assert_eq!(matched.code, "2020-5");
	}

	#[test]
	fn match_year_falls_back_to_year_digits_only() {
		let years = vec![year("2019-1", "2019 Gasolina"), year("2020-1", "2020 Gasolina")];
		let matched = match_year(&years, "2020", Some("Diesel")).unwrap();
		assert_eq!(matched.code, "2020-1");
	}

	#[test]
	fn match_model_keyword_hit_wins_immediately() {
		let models = vec![model("1", "Gol 1.0 Trend"), model("2", "Gol 1.6 GTI")];
		let matched = match_model(&models, "gol", &[], &["gti".to_string()]).unwrap();
		assert_eq!(matched.code, "2");
	}

	#[test]
	fn match_model_prefers_more_matching_words() {
		let models = vec![model("1", "Gol"), model("2", "Gol 1.0 Trend Flex")];
		let matched = match_model(&models, "gol 1.0 trend", &[], &[]).unwrap();
		assert_eq!(matched.code, "2");
	}
}

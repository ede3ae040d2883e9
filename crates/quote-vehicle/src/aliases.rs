//! Brand-alias normalization for FIPE lookups (spec.md §4.5 "Normalize
//! common aliases"). Grounded on `fipe_client.py`'s `_normalize_brand`.

const ALIASES: &[(&str, &str)] = &[
	("vw", "volkswagen"),
	("volks", "volkswagen"),
	("vdub", "volkswagen"),
	("gm", "chevrolet"),
	("chevy", "chevrolet"),
	("mb", "mercedes-benz"),
	("mercedes", "mercedes-benz"),
];

/// Maps a known alias to its canonical FIPE brand name. Unrecognized terms
/// pass through lower-cased unchanged so fuzzy matching still has something
/// to work with.
pub fn normalize_brand(raw: &str) -> String {
	let lower = raw.trim().to_lowercase();
	ALIASES
		.iter()
		.find(|(alias, _)| *alias == lower)
		.map(|(_, canonical)| canonical.to_string())
		.unwrap_or(lower)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn known_aliases_normalize() {
		assert_eq!(normalize_brand("VW"), "volkswagen");
		assert_eq!(normalize_brand("gm"), "chevrolet");
		assert_eq!(normalize_brand("MB"), "mercedes-benz");
		assert_eq!(normalize_brand("Chevy"), "chevrolet");
		assert_eq!(normalize_brand("vdub"), "volkswagen");
	}

	#[test]
	fn unknown_term_passes_through_lowercased() {
		assert_eq!(normalize_brand("Fiat"), "fiat");
	}
}

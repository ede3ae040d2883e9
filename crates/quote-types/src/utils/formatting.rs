//! String formatting utilities.

/// Truncates an identifier for display/log purposes.
///
/// Shows only the first 8 characters followed by ".." for longer strings.
pub fn truncate_id(id: &str) -> String {
	if id.len() <= 8 {
		id.to_string()
	} else {
		format!("{}..", &id[..8])
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_truncate_id() {
		assert_eq!(truncate_id("12345678"), "12345678");
		assert_eq!(truncate_id("123456789"), "12345678..");
	}
}

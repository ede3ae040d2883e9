//! Typed identifiers for the pipeline's core entities.
//!
//! Using newtypes instead of bare `Uuid`/`String` keeps a `QuoteSourceId`
//! from being passed where a `QuoteRequestId` is expected at a call site.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! typed_id {
	($name:ident) => {
		#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
		pub struct $name(pub Uuid);

		impl $name {
			/// Generates a new random identifier.
			pub fn new() -> Self {
				Self(Uuid::new_v4())
			}
		}

		impl Default for $name {
			fn default() -> Self {
				Self::new()
			}
		}

		impl fmt::Display for $name {
			fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
				fmt::Display::fmt(&self.0, f)
			}
		}

		impl From<Uuid> for $name {
			fn from(id: Uuid) -> Self {
				Self(id)
			}
		}

		impl std::str::FromStr for $name {
			type Err = uuid::Error;

			fn from_str(s: &str) -> Result<Self, Self::Err> {
				Ok(Self(Uuid::parse_str(s)?))
			}
		}
	};
}

typed_id!(QuoteRequestId);
typed_id!(QuoteSourceId);
typed_id!(FileId);
typed_id!(BatchId);
typed_id!(ConfigVersionId);

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn distinct_ids_are_generated() {
		assert_ne!(QuoteRequestId::new(), QuoteRequestId::new());
	}

	#[test]
	fn round_trips_through_display_and_parse() {
		let id = QuoteSourceId::new();
		let parsed: QuoteSourceId = id.to_string().parse().unwrap();
		assert_eq!(id, parsed);
	}
}

//! Money type used throughout quotation and cost-ledger math.
//!
//! Backed by `rust_decimal::Decimal` rather than a raw string or float, so
//! the block-search algorithm's `price * (1 + epsilon)` comparisons and the
//! cost ledger's rounding stay exact.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// BRL is the only currency this pipeline ever quotes in; the tag exists so a
/// `Money` value can't silently be compared against a future non-BRL value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Currency {
	Brl,
}

impl fmt::Display for Currency {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Currency::Brl => write!(f, "BRL"),
		}
	}
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MoneyError {
	#[error("price must be positive, got {0}")]
	NonPositive(Decimal),
	#[error("failed to parse price from {0:?}")]
	Parse(String),
}

/// A positive monetary amount in Brazilian Reais.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Money(Decimal);

impl Money {
	/// Builds a `Money` from a decimal value, rejecting non-positive amounts.
	///
	/// Product prices and ledger costs are always strictly positive in this
	/// system; a zero or negative value always indicates an upstream parsing
	/// bug, never a legitimate quote.
	pub fn new(amount: Decimal) -> Result<Self, MoneyError> {
		if amount <= Decimal::ZERO {
			return Err(MoneyError::NonPositive(amount));
		}
		Ok(Self(amount))
	}

	pub fn amount(&self) -> Decimal {
		self.0
	}

	/// Parses a BRL-formatted string (`"R$ 1.234,56"` or `"1234.56"`) into
	/// `Money`. Thousands separators (`.`) are stripped and a trailing `,`
	/// decimal separator is normalized to `.` before parsing, matching the
	/// `pt-BR` locale output the price-extraction cascade scrapes.
	pub fn parse_brl(raw: &str) -> Result<Self, MoneyError> {
		let cleaned: String = raw
			.chars()
			.filter(|c| c.is_ascii_digit() || *c == ',' || *c == '.' || *c == '-')
			.collect();
		let normalized = if let Some(comma_pos) = cleaned.rfind(',') {
			let (integer_part, decimal_part) = cleaned.split_at(comma_pos);
			let integer_part = integer_part.replace('.', "");
			format!("{integer_part}{decimal_part}").replace(',', ".")
		} else {
			cleaned
		};
		let amount: Decimal = normalized
			.parse()
			.map_err(|_| MoneyError::Parse(raw.to_string()))?;
		Self::new(amount)
	}

	/// `self * (1 + epsilon)`, the block-search variation-window boundary.
	pub fn scaled_by(&self, epsilon: Decimal) -> Decimal {
		self.0 * (Decimal::ONE + epsilon)
	}
}

impl fmt::Display for Money {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "R$ {:.2}", self.0)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rust_decimal_macros::dec;

	#[test]
	fn rejects_non_positive_amounts() {
		assert!(Money::new(Decimal::ZERO).is_err());
		assert!(Money::new(dec!(-1)).is_err());
	}

	#[test]
	fn parses_pt_br_formatted_prices() {
		let m = Money::parse_brl("R$ 1.234,56").unwrap();
		assert_eq!(m.amount(), dec!(1234.56));
	}

	#[test]
	fn parses_plain_decimal_strings() {
		let m = Money::parse_brl("99.90").unwrap();
		assert_eq!(m.amount(), dec!(99.90));
	}

	#[test]
	fn scaled_by_applies_variation_window() {
		let m = Money::new(dec!(100)).unwrap();
		assert_eq!(m.scaled_by(dec!(0.25)), dec!(125.00));
	}
}

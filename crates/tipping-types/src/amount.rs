//! Wei amounts and their human-readable form.
//!
//! Amounts are always carried as whole wei in a 256-bit unsigned integer.
//! Floating point only appears inside [`Amount::to_display_string`], right
//! before rounding for display.

use alloy_primitives::U256;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::str::FromStr;
use thiserror::Error;

/// Number of decimals between wei and ether.
pub const ETHER_DECIMALS: u32 = 18;

const WEI_PER_ETHER: u64 = 1_000_000_000_000_000_000;

/// Errors produced when turning user input into an [`Amount`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmountError {
	#[error("Tip amount is empty")]
	Empty,
	#[error("Invalid tip amount format: {0}")]
	Invalid(String),
	#[error("Please enter a valid tip amount greater than 0")]
	NonPositive,
	#[error("Tip amount is too large: {0}")]
	Overflow(String),
}

/// An amount of ETH expressed in wei.
#[derive(
	Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Amount(pub U256);

impl Amount {
	pub const ZERO: Self = Self(U256::ZERO);

	pub fn from_wei(wei: u128) -> Self {
		Self(U256::from(wei))
	}

	pub fn wei(&self) -> U256 {
		self.0
	}

	pub fn is_zero(&self) -> bool {
		self.0.is_zero()
	}

	pub fn saturating_add(self, other: Self) -> Self {
		Self(self.0.saturating_add(other.0))
	}

	pub fn saturating_sub(self, other: Self) -> Self {
		Self(self.0.saturating_sub(other.0))
	}

	/// Lossy conversion to ether, only meant for display.
	fn to_ether_f64(self) -> f64 {
		let wei = self.0.to_string().parse::<f64>().unwrap_or(f64::INFINITY);
		wei / 10f64.powi(ETHER_DECIMALS as i32)
	}

	/// Formats the amount in ether for display.
	///
	/// Zero prints as `"0"`. Below 0.001 ETH the value is printed in
	/// exponential notation with three fractional digits, below 1 ETH with up
	/// to six decimals, and otherwise with up to four decimals. Trailing
	/// zeros and a dangling decimal point are removed.
	pub fn to_display_string(&self) -> String {
		if self.is_zero() {
			return "0".to_string();
		}

		let ether = self.to_ether_f64();
		if ether < 0.001 {
			format!("{:.3e}", ether)
		} else if ether < 1.0 {
			strip_trailing_zeros(format!("{:.6}", ether))
		} else {
			strip_trailing_zeros(format!("{:.4}", ether))
		}
	}
}

fn strip_trailing_zeros(fixed: String) -> String {
	if !fixed.contains('.') {
		return fixed;
	}
	fixed
		.trim_end_matches('0')
		.trim_end_matches('.')
		.to_string()
}

/// Parses an ether amount typed by a user (e.g. `"0.01"` or `"5.000e-16"`)
/// into wei.
///
/// The decimal value is scaled by 10^18 exactly and rounded half away from
/// zero to whole wei. Empty, non-numeric and non-positive input is rejected,
/// as is anything that rounds down to zero wei.
pub fn parse_display_amount(input: &str) -> Result<Amount, AmountError> {
	let trimmed = input.trim();
	if trimmed.is_empty() {
		return Err(AmountError::Empty);
	}

	let parsed = if trimmed.contains(['e', 'E']) {
		Decimal::from_scientific(trimmed)
	} else {
		Decimal::from_str(trimmed)
	};
	let ether = parsed.map_err(|_| AmountError::Invalid(trimmed.to_string()))?;

	if ether <= Decimal::ZERO {
		return Err(AmountError::NonPositive);
	}

	let wei = ether
		.checked_mul(Decimal::from(WEI_PER_ETHER))
		.ok_or_else(|| AmountError::Overflow(trimmed.to_string()))?
		.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
		.to_u128()
		.ok_or_else(|| AmountError::Overflow(trimmed.to_string()))?;

	if wei == 0 {
		return Err(AmountError::NonPositive);
	}

	Ok(Amount::from_wei(wei))
}

impl fmt::Display for Amount {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

/// Parses a raw wei value, decimal or `0x`-prefixed hex.
impl FromStr for Amount {
	type Err = AmountError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		U256::from_str(s.trim())
			.map(Self)
			.map_err(|e| AmountError::Invalid(format!("{}: {}", s, e)))
	}
}

impl From<U256> for Amount {
	fn from(value: U256) -> Self {
		Self(value)
	}
}

impl From<u128> for Amount {
	fn from(value: u128) -> Self {
		Self::from_wei(value)
	}
}

impl Sum for Amount {
	fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
		iter.fold(Self::ZERO, Amount::saturating_add)
	}
}

impl<'a> Sum<&'a Amount> for Amount {
	fn sum<I: Iterator<Item = &'a Amount>>(iter: I) -> Self {
		iter.copied().sum()
	}
}

// Copyright 2025 chenjjiaa
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Fixed-point price and quantity types
//!
//! All matching arithmetic runs on `rust_decimal` with a fixed scale of
//! eight fractional digits. Binary floating point never enters the core:
//! sum-to-quantity invariants and persisted values must be exact.
//! Values serialize as strings so JSON round-trips cannot lose precision.

use std::fmt;
use std::ops::{Add, Mul, Sub};
use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fractional digits carried by every price and quantity.
pub const SCALE: u32 = 8;

/// Error constructing a price or quantity.
#[derive(Debug, Error)]
pub enum NumericError {
	#[error("invalid decimal: {0}")]
	Parse(#[from] rust_decimal::Error),
	#[error("value must not be negative")]
	Negative,
}

fn normalize(value: Decimal) -> Decimal {
	let mut d = value.round_dp_with_strategy(SCALE, RoundingStrategy::MidpointAwayFromZero);
	d.rescale(SCALE);
	d
}

/// Price with fixed-point decimal representation
///
/// Non-negative by construction. Zero is a valid value: market orders
/// carry no limit price and persist as zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Price(Decimal);

impl Price {
	pub const ZERO: Price = Price(Decimal::ZERO);

	/// Build a price from a decimal, normalizing to the fixed scale.
	pub fn try_new(value: Decimal) -> Result<Self, NumericError> {
		if value.is_sign_negative() && !value.is_zero() {
			return Err(NumericError::Negative);
		}
		Ok(Self(normalize(value)))
	}

	pub fn from_u64(value: u64) -> Self {
		Self(normalize(Decimal::from(value)))
	}

	pub fn as_decimal(&self) -> Decimal {
		self.0
	}

	pub fn is_zero(&self) -> bool {
		self.0.is_zero()
	}

	pub fn min(self, other: Self) -> Self {
		if self.0 <= other.0 { self } else { other }
	}
}

impl Add for Price {
	type Output = Self;

	fn add(self, rhs: Self) -> Self::Output {
		Self(self.0 + rhs.0)
	}
}

impl Sub for Price {
	type Output = Self;

	fn sub(self, rhs: Self) -> Self::Output {
		assert!(self.0 >= rhs.0, "price subtraction would go negative");
		Self(self.0 - rhs.0)
	}
}

impl Mul<i64> for Price {
	type Output = Self;

	fn mul(self, rhs: i64) -> Self::Output {
		Self(normalize(self.0 * Decimal::from(rhs)))
	}
}

impl FromStr for Price {
	type Err = NumericError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::try_new(Decimal::from_str(s)?)
	}
}

impl fmt::Display for Price {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl Serialize for Price {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: serde::Serializer,
	{
		serializer.serialize_str(&self.0.to_string())
	}
}

impl<'de> Deserialize<'de> for Price {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: serde::Deserializer<'de>,
	{
		let s = String::deserialize(deserializer)?;
		s.parse().map_err(serde::de::Error::custom)
	}
}

/// Quantity with fixed-point decimal representation
///
/// Non-negative by construction. Zero is a valid value: a fully executed
/// or cancelled order has nothing remaining.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Quantity(Decimal);

impl Quantity {
	pub const ZERO: Quantity = Quantity(Decimal::ZERO);

	/// Build a quantity from a decimal, normalizing to the fixed scale.
	pub fn try_new(value: Decimal) -> Result<Self, NumericError> {
		if value.is_sign_negative() && !value.is_zero() {
			return Err(NumericError::Negative);
		}
		Ok(Self(normalize(value)))
	}

	pub fn from_u64(value: u64) -> Self {
		Self(normalize(Decimal::from(value)))
	}

	pub fn as_decimal(&self) -> Decimal {
		self.0
	}

	pub fn is_zero(&self) -> bool {
		self.0.is_zero()
	}

	pub fn min(self, other: Self) -> Self {
		if self.0 <= other.0 { self } else { other }
	}
}

impl Add for Quantity {
	type Output = Self;

	fn add(self, rhs: Self) -> Self::Output {
		Self(self.0 + rhs.0)
	}
}

impl Sub for Quantity {
	type Output = Self;

	fn sub(self, rhs: Self) -> Self::Output {
		assert!(self.0 >= rhs.0, "quantity subtraction would go negative");
		Self(self.0 - rhs.0)
	}
}

impl Mul<i64> for Quantity {
	type Output = Self;

	fn mul(self, rhs: i64) -> Self::Output {
		Self(normalize(self.0 * Decimal::from(rhs)))
	}
}

impl FromStr for Quantity {
	type Err = NumericError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::try_new(Decimal::from_str(s)?)
	}
}

impl fmt::Display for Quantity {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl Serialize for Quantity {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: serde::Serializer,
	{
		serializer.serialize_str(&self.0.to_string())
	}
}

impl<'de> Deserialize<'de> for Quantity {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: serde::Deserializer<'de>,
	{
		let s = String::deserialize(deserializer)?;
		s.parse().map_err(serde::de::Error::custom)
	}
}

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

//! Order lifecycle types
//!
//! An [`OrderCommand`] is what a client submits; an [`Order`] is the
//! engine-owned row with server-assigned identity and execution state.
//! Status transitions are centralized here so the engine, the adapters,
//! and the tests cannot drift apart on lifecycle rules.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::numeric::{Price, Quantity};
use crate::time::now_nanos;

/// Order side (buyer or seller)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
	Buy,
	Sell,
}

impl Side {
	/// The side an aggressor executes against.
	pub fn opposite(&self) -> Self {
		match self {
			Side::Buy => Side::Sell,
			Side::Sell => Side::Buy,
		}
	}
}

/// Order type
///
/// Limit orders rest when unfilled; market orders never rest, any
/// unfilled remainder is cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderType {
	Limit,
	Market,
}

/// Order status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
	Open,
	PartiallyFilled,
	Filled,
	Cancelled,
}

impl OrderStatus {
	/// Terminal statuses admit no further transitions.
	pub fn is_terminal(&self) -> bool {
		matches!(self, OrderStatus::Filled | OrderStatus::Cancelled)
	}

	/// Resting statuses are the only ones allowed in a book.
	pub fn is_resting(&self) -> bool {
		matches!(self, OrderStatus::Open | OrderStatus::PartiallyFilled)
	}
}

/// Order submission received from a transport adapter
///
/// Validated by the engine before anything is persisted. The optional
/// `client_order_id` is the client-supplied idempotency key; resubmitting
/// the same (client_id, client_order_id) pair replays the recorded
/// outcome instead of creating a second order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderCommand {
	pub client_id: String,
	pub client_order_id: Option<String>,
	pub symbol: String,
	pub side: Side,
	pub order_type: OrderType,
	/// Limit price; ignored for market orders.
	pub price: Price,
	pub quantity: Quantity,
}

/// Authoritative order row
///
/// Created by submit, owned by the matching engine while its symbol lane
/// is held, persisted as the single source of truth. Copies held by the
/// in-memory book and by snapshots are plain values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
	pub id: Uuid,
	pub client_id: String,
	pub client_order_id: Option<String>,
	pub symbol: String,
	pub side: Side,
	pub order_type: OrderType,
	pub price: Price,
	pub quantity: Quantity,
	pub remaining: Quantity,
	pub status: OrderStatus,
	/// Unix nanos; doubles as the time-priority key.
	pub created_at: i64,
	pub updated_at: i64,
}

impl Order {
	/// Recompute status from the remaining quantity.
	///
	/// Cancellation is not derivable from quantities and is applied
	/// through [`Order::cancel`] instead.
	pub fn refresh_status(&mut self) {
		self.status = if self.remaining.is_zero() {
			OrderStatus::Filled
		} else if self.remaining < self.quantity {
			OrderStatus::PartiallyFilled
		} else {
			OrderStatus::Open
		};
	}

	/// Apply an execution of `quantity` against this order.
	pub fn apply_fill(&mut self, quantity: Quantity, timestamp: i64) {
		self.remaining = self.remaining - quantity;
		self.refresh_status();
		self.updated_at = timestamp;
	}

	/// Cancel the order, zeroing the remainder.
	pub fn cancel(&mut self, timestamp: i64) {
		self.status = OrderStatus::Cancelled;
		self.remaining = Quantity::ZERO;
		self.updated_at = timestamp;
	}

	/// Whether the order belongs in a book.
	pub fn is_resting(&self) -> bool {
		self.status.is_resting() && !self.remaining.is_zero()
	}
}

impl From<OrderCommand> for Order {
	fn from(cmd: OrderCommand) -> Self {
		let ts = now_nanos();
		Self {
			id: Uuid::new_v4(),
			client_id: cmd.client_id,
			client_order_id: cmd.client_order_id,
			symbol: cmd.symbol,
			side: cmd.side,
			order_type: cmd.order_type,
			price: cmd.price,
			quantity: cmd.quantity,
			remaining: cmd.quantity,
			status: OrderStatus::Open,
			created_at: ts,
			updated_at: ts,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rust_decimal_macros::dec;

	fn command(side: Side, order_type: OrderType, price: &str, qty: &str) -> OrderCommand {
		OrderCommand {
			client_id: "client_1".to_string(),
			client_order_id: None,
			symbol: "BTC-USDT".to_string(),
			side,
			order_type,
			price: price.parse().unwrap(),
			quantity: qty.parse().unwrap(),
		}
	}

	#[test]
	fn test_side_opposite() {
		assert_eq!(Side::Buy.opposite(), Side::Sell);
		assert_eq!(Side::Sell.opposite(), Side::Buy);
	}

	#[test]
	fn test_command_into_order() {
		let order: Order = command(Side::Buy, OrderType::Limit, "100", "5").into();
		assert_eq!(order.status, OrderStatus::Open);
		assert_eq!(order.remaining, order.quantity);
		assert_eq!(order.created_at, order.updated_at);
		assert!(order.is_resting());
	}

	#[test]
	fn test_fill_transitions() {
		let mut order: Order = command(Side::Sell, OrderType::Limit, "100", "5").into();

		order.apply_fill(Quantity::try_new(dec!(2)).unwrap(), order.created_at + 1);
		assert_eq!(order.status, OrderStatus::PartiallyFilled);
		assert_eq!(order.remaining.as_decimal(), dec!(3));

		order.apply_fill(Quantity::try_new(dec!(3)).unwrap(), order.created_at + 2);
		assert_eq!(order.status, OrderStatus::Filled);
		assert!(order.remaining.is_zero());
		assert!(order.status.is_terminal());
		assert!(!order.is_resting());
	}

	#[test]
	fn test_cancel_zeroes_remainder() {
		let mut order: Order = command(Side::Buy, OrderType::Market, "0", "5").into();
		order.cancel(order.created_at + 1);
		assert_eq!(order.status, OrderStatus::Cancelled);
		assert!(order.remaining.is_zero());
	}

	#[test]
	fn test_status_serde_tags() {
		let json = serde_json::to_string(&OrderStatus::PartiallyFilled).unwrap();
		assert_eq!(json, "\"PARTIALLY_FILLED\"");
		let json = serde_json::to_string(&Side::Buy).unwrap();
		assert_eq!(json, "\"BUY\"");
		let json = serde_json::to_string(&OrderType::Limit).unwrap();
		assert_eq!(json, "\"LIMIT\"");
	}
}

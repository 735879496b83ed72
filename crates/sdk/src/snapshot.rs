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

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::order::{Order, Side};
use crate::time::now_nanos;

/// Value-copy of an order book at a moment in time
///
/// Bids and asks are ordered best-first. A snapshot is immutable once
/// captured; handing one to a caller hands over ownership of the copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderbookSnapshot {
	pub symbol: String,
	pub bids: Vec<Order>,
	pub asks: Vec<Order>,
	/// Unix nanos at capture.
	pub timestamp: i64,
}

/// Match-priority comparator: better price first, then earlier
/// `created_at`, then order id to make the total order deterministic.
pub fn priority_cmp(side: Side, a: &Order, b: &Order) -> Ordering {
	let by_price = match side {
		Side::Buy => b.price.cmp(&a.price),
		Side::Sell => a.price.cmp(&b.price),
	};
	by_price
		.then_with(|| a.created_at.cmp(&b.created_at))
		.then_with(|| a.id.cmp(&b.id))
}

impl OrderbookSnapshot {
	pub fn empty(symbol: impl Into<String>) -> Self {
		Self {
			symbol: symbol.into(),
			bids: Vec::new(),
			asks: Vec::new(),
			timestamp: now_nanos(),
		}
	}

	/// Restore best-first ordering after a bulk load.
	pub fn sort(&mut self) {
		self.bids.sort_by(|a, b| priority_cmp(Side::Buy, a, b));
		self.asks.sort_by(|a, b| priority_cmp(Side::Sell, a, b));
	}

	pub fn best_bid(&self) -> Option<&Order> {
		self.bids.first()
	}

	pub fn best_ask(&self) -> Option<&Order> {
		self.asks.first()
	}

	/// Content equality ignoring the capture timestamp.
	pub fn content_eq(&self, other: &Self) -> bool {
		self.symbol == other.symbol && self.bids == other.bids && self.asks == other.asks
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::order::{OrderStatus, OrderType};
	use uuid::Uuid;

	fn order(side: Side, price: u64, created_at: i64) -> Order {
		Order {
			id: Uuid::new_v4(),
			client_id: "c".to_string(),
			client_order_id: None,
			symbol: "X".to_string(),
			side,
			order_type: OrderType::Limit,
			price: crate::numeric::Price::from_u64(price),
			quantity: crate::numeric::Quantity::from_u64(1),
			remaining: crate::numeric::Quantity::from_u64(1),
			status: OrderStatus::Open,
			created_at,
			updated_at: created_at,
		}
	}

	#[test]
	fn test_sort_best_first() {
		let mut snap = OrderbookSnapshot::empty("X");
		snap.bids = vec![
			order(Side::Buy, 99, 1),
			order(Side::Buy, 101, 3),
			order(Side::Buy, 101, 2),
		];
		snap.asks = vec![order(Side::Sell, 105, 2), order(Side::Sell, 103, 1)];
		snap.sort();

		assert_eq!(snap.best_bid().unwrap().price.as_decimal(), 101.into());
		assert_eq!(snap.bids[0].created_at, 2); // time priority at equal price
		assert_eq!(snap.best_ask().unwrap().price.as_decimal(), 103.into());
	}

	#[test]
	fn test_content_eq_ignores_timestamp() {
		let mut a = OrderbookSnapshot::empty("X");
		a.bids = vec![order(Side::Buy, 100, 1)];
		let mut b = a.clone();
		b.timestamp += 1_000;

		assert!(a.content_eq(&b));
		b.bids.clear();
		assert!(!a.content_eq(&b));
	}
}

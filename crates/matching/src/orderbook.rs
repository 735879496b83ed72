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

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};

use forge_sdk::{Order, OrderbookSnapshot, Price, Quantity, Side, now_nanos};
use uuid::Uuid;

/// Price level in the order book
///
/// A price level holds every resting order at one price, in time
/// priority: earlier `created_at` first, order id breaking ties.
#[derive(Debug, Clone)]
pub struct PriceLevel {
	price: Price,
	orders: Vec<Order>,
	total: Quantity,
}

impl PriceLevel {
	fn new(price: Price) -> Self {
		Self {
			price,
			orders: Vec::new(),
			total: Quantity::ZERO,
		}
	}

	/// Insert preserving (created_at, id) order. Live submissions always
	/// append; rebuilds from unsorted rows pay the scan.
	fn insert(&mut self, order: Order) {
		self.total = self.total + order.remaining;
		let key = (order.created_at, order.id);
		let pos = self
			.orders
			.iter()
			.rposition(|o| (o.created_at, o.id) <= key)
			.map(|p| p + 1)
			.unwrap_or(0);
		self.orders.insert(pos, order);
	}

	fn remove(&mut self, order_id: Uuid) -> Option<Order> {
		let pos = self.orders.iter().position(|o| o.id == order_id)?;
		let order = self.orders.remove(pos);
		self.total = self.total - order.remaining;
		Some(order)
	}

	fn update_remaining(&mut self, order_id: Uuid, remaining: Quantity) -> bool {
		if let Some(order) = self.orders.iter_mut().find(|o| o.id == order_id) {
			self.total = self.total - order.remaining + remaining;
			order.remaining = remaining;
			order.refresh_status();
			true
		} else {
			false
		}
	}

	pub fn front(&self) -> Option<&Order> {
		self.orders.first()
	}

	pub fn orders(&self) -> &[Order] {
		&self.orders
	}

	pub fn is_empty(&self) -> bool {
		self.orders.is_empty()
	}

	pub fn price(&self) -> Price {
		self.price
	}

	/// Aggregate remaining quantity at this price.
	pub fn total(&self) -> Quantity {
		self.total
	}

	pub fn len(&self) -> usize {
		self.orders.len()
	}
}

/// Per-symbol limit order book with price-time priority
///
/// Two price-ordered sides (bids descending via `Reverse`, asks
/// ascending in natural `BTreeMap` order) mapping each price to a FIFO
/// level, plus an id index so removal does not scan levels.
///
/// The book holds value-copies only: the authoritative rows live in the
/// durable store, and the coordinator replays each committed mutation
/// into this mirror. It is owned by the symbol lane and never shared.
#[derive(Debug, Clone)]
pub struct OrderBook {
	symbol: String,
	bids: BTreeMap<Reverse<Price>, PriceLevel>,
	asks: BTreeMap<Price, PriceLevel>,
	/// Order id -> (side, price) for O(log L) removal and updates.
	index: HashMap<Uuid, (Side, Price)>,
}

impl OrderBook {
	pub fn new(symbol: impl Into<String>) -> Self {
		Self {
			symbol: symbol.into(),
			bids: BTreeMap::new(),
			asks: BTreeMap::new(),
			index: HashMap::new(),
		}
	}

	/// Bulk-build a book from store rows; non-resting rows are skipped.
	pub fn rebuild(symbol: impl Into<String>, orders: impl IntoIterator<Item = Order>) -> Self {
		let mut book = Self::new(symbol);
		for order in orders {
			if order.is_resting() {
				book.insert(order);
			}
		}
		book
	}

	pub fn symbol(&self) -> &str {
		&self.symbol
	}

	/// Add a resting order to its side.
	pub fn insert(&mut self, order: Order) {
		// A re-inserted id replaces the stale copy.
		if self.index.contains_key(&order.id) {
			self.remove(order.id);
		}
		self.index.insert(order.id, (order.side, order.price));
		match order.side {
			Side::Buy => {
				self.bids
					.entry(Reverse(order.price))
					.or_insert_with(|| PriceLevel::new(order.price))
					.insert(order);
			}
			Side::Sell => {
				self.asks
					.entry(order.price)
					.or_insert_with(|| PriceLevel::new(order.price))
					.insert(order);
			}
		}
	}

	/// Remove an order through the id index.
	pub fn remove(&mut self, order_id: Uuid) -> Option<Order> {
		let (side, price) = self.index.remove(&order_id)?;
		match side {
			Side::Buy => {
				let level = self.bids.get_mut(&Reverse(price))?;
				let order = level.remove(order_id);
				if level.is_empty() {
					self.bids.remove(&Reverse(price));
				}
				order
			}
			Side::Sell => {
				let level = self.asks.get_mut(&price)?;
				let order = level.remove(order_id);
				if level.is_empty() {
					self.asks.remove(&price);
				}
				order
			}
		}
	}

	/// Update an order's remaining quantity; zero removes it.
	pub fn update_remaining(&mut self, order_id: Uuid, remaining: Quantity) -> bool {
		if remaining.is_zero() {
			return self.remove(order_id).is_some();
		}
		let Some(&(side, price)) = self.index.get(&order_id) else {
			return false;
		};
		match side {
			Side::Buy => self
				.bids
				.get_mut(&Reverse(price))
				.is_some_and(|l| l.update_remaining(order_id, remaining)),
			Side::Sell => self
				.asks
				.get_mut(&price)
				.is_some_and(|l| l.update_remaining(order_id, remaining)),
		}
	}

	pub fn contains(&self, order_id: Uuid) -> bool {
		self.index.contains_key(&order_id)
	}

	/// Highest-priority resting buy order.
	pub fn best_bid(&self) -> Option<&Order> {
		self.bids.first_key_value().and_then(|(_, l)| l.front())
	}

	/// Highest-priority resting sell order.
	pub fn best_ask(&self) -> Option<&Order> {
		self.asks.first_key_value().and_then(|(_, l)| l.front())
	}

	/// Resting orders of one side in match priority.
	pub fn iter_side(&self, side: Side) -> Box<dyn Iterator<Item = &Order> + '_> {
		match side {
			Side::Buy => Box::new(self.bids.values().flat_map(|l| l.orders().iter())),
			Side::Sell => Box::new(self.asks.values().flat_map(|l| l.orders().iter())),
		}
	}

	/// Resting orders an aggressor would execute against, best first.
	pub fn iter_opposite(&self, aggressor: Side) -> Box<dyn Iterator<Item = &Order> + '_> {
		self.iter_side(aggressor.opposite())
	}

	pub fn len(&self) -> usize {
		self.index.len()
	}

	pub fn is_empty(&self) -> bool {
		self.index.is_empty()
	}

	/// A crossed book (best bid at or above best ask) means a committed
	/// submit failed to run its matching loop to fixed point.
	pub fn is_crossed(&self) -> bool {
		match (self.best_bid(), self.best_ask()) {
			(Some(bid), Some(ask)) => bid.price >= ask.price,
			_ => false,
		}
	}

	/// Value-copy of the whole book, best-first on both sides.
	pub fn snapshot(&self) -> OrderbookSnapshot {
		OrderbookSnapshot {
			symbol: self.symbol.clone(),
			bids: self.iter_side(Side::Buy).cloned().collect(),
			asks: self.iter_side(Side::Sell).cloned().collect(),
			timestamp: now_nanos(),
		}
	}

	pub fn clear(&mut self) {
		self.bids.clear();
		self.asks.clear();
		self.index.clear();
	}
}

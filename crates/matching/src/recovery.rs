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

//! Startup recovery
//!
//! Rebuilds every symbol's in-memory book from the durable store: any
//! order with remaining quantity in a resting status is re-inserted,
//! and price-time ordering falls out of the book's insertion rules.
//! Recovery reconstructs state only; it never emits trades.

use std::collections::HashMap;

use forge_sdk::EngineError;
use tracing::info;

use crate::orderbook::OrderBook;
use crate::repository::Repository;

/// Load open orders for every known symbol and rebuild the books.
pub async fn rehydrate(repo: &dyn Repository) -> Result<HashMap<String, OrderBook>, EngineError> {
	let symbols = repo.list_symbols().await?;
	let mut books = HashMap::with_capacity(symbols.len());

	for symbol in symbols {
		let open_orders = repo.load_open_orders(&symbol).await?;
		let book = OrderBook::rebuild(&symbol, open_orders);
		info!(symbol = %symbol, resting = book.len(), "order book rehydrated");
		books.insert(symbol, book);
	}

	Ok(books)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::repository::MemoryRepository;
	use forge_sdk::{Order, OrderCommand, OrderType, Price, Quantity, Side};

	fn order(symbol: &str, side: Side, price: u64, qty: u64) -> Order {
		OrderCommand {
			client_id: "client".to_string(),
			client_order_id: None,
			symbol: symbol.to_string(),
			side,
			order_type: OrderType::Limit,
			price: Price::from_u64(price),
			quantity: Quantity::from_u64(qty),
		}
		.into()
	}

	#[tokio::test]
	async fn test_rehydrate_rebuilds_resting_orders_only() {
		let repo = MemoryRepository::new();
		let resting_bid = order("X", Side::Buy, 100, 5);
		let resting_ask = order("X", Side::Sell, 105, 3);
		let mut cancelled = order("X", Side::Buy, 99, 1);
		cancelled.cancel(cancelled.created_at + 1);
		let other = order("Y", Side::Sell, 50, 2);

		let mut tx = repo.begin().await.unwrap();
		for o in [&resting_bid, &resting_ask, &cancelled, &other] {
			tx.insert_order(o).await.unwrap();
		}
		tx.commit().await.unwrap();

		let books = rehydrate(&repo).await.unwrap();
		assert_eq!(books.len(), 2);

		let x = &books["X"];
		assert_eq!(x.len(), 2);
		assert_eq!(x.best_bid().unwrap().id, resting_bid.id);
		assert_eq!(x.best_ask().unwrap().id, resting_ask.id);
		assert!(!x.contains(cancelled.id));

		assert_eq!(books["Y"].len(), 1);
	}

	#[tokio::test]
	async fn test_rehydrate_empty_store() {
		let repo = MemoryRepository::new();
		let books = rehydrate(&repo).await.unwrap();
		assert!(books.is_empty());
	}
}

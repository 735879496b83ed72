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

//! Matching algorithm
//!
//! The [`Matcher`] applies deterministic price-time priority against
//! candidate pages loaded from the repository transaction it is handed.
//! It never touches the in-memory book: the coordinator owns that mirror
//! and replays committed outcomes into it. Every execution prices at the
//! resting (passive) order's price.

use std::collections::HashMap;
use std::time::Instant;

use forge_sdk::{
	EngineError, Order, OrderCommand, OrderStatus, OrderType, Price, Quantity, Side, Trade,
	now_nanos,
};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use crate::repository::RepositoryTx;

/// Result of one submission
///
/// `touched` carries the final state of every passive order this
/// submission executed against, so the caller can update its mirror
/// without re-reading the store.
#[derive(Debug)]
pub struct SubmitOutcome {
	pub order: Order,
	pub trades: Vec<Trade>,
	pub touched: Vec<Order>,
	/// The match budget elapsed before the loop ran dry; whatever was
	/// matched up to that point is still committed by the caller.
	pub timed_out: bool,
}

/// Price-time priority matcher
///
/// One instance serves all symbols; per-symbol serialisation is the
/// coordinator's lane, cross-process serialisation is the repository's
/// transaction isolation plus candidate row locks.
pub struct Matcher {
	page_size: usize,
}

impl Matcher {
	pub fn new(page_size: usize) -> Self {
		Self { page_size }
	}

	/// Validate, persist, and match an incoming order.
	///
	/// The order and all of its effects (counterparty remainders, trades)
	/// are written through `tx`; nothing is visible until the caller
	/// commits. Cancellation aborts with no effect; the budget deadline
	/// stops matching but keeps what already executed.
	pub async fn submit(
		&self,
		tx: &mut dyn RepositoryTx,
		cmd: OrderCommand,
		cancel: &CancellationToken,
		deadline: Instant,
	) -> Result<SubmitOutcome, EngineError> {
		validate(&cmd)?;

		let mut order: Order = cmd.into();
		if order.order_type == OrderType::Market {
			order.price = Price::ZERO;
		}
		tx.insert_order(&order).await?;

		let mut trades: Vec<Trade> = Vec::new();
		let mut touched: HashMap<Uuid, Order> = HashMap::new();
		let mut timed_out = false;

		'matching: while !order.remaining.is_zero() {
			if cancel.is_cancelled() {
				return Err(EngineError::Canceled("submit cancelled before commit".into()));
			}
			if Instant::now() >= deadline {
				timed_out = true;
				break;
			}

			let limit_price = (order.order_type == OrderType::Limit).then_some(order.price);
			let page = tx
				.load_candidates(&order.symbol, order.side, limit_price, self.page_size)
				.await?;
			if page.is_empty() {
				break;
			}

			let mut progressed = false;
			for mut passive in page {
				if order.remaining.is_zero() {
					break;
				}
				if Instant::now() >= deadline {
					timed_out = true;
					break 'matching;
				}
				if !price_crosses(&order, &passive) {
					continue;
				}
				let quantity = order.remaining.min(passive.remaining);
				if quantity.is_zero() {
					continue;
				}

				let executed_at = now_nanos();
				let (buy_order, sell_order) = match order.side {
					Side::Buy => (order.id, passive.id),
					Side::Sell => (passive.id, order.id),
				};
				let trade = Trade {
					id: Uuid::new_v4(),
					symbol: order.symbol.clone(),
					buy_order,
					sell_order,
					price: passive.price,
					quantity,
					executed_at,
				};

				order.apply_fill(quantity, executed_at);
				passive.apply_fill(quantity, executed_at);
				tx.save_order(&passive).await?;
				tx.save_trade(&trade).await?;

				debug!(
					trade = %trade.id,
					passive = %passive.id,
					price = %trade.price,
					quantity = %trade.quantity,
					"executed"
				);
				trades.push(trade);
				touched.insert(passive.id, passive);
				progressed = true;
			}

			// A page that yields nothing eligible ends the loop; the
			// next page would be the same rows again.
			if !progressed {
				break;
			}
		}

		if order.order_type == OrderType::Market && !order.remaining.is_zero() {
			// Market remainders never rest.
			order.cancel(now_nanos());
		}
		tx.save_order(&order).await?;

		Ok(SubmitOutcome {
			order,
			trades,
			touched: touched.into_values().collect(),
			timed_out,
		})
	}

	/// Replace price and quantity of an OPEN order.
	///
	/// The order loses its time priority: the reset position is as if it
	/// had just been submitted. Returns the updated row.
	pub async fn modify(
		&self,
		tx: &mut dyn RepositoryTx,
		order_id: Uuid,
		client_id: &str,
		new_price: Price,
		new_quantity: Quantity,
	) -> Result<Order, EngineError> {
		if new_price.is_zero() {
			return Err(EngineError::InvalidArgument("price must be > 0".into()));
		}
		if new_quantity.is_zero() {
			return Err(EngineError::InvalidArgument("quantity must be > 0".into()));
		}

		let mut order = tx.load_order_for_client(order_id, client_id).await?;
		if order.status != OrderStatus::Open {
			return Err(EngineError::ConflictState(format!(
				"cannot modify order in state {:?}",
				order.status
			)));
		}

		let ts = now_nanos();
		tx.modify_order(order_id, client_id, new_price, new_quantity, ts)
			.await?;

		order.price = new_price;
		order.quantity = new_quantity;
		order.remaining = new_quantity;
		order.created_at = ts;
		order.updated_at = ts;
		Ok(order)
	}

	/// Cancel an order that is still OPEN or PARTIALLY_FILLED.
	///
	/// Returns the cancelled row. Orders already in a terminal state
	/// yield `ConflictState`, which makes repeated cancels harmless and
	/// distinguishable.
	pub async fn cancel(
		&self,
		tx: &mut dyn RepositoryTx,
		order_id: Uuid,
		client_id: &str,
	) -> Result<Order, EngineError> {
		let mut order = tx.load_order_for_client(order_id, client_id).await?;
		if !order.status.is_resting() {
			return Err(EngineError::ConflictState(format!(
				"cannot cancel order in state {:?}",
				order.status
			)));
		}

		tx.cancel_order(order_id, client_id).await?;
		order.cancel(now_nanos());
		Ok(order)
	}
}

fn validate(cmd: &OrderCommand) -> Result<(), EngineError> {
	if cmd.client_id.is_empty() {
		return Err(EngineError::InvalidArgument("client id required".into()));
	}
	if cmd.symbol.is_empty() {
		return Err(EngineError::InvalidArgument("symbol required".into()));
	}
	if cmd.quantity.is_zero() {
		return Err(EngineError::InvalidArgument("quantity must be > 0".into()));
	}
	if cmd.order_type == OrderType::Limit && cmd.price.is_zero() {
		return Err(EngineError::InvalidArgument("limit price must be > 0".into()));
	}
	Ok(())
}

/// Whether the aggressor may trade with a passive order at its price.
fn price_crosses(aggressor: &Order, passive: &Order) -> bool {
	match aggressor.order_type {
		OrderType::Market => true,
		OrderType::Limit => match aggressor.side {
			Side::Buy => passive.price <= aggressor.price,
			Side::Sell => passive.price >= aggressor.price,
		},
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::repository::{MemoryRepository, Repository};
	use std::time::Duration;

	fn command(
		client: &str,
		side: Side,
		order_type: OrderType,
		price: u64,
		qty: u64,
	) -> OrderCommand {
		OrderCommand {
			client_id: client.to_string(),
			client_order_id: None,
			symbol: "X".to_string(),
			side,
			order_type,
			price: Price::from_u64(price),
			quantity: Quantity::from_u64(qty),
		}
	}

	fn far_deadline() -> Instant {
		Instant::now() + Duration::from_secs(2)
	}

	#[test]
	fn test_validate_rejects_bad_input() {
		let mut cmd = command("alice", Side::Buy, OrderType::Limit, 100, 5);
		cmd.quantity = Quantity::ZERO;
		assert!(validate(&cmd).is_err());

		let cmd = command("alice", Side::Buy, OrderType::Limit, 0, 5);
		assert!(validate(&cmd).is_err());

		// Market orders carry no limit price.
		let cmd = command("alice", Side::Buy, OrderType::Market, 0, 5);
		assert!(validate(&cmd).is_ok());

		let mut cmd = command("", Side::Buy, OrderType::Limit, 100, 5);
		assert!(validate(&cmd).is_err());
		cmd.client_id = "alice".to_string();
		cmd.symbol = String::new();
		assert!(validate(&cmd).is_err());
	}

	#[test]
	fn test_price_crossing() {
		let buy: Order = command("a", Side::Buy, OrderType::Limit, 100, 1).into();
		let cheap_ask: Order = command("b", Side::Sell, OrderType::Limit, 99, 1).into();
		let exact_ask: Order = command("c", Side::Sell, OrderType::Limit, 100, 1).into();
		let pricey_ask: Order = command("d", Side::Sell, OrderType::Limit, 101, 1).into();

		assert!(price_crosses(&buy, &cheap_ask));
		assert!(price_crosses(&buy, &exact_ask));
		assert!(!price_crosses(&buy, &pricey_ask));

		let market: Order = command("e", Side::Buy, OrderType::Market, 0, 1).into();
		assert!(price_crosses(&market, &pricey_ask));

		let sell: Order = command("f", Side::Sell, OrderType::Limit, 100, 1).into();
		let low_bid: Order = command("g", Side::Buy, OrderType::Limit, 99, 1).into();
		assert!(!price_crosses(&sell, &low_bid));
	}

	#[tokio::test]
	async fn test_submit_rests_when_uncrossed() {
		let repo = MemoryRepository::new();
		let matcher = Matcher::new(200);
		let cancel = CancellationToken::new();

		let mut tx = repo.begin().await.unwrap();
		let outcome = matcher
			.submit(
				tx.as_mut(),
				command("alice", Side::Buy, OrderType::Limit, 100, 5),
				&cancel,
				far_deadline(),
			)
			.await
			.unwrap();
		tx.commit().await.unwrap();

		assert!(outcome.trades.is_empty());
		assert!(!outcome.timed_out);
		assert_eq!(outcome.order.status, OrderStatus::Open);
		assert_eq!(outcome.order.remaining, Quantity::from_u64(5));
	}

	#[tokio::test]
	async fn test_cancellation_aborts_before_commit() {
		let repo = MemoryRepository::new();
		let matcher = Matcher::new(200);
		let cancel = CancellationToken::new();
		cancel.cancel();

		let mut tx = repo.begin().await.unwrap();
		let err = matcher
			.submit(
				tx.as_mut(),
				command("alice", Side::Buy, OrderType::Limit, 100, 5),
				&cancel,
				far_deadline(),
			)
			.await
			.unwrap_err();
		assert_eq!(err.kind(), forge_sdk::ErrorKind::Canceled);
		tx.rollback().await.unwrap();
	}

	#[tokio::test]
	async fn test_expired_budget_stops_matching() {
		let repo = MemoryRepository::new();
		let matcher = Matcher::new(200);
		let cancel = CancellationToken::new();

		let mut tx = repo.begin().await.unwrap();
		matcher
			.submit(
				tx.as_mut(),
				command("maker", Side::Sell, OrderType::Limit, 100, 5),
				&cancel,
				far_deadline(),
			)
			.await
			.unwrap();
		tx.commit().await.unwrap();

		// Deadline already in the past: the loop never pages.
		let mut tx = repo.begin().await.unwrap();
		let outcome = matcher
			.submit(
				tx.as_mut(),
				command("taker", Side::Buy, OrderType::Limit, 100, 5),
				&cancel,
				Instant::now() - Duration::from_millis(1),
			)
			.await
			.unwrap();
		tx.commit().await.unwrap();

		assert!(outcome.timed_out);
		assert!(outcome.trades.is_empty());
		assert_eq!(outcome.order.status, OrderStatus::Open);
	}
}

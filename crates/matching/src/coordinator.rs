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

//! Coordinator
//!
//! The synchronous programmatic contract transport adapters call into.
//! Mutations on one symbol serialise through that symbol's lane while
//! different symbols run in parallel; each mutation is one serialisable
//! repository transaction, committed before the lane's in-memory book
//! mirror, the advisory cache, and the post-commit hook observe it.
//!
//! The durable store is authoritative throughout. The lane's book is a
//! derived mirror: rebuilt from the store at startup and replayed from
//! committed outcomes afterwards, never consulted for matching itself.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use dashmap::DashMap;
use forge_sdk::{
	EngineError, ErrorKind, Order, OrderCommand, OrderbookSnapshot, Price, Quantity, Trade,
};
use tokio::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::cache::Cache;
use crate::config::EngineConfig;
use crate::engine::Matcher;
use crate::orderbook::OrderBook;
use crate::recovery;
use crate::repository::Repository;

/// Called after every committed mutation with the trades it produced and
/// a fresh snapshot of the book. Transport adapters fan this out.
pub type CommitHook = Box<dyn Fn(&[Trade], &OrderbookSnapshot) + Send + Sync>;

/// One symbol's serialisation domain.
struct Lane {
	book: Mutex<OrderBook>,
	/// Set on a post-commit invariant breach; mutations are refused
	/// until an operator acknowledges.
	halted: AtomicBool,
}

impl Lane {
	fn new(book: OrderBook) -> Self {
		Self {
			book: Mutex::new(book),
			halted: AtomicBool::new(false),
		}
	}
}

/// Matching core entry point
pub struct Coordinator {
	repo: Arc<dyn Repository>,
	cache: Arc<dyn Cache>,
	config: EngineConfig,
	matcher: Matcher,
	lanes: DashMap<String, Arc<Lane>>,
	commit_hook: Option<CommitHook>,
}

impl Coordinator {
	/// Build the coordinator, rehydrating per-symbol books from the
	/// durable store (recovery never emits trades).
	pub async fn start(
		repo: Arc<dyn Repository>,
		cache: Arc<dyn Cache>,
		config: EngineConfig,
	) -> Result<Self, EngineError> {
		let books = recovery::rehydrate(repo.as_ref()).await?;
		let lanes = DashMap::new();
		for (symbol, book) in books {
			lanes.insert(symbol, Arc::new(Lane::new(book)));
		}
		let matcher = Matcher::new(config.match_page_size);
		Ok(Self {
			repo,
			cache,
			config,
			matcher,
			lanes,
			commit_hook: None,
		})
	}

	/// Install the post-commit hook. Must be called before the
	/// coordinator is shared.
	pub fn with_commit_hook(mut self, hook: CommitHook) -> Self {
		self.commit_hook = Some(hook);
		self
	}

	fn lane(&self, symbol: &str) -> Arc<Lane> {
		self.lanes
			.entry(symbol.to_string())
			.or_insert_with(|| Arc::new(Lane::new(OrderBook::new(symbol))))
			.clone()
	}

	/// Acquire the lane within the operation budget.
	async fn lock_lane<'a>(
		&self,
		lane: &'a Lane,
		deadline: Instant,
	) -> Result<MutexGuard<'a, OrderBook>, EngineError> {
		let remaining = deadline.saturating_duration_since(Instant::now());
		tokio::time::timeout(remaining, lane.book.lock())
			.await
			.map_err(|_| {
				EngineError::DeadlineExceeded("timed out waiting for symbol lane".into())
			})
	}

	fn ensure_live(&self, symbol: &str, lane: &Lane) -> Result<(), EngineError> {
		if lane.halted.load(Ordering::SeqCst) {
			return Err(EngineError::Internal(format!(
				"symbol {symbol} halted pending operator acknowledgement"
			)));
		}
		Ok(())
	}

	/// Submit an order and return the trades it executed, in execution
	/// order.
	///
	/// Resubmitting a (client_id, client_order_id) pair replays the
	/// recorded outcome instead of mutating anything.
	pub async fn submit_order(
		&self,
		cmd: OrderCommand,
		cancel: &CancellationToken,
	) -> Result<Vec<Trade>, EngineError> {
		let deadline = Instant::now() + self.config.match_budget();
		let client_id = cmd.client_id.clone();
		let client_order_id = cmd.client_order_id.clone();
		let symbol = cmd.symbol.clone();

		if let Some(coid) = &client_order_id
			&& let Some(existing) = self.repo.load_order_by_client_key(&client_id, coid).await?
		{
			debug!(order = %existing.id, client_order_id = %coid, "replaying recorded outcome");
			return Ok(self.repo.load_trades_for_order(existing.id).await?);
		}

		let lane = self.lane(&symbol);
		let mut book = self.lock_lane(&lane, deadline).await?;
		self.ensure_live(&symbol, &lane)?;

		let mut tx = self.repo.begin().await?;
		match self.matcher.submit(tx.as_mut(), cmd, cancel, deadline).await {
			Ok(outcome) => {
				tx.commit().await?;
				if outcome.timed_out {
					warn!(
						symbol = %symbol,
						order = %outcome.order.id,
						trades = outcome.trades.len(),
						"match budget exhausted; partial result committed"
					);
				}

				for passive in &outcome.touched {
					if passive.is_resting() {
						// Replace the stale copy with the committed row.
						book.insert(passive.clone());
					} else {
						book.remove(passive.id);
					}
				}
				if outcome.order.is_resting() {
					book.insert(outcome.order.clone());
				}

				debug!(
					symbol = %symbol,
					order = %outcome.order.id,
					status = ?outcome.order.status,
					trades = outcome.trades.len(),
					"submit committed"
				);
				self.finish_mutation(&symbol, &lane, &book, &outcome.trades)
					.await?;
				Ok(outcome.trades)
			}
			Err(err) => {
				if let Err(rb) = tx.rollback().await {
					warn!(symbol = %symbol, error = %rb, "rollback failed");
				}
				// Another process may have won the idempotency race
				// inside the transaction; resolve to its outcome.
				if err.kind() == ErrorKind::ConflictState
					&& let Some(coid) = &client_order_id
					&& let Ok(Some(existing)) =
						self.repo.load_order_by_client_key(&client_id, coid).await
				{
					return Ok(self.repo.load_trades_for_order(existing.id).await?);
				}
				Err(err)
			}
		}
	}

	/// Atomically replace price and quantity of an OPEN order.
	///
	/// The order loses its time priority; partially filled orders must
	/// be cancel-and-replaced instead.
	pub async fn modify_order(
		&self,
		order_id: Uuid,
		client_id: &str,
		new_price: Price,
		new_quantity: Quantity,
		cancel: &CancellationToken,
	) -> Result<(), EngineError> {
		let deadline = Instant::now() + self.config.match_budget();
		let existing = self
			.repo
			.load_order(order_id)
			.await?
			.ok_or_else(|| EngineError::NotFound(format!("order {order_id}")))?;
		let symbol = existing.symbol;

		let lane = self.lane(&symbol);
		let mut book = self.lock_lane(&lane, deadline).await?;
		self.ensure_live(&symbol, &lane)?;

		let mut tx = self.repo.begin().await?;
		let result = async {
			if cancel.is_cancelled() {
				return Err(EngineError::Canceled("modify cancelled before commit".into()));
			}
			self.matcher
				.modify(tx.as_mut(), order_id, client_id, new_price, new_quantity)
				.await
		}
		.await;
		match result {
			Ok(updated) => {
				tx.commit().await?;
				book.remove(order_id);
				book.insert(updated);
				info!(symbol = %symbol, order = %order_id, "order modified");
				self.finish_mutation(&symbol, &lane, &book, &[]).await
			}
			Err(err) => {
				if let Err(rb) = tx.rollback().await {
					warn!(symbol = %symbol, error = %rb, "rollback failed");
				}
				Err(err)
			}
		}
	}

	/// Cancel an order that is still OPEN or PARTIALLY_FILLED.
	pub async fn cancel_order(
		&self,
		order_id: Uuid,
		client_id: &str,
		cancel: &CancellationToken,
	) -> Result<(), EngineError> {
		let deadline = Instant::now() + self.config.match_budget();
		let existing = self
			.repo
			.load_order(order_id)
			.await?
			.ok_or_else(|| EngineError::NotFound(format!("order {order_id}")))?;
		let symbol = existing.symbol;

		let lane = self.lane(&symbol);
		let mut book = self.lock_lane(&lane, deadline).await?;
		self.ensure_live(&symbol, &lane)?;

		let mut tx = self.repo.begin().await?;
		let result = async {
			if cancel.is_cancelled() {
				return Err(EngineError::Canceled("cancel cancelled before commit".into()));
			}
			self.matcher.cancel(tx.as_mut(), order_id, client_id).await
		}
		.await;
		match result {
			Ok(_) => {
				tx.commit().await?;
				book.remove(order_id);
				info!(symbol = %symbol, order = %order_id, "order cancelled");
				self.finish_mutation(&symbol, &lane, &book, &[]).await
			}
			Err(err) => {
				if let Err(rb) = tx.rollback().await {
					warn!(symbol = %symbol, error = %rb, "rollback failed");
				}
				Err(err)
			}
		}
	}

	/// Authoritative order row by id.
	pub async fn get_order(&self, order_id: Uuid) -> Result<Order, EngineError> {
		self.repo
			.load_order(order_id)
			.await?
			.ok_or_else(|| EngineError::NotFound(format!("order {order_id}")))
	}

	/// All trades referencing an order, in execution order.
	pub async fn get_trades_for_order(&self, order_id: Uuid) -> Result<Vec<Trade>, EngineError> {
		if self.repo.load_order(order_id).await?.is_none() {
			return Err(EngineError::NotFound(format!("order {order_id}")));
		}
		Ok(self.repo.load_trades_for_order(order_id).await?)
	}

	/// Cache-first read of a symbol's book; misses rebuild from the
	/// store and repopulate the cache. The returned snapshot is the
	/// caller's copy.
	pub async fn get_orderbook(&self, symbol: &str) -> Result<OrderbookSnapshot, EngineError> {
		match self.cache.get_orderbook(symbol).await {
			Ok(Some(snapshot)) => return Ok(snapshot),
			Ok(None) => {}
			Err(err) => warn!(symbol, error = %err, "cache read failed"),
		}

		let snapshot = self.repo.load_top_of_book(symbol).await?;
		if let Err(err) = self.cache.set_orderbook(symbol, &snapshot).await {
			warn!(symbol, error = %err, "cache repopulate failed");
		}
		Ok(snapshot)
	}

	/// Capture the current view of a symbol's book under an opaque id,
	/// persisted durably and (best-effort) in the cache.
	pub async fn snapshot_orderbook(&self, symbol: &str) -> Result<Uuid, EngineError> {
		let snapshot = self.get_orderbook(symbol).await?;
		let snapshot_id = Uuid::new_v4();
		self.repo.save_snapshot(snapshot_id, &snapshot).await?;

		match serde_json::to_vec(&snapshot) {
			Ok(data) => {
				if let Err(err) = self
					.cache
					.set_snapshot(snapshot_id, data, self.config.snapshot_ttl())
					.await
				{
					warn!(symbol, error = %err, "snapshot cache write failed");
				}
			}
			Err(err) => warn!(symbol, error = %err, "snapshot serialization for cache failed"),
		}

		info!(symbol, snapshot = %snapshot_id, "order book snapshot captured");
		Ok(snapshot_id)
	}

	/// Make a named snapshot the live view for its symbol.
	///
	/// A restart-recovery action: it replaces the in-memory mirror and
	/// the cached book, not the authoritative order rows.
	pub async fn restore_orderbook(&self, snapshot_id: Uuid) -> Result<(), EngineError> {
		let cached = match self.cache.get_snapshot(snapshot_id).await {
			Ok(Some(data)) => match serde_json::from_slice::<OrderbookSnapshot>(&data) {
				Ok(snapshot) => Some(snapshot),
				Err(err) => {
					warn!(snapshot = %snapshot_id, error = %err, "cached snapshot corrupt");
					None
				}
			},
			Ok(None) => None,
			Err(err) => {
				warn!(snapshot = %snapshot_id, error = %err, "snapshot cache read failed");
				None
			}
		};
		let snapshot = match cached {
			Some(snapshot) => snapshot,
			None => self
				.repo
				.load_snapshot(snapshot_id)
				.await?
				.ok_or_else(|| EngineError::NotFound(format!("snapshot {snapshot_id}")))?,
		};

		let symbol = snapshot.symbol.clone();
		let deadline = Instant::now() + self.config.match_budget();
		let lane = self.lane(&symbol);
		let mut book = self.lock_lane(&lane, deadline).await?;

		let orders = snapshot.bids.into_iter().chain(snapshot.asks);
		*book = OrderBook::rebuild(&symbol, orders);
		if let Err(err) = self.cache.set_orderbook(&symbol, &book.snapshot()).await {
			warn!(symbol = %symbol, error = %err, "cache refresh failed after restore");
		}
		info!(symbol = %symbol, snapshot = %snapshot_id, "order book view restored");
		Ok(())
	}

	/// Operator acknowledgement of a halted symbol. Returns whether the
	/// symbol had been halted.
	pub fn acknowledge_symbol(&self, symbol: &str) -> bool {
		match self.lanes.get(symbol) {
			Some(lane) => {
				let was_halted = lane.halted.swap(false, Ordering::SeqCst);
				if was_halted {
					info!(symbol, "symbol halt acknowledged; mutations resume");
				}
				was_halted
			}
			None => false,
		}
	}

	/// Post-commit bookkeeping: invariant verification, cache refresh,
	/// hook fan-out. Runs only after a successful commit.
	async fn finish_mutation(
		&self,
		symbol: &str,
		lane: &Lane,
		book: &OrderBook,
		trades: &[Trade],
	) -> Result<(), EngineError> {
		if book.is_crossed() {
			lane.halted.store(true, Ordering::SeqCst);
			let best_bid = book.best_bid().map(|o| o.price.to_string()).unwrap_or_default();
			let best_ask = book.best_ask().map(|o| o.price.to_string()).unwrap_or_default();
			error!(
				symbol,
				best_bid = %best_bid,
				best_ask = %best_ask,
				"crossed book after commit; halting symbol"
			);
			return Err(EngineError::Internal(format!(
				"crossed book on {symbol}; symbol halted"
			)));
		}

		let snapshot = book.snapshot();
		if let Err(err) = self.cache.set_orderbook(symbol, &snapshot).await {
			warn!(symbol, error = %err, "cache refresh failed");
			if let Err(err) = self.cache.invalidate(symbol).await {
				warn!(symbol, error = %err, "cache invalidate failed");
			}
		}
		if let Some(hook) = &self.commit_hook {
			hook(trades, &snapshot);
		}
		Ok(())
	}
}

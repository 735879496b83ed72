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

mod memory;

use async_trait::async_trait;
use forge_sdk::{EngineError, Order, OrderbookSnapshot, Price, Quantity, Side, Trade};
use thiserror::Error;
use uuid::Uuid;

pub use memory::MemoryRepository;

/// Error types for repository operations
#[derive(Debug, Error)]
pub enum RepositoryError {
	#[error("order not found: {0}")]
	OrderNotFound(Uuid),
	#[error("order {0} not owned by client {1}")]
	WrongOwner(Uuid, String),
	#[error("duplicate client order id: {0}")]
	DuplicateClientOrder(String),
	#[error("conflicting order state: {0}")]
	Conflict(String),
	#[error("storage failure: {0}")]
	Storage(String),
}

impl From<RepositoryError> for EngineError {
	fn from(err: RepositoryError) -> Self {
		match err {
			RepositoryError::OrderNotFound(id) => EngineError::NotFound(format!("order {id}")),
			RepositoryError::WrongOwner(id, client) => {
				EngineError::PermissionDenied(format!("order {id} not owned by client {client}"))
			}
			RepositoryError::DuplicateClientOrder(key) => {
				EngineError::ConflictState(format!("client order id already used: {key}"))
			}
			RepositoryError::Conflict(msg) => EngineError::ConflictState(msg),
			RepositoryError::Storage(msg) => EngineError::Unavailable(msg),
		}
	}
}

/// Durable store contract for the matching core
///
/// The store is the single source of truth for orders, trades, and named
/// snapshots. Everything the matching loop writes goes through a
/// [`RepositoryTx`] opened at serialisable isolation; the plain methods
/// here are reads (plus snapshot persistence) used outside the loop.
///
/// This abstraction is implementation-agnostic: the in-memory
/// implementation below backs tests, a SQL store backs production, and
/// both must honor the same semantics.
#[async_trait]
pub trait Repository: Send + Sync {
	/// Open a serialisable transaction.
	async fn begin(&self) -> Result<Box<dyn RepositoryTx>, RepositoryError>;

	/// Resting orders for a symbol, FIFO by `created_at`.
	async fn load_open_orders(&self, symbol: &str) -> Result<Vec<Order>, RepositoryError>;

	async fn load_order(&self, order_id: Uuid) -> Result<Option<Order>, RepositoryError>;

	/// Look up an order by its idempotency key.
	async fn load_order_by_client_key(
		&self,
		client_id: &str,
		client_order_id: &str,
	) -> Result<Option<Order>, RepositoryError>;

	/// All trades referencing an order, in execution order.
	async fn load_trades_for_order(&self, order_id: Uuid) -> Result<Vec<Trade>, RepositoryError>;

	/// Build a best-first snapshot of a symbol's resting orders.
	async fn load_top_of_book(&self, symbol: &str) -> Result<OrderbookSnapshot, RepositoryError>;

	/// Distinct symbols with at least one order row; drives recovery.
	async fn list_symbols(&self) -> Result<Vec<String>, RepositoryError>;

	async fn save_snapshot(
		&self,
		snapshot_id: Uuid,
		snapshot: &OrderbookSnapshot,
	) -> Result<(), RepositoryError>;

	async fn load_snapshot(
		&self,
		snapshot_id: Uuid,
	) -> Result<Option<OrderbookSnapshot>, RepositoryError>;
}

/// One serialisable transaction
///
/// Candidate rows loaded here are locked until commit or rollback:
/// another aggressor cannot see them concurrently. Implementations with
/// real row locks use skip-locked reads so concurrent processes working
/// disjoint parts of a book both make progress. Dropping a transaction
/// without calling either finisher behaves like rollback.
#[async_trait]
pub trait RepositoryTx: Send {
	/// Persist a brand-new order. Fails with
	/// [`RepositoryError::DuplicateClientOrder`] when the
	/// (client_id, client_order_id) pair is already taken.
	async fn insert_order(&mut self, order: &Order) -> Result<(), RepositoryError>;

	/// Upsert an order row by id.
	async fn save_order(&mut self, order: &Order) -> Result<(), RepositoryError>;

	/// Append a trade; replays of the same trade id are no-ops.
	async fn save_trade(&mut self, trade: &Trade) -> Result<(), RepositoryError>;

	/// Load an order for update, verifying ownership.
	async fn load_order_for_client(
		&mut self,
		order_id: Uuid,
		client_id: &str,
	) -> Result<Order, RepositoryError>;

	/// Load up to `limit` resting orders on the side opposite the
	/// aggressor, in match priority (best price first, then earliest
	/// `created_at`, then id). `limit_price` filters candidates an
	/// aggressing limit order could legally trade with; market orders
	/// pass `None`.
	async fn load_candidates(
		&mut self,
		symbol: &str,
		aggressor: Side,
		limit_price: Option<Price>,
		limit: usize,
	) -> Result<Vec<Order>, RepositoryError>;

	/// Cancel a resting order owned by `client_id`, zeroing its remainder.
	async fn cancel_order(&mut self, order_id: Uuid, client_id: &str)
	-> Result<(), RepositoryError>;

	/// Replace price and quantity of an OPEN order owned by `client_id`.
	/// The priority timestamp resets to `timestamp`.
	async fn modify_order(
		&mut self,
		order_id: Uuid,
		client_id: &str,
		price: Price,
		quantity: Quantity,
		timestamp: i64,
	) -> Result<(), RepositoryError>;

	async fn commit(self: Box<Self>) -> Result<(), RepositoryError>;

	async fn rollback(self: Box<Self>) -> Result<(), RepositoryError>;
}

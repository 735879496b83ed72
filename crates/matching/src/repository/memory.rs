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

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard as StdMutexGuard};

use async_trait::async_trait;
use dashmap::DashMap;
use forge_sdk::snapshot::priority_cmp;
use forge_sdk::{Order, OrderStatus, OrderbookSnapshot, Price, Quantity, Side, Trade, now_nanos};
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::{Repository, RepositoryError, RepositoryTx};

/// One symbol's rows. The shard mutex is this store's row-lock domain:
/// a transaction holds it from first touch to commit or rollback, so
/// candidates it loaded cannot be seen by another aggressor meanwhile.
#[derive(Default)]
struct SymbolStore {
	orders: HashMap<Uuid, Order>,
	/// Append-only, in execution order.
	trades: Vec<Trade>,
	trade_ids: HashSet<Uuid>,
}

/// Cross-symbol bookkeeping, locked only for short lookups.
#[derive(Default)]
struct GlobalIndex {
	/// Order id -> symbol; which shard owns the row.
	order_symbols: HashMap<Uuid, String>,
	/// (client_id, client_order_id) -> order id; the idempotency index.
	/// Keys are reserved at insert time and released on rollback.
	client_keys: HashMap<(String, String), Uuid>,
	snapshots: HashMap<Uuid, OrderbookSnapshot>,
}

fn lock_index(
	index: &StdMutex<GlobalIndex>,
) -> Result<StdMutexGuard<'_, GlobalIndex>, RepositoryError> {
	index
		.lock()
		.map_err(|_| RepositoryError::Storage("index lock poisoned".into()))
}

/// In-memory implementation of the repository contract
///
/// Backs tests and local development with the same transactional
/// semantics production relies on. Rows are sharded by symbol behind a
/// keyed async mutex: a transaction locks only the shards it touches
/// and holds them until commit or rollback, so transactions on
/// unrelated symbols run concurrently while conflicting ones serialise
/// (the per-symbol analog of row locks with skip-locked reads). Writes
/// are staged and applied on commit; dropping a transaction discards
/// the stage, which is exactly rollback. The global index is locked
/// only for brief lookups, never across a shard acquisition.
pub struct MemoryRepository {
	shards: Arc<DashMap<String, Arc<Mutex<SymbolStore>>>>,
	index: Arc<StdMutex<GlobalIndex>>,
}

impl MemoryRepository {
	pub fn new() -> Self {
		Self {
			shards: Arc::new(DashMap::new()),
			index: Arc::new(StdMutex::new(GlobalIndex::default())),
		}
	}

	fn shard_handle(&self, symbol: &str) -> Arc<Mutex<SymbolStore>> {
		self.shards.entry(symbol.to_string()).or_default().clone()
	}
}

impl Default for MemoryRepository {
	fn default() -> Self {
		Self::new()
	}
}

struct MemoryTx {
	shards: Arc<DashMap<String, Arc<Mutex<SymbolStore>>>>,
	index: Arc<StdMutex<GlobalIndex>>,
	/// Shard locks held by this transaction, acquired on first touch.
	guards: HashMap<String, OwnedMutexGuard<SymbolStore>>,
	staged_orders: HashMap<Uuid, Order>,
	staged_trades: Vec<Trade>,
	/// Idempotency keys reserved by this transaction; released again if
	/// it does not commit.
	reserved_keys: Vec<(String, String)>,
	committed: bool,
}

impl MemoryTx {
	/// The shard for `symbol`, locking it if this transaction does not
	/// hold it yet. The engine touches exactly one symbol per
	/// transaction, so lock order across shards never cycles.
	async fn shard_mut(&mut self, symbol: &str) -> Result<&mut SymbolStore, RepositoryError> {
		if !self.guards.contains_key(symbol) {
			let handle = self.shards.entry(symbol.to_string()).or_default().clone();
			self.guards.insert(symbol.to_string(), handle.lock_owned().await);
		}
		self.guards
			.get_mut(symbol)
			.map(|guard| &mut **guard)
			.ok_or_else(|| RepositoryError::Storage(format!("lost shard lock for {symbol}")))
	}

	/// Committed row overlaid with this transaction's staged write.
	async fn visible(&mut self, order_id: Uuid) -> Result<Option<Order>, RepositoryError> {
		if let Some(order) = self.staged_orders.get(&order_id) {
			return Ok(Some(order.clone()));
		}
		let symbol = {
			let index = lock_index(&self.index)?;
			index.order_symbols.get(&order_id).cloned()
		};
		let Some(symbol) = symbol else {
			return Ok(None);
		};
		let shard = self.shard_mut(&symbol).await?;
		Ok(shard.orders.get(&order_id).cloned())
	}
}

#[async_trait]
impl RepositoryTx for MemoryTx {
	async fn insert_order(&mut self, order: &Order) -> Result<(), RepositoryError> {
		if self.visible(order.id).await?.is_some() {
			return Err(RepositoryError::Conflict(format!(
				"order id already exists: {}",
				order.id
			)));
		}
		if let Some(coid) = &order.client_order_id {
			let key = (order.client_id.clone(), coid.clone());
			{
				let mut index = lock_index(&self.index)?;
				if index.client_keys.contains_key(&key) {
					return Err(RepositoryError::DuplicateClientOrder(coid.clone()));
				}
				index.client_keys.insert(key.clone(), order.id);
			}
			self.reserved_keys.push(key);
		}
		self.shard_mut(&order.symbol).await?;
		self.staged_orders.insert(order.id, order.clone());
		Ok(())
	}

	async fn save_order(&mut self, order: &Order) -> Result<(), RepositoryError> {
		self.shard_mut(&order.symbol).await?;
		self.staged_orders.insert(order.id, order.clone());
		Ok(())
	}

	async fn save_trade(&mut self, trade: &Trade) -> Result<(), RepositoryError> {
		if self.staged_trades.iter().any(|t| t.id == trade.id) {
			return Ok(());
		}
		let shard = self.shard_mut(&trade.symbol).await?;
		if shard.trade_ids.contains(&trade.id) {
			return Ok(());
		}
		self.staged_trades.push(trade.clone());
		Ok(())
	}

	async fn load_order_for_client(
		&mut self,
		order_id: Uuid,
		client_id: &str,
	) -> Result<Order, RepositoryError> {
		let order = self
			.visible(order_id)
			.await?
			.ok_or(RepositoryError::OrderNotFound(order_id))?;
		if order.client_id != client_id {
			return Err(RepositoryError::WrongOwner(order_id, client_id.to_string()));
		}
		Ok(order)
	}

	async fn load_candidates(
		&mut self,
		symbol: &str,
		aggressor: Side,
		limit_price: Option<Price>,
		limit: usize,
	) -> Result<Vec<Order>, RepositoryError> {
		let passive_side = aggressor.opposite();
		let staged: Vec<Order> = self
			.staged_orders
			.values()
			.filter(|o| o.symbol == symbol)
			.cloned()
			.collect();
		let staged_ids: HashSet<Uuid> = staged.iter().map(|o| o.id).collect();

		let shard = self.shard_mut(symbol).await?;
		let mut candidates: Vec<Order> = shard
			.orders
			.values()
			.filter(|o| !staged_ids.contains(&o.id))
			.cloned()
			.chain(staged)
			.filter(|o| o.side == passive_side && o.is_resting())
			.filter(|o| match (aggressor, limit_price) {
				(_, None) => true,
				(Side::Buy, Some(lp)) => o.price <= lp,
				(Side::Sell, Some(lp)) => o.price >= lp,
			})
			.collect();
		candidates.sort_by(|a, b| priority_cmp(passive_side, a, b));
		candidates.truncate(limit);
		Ok(candidates)
	}

	async fn cancel_order(
		&mut self,
		order_id: Uuid,
		client_id: &str,
	) -> Result<(), RepositoryError> {
		let mut order = self.load_order_for_client(order_id, client_id).await?;
		if !order.is_resting() {
			return Err(RepositoryError::Conflict(format!(
				"cannot cancel order in state {:?}",
				order.status
			)));
		}
		order.cancel(now_nanos());
		self.staged_orders.insert(order.id, order);
		Ok(())
	}

	async fn modify_order(
		&mut self,
		order_id: Uuid,
		client_id: &str,
		price: Price,
		quantity: Quantity,
		timestamp: i64,
	) -> Result<(), RepositoryError> {
		let mut order = self.load_order_for_client(order_id, client_id).await?;
		if order.status != OrderStatus::Open {
			return Err(RepositoryError::Conflict(format!(
				"cannot modify order in state {:?}",
				order.status
			)));
		}
		order.price = price;
		order.quantity = quantity;
		order.remaining = quantity;
		// Priority resets: the store orders candidates by created_at.
		order.created_at = timestamp;
		order.updated_at = timestamp;
		self.staged_orders.insert(order.id, order);
		Ok(())
	}

	async fn commit(mut self: Box<Self>) -> Result<(), RepositoryError> {
		let staged_orders = std::mem::take(&mut self.staged_orders);
		let staged_trades = std::mem::take(&mut self.staged_trades);

		{
			let mut index = lock_index(&self.index)?;
			for (id, order) in &staged_orders {
				index.order_symbols.insert(*id, order.symbol.clone());
			}
		}
		for (id, order) in staged_orders {
			let symbol = order.symbol.clone();
			let shard = self.shard_mut(&symbol).await?;
			shard.orders.insert(id, order);
		}
		for trade in staged_trades {
			let symbol = trade.symbol.clone();
			let shard = self.shard_mut(&symbol).await?;
			if shard.trade_ids.insert(trade.id) {
				shard.trades.push(trade);
			}
		}
		self.committed = true;
		Ok(())
	}

	async fn rollback(self: Box<Self>) -> Result<(), RepositoryError> {
		// Dropping the stage and the shard locks is the whole rollback;
		// reserved idempotency keys are released in Drop.
		Ok(())
	}
}

impl Drop for MemoryTx {
	fn drop(&mut self) {
		if self.committed {
			return;
		}
		if let Ok(mut index) = self.index.lock() {
			for key in self.reserved_keys.drain(..) {
				index.client_keys.remove(&key);
			}
		}
	}
}

#[async_trait]
impl Repository for MemoryRepository {
	async fn begin(&self) -> Result<Box<dyn RepositoryTx>, RepositoryError> {
		Ok(Box::new(MemoryTx {
			shards: self.shards.clone(),
			index: self.index.clone(),
			guards: HashMap::new(),
			staged_orders: HashMap::new(),
			staged_trades: Vec::new(),
			reserved_keys: Vec::new(),
			committed: false,
		}))
	}

	async fn load_open_orders(&self, symbol: &str) -> Result<Vec<Order>, RepositoryError> {
		let shard = self.shard_handle(symbol);
		let shard = shard.lock().await;
		let mut orders: Vec<Order> = shard
			.orders
			.values()
			.filter(|o| o.is_resting())
			.cloned()
			.collect();
		orders.sort_by_key(|o| (o.created_at, o.id));
		Ok(orders)
	}

	async fn load_order(&self, order_id: Uuid) -> Result<Option<Order>, RepositoryError> {
		let symbol = {
			let index = lock_index(&self.index)?;
			index.order_symbols.get(&order_id).cloned()
		};
		let Some(symbol) = symbol else {
			return Ok(None);
		};
		let shard = self.shard_handle(&symbol);
		let shard = shard.lock().await;
		Ok(shard.orders.get(&order_id).cloned())
	}

	async fn load_order_by_client_key(
		&self,
		client_id: &str,
		client_order_id: &str,
	) -> Result<Option<Order>, RepositoryError> {
		let key = (client_id.to_string(), client_order_id.to_string());
		let order_id = {
			let index = lock_index(&self.index)?;
			index.client_keys.get(&key).copied()
		};
		match order_id {
			Some(order_id) => self.load_order(order_id).await,
			None => Ok(None),
		}
	}

	async fn load_trades_for_order(&self, order_id: Uuid) -> Result<Vec<Trade>, RepositoryError> {
		let symbol = {
			let index = lock_index(&self.index)?;
			index.order_symbols.get(&order_id).cloned()
		};
		let Some(symbol) = symbol else {
			return Ok(Vec::new());
		};
		let shard = self.shard_handle(&symbol);
		let shard = shard.lock().await;
		Ok(shard
			.trades
			.iter()
			.filter(|t| t.involves(order_id))
			.cloned()
			.collect())
	}

	async fn load_top_of_book(&self, symbol: &str) -> Result<OrderbookSnapshot, RepositoryError> {
		let shard = self.shard_handle(symbol);
		let shard = shard.lock().await;
		let mut snapshot = OrderbookSnapshot::empty(symbol);
		for order in shard.orders.values() {
			if !order.is_resting() {
				continue;
			}
			match order.side {
				Side::Buy => snapshot.bids.push(order.clone()),
				Side::Sell => snapshot.asks.push(order.clone()),
			}
		}
		snapshot.sort();
		Ok(snapshot)
	}

	async fn list_symbols(&self) -> Result<Vec<String>, RepositoryError> {
		let handles: Vec<(String, Arc<Mutex<SymbolStore>>)> = self
			.shards
			.iter()
			.map(|entry| (entry.key().clone(), entry.value().clone()))
			.collect();
		let mut symbols = BTreeSet::new();
		for (symbol, shard) in handles {
			if !shard.lock().await.orders.is_empty() {
				symbols.insert(symbol);
			}
		}
		Ok(symbols.into_iter().collect())
	}

	async fn save_snapshot(
		&self,
		snapshot_id: Uuid,
		snapshot: &OrderbookSnapshot,
	) -> Result<(), RepositoryError> {
		let mut index = lock_index(&self.index)?;
		index.snapshots.insert(snapshot_id, snapshot.clone());
		Ok(())
	}

	async fn load_snapshot(
		&self,
		snapshot_id: Uuid,
	) -> Result<Option<OrderbookSnapshot>, RepositoryError> {
		let index = lock_index(&self.index)?;
		Ok(index.snapshots.get(&snapshot_id).cloned())
	}
}

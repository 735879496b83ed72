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

use std::time::Duration;

use async_trait::async_trait;
use forge_sdk::OrderbookSnapshot;
use thiserror::Error;
use uuid::Uuid;

pub use memory::MemoryCache;

/// Error types for cache operations
///
/// Cache errors never fail a core operation; callers log and move on.
#[derive(Debug, Error)]
pub enum CacheError {
	#[error("cache encoding: {0}")]
	Encoding(#[from] serde_json::Error),
	#[error("cache storage: {0}")]
	Storage(String),
}

/// Advisory read-through cache for book snapshots
///
/// Strictly advisory: the cache may miss or return stale data, and
/// matching correctness never depends on its content. The coordinator
/// writes through after every commit, last writer wins.
///
/// Key shape, shared with external cache implementations:
/// `ob:<symbol>` for live books, `snapshot:<id>` for named snapshots.
#[async_trait]
pub trait Cache: Send + Sync {
	async fn set_orderbook(
		&self,
		symbol: &str,
		snapshot: &OrderbookSnapshot,
	) -> Result<(), CacheError>;

	async fn get_orderbook(&self, symbol: &str) -> Result<Option<OrderbookSnapshot>, CacheError>;

	async fn invalidate(&self, symbol: &str) -> Result<(), CacheError>;

	/// Store a named snapshot's serialized bytes under a TTL.
	async fn set_snapshot(
		&self,
		snapshot_id: Uuid,
		data: Vec<u8>,
		ttl: Duration,
	) -> Result<(), CacheError>;

	async fn get_snapshot(&self, snapshot_id: Uuid) -> Result<Option<Vec<u8>>, CacheError>;
}

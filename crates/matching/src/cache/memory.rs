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

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use forge_sdk::OrderbookSnapshot;
use uuid::Uuid;

use super::{Cache, CacheError};

fn book_key(symbol: &str) -> String {
	format!("ob:{symbol}")
}

fn snapshot_key(snapshot_id: Uuid) -> String {
	format!("snapshot:{snapshot_id}")
}

struct Entry {
	data: Vec<u8>,
	expires_at: Instant,
}

/// In-memory cache implementation
///
/// Payloads are stored as serialized JSON under the same keys an
/// external cache would use, so swapping the backing store changes no
/// observable behavior. Expired entries are dropped lazily on read.
pub struct MemoryCache {
	entries: DashMap<String, Entry>,
	book_ttl: Duration,
}

impl MemoryCache {
	pub fn new(book_ttl: Duration) -> Self {
		Self {
			entries: DashMap::new(),
			book_ttl,
		}
	}

	fn get_live(&self, key: &str) -> Option<Vec<u8>> {
		let expired = match self.entries.get(key) {
			Some(entry) if entry.expires_at > Instant::now() => return Some(entry.data.clone()),
			Some(_) => true,
			None => false,
		};
		if expired {
			self.entries.remove(key);
		}
		None
	}

	fn put(&self, key: String, data: Vec<u8>, ttl: Duration) {
		self.entries.insert(
			key,
			Entry {
				data,
				expires_at: Instant::now() + ttl,
			},
		);
	}
}

#[async_trait]
impl Cache for MemoryCache {
	async fn set_orderbook(
		&self,
		symbol: &str,
		snapshot: &OrderbookSnapshot,
	) -> Result<(), CacheError> {
		let data = serde_json::to_vec(snapshot)?;
		self.put(book_key(symbol), data, self.book_ttl);
		Ok(())
	}

	async fn get_orderbook(&self, symbol: &str) -> Result<Option<OrderbookSnapshot>, CacheError> {
		match self.get_live(&book_key(symbol)) {
			Some(data) => Ok(Some(serde_json::from_slice(&data)?)),
			None => Ok(None),
		}
	}

	async fn invalidate(&self, symbol: &str) -> Result<(), CacheError> {
		self.entries.remove(&book_key(symbol));
		Ok(())
	}

	async fn set_snapshot(
		&self,
		snapshot_id: Uuid,
		data: Vec<u8>,
		ttl: Duration,
	) -> Result<(), CacheError> {
		self.put(snapshot_key(snapshot_id), data, ttl);
		Ok(())
	}

	async fn get_snapshot(&self, snapshot_id: Uuid) -> Result<Option<Vec<u8>>, CacheError> {
		Ok(self.get_live(&snapshot_key(snapshot_id)))
	}
}

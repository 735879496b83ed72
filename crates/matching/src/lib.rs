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

//! Forge Matching Core
//!
//! A continuous limit-order-book matching engine for a multi-symbol
//! exchange: per-symbol price-time priority books, limit and market
//! matching with partial fills, and atomic persistence of every
//! submission's effects under one serialisable transaction.
//!
//! Architecture:
//! - Per-symbol lanes serialise mutations; symbols run in parallel
//! - The durable store (repository port) is the single source of truth
//! - In-memory books are derived mirrors, rebuilt from the store on start
//! - The cache port is advisory: read-through snapshots, never consulted
//!   for matching correctness
//! - Transport adapters sit on top of the coordinator and are out of
//!   scope here

pub mod cache;
pub mod config;
pub mod coordinator;
pub mod engine;
pub mod orderbook;
pub mod recovery;
pub mod repository;

pub use cache::{Cache, CacheError, MemoryCache};
pub use config::EngineConfig;
pub use coordinator::{CommitHook, Coordinator};
pub use engine::{Matcher, SubmitOutcome};
pub use orderbook::{OrderBook, PriceLevel};
pub use repository::{MemoryRepository, Repository, RepositoryError, RepositoryTx};

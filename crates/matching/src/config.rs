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

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Matching core configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
	/// Candidates loaded per batch in the matching loop.
	pub match_page_size: usize,
	/// Wall-clock budget per mutating operation, milliseconds.
	pub match_budget_ms: u64,
	/// TTL for cached book snapshots, seconds.
	pub cache_ttl_secs: u64,
	/// TTL for named snapshots in the cache, seconds.
	pub snapshot_ttl_secs: u64,
}

impl Default for EngineConfig {
	fn default() -> Self {
		Self {
			match_page_size: 200,
			match_budget_ms: 2_000,
			cache_ttl_secs: 300,
			snapshot_ttl_secs: 86_400,
		}
	}
}

impl EngineConfig {
	/// Load configuration from environment variables (FORGE_ prefix).
	pub fn from_env() -> Result<Self, config::ConfigError> {
		let cfg = config::Config::builder()
			.add_source(config::Config::try_from(&Self::default())?)
			.add_source(config::Environment::with_prefix("FORGE"))
			.build()?;

		cfg.try_deserialize()
	}

	/// Load configuration from file, with environment override.
	pub fn from_file(path: &str) -> Result<Self, config::ConfigError> {
		let cfg = config::Config::builder()
			.add_source(config::Config::try_from(&Self::default())?)
			.add_source(config::File::with_name(path))
			.add_source(config::Environment::with_prefix("FORGE"))
			.build()?;

		cfg.try_deserialize()
	}

	pub fn match_budget(&self) -> Duration {
		Duration::from_millis(self.match_budget_ms)
	}

	pub fn cache_ttl(&self) -> Duration {
		Duration::from_secs(self.cache_ttl_secs)
	}

	pub fn snapshot_ttl(&self) -> Duration {
		Duration::from_secs(self.snapshot_ttl_secs)
	}
}

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

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::numeric::{Price, Quantity};

/// Executed trade
///
/// Produced only by the matching loop and immutable from creation.
/// The price is always the resting (passive) order's price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
	pub id: Uuid,
	pub symbol: String,
	pub buy_order: Uuid,
	pub sell_order: Uuid,
	pub price: Price,
	pub quantity: Quantity,
	/// Unix nanos at execution.
	pub executed_at: i64,
}

impl Trade {
	/// Whether this trade references the given order on either side.
	pub fn involves(&self, order_id: Uuid) -> bool {
		self.buy_order == order_id || self.sell_order == order_id
	}

	/// The order on the other side of `order_id`.
	pub fn counterparty(&self, order_id: Uuid) -> Option<Uuid> {
		if self.buy_order == order_id {
			Some(self.sell_order)
		} else if self.sell_order == order_id {
			Some(self.buy_order)
		} else {
			None
		}
	}
}

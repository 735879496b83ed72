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

//! Forge SDK
//!
//! Shared domain types for the forge matching core: fixed-point
//! price/quantity arithmetic, the order and trade model, order book
//! snapshots, and the error taxonomy exposed to transport adapters.
//!
//! This crate is deliberately free of I/O and async machinery so that
//! every consumer (engine, adapters, tests) agrees on one value model.

pub mod errors;
pub mod numeric;
pub mod order;
pub mod snapshot;
pub mod time;
pub mod trade;

pub use errors::{EngineError, ErrorKind};
pub use numeric::{NumericError, Price, Quantity};
pub use order::{Order, OrderCommand, OrderStatus, OrderType, Side};
pub use snapshot::OrderbookSnapshot;
pub use time::now_nanos;
pub use trade::Trade;

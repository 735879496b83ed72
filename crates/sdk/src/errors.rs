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

//! Error taxonomy for the matching core
//!
//! Every error the core returns carries a stable [`ErrorKind`] tag plus a
//! human-readable message, so transport adapters can map outcomes onto
//! their wire status codes without string matching.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable error kind tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
	InvalidArgument,
	NotFound,
	PermissionDenied,
	ConflictState,
	Canceled,
	DeadlineExceeded,
	Unavailable,
	Internal,
}

/// Error type returned by every core operation
#[derive(Debug, Error)]
pub enum EngineError {
	/// Bad side/type, non-positive price/quantity, missing field.
	#[error("invalid argument: {0}")]
	InvalidArgument(String),
	/// Unknown order, snapshot, or symbol.
	#[error("not found: {0}")]
	NotFound(String),
	/// Client does not own the order it tries to modify or cancel.
	#[error("permission denied: {0}")]
	PermissionDenied(String),
	/// Operation conflicts with the order's current lifecycle state,
	/// or an idempotency key collided.
	#[error("conflicting state: {0}")]
	ConflictState(String),
	/// Caller cancelled before commit; nothing was persisted.
	#[error("operation canceled: {0}")]
	Canceled(String),
	/// The operation budget elapsed before the transaction opened.
	#[error("deadline exceeded: {0}")]
	DeadlineExceeded(String),
	/// Durable store failure; the transaction rolled back.
	#[error("store unavailable: {0}")]
	Unavailable(String),
	/// Post-commit invariant breach. Should be unreachable; the symbol
	/// is halted until an operator acknowledges.
	#[error("internal: {0}")]
	Internal(String),
}

impl EngineError {
	pub fn kind(&self) -> ErrorKind {
		match self {
			EngineError::InvalidArgument(_) => ErrorKind::InvalidArgument,
			EngineError::NotFound(_) => ErrorKind::NotFound,
			EngineError::PermissionDenied(_) => ErrorKind::PermissionDenied,
			EngineError::ConflictState(_) => ErrorKind::ConflictState,
			EngineError::Canceled(_) => ErrorKind::Canceled,
			EngineError::DeadlineExceeded(_) => ErrorKind::DeadlineExceeded,
			EngineError::Unavailable(_) => ErrorKind::Unavailable,
			EngineError::Internal(_) => ErrorKind::Internal,
		}
	}

	/// Whether a caller may safely retry the operation as-is.
	///
	/// Retries of submissions are only lossless when the command carries
	/// a client order id; the store's uniqueness guarantee then collapses
	/// the replay onto the recorded outcome.
	pub fn is_retryable(&self) -> bool {
		matches!(self.kind(), ErrorKind::Unavailable | ErrorKind::Canceled)
	}
}

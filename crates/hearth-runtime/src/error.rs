// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use hearth_store::StoreError;

/// Result type for runtime manager operations
pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Errors surfaced by the lifecycle, template, background and blackboard
/// managers.  Tool handlers convert every variant into an `Error: ...`
/// string; nothing here ever crosses into the iteration loop as a panic.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("limit exceeded: {0}")]
    LimitExceeded(String),

    /// An operation was applied to a record in the wrong state, e.g.
    /// reviving an agent that was never dismissed.
    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
/// Result type for store operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors surfaced by the persistence layer.
///
/// Callers treat a failed read as missing data and a failed write as a
/// failed operation; there is no retry at this layer.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The underlying SQL engine or its I/O failed.
    #[error("storage unavailable: {0}")]
    Unavailable(#[from] rusqlite::Error),

    /// A stored value could not be decoded (corrupt JSON column, unknown
    /// status string).
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

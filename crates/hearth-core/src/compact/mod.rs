// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Deterministic text stages of the compaction pipeline.
//!
//! The driver in the runtime crate feeds old conversation messages through
//! rule-based pre-compression ([`rules`]), drops near-duplicate messages by
//! shingle similarity ([`dedup`]), budgets and truncates by estimated
//! tokens ([`tokens`]), and distills the LLM summary into priority tiers
//! ([`tiers`]).  Everything here is pure string-in/string-out.

pub mod dedup;
pub mod rules;
pub mod tiers;
pub mod tokens;

pub use dedup::{dedup_messages, jaccard_similarity};
pub use rules::precompress;
pub use tiers::derive_tier;
pub use tokens::{estimate_tokens, truncate_to_tokens};

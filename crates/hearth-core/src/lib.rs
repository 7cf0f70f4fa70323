// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod bus;
pub mod compact;
mod matcher;
pub mod prompts;
mod queue;
mod turn;

pub use bus::{topics, BusEvent, EventBus, Subscription};
pub use matcher::{tokenize, BestMatch, HybridMatcher};
pub use prompts::{inbox_note, primary_system_prompt, sub_agent_system_prompt, Orientation};
pub use queue::SessionQueue;
pub use turn::{run_turn, TurnConfig, TurnResult};

// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod mock;
mod provider;
mod types;

pub use mock::{EchoProvider, ScriptedProvider, ScriptedReply};
pub use provider::Provider;
pub use types::{ChatResponse, Message, Role, ToolCallRequest, ToolSchema};

// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;

use crate::{ChatResponse, Message, ToolSchema};

/// The seam between the runtime and a concrete LLM backend.
///
/// A provider answers one chat call with either a final text response or a
/// batch of tool invocations ([`ChatResponse`]).  Network errors and API
/// failures propagate as `Err`; the iteration loop converts them into a
/// failed turn rather than letting them escape to callers.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Stable identifier recorded on turn results (e.g. `"anthropic"`).
    fn id(&self) -> &str;

    /// Human-readable name for status display.
    fn name(&self) -> &str;

    /// Send the conversation and available tool schemas, get one response.
    async fn chat(
        &self,
        messages: &[Message],
        tools: &[ToolSchema],
    ) -> anyhow::Result<ChatResponse>;

    /// Cheap liveness check used when picking a provider at startup.
    fn is_available(&self) -> bool {
        true
    }
}

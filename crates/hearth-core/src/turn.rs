// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use hearth_model::{ChatResponse, Message, Provider, ToolCallRequest, ToolSchema};
use hearth_tools::{ToolCall, ToolRegistry};

/// Everything needed to drive one conversation turn to completion.
pub struct TurnConfig {
    pub provider: Arc<dyn Provider>,
    pub system_prompt: String,
    /// Conversation so far plus the new user message (no system message —
    /// that is prepended from `system_prompt`).
    pub messages: Vec<Message>,
    pub tools: Arc<ToolRegistry>,
    pub max_iterations: u32,
    /// Races against the whole loop, not per iteration.
    pub timeout: Duration,
}

/// Outcome of one turn.  Never an `Err`: provider failures, the iteration
/// cap and the timeout are all folded into `success = false` so the caller
/// can keep serving subsequent turns.
#[derive(Debug, Clone)]
pub struct TurnResult {
    pub success: bool,
    pub response: String,
    pub iterations: u32,
    pub provider_id: String,
    /// The full transcript including appended assistant and tool messages.
    pub messages: Vec<Message>,
}

/// Drive the model ↔ tool loop until the model produces a final text
/// response, the iteration cap is reached, or the overall timeout elapses.
pub async fn run_turn(config: TurnConfig) -> TurnResult {
    let provider_id = config.provider.id().to_string();
    let timeout = config.timeout;
    let fallback_messages = config.messages.clone();
    let max_iterations = config.max_iterations;

    match tokio::time::timeout(timeout, run_loop(config)).await {
        Ok(result) => result,
        Err(_) => TurnResult {
            success: false,
            response: "timed out".into(),
            iterations: max_iterations,
            provider_id,
            messages: fallback_messages,
        },
    }
}

async fn run_loop(config: TurnConfig) -> TurnResult {
    let TurnConfig {
        provider,
        system_prompt,
        messages: seed,
        tools,
        max_iterations,
        ..
    } = config;

    let provider_id = provider.id().to_string();
    let schemas: Vec<ToolSchema> = tools
        .schemas()
        .into_iter()
        .map(|s| ToolSchema {
            name: s.name,
            description: s.description,
            parameters: s.parameters,
        })
        .collect();

    let mut messages = Vec::with_capacity(seed.len() + 1);
    messages.push(Message::system(system_prompt));
    messages.extend(seed);

    let mut iterations = 0u32;
    loop {
        if iterations >= max_iterations {
            return TurnResult {
                success: false,
                response: "reached maximum iterations".into(),
                iterations,
                provider_id,
                messages,
            };
        }
        iterations += 1;

        let response = match provider.chat(&messages, &schemas).await {
            Ok(r) => r,
            Err(e) => {
                warn!(iteration = iterations, error = %e, "provider call failed");
                return TurnResult {
                    success: false,
                    response: e.to_string(),
                    iterations,
                    provider_id,
                    messages,
                };
            }
        };

        let calls = match response {
            ChatResponse::ToolCalls(calls) => calls,
            ChatResponse::Text(text) => {
                // Some providers cannot emit native tool calls and write
                // them as JSON into the text instead.  Scan for that shape
                // before accepting the text as final.
                match extract_embedded_calls(&text, iterations) {
                    Some((preamble, calls)) => {
                        debug!(
                            iteration = iterations,
                            count = calls.len(),
                            "recovered tool calls embedded in text response"
                        );
                        let mut msg = Message::assistant_tool_calls(calls.clone());
                        msg.content = preamble;
                        messages.push(msg);
                        execute_calls(&tools, &calls, &mut messages).await;
                        continue;
                    }
                    None => {
                        messages.push(Message::assistant(&text));
                        return TurnResult {
                            success: true,
                            response: text,
                            iterations,
                            provider_id,
                            messages,
                        };
                    }
                }
            }
        };

        messages.push(Message::assistant_tool_calls(calls.clone()));
        execute_calls(&tools, &calls, &mut messages).await;
    }
}

/// Execute each requested call and append its result as a tool message.
/// Unknown tools and handler failures become error-string results; the
/// next iteration lets the model read them and recover.
async fn execute_calls(
    tools: &ToolRegistry,
    calls: &[ToolCallRequest],
    messages: &mut Vec<Message>,
) {
    for call in calls {
        let output = tools
            .execute(&ToolCall {
                id: call.id.clone(),
                name: call.name.clone(),
                args: call.arguments.clone(),
            })
            .await;
        messages.push(Message::tool_result(&call.id, output.content));
    }
}

/// Recognized argument-container keys, tried in order.
const ARG_KEYS: &[&str] = &["arguments", "args", "parameters", "input"];

/// Scan a text response for an embedded JSON tool call: the slice from the
/// first `{` to the last `}` must parse as an object carrying a recognized
/// tool-call shape (`tool`, `action`, `name` + known signal keys, or a
/// `tool_calls` array).  Surrounding text is peeled off as a preamble /
/// postscript and preserved on the assistant message.
fn extract_embedded_calls(text: &str, iteration: u32) -> Option<(String, Vec<ToolCallRequest>)> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    let candidate = &text[start..=end];
    let value: serde_json::Value = serde_json::from_str(candidate).ok()?;
    let obj = value.as_object()?;

    let looks_like_call = obj.contains_key("tool")
        || obj.contains_key("action")
        || obj.contains_key("tool_calls")
        || obj.contains_key("file_path");
    if !looks_like_call {
        return None;
    }

    let preamble = format!("{}{}", &text[..start], &text[end + 1..])
        .trim()
        .to_string();

    // Batch shape: {"tool_calls": [{"name"|"tool": ..., "arguments": {...}}, ...]}
    if let Some(batch) = obj.get("tool_calls").and_then(|v| v.as_array()) {
        let calls: Vec<ToolCallRequest> = batch
            .iter()
            .enumerate()
            .filter_map(|(i, entry)| {
                let entry = entry.as_object()?;
                let name = entry
                    .get("name")
                    .or_else(|| entry.get("tool"))
                    .and_then(|v| v.as_str())?;
                Some(ToolCallRequest {
                    id: format!("embedded-{iteration}-{i}"),
                    name: name.to_string(),
                    arguments: extract_arguments(entry),
                })
            })
            .collect();
        if calls.is_empty() {
            return None;
        }
        return Some((preamble, calls));
    }

    // Single-call shape: {"tool"|"action": "name", "arguments": {...}}
    let name = obj
        .get("tool")
        .or_else(|| obj.get("action"))
        .and_then(|v| v.as_str())?;
    Some((
        preamble,
        vec![ToolCallRequest {
            id: format!("embedded-{iteration}-0"),
            name: name.to_string(),
            arguments: extract_arguments(obj),
        }],
    ))
}

/// Pull the argument object out of a call-shaped JSON object.  Falls back
/// to the object itself (minus the naming keys) when no argument container
/// is present, which covers flat shapes like `{"tool": "x", "file_path": y}`.
fn extract_arguments(obj: &serde_json::Map<String, serde_json::Value>) -> serde_json::Value {
    for key in ARG_KEYS {
        if let Some(args) = obj.get(*key) {
            if args.is_object() {
                return args.clone();
            }
        }
    }
    let mut rest = obj.clone();
    rest.remove("tool");
    rest.remove("action");
    rest.remove("name");
    serde_json::Value::Object(rest)
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

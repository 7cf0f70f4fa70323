// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::Value;

/// A single tool invocation requested by the model.
#[derive(Debug, Clone)]
pub struct ToolCall {
    /// Opaque identifier returned by the model (forwarded verbatim)
    pub id: String,
    pub name: String,
    /// Parsed JSON arguments
    pub args: Value,
}

/// The result of executing a tool.
///
/// Tool handlers never raise: a failed execution is an `is_error` output
/// whose content starts with `Error:`, so the model can read the failure
/// and recover on the next iteration instead of crashing the loop.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub call_id: String,
    pub content: String,
    pub is_error: bool,
}

impl ToolOutput {
    /// Successful plain-text result.
    pub fn ok(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            content: content.into(),
            is_error: false,
        }
    }

    /// Error result.  The content is prefixed with `Error:` unless the
    /// caller already did so.
    pub fn err(call_id: impl Into<String>, msg: impl Into<String>) -> Self {
        let text = msg.into();
        let content = if text.starts_with("Error:") {
            text
        } else {
            format!("Error: {text}")
        };
        Self {
            call_id: call_id.into(),
            content,
            is_error: true,
        }
    }
}

/// Trait that every agent-callable tool must implement.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// JSON Schema for parameters
    fn parameters_schema(&self) -> Value;
    /// Execute the tool.  Failures must be wrapped in [`ToolOutput::err`],
    /// never returned as panics or propagated errors.
    async fn execute(&self, call: &ToolCall) -> ToolOutput;
}

/// Fetch a required non-empty string argument, or produce the uniform
/// missing-parameter error message used by every tool handler.
pub fn require_str<'a>(args: &'a Value, key: &str) -> Result<&'a str, String> {
    match args.get(key).and_then(|v| v.as_str()) {
        Some(s) if !s.trim().is_empty() => Ok(s),
        _ => Err(format!("missing or empty required parameter '{key}'")),
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn ok_output_is_not_error() {
        let out = ToolOutput::ok("1", "fine");
        assert!(!out.is_error);
        assert_eq!(out.content, "fine");
    }

    #[test]
    fn err_output_gets_error_prefix() {
        let out = ToolOutput::err("1", "it broke");
        assert!(out.is_error);
        assert_eq!(out.content, "Error: it broke");
    }

    #[test]
    fn err_output_does_not_double_prefix() {
        let out = ToolOutput::err("1", "Error: already prefixed");
        assert_eq!(out.content, "Error: already prefixed");
    }

    #[test]
    fn require_str_accepts_non_empty() {
        let args = json!({"task": "do things"});
        assert_eq!(require_str(&args, "task").unwrap(), "do things");
    }

    #[test]
    fn require_str_rejects_missing_empty_and_blank() {
        assert!(require_str(&json!({}), "task").is_err());
        assert!(require_str(&json!({"task": ""}), "task").is_err());
        assert!(require_str(&json!({"task": "   "}), "task").is_err());
        assert!(require_str(&json!({"task": 7}), "task").is_err());
    }
}

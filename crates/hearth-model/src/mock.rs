// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::{ChatResponse, Message, Provider, Role, ToolCallRequest, ToolSchema};

/// Deterministic mock provider for tests.  Echoes the last user message
/// back as the assistant response.
#[derive(Default)]
pub struct EchoProvider;

#[async_trait]
impl Provider for EchoProvider {
    fn id(&self) -> &str {
        "echo"
    }
    fn name(&self) -> &str {
        "echo-mock"
    }

    async fn chat(
        &self,
        messages: &[Message],
        _tools: &[ToolSchema],
    ) -> anyhow::Result<ChatResponse> {
        let reply = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or("[no input]");
        Ok(ChatResponse::Text(format!("ECHO: {reply}")))
    }
}

/// One scripted reply for [`ScriptedProvider`].
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Text(String),
    ToolCalls(Vec<ToolCallRequest>),
    /// The provider call itself fails with this message.
    Fail(String),
}

/// A pre-scripted mock provider.  Each `chat` call pops the next reply from
/// the front of the queue, letting tests specify exact sequences — including
/// tool calls and provider failures — without network access.
pub struct ScriptedProvider {
    scripts: Mutex<Vec<ScriptedReply>>,
    /// When the script queue is exhausted, every further call returns this.
    /// `None` repeats the last consumed reply's fallback text instead.
    exhausted_reply: Option<ScriptedReply>,
    /// The messages seen by the most recent `chat` call, for inspection.
    pub last_messages: Arc<Mutex<Vec<Message>>>,
    /// The tool schemas seen by the most recent `chat` call.
    pub last_tools: Arc<Mutex<Vec<ToolSchema>>>,
}

impl ScriptedProvider {
    pub fn new(scripts: Vec<ScriptedReply>) -> Self {
        Self {
            scripts: Mutex::new(scripts),
            exhausted_reply: None,
            last_messages: Arc::new(Mutex::new(Vec::new())),
            last_tools: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Convenience: provider that always returns the same text reply.
    pub fn always_text(reply: impl Into<String>) -> Self {
        let mut p = Self::new(vec![]);
        p.exhausted_reply = Some(ScriptedReply::Text(reply.into()));
        p
    }

    /// Convenience: provider that always requests the same tool call.
    /// Used to exercise the iteration cap.
    pub fn always_tool_call(name: impl Into<String>, args: serde_json::Value) -> Self {
        let mut p = Self::new(vec![]);
        p.exhausted_reply = Some(ScriptedReply::ToolCalls(vec![ToolCallRequest {
            id: "call-loop".into(),
            name: name.into(),
            arguments: args,
        }]));
        p
    }

    /// Convenience: one tool call, then a final text reply.
    pub fn tool_then_text(
        tool_id: impl Into<String>,
        tool_name: impl Into<String>,
        args: serde_json::Value,
        final_text: impl Into<String>,
    ) -> Self {
        Self::new(vec![
            ScriptedReply::ToolCalls(vec![ToolCallRequest {
                id: tool_id.into(),
                name: tool_name.into(),
                arguments: args,
            }]),
            ScriptedReply::Text(final_text.into()),
        ])
    }

    /// Convenience: provider whose every call fails.
    pub fn always_fail(message: impl Into<String>) -> Self {
        let mut p = Self::new(vec![]);
        p.exhausted_reply = Some(ScriptedReply::Fail(message.into()));
        p
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn id(&self) -> &str {
        "scripted"
    }
    fn name(&self) -> &str {
        "scripted-mock"
    }

    async fn chat(
        &self,
        messages: &[Message],
        tools: &[ToolSchema],
    ) -> anyhow::Result<ChatResponse> {
        *self.last_messages.lock().unwrap() = messages.to_vec();
        *self.last_tools.lock().unwrap() = tools.to_vec();

        let reply = {
            let mut scripts = self.scripts.lock().unwrap();
            if scripts.is_empty() {
                self.exhausted_reply
                    .clone()
                    .unwrap_or_else(|| ScriptedReply::Text("[no more scripts]".into()))
            } else {
                scripts.remove(0)
            }
        };

        match reply {
            ScriptedReply::Text(t) => Ok(ChatResponse::Text(t)),
            ScriptedReply::ToolCalls(calls) => Ok(ChatResponse::ToolCalls(calls)),
            ScriptedReply::Fail(msg) => Err(anyhow::anyhow!(msg)),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn echo_returns_last_user_message() {
        let p = EchoProvider;
        let msgs = vec![Message::user("first"), Message::user("second")];
        let reply = p.chat(&msgs, &[]).await.unwrap();
        assert_eq!(reply.as_text(), Some("ECHO: second"));
    }

    #[tokio::test]
    async fn scripted_pops_replies_in_order() {
        let p = ScriptedProvider::new(vec![
            ScriptedReply::Text("one".into()),
            ScriptedReply::Text("two".into()),
        ]);
        let msgs = [Message::user("hi")];
        assert_eq!(p.chat(&msgs, &[]).await.unwrap().as_text(), Some("one"));
        assert_eq!(p.chat(&msgs, &[]).await.unwrap().as_text(), Some("two"));
    }

    #[tokio::test]
    async fn always_tool_call_never_drains() {
        let p = ScriptedProvider::always_tool_call("noop", serde_json::json!({}));
        let msgs = [Message::user("go")];
        for _ in 0..3 {
            match p.chat(&msgs, &[]).await.unwrap() {
                ChatResponse::ToolCalls(calls) => assert_eq!(calls[0].name, "noop"),
                other => panic!("expected tool calls, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn always_fail_is_an_error() {
        let p = ScriptedProvider::always_fail("boom");
        let err = p.chat(&[Message::user("x")], &[]).await.unwrap_err();
        assert!(err.to_string().contains("boom"));
    }

    #[tokio::test]
    async fn last_messages_is_captured() {
        let p = ScriptedProvider::always_text("ok");
        p.chat(&[Message::user("inspect me")], &[]).await.unwrap();
        let seen = p.last_messages.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].content, "inspect me");
    }
}

// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use hearth_core::{inbox_note, primary_system_prompt, run_turn, TurnConfig};
use hearth_model::{Message, Role};
use hearth_store::{MessageRecord, MetricRecord, TaskStatus};
use hearth_tools::ToolRegistry;

use crate::context::RuntimeContext;
use crate::toolset::build_delegation_tools;

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

const GENERIC_FAILURE: &str =
    "Something went wrong while handling that message. Please try again.";

/// Summary of one retention sweep.
#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    pub agents_removed: usize,
    pub problems_removed: usize,
    pub tasks_failed: usize,
}

/// Wires the subsystems into the user-facing entry point.
///
/// Each user message is enqueued on the session queue under the user's
/// id, so a single user's turns are strictly serialized while distinct
/// users proceed concurrently.  Background delegations escape the queue
/// through their own `agent:<id>` lanes.
pub struct Orchestrator {
    ctx: Arc<RuntimeContext>,
    tools: Arc<ToolRegistry>,
}

impl Orchestrator {
    pub fn new(ctx: Arc<RuntimeContext>) -> Self {
        let tools = Arc::new(build_delegation_tools(&ctx));
        Self { ctx, tools }
    }

    pub fn context(&self) -> &Arc<RuntimeContext> {
        &self.ctx
    }

    /// Process one user message to completion and return the reply.
    ///
    /// Failures never escape: provider errors, timeouts and storage
    /// problems all come back as a user-visible message so the session
    /// keeps serving subsequent turns.
    pub async fn agent_loop(&self, message: &str, user_id: &str) -> String {
        let ctx = Arc::clone(&self.ctx);
        let tools = Arc::clone(&self.tools);
        let message = message.to_string();
        let user_id = user_id.to_string();

        let receiver = self.ctx.queue.enqueue(&user_id.clone(), move || async move {
            run_primary_turn(ctx, tools, &message, &user_id).await
        });
        match receiver.await {
            Ok(response) => response,
            Err(_) => GENERIC_FAILURE.to_string(),
        }
    }

    /// Drain outstanding queued work within a bounded grace window.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        self.ctx.queue.shutdown(grace).await
    }

    /// One pass of all retention cleanups: expired agent tombstones, old
    /// resolved blackboard problems, and stale running task rows.
    pub fn retention_sweep(&self) -> SweepReport {
        let retention = &self.ctx.config.retention;
        let mut report = SweepReport::default();
        match self.ctx.lifecycle.cleanup(retention.agent_retention_ms) {
            Ok(n) => report.agents_removed = n,
            Err(e) => warn!(error = %e, "agent retention cleanup failed"),
        }
        match self.ctx.blackboard.cleanup(retention.blackboard_retention_ms) {
            Ok(n) => report.problems_removed = n,
            Err(e) => warn!(error = %e, "blackboard retention cleanup failed"),
        }
        match self.ctx.background.cleanup_stale(retention.stale_task_ms) {
            Ok(n) => report.tasks_failed = n,
            Err(e) => warn!(error = %e, "stale task cleanup failed"),
        }
        report
    }
}

/// The queued body of one primary turn.
async fn run_primary_turn(
    ctx: Arc<RuntimeContext>,
    tools: Arc<ToolRegistry>,
    message: &str,
    user_id: &str,
) -> String {
    let started = std::time::Instant::now();

    // Proactive compaction before this turn grows the history further.
    if let Err(e) = ctx.compactor.maybe_compact(user_id).await {
        warn!(user_id, error = %e, "pre-turn compaction failed");
    }

    // Undelivered background results get surfaced at the top of the turn.
    let inbox = ctx.background.get_undelivered(user_id).unwrap_or_default();

    if let Err(e) = ctx.store.insert_message(&MessageRecord {
        id: uuid::Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        role: "user".into(),
        content: message.to_string(),
        created_at: now_ms(),
    }) {
        warn!(user_id, error = %e, "failed to persist user message");
        return GENERIC_FAILURE.to_string();
    }

    let history = match ctx
        .store
        .list_recent_messages(user_id, ctx.config.compaction.threshold)
    {
        Ok(history) => history,
        Err(e) => {
            warn!(user_id, error = %e, "failed to load history");
            return GENERIC_FAILURE.to_string();
        }
    };

    let mut seed: Vec<Message> = Vec::with_capacity(history.len() + 1);
    let inbox_lines: Vec<(String, String, bool)> = inbox
        .iter()
        .map(|t| {
            (
                t.id.clone(),
                t.result.clone().unwrap_or_default(),
                t.status == TaskStatus::Completed,
            )
        })
        .collect();
    if let Some(note) = inbox_note(&inbox_lines) {
        seed.push(Message::system(note));
    }
    seed.extend(history.iter().filter_map(|m| {
        let role: Role = m.role.parse().ok()?;
        if role == Role::System {
            return None;
        }
        Some(Message {
            role,
            content: m.content.clone(),
            tool_call_id: None,
            tool_calls: None,
        })
    }));

    let orientation = ctx.orientation_for(user_id);
    let result = run_turn(TurnConfig {
        provider: Arc::clone(&ctx.provider),
        system_prompt: primary_system_prompt(&orientation),
        messages: seed,
        tools,
        max_iterations: ctx.config.agent.primary_max_iterations,
        timeout: Duration::from_secs(ctx.config.agent.task_timeout_secs),
    })
    .await;

    if result.success {
        if let Err(e) = ctx.store.insert_message(&MessageRecord {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            role: "assistant".into(),
            content: result.response.clone(),
            created_at: now_ms(),
        }) {
            warn!(user_id, error = %e, "failed to persist assistant response");
        }
        // Inbox entries were surfaced this turn; the agent may also have
        // confirmed some itself, which mark_delivered tolerates.
        for task in &inbox {
            if let Err(e) = ctx.background.mark_delivered(&task.id) {
                debug!(task_id = %task.id, error = %e, "inbox entry already delivered");
            }
        }
    }

    let metric = MetricRecord {
        id: uuid::Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        task_type: "chat".into(),
        tier: None,
        duration_ms: started.elapsed().as_millis() as i64,
        iterations: result.iterations as i64,
        success: result.success,
        created_at: now_ms(),
    };
    if let Err(e) = ctx.store.insert_metric(&metric) {
        warn!(error = %e, "failed to record turn metric");
    }

    // Post-turn check covers histories that grew past the threshold
    // during the turn itself.
    if let Err(e) = ctx.compactor.maybe_compact(user_id).await {
        warn!(user_id, error = %e, "post-turn compaction failed");
    }

    result.response
}

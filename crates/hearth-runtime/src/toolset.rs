// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The delegation toolset exposed to the primary agent.
//!
//! Every handler is defensive: required parameters are validated up
//! front and all failures come back as `Error: ...` strings so the
//! iteration loop keeps running and the model can recover.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use hearth_core::tokenize;
use hearth_store::AgentStatus;
use hearth_tools::{require_str, Tool, ToolCall, ToolOutput, ToolRegistry};

use crate::background::{TaskSpec, TemplateAutoCreate};
use crate::context::RuntimeContext;
use crate::lifecycle::CreateAgentSpec;
use crate::templates::TemplatePatch;

/// Build the registry of delegation tools for the primary agent.
pub fn build_delegation_tools(ctx: &Arc<RuntimeContext>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(DelegateTaskTool { ctx: Arc::clone(ctx) });
    registry.register(DelegateTasksTool { ctx: Arc::clone(ctx) });
    registry.register(DelegateToExistingTool { ctx: Arc::clone(ctx) });
    registry.register(DelegateBackgroundTool { ctx: Arc::clone(ctx) });
    registry.register(ListSubAgentsTool { ctx: Arc::clone(ctx) });
    registry.register(ManageSubAgentTool { ctx: Arc::clone(ctx) });
    registry.register(ManageTemplateTool { ctx: Arc::clone(ctx) });
    registry.register(ConfirmTaskTool { ctx: Arc::clone(ctx) });
    registry
}

fn optional_str(args: &Value, key: &str) -> Option<String> {
    args.get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .map(String::from)
}

fn optional_str_list(args: &Value, key: &str) -> Option<Vec<String>> {
    args.get(key).and_then(|v| v.as_array()).map(|items| {
        items
            .iter()
            .filter_map(|i| i.as_str())
            .map(String::from)
            .collect()
    })
}

/// The outcome of routing one delegation: which agent took it and whether
/// it was reused or newly created.
struct Dispatch {
    task_id: String,
    role: String,
    reused: bool,
}

/// Find a reusable sub-agent for the role or create a fresh one, then
/// start the task in the background.
async fn dispatch_task(
    ctx: &Arc<RuntimeContext>,
    user_id: &str,
    role: &str,
    task: &str,
    tier: Option<String>,
    tools: Option<Vec<String>>,
) -> Result<Dispatch, String> {
    let (agent, reused) = match ctx
        .lifecycle
        .find_reusable(user_id, role)
        .map_err(|e| e.to_string())?
    {
        Some(agent) => (agent, true),
        None => {
            // A matching template contributes its defaults to the new agent.
            let template = ctx
                .templates
                .find_best_match(user_id, role)
                .unwrap_or(None);
            let (template_tools, template_tier, template_id) = match &template {
                Some(t) => (
                    t.default_tools.clone(),
                    t.default_tier.clone(),
                    Some(t.id.clone()),
                ),
                None => (Vec::new(), None, None),
            };
            let agent = ctx
                .lifecycle
                .create(
                    CreateAgentSpec {
                        user_id: user_id.to_string(),
                        role: role.to_string(),
                        tools_granted: tools.unwrap_or(template_tools),
                        tier_preference: tier.clone().or(template_tier),
                        template_id,
                    },
                    &ctx.orientation_for(user_id),
                )
                .map_err(|e| e.to_string())?;
            (agent, false)
        }
    };

    let task_id = ctx
        .background
        .start(TaskSpec {
            user_id: user_id.to_string(),
            agent_id: agent.id.clone(),
            task: task.to_string(),
            tier,
            timeout: None,
            template_auto_create: Some(TemplateAutoCreate {
                name: role.to_string(),
                role_description: format!("{role} specialist for tasks such as: {task}"),
                default_tools: agent.tools_granted.clone(),
                default_tier: agent.tier_preference.clone(),
                tags: tokenize(role),
            }),
        })
        .map_err(|e| e.to_string())?;

    Ok(Dispatch {
        task_id,
        role: agent.role,
        reused,
    })
}

fn dispatch_confirmation(dispatch: &Dispatch) -> String {
    format!(
        "Dispatched to {} sub-agent \"{}\" (task {}). The result will arrive in the background.",
        if dispatch.reused { "reused" } else { "new" },
        dispatch.role,
        dispatch.task_id,
    )
}

// ─── delegate_task ───────────────────────────────────────────────────────────

struct DelegateTaskTool {
    ctx: Arc<RuntimeContext>,
}

#[async_trait]
impl Tool for DelegateTaskTool {
    fn name(&self) -> &str {
        "delegate_task"
    }

    fn description(&self) -> &str {
        "Delegate a task to a specialist sub-agent. Reuses an existing sub-agent \
         with a matching role or creates a new one. Non-blocking: returns a \
         dispatch confirmation immediately and the result is delivered later."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "task": { "type": "string", "description": "What the sub-agent should do" },
                "role": { "type": "string", "description": "Specialist role, e.g. 'Research Analyst'" },
                "user_id": { "type": "string" },
                "tier": { "type": "string", "enum": ["simple", "moderate", "complex", "reasoning"] },
                "tools": { "type": "array", "items": { "type": "string" } }
            },
            "required": ["task", "role", "user_id"]
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let (task, role, user_id) = match (
            require_str(&call.args, "task"),
            require_str(&call.args, "role"),
            require_str(&call.args, "user_id"),
        ) {
            (Ok(t), Ok(r), Ok(u)) => (t, r, u),
            (Err(e), ..) | (_, Err(e), _) | (.., Err(e)) => return ToolOutput::err(&call.id, e),
        };
        let tier = optional_str(&call.args, "tier");
        let tools = optional_str_list(&call.args, "tools");
        match dispatch_task(&self.ctx, user_id, role, task, tier, tools).await {
            Ok(dispatch) => ToolOutput::ok(&call.id, dispatch_confirmation(&dispatch)),
            Err(e) => ToolOutput::err(&call.id, e),
        }
    }
}

// ─── delegate_tasks ──────────────────────────────────────────────────────────

struct DelegateTasksTool {
    ctx: Arc<RuntimeContext>,
}

#[async_trait]
impl Tool for DelegateTasksTool {
    fn name(&self) -> &str {
        "delegate_tasks"
    }

    fn description(&self) -> &str {
        "Delegate several tasks at once. Each entry needs 'task' and 'role'; \
         'tier' and 'tools' are optional. Batch form of delegate_task."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "tasks": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "task": { "type": "string" },
                            "role": { "type": "string" },
                            "tier": { "type": "string" },
                            "tools": { "type": "array", "items": { "type": "string" } }
                        },
                        "required": ["task", "role"]
                    }
                },
                "user_id": { "type": "string" }
            },
            "required": ["tasks", "user_id"]
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let user_id = match require_str(&call.args, "user_id") {
            Ok(u) => u,
            Err(e) => return ToolOutput::err(&call.id, e),
        };
        let entries = match call.args.get("tasks").and_then(|v| v.as_array()) {
            Some(entries) if !entries.is_empty() => entries,
            _ => return ToolOutput::err(&call.id, "missing or empty required parameter 'tasks'"),
        };

        let mut lines = Vec::with_capacity(entries.len());
        for (i, entry) in entries.iter().enumerate() {
            let (task, role) = match (require_str(entry, "task"), require_str(entry, "role")) {
                (Ok(t), Ok(r)) => (t, r),
                (Err(e), _) | (_, Err(e)) => {
                    lines.push(format!("{}. Error: {e}", i + 1));
                    continue;
                }
            };
            let tier = optional_str(entry, "tier");
            let tools = optional_str_list(entry, "tools");
            match dispatch_task(&self.ctx, user_id, role, task, tier, tools).await {
                Ok(dispatch) => lines.push(format!("{}. {}", i + 1, dispatch_confirmation(&dispatch))),
                Err(e) => lines.push(format!("{}. Error: {e}", i + 1)),
            }
        }
        ToolOutput::ok(&call.id, lines.join("\n"))
    }
}

// ─── delegate_to_existing ────────────────────────────────────────────────────

struct DelegateToExistingTool {
    ctx: Arc<RuntimeContext>,
}

#[async_trait]
impl Tool for DelegateToExistingTool {
    fn name(&self) -> &str {
        "delegate_to_existing"
    }

    fn description(&self) -> &str {
        "Delegate a task to a specific sub-agent by id. Suspended agents are \
         resumed automatically; dismissed agents must be revived first."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "agent_id": { "type": "string" },
                "task": { "type": "string" },
                "user_id": { "type": "string" }
            },
            "required": ["agent_id", "task", "user_id"]
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let (agent_id, task, user_id) = match (
            require_str(&call.args, "agent_id"),
            require_str(&call.args, "task"),
            require_str(&call.args, "user_id"),
        ) {
            (Ok(a), Ok(t), Ok(u)) => (a, t, u),
            (Err(e), ..) | (_, Err(e), _) | (.., Err(e)) => return ToolOutput::err(&call.id, e),
        };

        let agent = match self.ctx.lifecycle.get(agent_id) {
            Ok(agent) => agent,
            Err(e) => return ToolOutput::err(&call.id, e.to_string()),
        };
        if agent.status == AgentStatus::Suspended {
            if let Err(e) = self.ctx.lifecycle.resume(agent_id) {
                return ToolOutput::err(&call.id, e.to_string());
            }
        }

        match self.ctx.background.start(TaskSpec {
            user_id: user_id.to_string(),
            agent_id: agent_id.to_string(),
            task: task.to_string(),
            tier: agent.tier_preference.clone(),
            timeout: None,
            template_auto_create: None,
        }) {
            Ok(task_id) => ToolOutput::ok(
                &call.id,
                format!(
                    "Dispatched to existing sub-agent \"{}\" (task {task_id}).",
                    agent.role
                ),
            ),
            Err(e) => ToolOutput::err(&call.id, e.to_string()),
        }
    }
}

// ─── delegate_background ─────────────────────────────────────────────────────

struct DelegateBackgroundTool {
    ctx: Arc<RuntimeContext>,
}

#[async_trait]
impl Tool for DelegateBackgroundTool {
    fn name(&self) -> &str {
        "delegate_background"
    }

    fn description(&self) -> &str {
        "Delegate a task and get the background task id back for tracking. \
         Otherwise identical to delegate_task."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "task": { "type": "string" },
                "role": { "type": "string" },
                "user_id": { "type": "string" },
                "tier": { "type": "string" },
                "tools": { "type": "array", "items": { "type": "string" } }
            },
            "required": ["task", "role", "user_id"]
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let (task, role, user_id) = match (
            require_str(&call.args, "task"),
            require_str(&call.args, "role"),
            require_str(&call.args, "user_id"),
        ) {
            (Ok(t), Ok(r), Ok(u)) => (t, r, u),
            (Err(e), ..) | (_, Err(e), _) | (.., Err(e)) => return ToolOutput::err(&call.id, e),
        };
        let tier = optional_str(&call.args, "tier");
        let tools = optional_str_list(&call.args, "tools");
        match dispatch_task(&self.ctx, user_id, role, task, tier, tools).await {
            Ok(dispatch) => ToolOutput::ok(
                &call.id,
                format!(
                    "task_id: {} ({} sub-agent \"{}\")",
                    dispatch.task_id,
                    if dispatch.reused { "reused" } else { "new" },
                    dispatch.role
                ),
            ),
            Err(e) => ToolOutput::err(&call.id, e),
        }
    }
}

// ─── list_sub_agents ─────────────────────────────────────────────────────────

struct ListSubAgentsTool {
    ctx: Arc<RuntimeContext>,
}

#[async_trait]
impl Tool for ListSubAgentsTool {
    fn name(&self) -> &str {
        "list_sub_agents"
    }

    fn description(&self) -> &str {
        "List the user's sub-agents with role, status, performance and task counts."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "user_id": { "type": "string" },
                "include_deleted": { "type": "boolean" }
            },
            "required": ["user_id"]
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let user_id = match require_str(&call.args, "user_id") {
            Ok(u) => u,
            Err(e) => return ToolOutput::err(&call.id, e),
        };
        let include_deleted = call
            .args
            .get("include_deleted")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        let agents = if include_deleted {
            self.ctx.lifecycle.list_all(user_id)
        } else {
            self.ctx.lifecycle.list_active(user_id)
        };
        let agents = match agents {
            Ok(agents) => agents,
            Err(e) => return ToolOutput::err(&call.id, e.to_string()),
        };
        if agents.is_empty() {
            return ToolOutput::ok(&call.id, "No sub-agents.");
        }
        let lines: Vec<String> = agents
            .iter()
            .map(|a| {
                format!(
                    "- {} [{}] performance {:.2} tasks {}/{} id {}",
                    a.role,
                    a.status.as_str(),
                    a.performance_score,
                    a.successful_tasks,
                    a.total_tasks,
                    a.id
                )
            })
            .collect();
        ToolOutput::ok(&call.id, lines.join("\n"))
    }
}

// ─── manage_sub_agent ────────────────────────────────────────────────────────

struct ManageSubAgentTool {
    ctx: Arc<RuntimeContext>,
}

#[async_trait]
impl Tool for ManageSubAgentTool {
    fn name(&self) -> &str {
        "manage_sub_agent"
    }

    fn description(&self) -> &str {
        "Manage a sub-agent's lifecycle: dismiss (revivable for 14 days), \
         revive a dismissed agent, or kill (permanent, deletes its history)."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "agent_id": { "type": "string" },
                "action": { "type": "string", "enum": ["dismiss", "revive", "kill"] }
            },
            "required": ["agent_id", "action"]
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let (agent_id, action) = match (
            require_str(&call.args, "agent_id"),
            require_str(&call.args, "action"),
        ) {
            (Ok(a), Ok(b)) => (a, b),
            (Err(e), _) | (_, Err(e)) => return ToolOutput::err(&call.id, e),
        };
        let result = match action {
            "dismiss" => self
                .ctx
                .lifecycle
                .dismiss(agent_id)
                .map(|_| format!("Sub-agent {agent_id} dismissed.")),
            "revive" => self
                .ctx
                .lifecycle
                .revive(agent_id)
                .map(|a| format!("Sub-agent {agent_id} revived as \"{}\".", a.role)),
            "kill" => self
                .ctx
                .lifecycle
                .kill(agent_id)
                .map(|_| format!("Sub-agent {agent_id} killed; its history is gone.")),
            other => return ToolOutput::err(&call.id, format!("unknown action: {other}")),
        };
        match result {
            Ok(message) => ToolOutput::ok(&call.id, message),
            Err(e) => ToolOutput::err(&call.id, e.to_string()),
        }
    }
}

// ─── manage_template ─────────────────────────────────────────────────────────

struct ManageTemplateTool {
    ctx: Arc<RuntimeContext>,
}

#[async_trait]
impl Tool for ManageTemplateTool {
    fn name(&self) -> &str {
        "manage_template"
    }

    fn description(&self) -> &str {
        "Manage role templates: list them for a user, update one's fields, \
         or delete one."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": { "type": "string", "enum": ["list", "update", "delete"] },
                "user_id": { "type": "string" },
                "template_id": { "type": "string" },
                "name": { "type": "string" },
                "role_description": { "type": "string" },
                "default_tools": { "type": "array", "items": { "type": "string" } },
                "default_tier": { "type": "string" },
                "tags": { "type": "array", "items": { "type": "string" } }
            },
            "required": ["action"]
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let action = match require_str(&call.args, "action") {
            Ok(a) => a,
            Err(e) => return ToolOutput::err(&call.id, e),
        };
        match action {
            "list" => {
                let user_id = match require_str(&call.args, "user_id") {
                    Ok(u) => u,
                    Err(e) => return ToolOutput::err(&call.id, e),
                };
                match self.ctx.templates.list(user_id) {
                    Ok(templates) if templates.is_empty() => {
                        ToolOutput::ok(&call.id, "No templates.")
                    }
                    Ok(templates) => {
                        let lines: Vec<String> = templates
                            .iter()
                            .map(|t| {
                                format!(
                                    "- {} (used {}x, avg {:.2}) id {}",
                                    t.name, t.times_used, t.avg_performance, t.id
                                )
                            })
                            .collect();
                        ToolOutput::ok(&call.id, lines.join("\n"))
                    }
                    Err(e) => ToolOutput::err(&call.id, e.to_string()),
                }
            }
            "update" => {
                let template_id = match require_str(&call.args, "template_id") {
                    Ok(t) => t,
                    Err(e) => return ToolOutput::err(&call.id, e),
                };
                let patch = TemplatePatch {
                    name: optional_str(&call.args, "name"),
                    role_description: optional_str(&call.args, "role_description"),
                    default_tools: optional_str_list(&call.args, "default_tools"),
                    default_tier: optional_str(&call.args, "default_tier").map(Some),
                    tags: optional_str_list(&call.args, "tags"),
                };
                match self.ctx.templates.update(template_id, patch) {
                    Ok(t) => ToolOutput::ok(&call.id, format!("Template \"{}\" updated.", t.name)),
                    Err(e) => ToolOutput::err(&call.id, e.to_string()),
                }
            }
            "delete" => {
                let template_id = match require_str(&call.args, "template_id") {
                    Ok(t) => t,
                    Err(e) => return ToolOutput::err(&call.id, e),
                };
                match self.ctx.templates.delete(template_id) {
                    Ok(()) => ToolOutput::ok(&call.id, format!("Template {template_id} deleted.")),
                    Err(e) => ToolOutput::err(&call.id, e.to_string()),
                }
            }
            other => ToolOutput::err(&call.id, format!("unknown action: {other}")),
        }
    }
}

// ─── confirm_task ────────────────────────────────────────────────────────────

struct ConfirmTaskTool {
    ctx: Arc<RuntimeContext>,
}

#[async_trait]
impl Tool for ConfirmTaskTool {
    fn name(&self) -> &str {
        "confirm_task"
    }

    fn description(&self) -> &str {
        "Mark a finished background task as delivered after relaying its \
         result to the user."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "task_id": { "type": "string" } },
            "required": ["task_id"]
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let task_id = match require_str(&call.args, "task_id") {
            Ok(t) => t,
            Err(e) => return ToolOutput::err(&call.id, e),
        };
        match self.ctx.background.mark_delivered(task_id) {
            Ok(()) => ToolOutput::ok(&call.id, format!("Task {task_id} confirmed as delivered.")),
            Err(e) => ToolOutput::err(&call.id, e.to_string()),
        }
    }
}

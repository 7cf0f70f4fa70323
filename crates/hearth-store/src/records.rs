// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Compose the synthetic user id under which a sub-agent's conversation is
/// stored in the shared messages table.
pub fn subagent_user_id(agent_id: &str) -> String {
    format!("subagent:{agent_id}")
}

/// One stored conversation message.  Immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: String,
    pub user_id: String,
    /// `user`, `assistant`, `system` or `tool`
    pub role: String,
    pub content: String,
    /// Epoch milliseconds
    pub created_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Active,
    Suspended,
    SoftDeleted,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentStatus::Active => "active",
            AgentStatus::Suspended => "suspended",
            AgentStatus::SoftDeleted => "soft_deleted",
        }
    }

    pub fn parse(s: &str) -> Result<Self, StoreError> {
        match s {
            "active" => Ok(AgentStatus::Active),
            "suspended" => Ok(AgentStatus::Suspended),
            "soft_deleted" => Ok(AgentStatus::SoftDeleted),
            other => Err(StoreError::Corrupt(format!("unknown agent status: {other}"))),
        }
    }
}

/// A persistent sub-agent.
///
/// `performance_score` is `successful_tasks / max(total_tasks, 1)` once the
/// first task lands; it starts at the neutral 0.5.  `deleted_at` is set iff
/// `status` is `soft_deleted`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRecord {
    pub id: String,
    pub user_id: String,
    /// Free-text specialty label, e.g. "Research Analyst"
    pub role: String,
    /// Frozen at creation
    pub system_prompt: String,
    pub tools_granted: Vec<String>,
    pub tier_preference: Option<String>,
    pub status: AgentStatus,
    pub performance_score: f64,
    pub total_tasks: i64,
    pub successful_tasks: i64,
    pub template_id: Option<String>,
    pub created_at: i64,
    pub last_active_at: i64,
    pub deleted_at: Option<i64>,
}

/// A reusable role specification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateRecord {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub role_description: String,
    pub default_tools: Vec<String>,
    pub default_tier: Option<String>,
    pub times_used: i64,
    /// Running mean of recorded usage scores, starting at 0.5
    pub avg_performance: f64,
    pub tags: Vec<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Running,
    Completed,
    Failed,
    Delivered,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Delivered => "delivered",
        }
    }

    pub fn parse(s: &str) -> Result<Self, StoreError> {
        match s {
            "running" => Ok(TaskStatus::Running),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            "delivered" => Ok(TaskStatus::Delivered),
            other => Err(StoreError::Corrupt(format!("unknown task status: {other}"))),
        }
    }
}

/// One fire-and-forget delegated task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: String,
    pub user_id: String,
    pub agent_id: String,
    pub task_description: String,
    pub status: TaskStatus,
    pub result: Option<String>,
    pub started_at: i64,
    pub completed_at: Option<i64>,
    pub delivered_at: Option<i64>,
}

/// One compaction of a user's conversation history.  `summary` holds the
/// full (L2) tier text; messages older than `replaced_before` were deleted
/// when this record was written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompactionRecord {
    pub id: String,
    pub user_id: String,
    pub summary: String,
    pub replaced_before: i64,
    pub created_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlackboardStatus {
    Open,
    Resolved,
}

impl BlackboardStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlackboardStatus::Open => "open",
            BlackboardStatus::Resolved => "resolved",
        }
    }

    pub fn parse(s: &str) -> Result<Self, StoreError> {
        match s {
            "open" => Ok(BlackboardStatus::Open),
            "resolved" => Ok(BlackboardStatus::Resolved),
            other => Err(StoreError::Corrupt(format!(
                "unknown blackboard status: {other}"
            ))),
        }
    }
}

/// A blackboard entry.  Two shapes share the table: a *problem* row has
/// `id == problem_id` and the agent fields null; a *proposal* row points at
/// its problem via `problem_id` and fills the agent fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlackboardRecord {
    pub id: String,
    pub user_id: String,
    pub problem_id: String,
    pub problem_text: Option<String>,
    pub agent_id: Option<String>,
    pub agent_role: Option<String>,
    pub proposal: Option<String>,
    /// Clamped to [0, 1] on write
    pub confidence: Option<f64>,
    pub status: BlackboardStatus,
    pub synthesis: Option<String>,
    pub created_at: i64,
}

impl BlackboardRecord {
    pub fn is_problem(&self) -> bool {
        self.id == self.problem_id
    }
}

/// Append-only record of one completed agent run, used to estimate future
/// timeouts per task type and tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricRecord {
    pub id: String,
    pub user_id: String,
    pub task_type: String,
    pub tier: Option<String>,
    pub duration_ms: i64,
    pub iterations: i64,
    pub success: bool,
    pub created_at: i64,
}

/// One keyed note in the ancillary episodic-memory index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: String,
    pub user_id: String,
    pub key: String,
    pub content: String,
    pub updated_at: i64,
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::Arc;

use serde_json::json;
use tracing::debug;

use hearth_config::{AgentConfig, MatcherConfig};
use hearth_core::{sub_agent_system_prompt, topics, EventBus, HybridMatcher, Orientation};
use hearth_store::{
    subagent_user_id, AgentRecord, AgentStatus, MessageRecord, Store,
};

use crate::error::{Result, RuntimeError};

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Everything needed to spawn a new persistent sub-agent.
#[derive(Debug, Clone)]
pub struct CreateAgentSpec {
    pub user_id: String,
    /// Free-text specialty label, e.g. "Research Analyst"
    pub role: String,
    pub tools_granted: Vec<String>,
    pub tier_preference: Option<String>,
    pub template_id: Option<String>,
}

/// Owns the full lifecycle of persistent sub-agents: creation under the
/// per-user cap, reuse lookup via the hybrid matcher, performance
/// accounting, suspend/dismiss/revive/kill transitions, and tombstone
/// retention cleanup.
pub struct LifecycleManager {
    store: Arc<Store>,
    bus: Arc<EventBus>,
    matcher: HybridMatcher,
    config: AgentConfig,
    reuse_min_score: f64,
}

impl LifecycleManager {
    pub fn new(
        store: Arc<Store>,
        bus: Arc<EventBus>,
        agent_config: AgentConfig,
        matcher_config: MatcherConfig,
    ) -> Self {
        let reuse_min_score = matcher_config.reuse_min_score;
        Self {
            store,
            bus,
            matcher: HybridMatcher::new(matcher_config),
            config: agent_config,
            reuse_min_score,
        }
    }

    /// Create a new sub-agent with a frozen system prompt composed from
    /// the orientation block and the role.  Rejects with `LimitExceeded`
    /// when the user already has the maximum number of active agents.
    pub fn create(&self, spec: CreateAgentSpec, orientation: &Orientation) -> Result<AgentRecord> {
        let active = self.store.count_active_agents(&spec.user_id)?;
        if active >= self.config.max_active_agents_per_user {
            return Err(RuntimeError::LimitExceeded(format!(
                "user {} already has {active} active sub-agents (max {})",
                spec.user_id, self.config.max_active_agents_per_user
            )));
        }

        let now = now_ms();
        let agent = AgentRecord {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: spec.user_id,
            system_prompt: sub_agent_system_prompt(orientation, &spec.role),
            role: spec.role,
            tools_granted: spec.tools_granted,
            tier_preference: spec.tier_preference,
            status: AgentStatus::Active,
            performance_score: 0.5,
            total_tasks: 0,
            successful_tasks: 0,
            template_id: spec.template_id,
            created_at: now,
            last_active_at: now,
            deleted_at: None,
        };
        self.store.insert_agent(&agent)?;
        self.bus.emit(
            topics::AGENT_CREATED,
            &agent.user_id,
            json!({ "agent_id": agent.id, "role": agent.role }),
        );
        Ok(agent)
    }

    pub fn get(&self, agent_id: &str) -> Result<AgentRecord> {
        self.store
            .get_agent(agent_id)?
            .ok_or_else(|| RuntimeError::NotFound(format!("sub-agent {agent_id}")))
    }

    /// Agents that can still take work: active plus suspended.
    pub fn list_active(&self, user_id: &str) -> Result<Vec<AgentRecord>> {
        Ok(self.store.list_agents_by_status(
            user_id,
            &[AgentStatus::Active, AgentStatus::Suspended],
        )?)
    }

    pub fn list_all(&self, user_id: &str) -> Result<Vec<AgentRecord>> {
        Ok(self.store.list_agents_by_status(
            user_id,
            &[
                AgentStatus::Active,
                AgentStatus::Suspended,
                AgentStatus::SoftDeleted,
            ],
        )?)
    }

    /// Find an active agent whose role matches the requested one well
    /// enough to reuse instead of spawning a fresh specialist.
    pub fn find_reusable(
        &self,
        user_id: &str,
        requested_role: &str,
    ) -> Result<Option<AgentRecord>> {
        let candidates = self
            .store
            .list_agents_by_status(user_id, &[AgentStatus::Active])?;
        let roles: Vec<String> = candidates.iter().map(|a| a.role.clone()).collect();
        let best =
            self.matcher
                .find_best_with_threshold(requested_role, &roles, self.reuse_min_score);
        match best {
            Some(m) => {
                debug!(
                    requested_role,
                    matched_role = %candidates[m.index].role,
                    score = m.score,
                    "reusing existing sub-agent"
                );
                Ok(Some(candidates[m.index].clone()))
            }
            None => Ok(None),
        }
    }

    /// Fold one task outcome into the agent's performance accounting.
    pub fn record_task_result(&self, agent_id: &str, success: bool) -> Result<()> {
        if !self
            .store
            .record_agent_task_result(agent_id, success, now_ms())?
        {
            return Err(RuntimeError::NotFound(format!("sub-agent {agent_id}")));
        }
        Ok(())
    }

    /// Pause an agent without deleting it.
    pub fn suspend(&self, agent_id: &str) -> Result<()> {
        self.get(agent_id)?;
        self.store
            .set_agent_status(agent_id, AgentStatus::Suspended, None)?;
        Ok(())
    }

    /// Wake a suspended agent back up.  Active agents pass through
    /// unchanged; dismissed agents need `revive` instead.
    pub fn resume(&self, agent_id: &str) -> Result<AgentRecord> {
        let agent = self.get(agent_id)?;
        match agent.status {
            AgentStatus::Active => Ok(agent),
            AgentStatus::Suspended => {
                self.store
                    .set_agent_status(agent_id, AgentStatus::Active, None)?;
                self.store.touch_agent(agent_id, now_ms())?;
                self.get(agent_id)
            }
            AgentStatus::SoftDeleted => Err(RuntimeError::InvalidState(format!(
                "sub-agent {agent_id} is dismissed; revive it first"
            ))),
        }
    }

    /// Soft-delete: the agent disappears from active listings but stays
    /// revivable until retention cleanup removes the tombstone.
    pub fn dismiss(&self, agent_id: &str) -> Result<()> {
        let agent = self.get(agent_id)?;
        self.store
            .set_agent_status(agent_id, AgentStatus::SoftDeleted, Some(now_ms()))?;
        self.bus.emit(
            topics::AGENT_DISMISSED,
            &agent.user_id,
            json!({ "agent_id": agent_id, "role": agent.role }),
        );
        Ok(())
    }

    /// Restore a dismissed agent.  Only valid from `soft_deleted`.
    pub fn revive(&self, agent_id: &str) -> Result<AgentRecord> {
        let agent = self.get(agent_id)?;
        if agent.status != AgentStatus::SoftDeleted {
            return Err(RuntimeError::InvalidState(format!(
                "sub-agent {agent_id} is {}, only dismissed agents can be revived",
                agent.status.as_str()
            )));
        }
        self.store
            .set_agent_status(agent_id, AgentStatus::Active, None)?;
        self.store.touch_agent(agent_id, now_ms())?;
        self.bus.emit(
            topics::AGENT_REVIVED,
            &agent.user_id,
            json!({ "agent_id": agent_id, "role": agent.role }),
        );
        self.get(agent_id)
    }

    /// Hard-delete an agent and its entire conversation log.  The escape
    /// hatch next to the tombstone path.
    pub fn kill(&self, agent_id: &str) -> Result<()> {
        self.get(agent_id)?;
        self.store.delete_agent_cascading(agent_id)?;
        Ok(())
    }

    /// Remove tombstoned agents whose retention window has passed.
    /// Returns the number removed.
    pub fn cleanup(&self, retention_ms: i64) -> Result<usize> {
        let cutoff = now_ms() - retention_ms;
        Ok(self.store.delete_expired_agents(cutoff)?)
    }

    /// The most recent messages of an agent's own conversation, oldest
    /// first, capped at the configured per-agent window.
    pub fn get_messages(&self, agent_id: &str, limit: usize) -> Result<Vec<MessageRecord>> {
        let capped = limit.min(self.config.max_agent_messages);
        Ok(self
            .store
            .list_recent_messages(&subagent_user_id(agent_id), capped)?)
    }

    pub fn save_message(&self, agent_id: &str, role: &str, content: &str) -> Result<()> {
        self.store.insert_message(&MessageRecord {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: subagent_user_id(agent_id),
            role: role.to_string(),
            content: content.to_string(),
            created_at: now_ms(),
        })?;
        Ok(())
    }

    pub fn max_messages(&self) -> usize {
        self.config.max_agent_messages
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

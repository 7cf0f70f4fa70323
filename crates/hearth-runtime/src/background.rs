// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use hearth_config::AgentConfig;
use hearth_core::{run_turn, topics, EventBus, SessionQueue, TurnConfig};
use hearth_model::{Message, Provider, Role};
use hearth_store::{MetricRecord, Store, TaskRecord, TaskStatus};
use hearth_tools::ToolRegistry;

use crate::error::{Result, RuntimeError};
use crate::estimate::TimeoutEstimator;
use crate::lifecycle::LifecycleManager;
use crate::templates::{CreateTemplateSpec, TemplateManager};

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Metric task type recorded for every delegated run.
const TASK_TYPE_DELEGATION: &str = "delegation";

/// Template specification applied after a successful run: the runner
/// either records usage on the best-matching existing template or creates
/// a new one from this spec.
#[derive(Debug, Clone)]
pub struct TemplateAutoCreate {
    pub name: String,
    pub role_description: String,
    pub default_tools: Vec<String>,
    pub default_tier: Option<String>,
    pub tags: Vec<String>,
}

/// One fire-and-forget delegation.
#[derive(Debug, Clone)]
pub struct TaskSpec {
    pub user_id: String,
    pub agent_id: String,
    pub task: String,
    pub tier: Option<String>,
    /// Explicit timeout; when absent the estimator derives one from
    /// recent metrics for this tier.
    pub timeout: Option<Duration>,
    pub template_auto_create: Option<TemplateAutoCreate>,
}

/// Runs delegated tasks against sub-agents in the background.
///
/// Execution is serialized per agent through the session queue (key
/// `agent:<id>`), so a burst of delegations to one specialist cannot
/// interleave its conversation.  The task row is durable; the in-memory
/// completion handle is best-effort and dropping it (via `cancel`) merely
/// abandons interest — the run still completes and records its result.
pub struct BackgroundRunner {
    store: Arc<Store>,
    queue: Arc<SessionQueue>,
    lifecycle: Arc<LifecycleManager>,
    templates: Arc<TemplateManager>,
    bus: Arc<EventBus>,
    estimator: TimeoutEstimator,
    provider: Arc<dyn Provider>,
    /// Tools sub-agents may be granted, by name.
    tool_catalog: Arc<ToolRegistry>,
    config: AgentConfig,
    handles: Mutex<HashMap<String, oneshot::Receiver<bool>>>,
}

impl BackgroundRunner {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<Store>,
        queue: Arc<SessionQueue>,
        lifecycle: Arc<LifecycleManager>,
        templates: Arc<TemplateManager>,
        bus: Arc<EventBus>,
        provider: Arc<dyn Provider>,
        tool_catalog: Arc<ToolRegistry>,
        config: AgentConfig,
    ) -> Self {
        let estimator = TimeoutEstimator::new(
            Arc::clone(&store),
            Duration::from_secs(config.task_timeout_secs),
        );
        Self {
            store,
            queue,
            lifecycle,
            templates,
            bus,
            estimator,
            provider,
            tool_catalog,
            config,
            handles: Mutex::new(HashMap::new()),
        }
    }

    /// Start a delegated task.  Returns the task id immediately; the run
    /// itself is queued behind any other task already executing against
    /// the same agent.
    pub fn start(self: &Arc<Self>, spec: TaskSpec) -> Result<String> {
        // Fail fast on unknown agents so the caller gets a tool-level
        // error instead of a background failure nobody is watching.
        self.lifecycle.get(&spec.agent_id)?;

        let task_id = uuid::Uuid::new_v4().to_string();
        self.store.insert_task(&TaskRecord {
            id: task_id.clone(),
            user_id: spec.user_id.clone(),
            agent_id: spec.agent_id.clone(),
            task_description: spec.task.clone(),
            status: TaskStatus::Running,
            result: None,
            started_at: now_ms(),
            completed_at: None,
            delivered_at: None,
        })?;
        self.bus.emit(
            topics::TASK_QUEUED,
            &spec.user_id,
            json!({ "task_id": task_id, "agent_id": spec.agent_id }),
        );

        let timeout = spec.timeout.unwrap_or_else(|| {
            self.estimator
                .estimate(TASK_TYPE_DELEGATION, spec.tier.as_deref())
        });

        let runner = Arc::clone(self);
        let queue_key = format!("agent:{}", spec.agent_id);
        let run_task_id = task_id.clone();
        let receiver = self.queue.enqueue(&queue_key, move || async move {
            runner.run_delegation(&run_task_id, spec, timeout).await
        });
        self.handles
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(task_id.clone(), receiver);

        Ok(task_id)
    }

    /// The queued body of one delegation: load the agent's conversation,
    /// run the iteration loop, persist the exchange, account the outcome.
    async fn run_delegation(&self, task_id: &str, spec: TaskSpec, timeout: Duration) -> bool {
        let started = std::time::Instant::now();

        let agent = match self.lifecycle.get(&spec.agent_id) {
            Ok(agent) => agent,
            Err(e) => {
                self.finish_task(task_id, &spec, false, &e.to_string());
                return false;
            }
        };

        let prior = self
            .lifecycle
            .get_messages(&agent.id, self.config.max_agent_messages)
            .unwrap_or_default();
        let mut messages: Vec<Message> = prior
            .iter()
            .filter_map(|m| {
                let role: Role = m.role.parse().ok()?;
                Some(Message {
                    role,
                    content: m.content.clone(),
                    tool_call_id: None,
                    tool_calls: None,
                })
            })
            .filter(|m| m.role != Role::System)
            .collect();
        messages.push(Message::user(&spec.task));

        let result = run_turn(TurnConfig {
            provider: Arc::clone(&self.provider),
            system_prompt: agent.system_prompt.clone(),
            messages,
            tools: self.registry_for(&agent.tools_granted),
            max_iterations: self.config.sub_agent_max_iterations,
            timeout,
        })
        .await;

        // Persist the exchange to the agent's own conversation log.
        if let Err(e) = self.lifecycle.save_message(&agent.id, "user", &spec.task) {
            warn!(agent_id = %agent.id, error = %e, "failed to persist task message");
        }
        if result.success {
            if let Err(e) = self
                .lifecycle
                .save_message(&agent.id, "assistant", &result.response)
            {
                warn!(agent_id = %agent.id, error = %e, "failed to persist agent response");
            }
        }

        if let Err(e) = self.lifecycle.record_task_result(&agent.id, result.success) {
            warn!(agent_id = %agent.id, error = %e, "failed to record task result");
        }

        if result.success {
            if let Some(template_spec) = &spec.template_auto_create {
                self.ensure_template(&spec.user_id, template_spec);
            }
        }

        self.finish_task(task_id, &spec, result.success, &result.response);

        let metric = MetricRecord {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: spec.user_id.clone(),
            task_type: TASK_TYPE_DELEGATION.into(),
            tier: spec.tier.clone(),
            duration_ms: started.elapsed().as_millis() as i64,
            iterations: result.iterations as i64,
            success: result.success,
            created_at: now_ms(),
        };
        if let Err(e) = self.store.insert_metric(&metric) {
            warn!(error = %e, "failed to record task metric");
        }

        result.success
    }

    /// Record usage on the best-matching template for this role, creating
    /// one from the spec when no template matches.
    fn ensure_template(&self, user_id: &str, spec: &TemplateAutoCreate) {
        let matched = self
            .templates
            .find_best_match(user_id, &spec.name)
            .unwrap_or(None);
        let template_id = match matched {
            Some(t) => t.id,
            None => match self.templates.create(CreateTemplateSpec {
                user_id: user_id.to_string(),
                name: spec.name.clone(),
                role_description: spec.role_description.clone(),
                default_tools: spec.default_tools.clone(),
                default_tier: spec.default_tier.clone(),
                tags: spec.tags.clone(),
            }) {
                Ok(t) => {
                    debug!(template = %t.name, "auto-created template from delegation");
                    t.id
                }
                Err(e) => {
                    warn!(error = %e, "template auto-creation failed");
                    return;
                }
            },
        };
        if let Err(e) = self.templates.record_usage(&template_id, 1.0) {
            warn!(error = %e, "failed to record template usage");
        }
    }

    fn finish_task(&self, task_id: &str, spec: &TaskSpec, success: bool, result: &str) {
        let status = if success {
            TaskStatus::Completed
        } else {
            TaskStatus::Failed
        };
        if let Err(e) = self.store.complete_task(task_id, status, result, now_ms()) {
            warn!(task_id, error = %e, "failed to persist task completion");
        }
        let topic = if success {
            topics::TASK_COMPLETED
        } else {
            topics::TASK_FAILED
        };
        self.bus.emit(
            topic,
            &spec.user_id,
            json!({ "task_id": task_id, "agent_id": spec.agent_id }),
        );
    }

    fn registry_for(&self, granted: &[String]) -> Arc<ToolRegistry> {
        let mut registry = ToolRegistry::new();
        for name in granted {
            match self.tool_catalog.get(name) {
                Some(tool) => registry.register_arc(tool),
                None => debug!(tool = %name, "granted tool not in catalog; skipped"),
            }
        }
        Arc::new(registry)
    }

    // ─── Inbox operations ────────────────────────────────────────────────────

    pub fn get_status(&self, task_id: &str) -> Result<TaskRecord> {
        self.store
            .get_task(task_id)?
            .ok_or_else(|| RuntimeError::NotFound(format!("task {task_id}")))
    }

    /// Finished tasks not yet surfaced to the user, oldest first.
    pub fn get_undelivered(&self, user_id: &str) -> Result<Vec<TaskRecord>> {
        Ok(self.store.list_undelivered_tasks(user_id)?)
    }

    pub fn mark_delivered(&self, task_id: &str) -> Result<()> {
        if !self.store.mark_task_delivered(task_id, now_ms())? {
            return Err(RuntimeError::NotFound(format!(
                "undelivered finished task {task_id}"
            )));
        }
        Ok(())
    }

    /// Drop the in-memory completion handle.  Best-effort only: the run
    /// continues and its record completes normally.
    pub fn cancel(&self, task_id: &str) {
        self.handles
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(task_id);
    }

    /// Await a task's completion.  Returns `None` for unknown or
    /// cancelled tasks, `Some(success)` otherwise.
    pub async fn wait(&self, task_id: &str) -> Option<bool> {
        let receiver = self
            .handles
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(task_id)?;
        receiver.await.ok()
    }

    /// Mark long-running rows as failed.  These are orphans whose
    /// in-memory future died with a previous process.
    pub fn cleanup_stale(&self, older_than_ms: i64) -> Result<usize> {
        let now = now_ms();
        let count = self.store.mark_stale_tasks_failed(now - older_than_ms, now)?;
        if count > 0 {
            warn!(count, "marked stale background tasks as failed");
        }
        Ok(count)
    }
}

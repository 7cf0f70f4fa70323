// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::path::Path;
use std::sync::Mutex;

use rusqlite::Connection;

use crate::error::Result;
use crate::queries;
use crate::records::*;
use crate::schema;

/// The single source of truth for all durable runtime state.
///
/// One process owns the store; concurrent callers are safe because every
/// operation takes the connection mutex, which serializes writes.  Other
/// components hold no record references across call boundaries — they
/// re-read on demand.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init()?;
        Ok(store)
    }

    fn init(&self) -> Result<()> {
        let conn = self.lock();
        schema::init_schema(&conn)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        // A poisoned mutex means another thread panicked mid-query; the
        // connection itself is still usable.
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ─── Messages ────────────────────────────────────────────────────────────

    pub fn insert_message(&self, msg: &MessageRecord) -> Result<()> {
        queries::messages::insert(&self.lock(), msg)
    }

    pub fn list_recent_messages(&self, user_id: &str, limit: usize) -> Result<Vec<MessageRecord>> {
        queries::messages::list_recent(&self.lock(), user_id, limit)
    }

    pub fn count_messages(&self, user_id: &str) -> Result<usize> {
        queries::messages::count(&self.lock(), user_id)
    }

    pub fn delete_messages_before(&self, user_id: &str, cutoff: i64) -> Result<usize> {
        queries::messages::delete_before(&self.lock(), user_id, cutoff)
    }

    pub fn delete_messages_for_user(&self, user_id: &str) -> Result<usize> {
        queries::messages::delete_for_user(&self.lock(), user_id)
    }

    // ─── Sub-agents ──────────────────────────────────────────────────────────

    pub fn insert_agent(&self, agent: &AgentRecord) -> Result<()> {
        queries::agents::insert(&self.lock(), agent)
    }

    pub fn get_agent(&self, id: &str) -> Result<Option<AgentRecord>> {
        queries::agents::get(&self.lock(), id)
    }

    pub fn list_agents_by_status(
        &self,
        user_id: &str,
        statuses: &[AgentStatus],
    ) -> Result<Vec<AgentRecord>> {
        queries::agents::list_by_status(&self.lock(), user_id, statuses)
    }

    pub fn count_active_agents(&self, user_id: &str) -> Result<usize> {
        queries::agents::count_active(&self.lock(), user_id)
    }

    pub fn set_agent_status(
        &self,
        id: &str,
        status: AgentStatus,
        deleted_at: Option<i64>,
    ) -> Result<bool> {
        queries::agents::set_status(&self.lock(), id, status, deleted_at)
    }

    pub fn record_agent_task_result(&self, id: &str, success: bool, now: i64) -> Result<bool> {
        queries::agents::record_task_result(&self.lock(), id, success, now)
    }

    pub fn touch_agent(&self, id: &str, now: i64) -> Result<()> {
        queries::agents::touch_last_active(&self.lock(), id, now)
    }

    pub fn delete_expired_agents(&self, cutoff: i64) -> Result<usize> {
        queries::agents::delete_expired(&self.lock(), cutoff)
    }

    /// Hard-delete one agent row and its entire synthetic-user conversation.
    pub fn delete_agent_cascading(&self, id: &str) -> Result<bool> {
        let conn = self.lock();
        queries::messages::delete_for_user(&conn, &subagent_user_id(id))?;
        queries::agents::delete(&conn, id)
    }

    // ─── Templates ───────────────────────────────────────────────────────────

    pub fn insert_template(&self, template: &TemplateRecord) -> Result<()> {
        queries::templates::insert(&self.lock(), template)
    }

    pub fn get_template(&self, id: &str) -> Result<Option<TemplateRecord>> {
        queries::templates::get(&self.lock(), id)
    }

    pub fn list_templates(&self, user_id: &str) -> Result<Vec<TemplateRecord>> {
        queries::templates::list(&self.lock(), user_id)
    }

    pub fn count_templates(&self, user_id: &str) -> Result<usize> {
        queries::templates::count(&self.lock(), user_id)
    }

    pub fn update_template(&self, template: &TemplateRecord) -> Result<bool> {
        queries::templates::update(&self.lock(), template)
    }

    pub fn record_template_usage(&self, id: &str, score: f64, now: i64) -> Result<bool> {
        queries::templates::record_usage(&self.lock(), id, score, now)
    }

    pub fn delete_template(&self, id: &str) -> Result<bool> {
        queries::templates::delete(&self.lock(), id)
    }

    // ─── Background tasks ────────────────────────────────────────────────────

    pub fn insert_task(&self, task: &TaskRecord) -> Result<()> {
        queries::tasks::insert(&self.lock(), task)
    }

    pub fn get_task(&self, id: &str) -> Result<Option<TaskRecord>> {
        queries::tasks::get(&self.lock(), id)
    }

    pub fn complete_task(
        &self,
        id: &str,
        status: TaskStatus,
        result: &str,
        completed_at: i64,
    ) -> Result<bool> {
        queries::tasks::complete(&self.lock(), id, status, result, completed_at)
    }

    pub fn list_undelivered_tasks(&self, user_id: &str) -> Result<Vec<TaskRecord>> {
        queries::tasks::list_undelivered(&self.lock(), user_id)
    }

    pub fn mark_task_delivered(&self, id: &str, now: i64) -> Result<bool> {
        queries::tasks::mark_delivered(&self.lock(), id, now)
    }

    pub fn mark_stale_tasks_failed(&self, started_before: i64, now: i64) -> Result<usize> {
        queries::tasks::mark_stale_failed(&self.lock(), started_before, now)
    }

    // ─── Compactions ─────────────────────────────────────────────────────────

    pub fn insert_compaction(&self, record: &CompactionRecord) -> Result<()> {
        queries::compactions::insert(&self.lock(), record)
    }

    pub fn latest_compaction(&self, user_id: &str) -> Result<Option<CompactionRecord>> {
        queries::compactions::latest(&self.lock(), user_id)
    }

    // ─── Blackboard ──────────────────────────────────────────────────────────

    pub fn insert_blackboard_entry(&self, entry: &BlackboardRecord) -> Result<()> {
        queries::blackboard::insert(&self.lock(), entry)
    }

    pub fn get_blackboard_entry(&self, id: &str) -> Result<Option<BlackboardRecord>> {
        queries::blackboard::get(&self.lock(), id)
    }

    pub fn list_proposals(&self, problem_id: &str) -> Result<Vec<BlackboardRecord>> {
        queries::blackboard::proposals_for(&self.lock(), problem_id)
    }

    pub fn count_proposals(&self, problem_id: &str) -> Result<usize> {
        queries::blackboard::proposal_count(&self.lock(), problem_id)
    }

    pub fn resolve_problem(&self, problem_id: &str, synthesis: &str) -> Result<bool> {
        queries::blackboard::resolve(&self.lock(), problem_id, synthesis)
    }

    pub fn list_open_problems(&self, user_id: &str) -> Result<Vec<BlackboardRecord>> {
        queries::blackboard::open_problems(&self.lock(), user_id)
    }

    pub fn delete_resolved_problems_before(&self, cutoff: i64) -> Result<usize> {
        queries::blackboard::delete_resolved_before(&self.lock(), cutoff)
    }

    // ─── Metrics ─────────────────────────────────────────────────────────────

    pub fn insert_metric(&self, metric: &MetricRecord) -> Result<()> {
        queries::metrics::insert(&self.lock(), metric)
    }

    pub fn recent_metrics(
        &self,
        task_type: &str,
        tier: Option<&str>,
        limit: usize,
    ) -> Result<Vec<MetricRecord>> {
        queries::metrics::recent(&self.lock(), task_type, tier, limit)
    }

    // ─── Episodic memory ─────────────────────────────────────────────────────

    pub fn upsert_memory(&self, record: &MemoryRecord) -> Result<()> {
        queries::memory::upsert(&self.lock(), record)
    }

    pub fn get_memory(&self, user_id: &str, key: &str) -> Result<Option<MemoryRecord>> {
        queries::memory::get(&self.lock(), user_id, key)
    }

    pub fn search_memory(
        &self,
        user_id: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<MemoryRecord>> {
        queries::memory::search(&self.lock(), user_id, query, limit)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn message(user_id: &str, role: &str, content: &str, ts: i64) -> MessageRecord {
        MessageRecord {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            role: role.into(),
            content: content.into(),
            created_at: ts,
        }
    }

    fn agent(user_id: &str, role: &str) -> AgentRecord {
        AgentRecord {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            role: role.into(),
            system_prompt: "prompt".into(),
            tools_granted: vec!["delegate_task".into()],
            tier_preference: None,
            status: AgentStatus::Active,
            performance_score: 0.5,
            total_tasks: 0,
            successful_tasks: 0,
            template_id: None,
            created_at: 1,
            last_active_at: 1,
            deleted_at: None,
        }
    }

    #[test]
    fn schema_initializes_empty() {
        let store = Store::open_in_memory().unwrap();
        assert_eq!(store.count_messages("u1").unwrap(), 0);
        assert_eq!(store.count_active_agents("u1").unwrap(), 0);
    }

    #[test]
    fn open_on_disk_creates_and_reopens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hearth.db");
        {
            let store = Store::open(&path).unwrap();
            store.insert_message(&message("u1", "user", "hi", 10)).unwrap();
        }
        let store = Store::open(&path).unwrap();
        assert_eq!(store.count_messages("u1").unwrap(), 1);
    }

    #[test]
    fn messages_list_recent_truncates_oldest() {
        let store = Store::open_in_memory().unwrap();
        for i in 0..5 {
            store
                .insert_message(&message("u1", "user", &format!("m{i}"), i))
                .unwrap();
        }
        let recent = store.list_recent_messages("u1", 3).unwrap();
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].content, "m2");
        assert_eq!(recent[2].content, "m4");
    }

    #[test]
    fn messages_same_timestamp_keep_insertion_order() {
        let store = Store::open_in_memory().unwrap();
        for label in ["a", "b", "c"] {
            store.insert_message(&message("u1", "user", label, 42)).unwrap();
        }
        let recent = store.list_recent_messages("u1", 10).unwrap();
        let contents: Vec<_> = recent.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["a", "b", "c"]);
    }

    #[test]
    fn delete_before_removes_only_older() {
        let store = Store::open_in_memory().unwrap();
        store.insert_message(&message("u1", "user", "old", 10)).unwrap();
        store.insert_message(&message("u1", "user", "new", 20)).unwrap();
        let removed = store.delete_messages_before("u1", 15).unwrap();
        assert_eq!(removed, 1);
        let remaining = store.list_recent_messages("u1", 10).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].content, "new");
    }

    #[test]
    fn agent_task_result_updates_score_in_sql() {
        let store = Store::open_in_memory().unwrap();
        let a = agent("u1", "Researcher");
        store.insert_agent(&a).unwrap();

        store.record_agent_task_result(&a.id, true, 100).unwrap();
        let after = store.get_agent(&a.id).unwrap().unwrap();
        assert_eq!(after.total_tasks, 1);
        assert_eq!(after.successful_tasks, 1);
        assert!((after.performance_score - 1.0).abs() < 1e-9);

        store.record_agent_task_result(&a.id, false, 200).unwrap();
        let after = store.get_agent(&a.id).unwrap().unwrap();
        assert_eq!(after.total_tasks, 2);
        assert_eq!(after.successful_tasks, 1);
        assert!((after.performance_score - 0.5).abs() < 1e-9);
        assert_eq!(after.last_active_at, 200);
    }

    #[test]
    fn agent_status_transitions_and_tombstones() {
        let store = Store::open_in_memory().unwrap();
        let a = agent("u1", "Coder");
        store.insert_agent(&a).unwrap();

        store
            .set_agent_status(&a.id, AgentStatus::SoftDeleted, Some(500))
            .unwrap();
        let got = store.get_agent(&a.id).unwrap().unwrap();
        assert_eq!(got.status, AgentStatus::SoftDeleted);
        assert_eq!(got.deleted_at, Some(500));
        assert_eq!(store.count_active_agents("u1").unwrap(), 0);

        store.set_agent_status(&a.id, AgentStatus::Active, None).unwrap();
        let got = store.get_agent(&a.id).unwrap().unwrap();
        assert_eq!(got.status, AgentStatus::Active);
        assert_eq!(got.deleted_at, None);
    }

    #[test]
    fn expired_tombstones_are_swept() {
        let store = Store::open_in_memory().unwrap();
        let a = agent("u1", "Old");
        let b = agent("u1", "Fresh");
        store.insert_agent(&a).unwrap();
        store.insert_agent(&b).unwrap();
        store
            .set_agent_status(&a.id, AgentStatus::SoftDeleted, Some(100))
            .unwrap();
        store
            .set_agent_status(&b.id, AgentStatus::SoftDeleted, Some(900))
            .unwrap();

        let removed = store.delete_expired_agents(500).unwrap();
        assert_eq!(removed, 1);
        assert!(store.get_agent(&a.id).unwrap().is_none());
        assert!(store.get_agent(&b.id).unwrap().is_some());
    }

    #[test]
    fn kill_cascades_to_synthetic_messages() {
        let store = Store::open_in_memory().unwrap();
        let a = agent("u1", "Victim");
        store.insert_agent(&a).unwrap();
        let synthetic = subagent_user_id(&a.id);
        store.insert_message(&message(&synthetic, "user", "task", 1)).unwrap();
        store
            .insert_message(&message(&synthetic, "assistant", "done", 2))
            .unwrap();

        assert!(store.delete_agent_cascading(&a.id).unwrap());
        assert!(store.get_agent(&a.id).unwrap().is_none());
        assert_eq!(store.count_messages(&synthetic).unwrap(), 0);
    }

    #[test]
    fn template_usage_updates_running_mean() {
        let store = Store::open_in_memory().unwrap();
        let t = TemplateRecord {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: "u1".into(),
            name: "Research Analyst".into(),
            role_description: "researches things".into(),
            default_tools: vec![],
            default_tier: None,
            times_used: 0,
            avg_performance: 0.5,
            tags: vec!["research".into()],
            created_at: 1,
            updated_at: 1,
        };
        store.insert_template(&t).unwrap();

        store.record_template_usage(&t.id, 1.0, 10).unwrap();
        let got = store.get_template(&t.id).unwrap().unwrap();
        assert_eq!(got.times_used, 1);
        assert!((got.avg_performance - 1.0).abs() < 1e-9);

        store.record_template_usage(&t.id, 0.0, 20).unwrap();
        let got = store.get_template(&t.id).unwrap().unwrap();
        assert_eq!(got.times_used, 2);
        assert!((got.avg_performance - 0.5).abs() < 1e-9);
    }

    #[test]
    fn task_lifecycle_and_inbox() {
        let store = Store::open_in_memory().unwrap();
        let task = TaskRecord {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: "u1".into(),
            agent_id: "a1".into(),
            task_description: "do it".into(),
            status: TaskStatus::Running,
            result: None,
            started_at: 100,
            completed_at: None,
            delivered_at: None,
        };
        store.insert_task(&task).unwrap();

        // Running tasks are not in the inbox, and cannot be delivered.
        assert!(store.list_undelivered_tasks("u1").unwrap().is_empty());
        assert!(!store.mark_task_delivered(&task.id, 150).unwrap());

        store
            .complete_task(&task.id, TaskStatus::Completed, "all done", 200)
            .unwrap();
        let inbox = store.list_undelivered_tasks("u1").unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].result.as_deref(), Some("all done"));

        assert!(store.mark_task_delivered(&task.id, 300).unwrap());
        let got = store.get_task(&task.id).unwrap().unwrap();
        assert_eq!(got.status, TaskStatus::Delivered);
        assert_eq!(got.delivered_at, Some(300));
        assert!(store.list_undelivered_tasks("u1").unwrap().is_empty());
    }

    #[test]
    fn stale_running_tasks_are_failed() {
        let store = Store::open_in_memory().unwrap();
        let task = TaskRecord {
            id: "stale-1".into(),
            user_id: "u1".into(),
            agent_id: "a1".into(),
            task_description: "orphaned".into(),
            status: TaskStatus::Running,
            result: None,
            started_at: 100,
            completed_at: None,
            delivered_at: None,
        };
        store.insert_task(&task).unwrap();
        let n = store.mark_stale_tasks_failed(500, 600).unwrap();
        assert_eq!(n, 1);
        let got = store.get_task("stale-1").unwrap().unwrap();
        assert_eq!(got.status, TaskStatus::Failed);
        assert!(got.result.unwrap().contains("stale"));
    }

    #[test]
    fn latest_compaction_wins_by_created_at() {
        let store = Store::open_in_memory().unwrap();
        for (id, ts) in [("c1", 100), ("c2", 300), ("c3", 200)] {
            store
                .insert_compaction(&CompactionRecord {
                    id: id.into(),
                    user_id: "u1".into(),
                    summary: format!("summary {id}"),
                    replaced_before: ts,
                    created_at: ts,
                })
                .unwrap();
        }
        let latest = store.latest_compaction("u1").unwrap().unwrap();
        assert_eq!(latest.id, "c2");
    }

    #[test]
    fn blackboard_proposals_sorted_by_confidence() {
        let store = Store::open_in_memory().unwrap();
        let problem = BlackboardRecord {
            id: "p1".into(),
            user_id: "u1".into(),
            problem_id: "p1".into(),
            problem_text: Some("best deployment?".into()),
            agent_id: None,
            agent_role: None,
            proposal: None,
            confidence: None,
            status: BlackboardStatus::Open,
            synthesis: None,
            created_at: 1,
        };
        store.insert_blackboard_entry(&problem).unwrap();
        for (i, conf) in [0.7, 0.9, 0.85].iter().enumerate() {
            store
                .insert_blackboard_entry(&BlackboardRecord {
                    id: format!("prop-{i}"),
                    user_id: "u1".into(),
                    problem_id: "p1".into(),
                    problem_text: None,
                    agent_id: Some(format!("a{i}")),
                    agent_role: Some("role".into()),
                    proposal: Some(format!("idea {i}")),
                    confidence: Some(*conf),
                    status: BlackboardStatus::Open,
                    synthesis: None,
                    created_at: 2 + i as i64,
                })
                .unwrap();
        }
        let props = store.list_proposals("p1").unwrap();
        let confs: Vec<f64> = props.iter().map(|p| p.confidence.unwrap()).collect();
        assert_eq!(confs, vec![0.9, 0.85, 0.7]);
        assert_eq!(store.count_proposals("p1").unwrap(), 3);

        assert!(store.resolve_problem("p1", "use canary").unwrap());
        assert!(store.list_open_problems("u1").unwrap().is_empty());
        // Proposals survive resolution.
        assert_eq!(store.list_proposals("p1").unwrap().len(), 3);
    }

    #[test]
    fn resolved_problems_are_swept_with_proposals() {
        let store = Store::open_in_memory().unwrap();
        let problem = BlackboardRecord {
            id: "p1".into(),
            user_id: "u1".into(),
            problem_id: "p1".into(),
            problem_text: Some("q".into()),
            agent_id: None,
            agent_role: None,
            proposal: None,
            confidence: None,
            status: BlackboardStatus::Open,
            synthesis: None,
            created_at: 10,
        };
        store.insert_blackboard_entry(&problem).unwrap();
        store
            .insert_blackboard_entry(&BlackboardRecord {
                id: "prop-1".into(),
                problem_id: "p1".into(),
                problem_text: None,
                agent_id: Some("a1".into()),
                agent_role: Some("r".into()),
                proposal: Some("idea".into()),
                confidence: Some(0.5),
                synthesis: None,
                created_at: 11,
                ..problem.clone()
            })
            .unwrap();
        store.resolve_problem("p1", "done").unwrap();

        let removed = store.delete_resolved_problems_before(100).unwrap();
        assert_eq!(removed, 1);
        assert!(store.get_blackboard_entry("p1").unwrap().is_none());
        assert!(store.get_blackboard_entry("prop-1").unwrap().is_none());
    }

    #[test]
    fn metrics_recent_filters_by_type_and_tier() {
        let store = Store::open_in_memory().unwrap();
        for (i, (ty, tier)) in [
            ("delegation", Some("simple")),
            ("delegation", Some("complex")),
            ("delegation", Some("simple")),
            ("chat", Some("simple")),
        ]
        .iter()
        .enumerate()
        {
            store
                .insert_metric(&MetricRecord {
                    id: format!("m{i}"),
                    user_id: "u1".into(),
                    task_type: ty.to_string(),
                    tier: tier.map(String::from),
                    duration_ms: 1000 * (i as i64 + 1),
                    iterations: 1,
                    success: true,
                    created_at: i as i64,
                })
                .unwrap();
        }
        let recent = store.recent_metrics("delegation", Some("simple"), 10).unwrap();
        assert_eq!(recent.len(), 2);
        // Newest first.
        assert_eq!(recent[0].id, "m2");
    }

    #[test]
    fn memory_upsert_is_unique_per_user_and_key() {
        let store = Store::open_in_memory().unwrap();
        let rec = MemoryRecord {
            id: "mem-1".into(),
            user_id: "u1".into(),
            key: "favorite_color".into(),
            content: "blue".into(),
            updated_at: 1,
        };
        store.upsert_memory(&rec).unwrap();
        store
            .upsert_memory(&MemoryRecord {
                content: "green".into(),
                updated_at: 2,
                ..rec.clone()
            })
            .unwrap();
        let got = store.get_memory("u1", "favorite_color").unwrap().unwrap();
        assert_eq!(got.content, "green");

        let found = store.search_memory("u1", "gree", 10).unwrap();
        assert_eq!(found.len(), 1);
    }
}

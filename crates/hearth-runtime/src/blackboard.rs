// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::Arc;

use serde_json::json;
use tracing::warn;

use hearth_core::{topics, EventBus};
use hearth_store::{BlackboardRecord, BlackboardStatus, Store};

use crate::error::{Result, RuntimeError};

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Longest synthesis excerpt carried on the `blackboard:resolved` event.
const SYNTHESIS_EVENT_LIMIT: usize = 200;

/// An open problem with its live proposal count.
#[derive(Debug, Clone)]
pub struct ActiveProblem {
    pub problem: BlackboardRecord,
    pub proposal_count: usize,
}

/// Persistent shared problem space: the primary agent posts a problem,
/// sub-agents post scored proposals against it, and the primary agent
/// resolves it with a synthesis.  Proposals stay queryable afterwards.
pub struct Blackboard {
    store: Arc<Store>,
    bus: Arc<EventBus>,
}

impl Blackboard {
    pub fn new(store: Arc<Store>, bus: Arc<EventBus>) -> Self {
        Self { store, bus }
    }

    /// Post a new problem; the returned id doubles as the root entry id.
    pub fn post_problem(&self, user_id: &str, problem: &str) -> Result<String> {
        let problem_id = uuid::Uuid::new_v4().to_string();
        self.store.insert_blackboard_entry(&BlackboardRecord {
            id: problem_id.clone(),
            user_id: user_id.to_string(),
            problem_id: problem_id.clone(),
            problem_text: Some(problem.to_string()),
            agent_id: None,
            agent_role: None,
            proposal: None,
            confidence: None,
            status: BlackboardStatus::Open,
            synthesis: None,
            created_at: now_ms(),
        })?;
        Ok(problem_id)
    }

    /// Attach a scored proposal to a problem.  Confidence is clamped to
    /// [0, 1]; the user id is inherited from the root problem.
    pub fn add_proposal(
        &self,
        problem_id: &str,
        agent_id: &str,
        agent_role: &str,
        proposal: &str,
        confidence: f64,
    ) -> Result<String> {
        let user_id = match self.store.get_blackboard_entry(problem_id)? {
            Some(root) => root.user_id,
            None => {
                warn!(problem_id, "proposal posted against unknown problem");
                "unknown".to_string()
            }
        };
        let confidence = confidence.clamp(0.0, 1.0);
        let id = uuid::Uuid::new_v4().to_string();
        self.store.insert_blackboard_entry(&BlackboardRecord {
            id: id.clone(),
            user_id: user_id.clone(),
            problem_id: problem_id.to_string(),
            problem_text: None,
            agent_id: Some(agent_id.to_string()),
            agent_role: Some(agent_role.to_string()),
            proposal: Some(proposal.to_string()),
            confidence: Some(confidence),
            status: BlackboardStatus::Open,
            synthesis: None,
            created_at: now_ms(),
        })?;
        self.bus.emit(
            topics::BLACKBOARD_PROPOSAL,
            &user_id,
            json!({
                "problem_id": problem_id,
                "agent_id": agent_id,
                "agent_role": agent_role,
                "confidence": confidence,
            }),
        );
        Ok(id)
    }

    /// Proposals for a problem, best confidence first.
    pub fn get_proposals(&self, problem_id: &str) -> Result<Vec<BlackboardRecord>> {
        Ok(self.store.list_proposals(problem_id)?)
    }

    /// Resolve the problem with a synthesis of its proposals.
    pub fn resolve(&self, problem_id: &str, synthesis: &str) -> Result<()> {
        let root = self
            .store
            .get_blackboard_entry(problem_id)?
            .filter(|r| r.is_problem())
            .ok_or_else(|| RuntimeError::NotFound(format!("problem {problem_id}")))?;
        self.store.resolve_problem(problem_id, synthesis)?;

        let excerpt: String = synthesis.chars().take(SYNTHESIS_EVENT_LIMIT).collect();
        self.bus.emit(
            topics::BLACKBOARD_RESOLVED,
            &root.user_id,
            json!({ "problem_id": problem_id, "synthesis": excerpt }),
        );
        Ok(())
    }

    /// Open problems for a user, each with its live proposal count.
    pub fn get_active_problems(&self, user_id: &str) -> Result<Vec<ActiveProblem>> {
        let problems = self.store.list_open_problems(user_id)?;
        let mut out = Vec::with_capacity(problems.len());
        for problem in problems {
            let proposal_count = self.store.count_proposals(&problem.problem_id)?;
            out.push(ActiveProblem {
                problem,
                proposal_count,
            });
        }
        Ok(out)
    }

    /// Hard-delete resolved problems (and their proposals) older than the
    /// cutoff.  Returns the number of problems removed.
    pub fn cleanup(&self, older_than_ms: i64) -> Result<usize> {
        let cutoff = now_ms() - older_than_ms;
        Ok(self.store.delete_resolved_problems_before(cutoff)?)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn blackboard() -> (Blackboard, Arc<EventBus>) {
        let bus = Arc::new(EventBus::new(100));
        (
            Blackboard::new(Arc::new(Store::open_in_memory().unwrap()), Arc::clone(&bus)),
            bus,
        )
    }

    #[test]
    fn proposals_come_back_sorted_by_confidence() {
        let (bb, _) = blackboard();
        let pid = bb.post_problem("u3", "Best deployment?").unwrap();
        bb.add_proposal(&pid, "a1", "DevOps", "blue/green", 0.90).unwrap();
        bb.add_proposal(&pid, "a2", "SRE", "big bang", 0.70).unwrap();
        bb.add_proposal(&pid, "a3", "Platform", "canary", 0.85).unwrap();

        let proposals = bb.get_proposals(&pid).unwrap();
        let confidences: Vec<f64> = proposals.iter().map(|p| p.confidence.unwrap()).collect();
        assert_eq!(confidences, vec![0.90, 0.85, 0.70]);
    }

    #[test]
    fn confidence_is_clamped() {
        let (bb, _) = blackboard();
        let pid = bb.post_problem("u1", "q").unwrap();
        bb.add_proposal(&pid, "a1", "r", "over-eager", 7.5).unwrap();
        bb.add_proposal(&pid, "a2", "r", "defeatist", -2.0).unwrap();
        let proposals = bb.get_proposals(&pid).unwrap();
        assert_eq!(proposals[0].confidence, Some(1.0));
        assert_eq!(proposals[1].confidence, Some(0.0));
    }

    #[test]
    fn proposal_inherits_user_from_root() {
        let (bb, _) = blackboard();
        let pid = bb.post_problem("u3", "q").unwrap();
        bb.add_proposal(&pid, "a1", "r", "idea", 0.5).unwrap();
        let proposals = bb.get_proposals(&pid).unwrap();
        assert_eq!(proposals[0].user_id, "u3");
    }

    #[test]
    fn orphan_proposal_falls_back_to_unknown_user() {
        let (bb, _) = blackboard();
        bb.add_proposal("no-such-problem", "a1", "r", "idea", 0.5).unwrap();
        let proposals = bb.get_proposals("no-such-problem").unwrap();
        assert_eq!(proposals[0].user_id, "unknown");
    }

    #[test]
    fn resolve_clears_active_but_keeps_proposals() {
        let (bb, bus) = blackboard();
        let pid = bb.post_problem("u3", "Best deployment?").unwrap();
        bb.add_proposal(&pid, "a1", "DevOps", "canary", 0.9).unwrap();

        assert_eq!(bb.get_active_problems("u3").unwrap().len(), 1);
        bb.resolve(&pid, "Use canary").unwrap();
        assert!(bb.get_active_problems("u3").unwrap().is_empty());
        assert_eq!(bb.get_proposals(&pid).unwrap().len(), 1);

        let events = bus.recent(topics::BLACKBOARD_RESOLVED, 1);
        assert_eq!(events[0].data["synthesis"], "Use canary");
    }

    #[test]
    fn resolve_unknown_problem_is_not_found() {
        let (bb, _) = blackboard();
        assert!(matches!(
            bb.resolve("ghost", "synthesis"),
            Err(RuntimeError::NotFound(_))
        ));
    }

    #[test]
    fn resolved_event_truncates_long_synthesis() {
        let (bb, bus) = blackboard();
        let pid = bb.post_problem("u1", "q").unwrap();
        bb.resolve(&pid, &"x".repeat(1000)).unwrap();
        let events = bus.recent(topics::BLACKBOARD_RESOLVED, 1);
        let excerpt = events[0].data["synthesis"].as_str().unwrap();
        assert_eq!(excerpt.len(), SYNTHESIS_EVENT_LIMIT);
    }

    #[test]
    fn active_problems_carry_proposal_counts() {
        let (bb, _) = blackboard();
        let pid = bb.post_problem("u1", "q").unwrap();
        bb.add_proposal(&pid, "a1", "r", "one", 0.5).unwrap();
        bb.add_proposal(&pid, "a2", "r", "two", 0.6).unwrap();
        let active = bb.get_active_problems("u1").unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].proposal_count, 2);
    }

    #[test]
    fn cleanup_removes_old_resolved_problems() {
        let (bb, _) = blackboard();
        let resolved = bb.post_problem("u1", "old and settled").unwrap();
        bb.resolve(&resolved, "done").unwrap();
        let open = bb.post_problem("u1", "still open").unwrap();

        // Cutoff in the future relative to creation: resolved goes, open stays.
        let removed = bb.cleanup(-1000).unwrap();
        assert_eq!(removed, 1);
        assert!(bb.store.get_blackboard_entry(&resolved).unwrap().is_none());
        assert!(bb.store.get_blackboard_entry(&open).unwrap().is_some());
    }
}

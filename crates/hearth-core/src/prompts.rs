// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! System-prompt composition for the primary agent and its sub-agents.
//!
//! The orientation block (identity, preferences, memories, optional
//! compacted context) is shared by both: every sub-agent wakes up knowing
//! who it works for, then gets its role and the focused-sub-agent
//! instruction appended.

/// Contextual blocks injected into every composed system prompt.
///
/// The identity text arrives pre-composed from the heartware directory;
/// this module never reads files itself.
#[derive(Debug, Clone, Default)]
pub struct Orientation {
    /// Pre-composed identity block from the heartware store.
    pub identity: Option<String>,
    /// User preferences, one per line.
    pub preferences: Option<String>,
    /// Durable memory notes worth carrying into every conversation.
    pub memories: Vec<String>,
    /// The latest compaction summary, when one exists.
    pub compacted_context: Option<String>,
}

impl Orientation {
    /// Render the orientation block, or an empty string when there is
    /// nothing to orient with.
    pub fn render(&self) -> String {
        let mut sections: Vec<String> = Vec::new();
        if let Some(identity) = self.identity.as_deref().filter(|s| !s.trim().is_empty()) {
            sections.push(format!("## Who You Work With\n{identity}"));
        }
        if let Some(prefs) = self.preferences.as_deref().filter(|s| !s.trim().is_empty()) {
            sections.push(format!("## Preferences\n{prefs}"));
        }
        if !self.memories.is_empty() {
            let notes: Vec<String> = self.memories.iter().map(|m| format!("- {m}")).collect();
            sections.push(format!("## Memories\n{}", notes.join("\n")));
        }
        if let Some(ctx) = self
            .compacted_context
            .as_deref()
            .filter(|s| !s.trim().is_empty())
        {
            sections.push(format!("## Earlier Conversation (compacted)\n{ctx}"));
        }
        sections.join("\n\n")
    }
}

const FOCUSED_SUB_AGENT_INSTRUCTION: &str = "\
You are a focused sub-agent. Work only on the task you are given, in the \
role described above. Do not take on unrelated work, do not address the \
user directly, and return a single self-contained result the primary \
agent can relay.";

/// Build the frozen system prompt for a new sub-agent: orientation, then
/// the role, then the fixed focused-sub-agent instruction.
pub fn sub_agent_system_prompt(orientation: &Orientation, role: &str) -> String {
    let mut parts: Vec<String> = Vec::new();
    let oriented = orientation.render();
    if !oriented.is_empty() {
        parts.push(oriented);
    }
    parts.push(format!("## Your Role\n{role}"));
    parts.push(FOCUSED_SUB_AGENT_INSTRUCTION.to_string());
    parts.join("\n\n")
}

const PRIMARY_GUIDELINES: &str = "\
You are the primary assistant for a single user, backed by a pool of \
persistent specialist sub-agents.

Guidelines:
- Delegate substantial or long-running work with `delegate_task`; it runs \
in the background and returns immediately. Tell the user the work was \
dispatched rather than blocking on it.
- Reuse an existing specialist when one fits; `delegate_task` does this \
matching for you.
- When background results appear at the start of a turn, relay them to \
the user and confirm each with `confirm_task`.
- Use `list_sub_agents` and `manage_sub_agent` to inspect, dismiss, \
revive, or kill specialists when the user asks about them.
- Answer small questions yourself; spawning a specialist for a one-line \
answer wastes time.";

/// Build the primary agent's system prompt for one turn.
pub fn primary_system_prompt(orientation: &Orientation) -> String {
    let mut parts: Vec<String> = Vec::new();
    let oriented = orientation.render();
    if !oriented.is_empty() {
        parts.push(oriented);
    }
    parts.push(PRIMARY_GUIDELINES.to_string());
    parts.join("\n\n")
}

/// Format undelivered background results into the system note prepended to
/// a primary turn.  Returns `None` when the inbox is empty.
pub fn inbox_note(results: &[(String, String, bool)]) -> Option<String> {
    if results.is_empty() {
        return None;
    }
    let lines: Vec<String> = results
        .iter()
        .map(|(task_id, summary, success)| {
            let status = if *success { "completed" } else { "failed" };
            format!("- [{status}] task {task_id}: {summary}")
        })
        .collect();
    Some(format!(
        "[background results]\nThe following delegated tasks finished since \
the last turn. Relay them to the user and confirm each with `confirm_task`:\n{}",
        lines.join("\n")
    ))
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn orientation() -> Orientation {
        Orientation {
            identity: Some("The user is Ada, a compiler engineer.".into()),
            preferences: Some("- terse answers\n- metric units".into()),
            memories: vec!["allergic to peanuts".into()],
            compacted_context: Some("Earlier we debugged the lexer.".into()),
        }
    }

    #[test]
    fn sub_agent_prompt_contains_role_heading() {
        let prompt = sub_agent_system_prompt(&orientation(), "Research Analyst");
        assert!(prompt.contains("## Your Role\nResearch Analyst"));
    }

    #[test]
    fn sub_agent_prompt_ends_with_focused_instruction() {
        let prompt = sub_agent_system_prompt(&Orientation::default(), "Coder");
        assert!(prompt.ends_with(FOCUSED_SUB_AGENT_INSTRUCTION));
    }

    #[test]
    fn orientation_sections_appear_in_order() {
        let rendered = orientation().render();
        let identity = rendered.find("Who You Work With").unwrap();
        let prefs = rendered.find("Preferences").unwrap();
        let memories = rendered.find("Memories").unwrap();
        let compacted = rendered.find("compacted").unwrap();
        assert!(identity < prefs && prefs < memories && memories < compacted);
    }

    #[test]
    fn empty_orientation_renders_empty() {
        assert_eq!(Orientation::default().render(), "");
        let prompt = sub_agent_system_prompt(&Orientation::default(), "X");
        assert!(prompt.starts_with("## Your Role"));
    }

    #[test]
    fn primary_prompt_mentions_delegation_tools() {
        let prompt = primary_system_prompt(&orientation());
        assert!(prompt.contains("delegate_task"));
        assert!(prompt.contains("confirm_task"));
        assert!(prompt.contains("Ada"));
    }

    #[test]
    fn inbox_note_formats_results() {
        let note = inbox_note(&[
            ("t1".into(), "research finished".into(), true),
            ("t2".into(), "agent timed out".into(), false),
        ])
        .unwrap();
        assert!(note.contains("[background results]"));
        assert!(note.contains("[completed] task t1"));
        assert!(note.contains("[failed] task t2"));
    }

    #[test]
    fn empty_inbox_is_none() {
        assert!(inbox_note(&[]).is_none());
    }
}

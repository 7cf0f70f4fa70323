// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Tier derivation: distill the full (L2) summary into the smaller working
//! (L1) and ultra-compact (L0) tiers by keeping the highest-priority lines
//! that fit the token budget.

use super::tokens::estimate_tokens;

/// Keyword classes in descending priority.  A line's priority is the
/// weight of the highest class any of its keywords hits; unmatched lines
/// default to 1.
const PRIORITY_KEYWORDS: &[(&[&str], u32)] = &[
    (&["name", "identity", "i am", "call me", "born", "lives in"], 10),
    (&["decision", "decided", "correction", "corrected", "instead", "changed to", "actually"], 9),
    (&["task", "todo", "to-do", "action item", "deadline", "due", "pending", "follow up"], 8),
    (&["prefer", "preference", "likes", "dislikes", "favorite", "always", "never"], 7),
    (&["topic", "discussed", "talked about", "working on", "project"], 5),
];

fn line_priority(line: &str) -> u32 {
    let lower = line.to_lowercase();
    for (keywords, weight) in PRIORITY_KEYWORDS {
        if keywords.iter().any(|k| lower.contains(k)) {
            return *weight;
        }
    }
    1
}

/// Derive a tier from the full summary: take the highest-priority lines
/// whose cumulative token estimate fits `budget`, then restore original
/// line order for readable flow.
pub fn derive_tier(summary: &str, budget: usize) -> String {
    let lines: Vec<(usize, &str)> = summary
        .lines()
        .map(str::trim_end)
        .filter(|l| !l.trim().is_empty())
        .enumerate()
        .collect();

    let mut ranked: Vec<(usize, &str, u32)> = lines
        .iter()
        .map(|(i, l)| (*i, *l, line_priority(l)))
        .collect();
    // Stable sort keeps earlier lines ahead within the same priority.
    ranked.sort_by(|a, b| b.2.cmp(&a.2));

    let mut selected: Vec<(usize, &str)> = Vec::new();
    let mut used = 0usize;
    for (index, line, _) in ranked {
        let cost = estimate_tokens(line);
        if used + cost > budget {
            continue;
        }
        used += cost;
        selected.push((index, line));
    }

    selected.sort_by_key(|(index, _)| *index);
    selected
        .into_iter()
        .map(|(_, line)| line)
        .collect::<Vec<_>>()
        .join("\n")
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_lines_outrank_chitchat() {
        assert!(line_priority("User's name is Ada Lovelace") > line_priority("the weather was nice"));
    }

    #[test]
    fn decision_outranks_preference() {
        assert!(line_priority("Decision: use SQLite") > line_priority("prefers dark mode"));
    }

    #[test]
    fn unmatched_lines_default_to_one() {
        assert_eq!(line_priority("just some words"), 1);
    }

    #[test]
    fn derive_keeps_high_priority_lines_under_tight_budget() {
        let summary = "\
the conversation meandered for a while
User's name is Ada and she lives in London
some filler chatter about nothing much
Decision: deploy with canary releases
more filler text that matters less";
        // Tight budget: only a couple of lines fit.
        let tier = derive_tier(summary, 22);
        assert!(tier.contains("name is Ada"));
        assert!(tier.contains("Decision"));
        assert!(!tier.contains("filler chatter"));
    }

    #[test]
    fn derive_preserves_original_order() {
        let summary = "Decision: adopt rust\nUser's name is Ada\nTask: write the report";
        let tier = derive_tier(summary, 1000);
        let lines: Vec<&str> = tier.lines().collect();
        assert_eq!(lines[0], "Decision: adopt rust");
        assert_eq!(lines[1], "User's name is Ada");
        assert_eq!(lines[2], "Task: write the report");
    }

    #[test]
    fn derive_with_generous_budget_keeps_everything() {
        let summary = "line one here\nline two here\nline three here";
        assert_eq!(derive_tier(summary, 1000), summary);
    }

    #[test]
    fn derive_with_zero_budget_is_empty() {
        assert_eq!(derive_tier("some line", 0), "");
    }

    #[test]
    fn blank_lines_are_dropped() {
        let summary = "a real line\n\n\nanother real line";
        let tier = derive_tier(summary, 1000);
        assert_eq!(tier, "a real line\nanother real line");
    }
}

// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use serde::{Deserialize, Serialize};

/// Serde default helpers.
///
/// `#[serde(default)]` on a numeric field always falls back to the type's
/// zero value, so every tunable with a non-zero default needs a named
/// function.
fn default_max_active_agents() -> usize {
    10
}
fn default_max_templates() -> usize {
    50
}
fn default_max_agent_messages() -> usize {
    100
}
fn default_sub_agent_max_iterations() -> u32 {
    10
}
fn default_primary_max_iterations() -> u32 {
    25
}
fn default_task_timeout_secs() -> u64 {
    120
}
fn default_keyword_weight() -> f64 {
    0.5
}
fn default_fuzzy_weight() -> f64 {
    0.2
}
fn default_synonym_weight() -> f64 {
    0.3
}
fn default_min_score() -> f64 {
    0.3
}
fn default_reuse_min_score() -> f64 {
    0.6
}
fn default_compaction_threshold() -> usize {
    60
}
fn default_keep_recent() -> usize {
    20
}
fn default_similarity_threshold() -> f64 {
    0.6
}
fn default_l2_budget() -> usize {
    3000
}
fn default_l1_budget() -> usize {
    1000
}
fn default_l0_budget() -> usize {
    200
}
fn default_history_limit() -> usize {
    100
}
fn default_agent_retention_ms() -> i64 {
    14 * 24 * 60 * 60 * 1000
}
fn default_blackboard_retention_ms() -> i64 {
    7 * 24 * 60 * 60 * 1000
}
fn default_stale_task_ms() -> i64 {
    60 * 60 * 1000
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub matcher: MatcherConfig,
    #[serde(default)]
    pub compaction: CompactionConfig,
    #[serde(default)]
    pub events: EventsConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
}

/// Limits and loop budgets for the primary agent and its sub-agents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Hard cap on `status = active` sub-agents per user.
    #[serde(default = "default_max_active_agents")]
    pub max_active_agents_per_user: usize,
    /// Hard cap on role templates per user.
    #[serde(default = "default_max_templates")]
    pub max_templates_per_user: usize,
    /// Most-recent messages loaded into a sub-agent's context; older
    /// history is truncated on read.
    #[serde(default = "default_max_agent_messages")]
    pub max_agent_messages: usize,
    /// Iteration cap for a delegated sub-agent turn.
    #[serde(default = "default_sub_agent_max_iterations")]
    pub sub_agent_max_iterations: u32,
    /// Iteration cap for the primary agent's turn.
    #[serde(default = "default_primary_max_iterations")]
    pub primary_max_iterations: u32,
    /// Fallback background-task timeout when the metric-based estimator
    /// has too few samples.
    #[serde(default = "default_task_timeout_secs")]
    pub task_timeout_secs: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_active_agents_per_user: default_max_active_agents(),
            max_templates_per_user: default_max_templates(),
            max_agent_messages: default_max_agent_messages(),
            sub_agent_max_iterations: default_sub_agent_max_iterations(),
            primary_max_iterations: default_primary_max_iterations(),
            task_timeout_secs: default_task_timeout_secs(),
        }
    }
}

/// Weights and thresholds for the hybrid semantic matcher.
///
/// The three weights are applied to the keyword-overlap, fuzzy-similarity
/// and synonym-expansion sub-scores; the final score is their clamped
/// weighted sum.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatcherConfig {
    #[serde(default = "default_keyword_weight")]
    pub keyword_weight: f64,
    #[serde(default = "default_fuzzy_weight")]
    pub fuzzy_weight: f64,
    #[serde(default = "default_synonym_weight")]
    pub synonym_weight: f64,
    /// Minimum final score for `find_best` to report a match at all
    /// (template lookup uses this directly).
    #[serde(default = "default_min_score")]
    pub min_score: f64,
    /// Minimum final score for reusing an existing sub-agent instead of
    /// creating a new one.  Stricter than `min_score`: handing a task to
    /// the wrong specialist costs more than spawning a fresh one.
    #[serde(default = "default_reuse_min_score")]
    pub reuse_min_score: f64,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            keyword_weight: default_keyword_weight(),
            fuzzy_weight: default_fuzzy_weight(),
            synonym_weight: default_synonym_weight(),
            min_score: default_min_score(),
            reuse_min_score: default_reuse_min_score(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompactionConfig {
    /// Message count at which compaction triggers after a turn.
    #[serde(default = "default_compaction_threshold")]
    pub threshold: usize,
    /// Most-recent messages left untouched by compaction.
    #[serde(default = "default_keep_recent")]
    pub keep_recent: usize,
    /// Jaccard shingle similarity at or above which the earlier of two
    /// near-duplicate messages is dropped before summarization.
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
    /// Token budget for the full-tier (L2) summary.
    #[serde(default = "default_l2_budget")]
    pub l2_budget: usize,
    /// Token budget for the working-tier (L1) summary.
    #[serde(default = "default_l1_budget")]
    pub l1_budget: usize,
    /// Token budget for the ultra-compact (L0) summary.
    #[serde(default = "default_l0_budget")]
    pub l0_budget: usize,
    /// Strip emoji during rule-based pre-compression.
    #[serde(default)]
    pub strip_emoji: bool,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            threshold: default_compaction_threshold(),
            keep_recent: default_keep_recent(),
            similarity_threshold: default_similarity_threshold(),
            l2_budget: default_l2_budget(),
            l1_budget: default_l1_budget(),
            l0_budget: default_l0_budget(),
            strip_emoji: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsConfig {
    /// Ring-buffer capacity per topic; the global buffer holds twice this.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self { history_limit: default_history_limit() }
    }
}

/// Retention windows for the periodic cleanup sweep, in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// How long dismissed (soft-deleted) sub-agents stay revivable.
    #[serde(default = "default_agent_retention_ms")]
    pub agent_retention_ms: i64,
    /// How long resolved blackboard problems are kept.
    #[serde(default = "default_blackboard_retention_ms")]
    pub blackboard_retention_ms: i64,
    /// Age at which a still-`running` background task row is presumed
    /// orphaned (e.g. by a process restart) and marked failed.
    #[serde(default = "default_stale_task_ms")]
    pub stale_task_ms: i64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            agent_retention_ms: default_agent_retention_ms(),
            blackboard_retention_ms: default_blackboard_retention_ms(),
            stale_task_ms: default_stale_task_ms(),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

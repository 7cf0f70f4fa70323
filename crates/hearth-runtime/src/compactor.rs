// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::Arc;

use serde_json::json;
use tracing::{debug, warn};

use hearth_config::CompactionConfig;
use hearth_core::compact::{
    dedup_messages, derive_tier, estimate_tokens, precompress, truncate_to_tokens,
};
use hearth_core::{topics, EventBus};
use hearth_model::{ChatResponse, Message, Provider};
use hearth_store::{CompactionRecord, Store};

use crate::error::Result;

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

const SUMMARIZE_SYSTEM_PROMPT: &str = "\
You are a conversation compaction assistant. Summarize the conversation \
history below into a dense, factual digest that will replace it. Preserve:
- facts about the user (name, identity, circumstances)
- decisions made and corrections the user gave
- open tasks and anything the user is still waiting on
Drop greetings, filler and repetition. Stay under {budget} tokens.";

/// The three summary tiers produced by one compaction.  Only the full
/// tier is persisted on the compaction record; the smaller tiers are
/// derived artifacts for callers that want a cheaper context block.
#[derive(Debug, Clone)]
pub struct CompactionTiers {
    /// Full tier (L2) — what the compaction record stores.
    pub full: String,
    /// Working tier (L1)
    pub working: String,
    /// Ultra-compact tier (L0)
    pub ultra: String,
}

#[derive(Debug, Clone)]
pub struct CompactionMetrics {
    pub messages_before: usize,
    pub messages_summarized: usize,
    pub messages_kept: usize,
    pub tokens_before: usize,
    pub tokens_after: usize,
    pub compression_ratio: f64,
    pub dedup_groups_removed: usize,
    pub duration_ms: u64,
}

#[derive(Debug, Clone)]
pub struct CompactionOutcome {
    pub record: CompactionRecord,
    pub tiers: CompactionTiers,
    pub metrics: CompactionMetrics,
}

/// Caps conversation growth by folding old messages into one tiered
/// LLM-generated summary and deleting the originals.
///
/// The pipeline is: threshold check → rule pre-compression → shingle
/// dedup → LLM summarization → tier derivation → persist + delete.  Any
/// failure before the persist step abandons the run without deleting
/// anything; the threshold simply triggers again on a later turn.
pub struct Compactor {
    store: Arc<Store>,
    provider: Arc<dyn Provider>,
    bus: Arc<EventBus>,
    config: CompactionConfig,
}

impl Compactor {
    pub fn new(
        store: Arc<Store>,
        provider: Arc<dyn Provider>,
        bus: Arc<EventBus>,
        config: CompactionConfig,
    ) -> Self {
        Self {
            store,
            provider,
            bus,
            config,
        }
    }

    /// Compact the user's history if it has crossed the threshold.
    /// Returns `None` when below threshold or when the run was abandoned.
    pub async fn maybe_compact(&self, user_id: &str) -> Result<Option<CompactionOutcome>> {
        let started = std::time::Instant::now();

        let total = self.store.count_messages(user_id)?;
        if total < self.config.threshold {
            return Ok(None);
        }
        let all = self.store.list_recent_messages(user_id, total)?;
        if all.len() <= self.config.keep_recent {
            return Ok(None);
        }

        let split = all.len() - self.config.keep_recent;
        let (old, kept) = all.split_at(split);
        // Everything strictly before the oldest kept message goes away.
        let replaced_before = kept
            .first()
            .map(|m| m.created_at)
            .unwrap_or_else(now_ms);

        let tokens_before: usize = old.iter().map(|m| estimate_tokens(&m.content)).sum();

        // Rule-based pre-compression, then message-level dedup.
        let compressed: Vec<String> = old
            .iter()
            .map(|m| {
                format!(
                    "{}: {}",
                    m.role,
                    precompress(&m.content, self.config.strip_emoji)
                )
            })
            .collect();
        let (surviving, dedup_groups_removed) =
            dedup_messages(&compressed, self.config.similarity_threshold);

        let history_text = surviving.join("\n\n");
        let summary = match self.summarize(&history_text).await {
            Some(s) => s,
            None => {
                warn!(user_id, "compaction abandoned; history left untouched");
                return Ok(None);
            }
        };

        let full = truncate_to_tokens(&summary, self.config.l2_budget);
        let tiers = CompactionTiers {
            working: derive_tier(&full, self.config.l1_budget),
            ultra: derive_tier(&full, self.config.l0_budget),
            full: full.clone(),
        };

        let record = CompactionRecord {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            summary: full,
            replaced_before,
            created_at: now_ms(),
        };
        self.store.insert_compaction(&record)?;
        let deleted = self
            .store
            .delete_messages_before(user_id, replaced_before)?;

        let tokens_after = estimate_tokens(&record.summary);
        let metrics = CompactionMetrics {
            messages_before: all.len(),
            messages_summarized: old.len(),
            messages_kept: kept.len(),
            tokens_before,
            tokens_after,
            compression_ratio: if tokens_before > 0 {
                tokens_after as f64 / tokens_before as f64
            } else {
                1.0
            },
            dedup_groups_removed,
            duration_ms: started.elapsed().as_millis() as u64,
        };
        debug!(
            user_id,
            deleted,
            summarized = metrics.messages_summarized,
            ratio = metrics.compression_ratio,
            "compacted conversation history"
        );

        self.bus.emit(
            topics::MEMORY_CONSOLIDATED,
            user_id,
            json!({
                "compaction_id": record.id,
                "messages_summarized": metrics.messages_summarized,
                "dedup_groups_removed": metrics.dedup_groups_removed,
                "tokens_after": tokens_after,
            }),
        );

        Ok(Some(CompactionOutcome {
            record,
            tiers,
            metrics,
        }))
    }

    /// One tool-free provider call.  `None` on failure or an empty/
    /// non-text reply — the caller abandons the compaction in that case.
    async fn summarize(&self, history_text: &str) -> Option<String> {
        let system = SUMMARIZE_SYSTEM_PROMPT.replace("{budget}", &self.config.l2_budget.to_string());
        let messages = vec![Message::system(system), Message::user(history_text)];
        match self.provider.chat(&messages, &[]).await {
            Ok(ChatResponse::Text(text)) if !text.trim().is_empty() => Some(text),
            Ok(ChatResponse::Text(_)) => {
                warn!("summarization returned empty text");
                None
            }
            Ok(ChatResponse::ToolCalls(_)) => {
                warn!("summarization returned tool calls instead of text");
                None
            }
            Err(e) => {
                warn!(error = %e, "summarization call failed");
                None
            }
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use hearth_model::ScriptedProvider;
    use hearth_store::MessageRecord;

    use super::*;

    fn seed_messages(store: &Store, user_id: &str, count: usize) {
        for i in 0..count {
            store
                .insert_message(&MessageRecord {
                    id: format!("m{i}"),
                    user_id: user_id.into(),
                    role: if i % 2 == 0 { "user" } else { "assistant" }.into(),
                    content: format!("message number {i} about topic {}", i % 7),
                    created_at: i as i64,
                })
                .unwrap();
        }
    }

    fn compactor(provider: ScriptedProvider, store: Arc<Store>) -> (Compactor, Arc<EventBus>) {
        let bus = Arc::new(EventBus::new(100));
        (
            Compactor::new(
                store,
                Arc::new(provider),
                Arc::clone(&bus),
                CompactionConfig::default(),
            ),
            bus,
        )
    }

    #[tokio::test]
    async fn below_threshold_is_a_noop() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        seed_messages(&store, "u1", 10);
        let (c, _) = compactor(ScriptedProvider::always_text("summary"), Arc::clone(&store));
        assert!(c.maybe_compact("u1").await.unwrap().is_none());
        assert_eq!(store.count_messages("u1").unwrap(), 10);
    }

    #[tokio::test]
    async fn over_threshold_keeps_recent_and_deletes_old() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        seed_messages(&store, "u1", 61);
        let (c, bus) = compactor(
            ScriptedProvider::always_text("User discussed topics 0 through 6."),
            Arc::clone(&store),
        );
        let outcome = c.maybe_compact("u1").await.unwrap().unwrap();

        assert_eq!(store.count_messages("u1").unwrap(), 20);
        assert_eq!(outcome.metrics.messages_summarized, 41);
        assert_eq!(outcome.metrics.messages_kept, 20);

        // The survivors are the newest 20.
        let remaining = store.list_recent_messages("u1", 100).unwrap();
        assert_eq!(remaining.first().unwrap().content, "message number 41 about topic 6");

        // Record persisted and consultable.
        let latest = store.latest_compaction("u1").unwrap().unwrap();
        assert_eq!(latest.id, outcome.record.id);
        assert!(latest.summary.contains("topics 0 through 6"));

        // Event emitted on success.
        assert_eq!(bus.recent(topics::MEMORY_CONSOLIDATED, 1).len(), 1);
    }

    #[tokio::test]
    async fn provider_failure_abandons_without_deleting() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        seed_messages(&store, "u1", 61);
        let (c, bus) = compactor(ScriptedProvider::always_fail("overloaded"), Arc::clone(&store));
        assert!(c.maybe_compact("u1").await.unwrap().is_none());
        assert_eq!(store.count_messages("u1").unwrap(), 61);
        assert!(store.latest_compaction("u1").unwrap().is_none());
        assert!(bus.recent(topics::MEMORY_CONSOLIDATED, 1).is_empty());
    }

    #[tokio::test]
    async fn empty_summary_abandons_without_deleting() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        seed_messages(&store, "u1", 61);
        let (c, _) = compactor(ScriptedProvider::always_text("   "), Arc::clone(&store));
        assert!(c.maybe_compact("u1").await.unwrap().is_none());
        assert_eq!(store.count_messages("u1").unwrap(), 61);
    }

    #[tokio::test]
    async fn duplicate_messages_are_removed_before_summarizing() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        // 60 messages where many are exact repeats of one another.
        for i in 0..60 {
            store
                .insert_message(&MessageRecord {
                    id: format!("m{i}"),
                    user_id: "u1".into(),
                    role: "user".into(),
                    content: if i < 30 {
                        "please remember to check the quarterly figures".into()
                    } else {
                        format!("a distinct message number {i} with unique words {i}")
                    },
                    created_at: i as i64,
                })
                .unwrap();
        }
        let (c, _) = compactor(ScriptedProvider::always_text("summary"), Arc::clone(&store));
        let outcome = c.maybe_compact("u1").await.unwrap().unwrap();
        // 30 duplicates collapse to one survivor: 29 groups removed.
        assert_eq!(outcome.metrics.dedup_groups_removed, 29);
    }

    #[tokio::test]
    async fn summary_is_truncated_to_full_tier_budget() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        seed_messages(&store, "u1", 61);
        let huge = "many words here repeated over and over again \n".repeat(2000);
        let (c, _) = compactor(ScriptedProvider::always_text(huge), Arc::clone(&store));
        let outcome = c.maybe_compact("u1").await.unwrap().unwrap();
        assert!(estimate_tokens(&outcome.record.summary) <= 3000);
        assert!(estimate_tokens(&outcome.tiers.working) <= 1000);
        assert!(estimate_tokens(&outcome.tiers.ultra) <= 200);
    }
}

// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;

use hearth_config::Config;
use hearth_core::{EventBus, Orientation, SessionQueue};
use hearth_model::Provider;
use hearth_store::Store;
use hearth_tools::ToolRegistry;

use crate::background::BackgroundRunner;
use crate::blackboard::Blackboard;
use crate::compactor::Compactor;
use crate::lifecycle::LifecycleManager;
use crate::templates::TemplateManager;

/// The wired-together runtime: every subsystem, sharing one store, one
/// bus and one session queue.  Components hold `Arc`s and re-read records
/// on demand; the context itself is cheap to clone around behind an `Arc`.
pub struct RuntimeContext {
    pub config: Config,
    pub store: Arc<Store>,
    pub provider: Arc<dyn Provider>,
    pub bus: Arc<EventBus>,
    pub queue: Arc<SessionQueue>,
    pub lifecycle: Arc<LifecycleManager>,
    pub templates: Arc<TemplateManager>,
    pub background: Arc<BackgroundRunner>,
    pub blackboard: Arc<Blackboard>,
    pub compactor: Arc<Compactor>,
    /// Heartware-derived orientation (identity, preferences, memories);
    /// composed at startup by the embedding process.
    pub orientation: Orientation,
}

impl RuntimeContext {
    /// Wire all subsystems.  `sub_agent_tools` is the catalog of tools a
    /// sub-agent may be granted by name.
    pub fn new(
        config: Config,
        store: Arc<Store>,
        provider: Arc<dyn Provider>,
        orientation: Orientation,
        sub_agent_tools: Arc<ToolRegistry>,
    ) -> Arc<Self> {
        let bus = Arc::new(EventBus::new(config.events.history_limit));
        let queue = Arc::new(SessionQueue::new());
        let lifecycle = Arc::new(LifecycleManager::new(
            Arc::clone(&store),
            Arc::clone(&bus),
            config.agent.clone(),
            config.matcher.clone(),
        ));
        let templates = Arc::new(TemplateManager::new(
            Arc::clone(&store),
            config.agent.clone(),
            config.matcher.clone(),
        ));
        let background = Arc::new(BackgroundRunner::new(
            Arc::clone(&store),
            Arc::clone(&queue),
            Arc::clone(&lifecycle),
            Arc::clone(&templates),
            Arc::clone(&bus),
            Arc::clone(&provider),
            sub_agent_tools,
            config.agent.clone(),
        ));
        let blackboard = Arc::new(Blackboard::new(Arc::clone(&store), Arc::clone(&bus)));
        let compactor = Arc::new(Compactor::new(
            Arc::clone(&store),
            Arc::clone(&provider),
            Arc::clone(&bus),
            config.compaction.clone(),
        ));
        Arc::new(Self {
            config,
            store,
            provider,
            bus,
            queue,
            lifecycle,
            templates,
            background,
            blackboard,
            compactor,
            orientation,
        })
    }

    /// The base orientation enriched with the user's latest compaction
    /// summary, for seeding new sub-agents and primary turns.
    pub fn orientation_for(&self, user_id: &str) -> Orientation {
        let mut orientation = self.orientation.clone();
        if let Ok(Some(compaction)) = self.store.latest_compaction(user_id) {
            orientation.compacted_context = Some(compaction.summary);
        }
        orientation
    }
}

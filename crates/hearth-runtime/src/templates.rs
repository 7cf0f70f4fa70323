// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::Arc;

use tracing::debug;

use hearth_config::{AgentConfig, MatcherConfig};
use hearth_core::HybridMatcher;
use hearth_store::{Store, TemplateRecord};

use crate::error::{Result, RuntimeError};

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[derive(Debug, Clone)]
pub struct CreateTemplateSpec {
    pub user_id: String,
    pub name: String,
    pub role_description: String,
    pub default_tools: Vec<String>,
    pub default_tier: Option<String>,
    pub tags: Vec<String>,
}

/// Fields of a template that can be patched after creation.  `None`
/// leaves the stored value untouched.
#[derive(Debug, Clone, Default)]
pub struct TemplatePatch {
    pub name: Option<String>,
    pub role_description: Option<String>,
    pub default_tools: Option<Vec<String>>,
    pub default_tier: Option<Option<String>>,
    pub tags: Option<Vec<String>>,
}

/// Owns role templates: creation under the per-user cap, best-match
/// lookup via the hybrid matcher, usage and average-performance tracking.
pub struct TemplateManager {
    store: Arc<Store>,
    matcher: HybridMatcher,
    config: AgentConfig,
}

impl TemplateManager {
    pub fn new(store: Arc<Store>, agent_config: AgentConfig, matcher_config: MatcherConfig) -> Self {
        Self {
            store,
            matcher: HybridMatcher::new(matcher_config),
            config: agent_config,
        }
    }

    pub fn create(&self, spec: CreateTemplateSpec) -> Result<TemplateRecord> {
        let count = self.store.count_templates(&spec.user_id)?;
        if count >= self.config.max_templates_per_user {
            return Err(RuntimeError::LimitExceeded(format!(
                "user {} already has {count} templates (max {})",
                spec.user_id, self.config.max_templates_per_user
            )));
        }
        let now = now_ms();
        let template = TemplateRecord {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: spec.user_id,
            name: spec.name,
            role_description: spec.role_description,
            default_tools: spec.default_tools,
            default_tier: spec.default_tier,
            times_used: 0,
            avg_performance: 0.5,
            tags: spec.tags,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_template(&template)?;
        Ok(template)
    }

    pub fn get(&self, template_id: &str) -> Result<TemplateRecord> {
        self.store
            .get_template(template_id)?
            .ok_or_else(|| RuntimeError::NotFound(format!("template {template_id}")))
    }

    pub fn list(&self, user_id: &str) -> Result<Vec<TemplateRecord>> {
        Ok(self.store.list_templates(user_id)?)
    }

    /// Best-matching template for a task description, scored against each
    /// template's name, role description and tags.
    pub fn find_best_match(
        &self,
        user_id: &str,
        task_description: &str,
    ) -> Result<Option<TemplateRecord>> {
        let templates = self.store.list_templates(user_id)?;
        let searchable: Vec<String> = templates
            .iter()
            .map(|t| format!("{} {} {}", t.name, t.role_description, t.tags.join(" ")))
            .collect();
        match self.matcher.find_best(task_description, &searchable) {
            Some(m) => {
                debug!(
                    task_description,
                    template = %templates[m.index].name,
                    score = m.score,
                    "template matched"
                );
                Ok(Some(templates[m.index].clone()))
            }
            None => Ok(None),
        }
    }

    pub fn update(&self, template_id: &str, patch: TemplatePatch) -> Result<TemplateRecord> {
        let mut template = self.get(template_id)?;
        if let Some(name) = patch.name {
            template.name = name;
        }
        if let Some(role_description) = patch.role_description {
            template.role_description = role_description;
        }
        if let Some(default_tools) = patch.default_tools {
            template.default_tools = default_tools;
        }
        if let Some(default_tier) = patch.default_tier {
            template.default_tier = default_tier;
        }
        if let Some(tags) = patch.tags {
            template.tags = tags;
        }
        template.updated_at = now_ms();
        self.store.update_template(&template)?;
        Ok(template)
    }

    /// Fold one usage score into the template's running mean.
    pub fn record_usage(&self, template_id: &str, performance_score: f64) -> Result<()> {
        if !self
            .store
            .record_template_usage(template_id, performance_score.clamp(0.0, 1.0), now_ms())?
        {
            return Err(RuntimeError::NotFound(format!("template {template_id}")));
        }
        Ok(())
    }

    pub fn delete(&self, template_id: &str) -> Result<()> {
        if !self.store.delete_template(template_id)? {
            return Err(RuntimeError::NotFound(format!("template {template_id}")));
        }
        Ok(())
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use hearth_config::Config;

    use super::*;

    fn manager() -> TemplateManager {
        let config = Config::default();
        TemplateManager::new(
            Arc::new(Store::open_in_memory().unwrap()),
            config.agent,
            config.matcher,
        )
    }

    fn spec(user_id: &str, name: &str, tags: &[&str]) -> CreateTemplateSpec {
        CreateTemplateSpec {
            user_id: user_id.into(),
            name: name.into(),
            role_description: format!("{name} specialist for recurring work"),
            default_tools: vec![],
            default_tier: None,
            tags: tags.iter().map(|t| t.to_string()).collect(),
        }
    }

    #[test]
    fn create_starts_unused_at_neutral_average() {
        let m = manager();
        let t = m.create(spec("u1", "Research Analyst", &["research"])).unwrap();
        assert_eq!(t.times_used, 0);
        assert_eq!(t.avg_performance, 0.5);
    }

    #[test]
    fn create_enforces_per_user_cap() {
        let config = Config {
            agent: hearth_config::AgentConfig {
                max_templates_per_user: 2,
                ..Default::default()
            },
            ..Default::default()
        };
        let m = TemplateManager::new(
            Arc::new(Store::open_in_memory().unwrap()),
            config.agent,
            config.matcher,
        );
        m.create(spec("u1", "A", &[])).unwrap();
        m.create(spec("u1", "B", &[])).unwrap();
        assert!(matches!(
            m.create(spec("u1", "C", &[])),
            Err(RuntimeError::LimitExceeded(_))
        ));
    }

    #[test]
    fn find_best_match_uses_name_description_and_tags() {
        let m = manager();
        m.create(spec("u1", "Travel Planner", &["travel"])).unwrap();
        m.create(spec("u1", "Research Analyst", &["research", "analysis"]))
            .unwrap();
        let best = m
            .find_best_match("u1", "research the history of computing")
            .unwrap()
            .unwrap();
        assert_eq!(best.name, "Research Analyst");
    }

    #[test]
    fn find_best_match_returns_none_below_threshold() {
        let m = manager();
        m.create(spec("u1", "Travel Planner", &["travel"])).unwrap();
        assert!(m
            .find_best_match("u1", "refactor the parser module")
            .unwrap()
            .is_none());
    }

    #[test]
    fn record_usage_updates_running_mean() {
        let m = manager();
        let t = m.create(spec("u1", "Coder", &[])).unwrap();
        m.record_usage(&t.id, 1.0).unwrap();
        let after = m.get(&t.id).unwrap();
        assert_eq!(after.times_used, 1);
        assert!((after.avg_performance - 1.0).abs() < 1e-9);

        m.record_usage(&t.id, 0.5).unwrap();
        let after = m.get(&t.id).unwrap();
        assert_eq!(after.times_used, 2);
        assert!((after.avg_performance - 0.75).abs() < 1e-9);
    }

    #[test]
    fn update_patches_only_named_fields() {
        let m = manager();
        let t = m.create(spec("u1", "Coder", &["code"])).unwrap();
        let updated = m
            .update(
                &t.id,
                TemplatePatch {
                    name: Some("Senior Coder".into()),
                    tags: Some(vec!["code".into(), "review".into()]),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.name, "Senior Coder");
        assert_eq!(updated.tags.len(), 2);
        assert_eq!(updated.role_description, t.role_description);
        assert!(updated.updated_at >= t.updated_at);
    }

    #[test]
    fn delete_unknown_is_not_found() {
        let m = manager();
        assert!(matches!(
            m.delete("ghost"),
            Err(RuntimeError::NotFound(_))
        ));
    }
}

// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::debug;

use crate::Config;

/// Ordered list of config file locations searched from lowest to highest
/// priority.  Later files override earlier ones.
fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    // 1. System-wide default
    paths.push(PathBuf::from("/etc/hearth/config.yaml"));
    paths.push(PathBuf::from("/etc/hearth/config.yml"));

    // 2. XDG / home
    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(".config/hearth/config.yaml"));
        paths.push(home.join(".config/hearth/config.yml"));
    }
    if let Some(cfg) = dirs::config_dir() {
        paths.push(cfg.join("hearth/config.yaml"));
        paths.push(cfg.join("hearth/config.yml"));
    }

    // 3. Workspace-local
    paths.push(PathBuf::from(".hearth/config.yaml"));
    paths.push(PathBuf::from(".hearth/config.yml"));
    paths.push(PathBuf::from("hearth.yaml"));
    paths.push(PathBuf::from("hearth.yml"));

    paths
}

/// Load configuration by merging all discovered YAML files.
/// The `extra` argument may provide an explicit path (e.g. a CLI flag).
pub fn load(extra: Option<&Path>) -> anyhow::Result<Config> {
    let mut merged = serde_yaml::Value::Mapping(serde_yaml::Mapping::new());

    for path in config_search_paths() {
        if path.is_file() {
            debug!(path = %path.display(), "loading config layer");
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            let layer: serde_yaml::Value = serde_yaml::from_str(&text)
                .with_context(|| format!("parsing {}", path.display()))?;
            merge_yaml(&mut merged, layer);
        }
    }

    if let Some(p) = extra {
        debug!(path = %p.display(), "loading explicit config");
        let text =
            std::fs::read_to_string(p).with_context(|| format!("reading {}", p.display()))?;
        let layer: serde_yaml::Value =
            serde_yaml::from_str(&text).with_context(|| format!("parsing {}", p.display()))?;
        merge_yaml(&mut merged, layer);
    }

    let config: Config =
        serde_yaml::from_value(merged).context("deserializing merged configuration")?;
    Ok(config)
}

/// Deep-merge `overlay` into `base`.  Mappings merge key-by-key; any other
/// value type replaces the base value wholesale.
fn merge_yaml(base: &mut serde_yaml::Value, overlay: serde_yaml::Value) {
    match (base, overlay) {
        (serde_yaml::Value::Mapping(base_map), serde_yaml::Value::Mapping(overlay_map)) => {
            for (k, v) in overlay_map {
                match base_map.get_mut(&k) {
                    Some(existing) => merge_yaml(existing, v),
                    None => {
                        base_map.insert(k, v);
                    }
                }
            }
        }
        (base_slot, overlay_value) => *base_slot = overlay_value,
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn load_without_any_files_yields_defaults() {
        let config = load(None).unwrap();
        assert_eq!(config.agent.max_active_agents_per_user, 10);
    }

    #[test]
    fn explicit_path_overrides_defaults() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "compaction:\n  threshold: 10\n  keep_recent: 4").unwrap();
        let config = load(Some(f.path())).unwrap();
        assert_eq!(config.compaction.threshold, 10);
        assert_eq!(config.compaction.keep_recent, 4);
        // Untouched sections keep their defaults.
        assert_eq!(config.matcher.min_score, 0.3);
    }

    #[test]
    fn merge_replaces_scalars_and_merges_mappings() {
        let mut base: serde_yaml::Value =
            serde_yaml::from_str("a:\n  x: 1\n  y: 2\nb: 3").unwrap();
        let overlay: serde_yaml::Value = serde_yaml::from_str("a:\n  y: 9\nc: 4").unwrap();
        merge_yaml(&mut base, overlay);
        assert_eq!(base["a"]["x"], serde_yaml::Value::from(1));
        assert_eq!(base["a"]["y"], serde_yaml::Value::from(9));
        assert_eq!(base["b"], serde_yaml::Value::from(3));
        assert_eq!(base["c"], serde_yaml::Value::from(4));
    }

    #[test]
    fn malformed_explicit_file_is_an_error() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, ": not yaml [").unwrap();
        assert!(load(Some(f.path())).is_err());
    }
}

// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use hearth_store::Store;

/// How many recent metric rows feed one estimate.
const SAMPLE_WINDOW: usize = 20;
/// Below this many samples the static default wins.
const MIN_SAMPLES: usize = 3;
/// Headroom multiplier over the observed median.
const PADDING: f64 = 1.5;

const MIN_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_TIMEOUT: Duration = Duration::from_secs(600);

/// Estimates background-task timeouts from recorded task metrics.
///
/// The estimate is the median duration of recent runs for the same
/// (task_type, tier), padded with headroom and clamped to a sane band.
/// With too few samples it falls back to the configured static default.
pub struct TimeoutEstimator {
    store: Arc<Store>,
    default_timeout: Duration,
}

impl TimeoutEstimator {
    pub fn new(store: Arc<Store>, default_timeout: Duration) -> Self {
        Self {
            store,
            default_timeout,
        }
    }

    pub fn estimate(&self, task_type: &str, tier: Option<&str>) -> Duration {
        let metrics = match self.store.recent_metrics(task_type, tier, SAMPLE_WINDOW) {
            Ok(m) => m,
            Err(_) => return self.default_timeout,
        };
        if metrics.len() < MIN_SAMPLES {
            return self.default_timeout;
        }

        let mut durations: Vec<i64> = metrics.iter().map(|m| m.duration_ms).collect();
        durations.sort_unstable();
        let median = durations[durations.len() / 2] as f64;
        let padded = Duration::from_millis((median * PADDING) as u64);
        let clamped = padded.clamp(MIN_TIMEOUT, MAX_TIMEOUT);
        debug!(
            task_type,
            ?tier,
            samples = durations.len(),
            estimate_ms = clamped.as_millis() as u64,
            "derived adaptive timeout"
        );
        clamped
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use hearth_store::MetricRecord;

    use super::*;

    fn seed(store: &Store, task_type: &str, tier: Option<&str>, durations_ms: &[i64]) {
        for (i, d) in durations_ms.iter().enumerate() {
            store
                .insert_metric(&MetricRecord {
                    id: format!("{task_type}-{i}"),
                    user_id: "u1".into(),
                    task_type: task_type.into(),
                    tier: tier.map(String::from),
                    duration_ms: *d,
                    iterations: 2,
                    success: true,
                    created_at: i as i64,
                })
                .unwrap();
        }
    }

    #[test]
    fn too_few_samples_fall_back_to_default() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        seed(&store, "delegation", Some("simple"), &[1000, 2000]);
        let est = TimeoutEstimator::new(store, Duration::from_secs(120));
        assert_eq!(
            est.estimate("delegation", Some("simple")),
            Duration::from_secs(120)
        );
    }

    #[test]
    fn median_times_padding_within_band() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        // Median 60s → padded 90s.
        seed(&store, "delegation", Some("complex"), &[40_000, 60_000, 80_000]);
        let est = TimeoutEstimator::new(store, Duration::from_secs(120));
        assert_eq!(
            est.estimate("delegation", Some("complex")),
            Duration::from_secs(90)
        );
    }

    #[test]
    fn fast_history_clamps_to_minimum() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        seed(&store, "delegation", None, &[100, 150, 200, 250]);
        let est = TimeoutEstimator::new(store, Duration::from_secs(120));
        assert_eq!(est.estimate("delegation", None), MIN_TIMEOUT);
    }

    #[test]
    fn slow_history_clamps_to_maximum() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        seed(
            &store,
            "delegation",
            None,
            &[900_000, 1_000_000, 1_100_000],
        );
        let est = TimeoutEstimator::new(store, Duration::from_secs(120));
        assert_eq!(est.estimate("delegation", None), MAX_TIMEOUT);
    }

    #[test]
    fn tiers_are_estimated_independently() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        seed(&store, "delegation", Some("simple"), &[40_000, 40_000, 40_000]);
        let est = TimeoutEstimator::new(store, Duration::from_secs(120));
        // Other tier has no samples → default.
        assert_eq!(
            est.estimate("delegation", Some("complex")),
            Duration::from_secs(120)
        );
        assert_eq!(
            est.estimate("delegation", Some("simple")),
            Duration::from_secs(60)
        );
    }
}

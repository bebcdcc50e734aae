use crate::selection::registry::ModelCapabilityRegistry;
use crate::types::{clamp_score, model_key, PerformanceMetrics, PerformanceSample};
use chrono::{Duration, Utc};
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::debug;

/// Samples kept per model key; oldest are trimmed first.
const MAX_SAMPLES_PER_MODEL: usize = 100;

/// Days covered by aggregate metrics.
const METRICS_WINDOW_DAYS: i64 = 7;

/// Rolling window of observed (duration, cost, accuracy) outcomes per model
/// key, with write-through onto the capability registry.
pub struct PerformanceTracker {
    history: DashMap<String, VecDeque<PerformanceSample>>,
    registry: Arc<ModelCapabilityRegistry>,
}

impl PerformanceTracker {
    pub fn new(registry: Arc<ModelCapabilityRegistry>) -> Self {
        Self {
            history: DashMap::new(),
            registry,
        }
    }

    /// Record one observed outcome and reflect it onto the model's option.
    pub fn track(&self, provider: &str, model: &str, duration_ms: u64, cost: f64, accuracy: f64) {
        let sample = PerformanceSample {
            accuracy: clamp_score(accuracy),
            duration_ms,
            cost,
            timestamp: Utc::now(),
        };
        self.push_sample(provider, model, sample);
    }

    /// Append a sample with an explicit timestamp. Window tests use this to
    /// plant old samples.
    pub fn push_sample(&self, provider: &str, model: &str, sample: PerformanceSample) {
        let key = model_key(provider, model);
        let accuracy = sample.accuracy;
        let duration_ms = sample.duration_ms;
        let cost = sample.cost;

        {
            let mut samples = self.history.entry(key.clone()).or_default();
            samples.push_back(sample);
            while samples.len() > MAX_SAMPLES_PER_MODEL {
                samples.pop_front();
            }
            debug!("Model {} now has {} performance samples", key, samples.len());
        }

        self.registry
            .apply_observation(provider, model, accuracy, duration_ms, cost);
    }

    /// Aggregate metrics over the trailing seven days. `None` means no samples
    /// in the window: callers must treat that as unknown, not zero.
    pub fn metrics(&self, provider: &str, model: &str) -> Option<PerformanceMetrics> {
        let key = model_key(provider, model);
        let cutoff = Utc::now() - Duration::days(METRICS_WINDOW_DAYS);

        let samples = self.history.get(&key)?;
        let recent: Vec<&PerformanceSample> = samples
            .iter()
            .filter(|s| s.timestamp >= cutoff)
            .collect();

        if recent.is_empty() {
            return None;
        }

        let count = recent.len() as f64;
        Some(PerformanceMetrics {
            sample_count: recent.len(),
            avg_accuracy: recent.iter().map(|s| s.accuracy).sum::<f64>() / count,
            avg_duration_ms: recent.iter().map(|s| s.duration_ms as f64).sum::<f64>() / count,
            avg_cost: recent.iter().map(|s| s.cost).sum::<f64>() / count,
            window_days: METRICS_WINDOW_DAYS,
        })
    }

    pub fn sample_count(&self, provider: &str, model: &str) -> usize {
        self.history
            .get(&model_key(provider, model))
            .map(|s| s.len())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> PerformanceTracker {
        PerformanceTracker::new(Arc::new(ModelCapabilityRegistry::from_config(&[])))
    }

    #[test]
    fn history_is_trimmed_to_window_cap() {
        let tracker = tracker();
        for i in 0..150 {
            tracker.track("openai", "gpt-4", 1000 + i, 0.01, 0.9);
        }
        assert_eq!(tracker.sample_count("openai", "gpt-4"), MAX_SAMPLES_PER_MODEL);
    }

    #[test]
    fn tracking_writes_through_to_registry() {
        let registry = Arc::new(ModelCapabilityRegistry::from_config(&[]));
        let tracker = PerformanceTracker::new(Arc::clone(&registry));

        tracker.track("openai", "gpt-4", 2500, 0.02, 0.88);

        let option = registry.get("openai", "gpt-4").unwrap();
        assert_eq!(option.estimated_latency_ms, 2500);
        assert_eq!(option.estimated_cost, 0.02);
        assert_eq!(option.accuracy_score, 0.88);
    }

    #[test]
    fn metrics_ignore_samples_older_than_window() {
        let tracker = tracker();
        tracker.push_sample(
            "openai",
            "gpt-4",
            PerformanceSample {
                accuracy: 0.9,
                duration_ms: 1000,
                cost: 0.01,
                timestamp: Utc::now() - Duration::days(10),
            },
        );

        assert!(tracker.metrics("openai", "gpt-4").is_none());

        tracker.track("openai", "gpt-4", 2000, 0.02, 0.8);
        let metrics = tracker.metrics("openai", "gpt-4").unwrap();
        assert_eq!(metrics.sample_count, 1);
        assert_eq!(metrics.avg_duration_ms, 2000.0);
    }

    #[test]
    fn metrics_absent_for_untracked_model() {
        let tracker = tracker();
        assert!(tracker.metrics("openai", "gpt-4").is_none());
    }

    #[test]
    fn accuracy_is_clamped_on_ingest() {
        let tracker = tracker();
        tracker.track("openai", "gpt-4", 100, 0.0, 1.8);
        let metrics = tracker.metrics("openai", "gpt-4").unwrap();
        assert_eq!(metrics.avg_accuracy, 1.0);
    }
}

use crate::config::ModelEntry;
use crate::types::{clamp_score, model_key, ModelCapabilities, ModelOption, ModelQualityTier};
use dashmap::DashMap;
use tracing::{debug, info};

/// Table of known (provider, model) pairs with their declared cost, latency,
/// accuracy, and capability attributes. Declared values come from
/// configuration; observed values are written through by the performance
/// tracker as samples arrive.
pub struct ModelCapabilityRegistry {
    models: DashMap<String, ModelOption>,
}

impl ModelCapabilityRegistry {
    pub fn new() -> Self {
        Self {
            models: DashMap::new(),
        }
    }

    /// Build the registry from configured entries, falling back to the
    /// built-in table when none are configured.
    pub fn from_config(entries: &[ModelEntry]) -> Self {
        let registry = Self::new();
        if entries.is_empty() {
            info!("No models configured, loading built-in model table");
            registry.refresh(&ModelEntry::builtin());
        } else {
            registry.refresh(entries);
        }
        registry
    }

    /// Re-apply declared attributes from configuration. Entries not present in
    /// the new table are removed; observed availability is reset. Long-running
    /// hosts call this on configuration reload; the CLI builds the table once.
    pub fn refresh(&self, entries: &[ModelEntry]) {
        let fresh: Vec<ModelOption> = entries.iter().map(entry_to_option).collect();

        self.models
            .retain(|key, _| fresh.iter().any(|m| m.key() == *key));

        for option in fresh {
            debug!("Registering model {}", option.key());
            self.models.insert(option.key(), option);
        }

        info!("Model capability registry holds {} models", self.models.len());
    }

    pub fn insert(&self, option: ModelOption) {
        self.models.insert(option.key(), option);
    }

    pub fn get(&self, provider: &str, model: &str) -> Option<ModelOption> {
        self.models
            .get(&model_key(provider, model))
            .map(|entry| entry.clone())
    }

    pub fn all(&self) -> Vec<ModelOption> {
        self.models.iter().map(|entry| entry.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Write observed outcome values onto the model's option so the next
    /// selection call sees fresh numbers without recomputation.
    pub fn apply_observation(
        &self,
        provider: &str,
        model: &str,
        accuracy: f64,
        duration_ms: u64,
        cost: f64,
    ) {
        if let Some(mut entry) = self.models.get_mut(&model_key(provider, model)) {
            entry.accuracy_score = clamp_score(accuracy);
            entry.estimated_latency_ms = duration_ms;
            entry.estimated_cost = cost;
        }
    }

    pub fn set_availability(&self, provider: &str, model: &str, available: bool) {
        if let Some(mut entry) = self.models.get_mut(&model_key(provider, model)) {
            entry.is_available = available;
        }
    }
}

impl Default for ModelCapabilityRegistry {
    fn default() -> Self {
        Self::from_config(&[])
    }
}

fn entry_to_option(entry: &ModelEntry) -> ModelOption {
    let quality_tier = match entry.quality.as_str() {
        "low" => ModelQualityTier::Low,
        "high" => ModelQualityTier::High,
        _ => ModelQualityTier::Medium,
    };

    ModelOption {
        provider: entry.provider.clone(),
        model: entry.model.clone(),
        estimated_cost: entry.cost,
        estimated_latency_ms: entry.latency_ms,
        accuracy_score: clamp_score(entry.accuracy),
        is_available: true,
        capabilities: ModelCapabilities {
            max_tokens: entry.max_tokens,
            context_window: entry.context_window,
            quality_tier,
            supports_streaming: entry.streaming,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_table_loads_when_config_is_empty() {
        let registry = ModelCapabilityRegistry::from_config(&[]);
        assert!(!registry.is_empty());
        assert!(registry.get("openai", "gpt-3.5-turbo").is_some());
    }

    #[test]
    fn refresh_drops_models_no_longer_configured() {
        let registry = ModelCapabilityRegistry::from_config(&[]);
        let only = ModelEntry {
            provider: "openai".to_string(),
            model: "gpt-4".to_string(),
            ..ModelEntry::default()
        };
        registry.refresh(&[only]);
        assert_eq!(registry.len(), 1);
        assert!(registry.get("openai", "gpt-3.5-turbo").is_none());
    }

    #[test]
    fn observation_writes_through() {
        let registry = ModelCapabilityRegistry::from_config(&[]);
        registry.apply_observation("openai", "gpt-4", 0.7, 1234, 0.01);
        let option = registry.get("openai", "gpt-4").unwrap();
        assert_eq!(option.accuracy_score, 0.7);
        assert_eq!(option.estimated_latency_ms, 1234);
        assert_eq!(option.estimated_cost, 0.01);
    }
}

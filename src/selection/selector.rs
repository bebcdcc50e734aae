use crate::error::PipelineError;
use crate::selection::availability::ProviderAvailabilityTracker;
use crate::selection::registry::ModelCapabilityRegistry;
use crate::types::{
    clamp_score, ModelAlternative, ModelOption, ModelQualityTier, ModelSelectionCriteria,
    ModelSelectionResult, QueryComplexity, SelectionPriority,
};
use std::sync::Arc;
use tracing::{debug, info};

/// Ranked alternatives returned alongside the winner.
const MAX_ALTERNATIVES: usize = 3;

/// Component weights for one scoring pass.
#[derive(Debug, Clone, Copy)]
struct WeightProfile {
    cost: f64,
    speed: f64,
    accuracy: f64,
    availability: f64,
    complexity: f64,
}

impl WeightProfile {
    fn for_priority(priority: SelectionPriority) -> Self {
        match priority {
            SelectionPriority::Cost => Self {
                cost: 0.5,
                speed: 0.15,
                accuracy: 0.15,
                availability: 0.1,
                complexity: 0.1,
            },
            SelectionPriority::Speed => Self {
                cost: 0.15,
                speed: 0.5,
                accuracy: 0.15,
                availability: 0.1,
                complexity: 0.1,
            },
            SelectionPriority::Accuracy => Self {
                cost: 0.15,
                speed: 0.15,
                accuracy: 0.5,
                availability: 0.1,
                complexity: 0.1,
            },
            SelectionPriority::Availability => Self {
                cost: 0.15,
                speed: 0.15,
                accuracy: 0.2,
                availability: 0.4,
                complexity: 0.1,
            },
            SelectionPriority::Balanced => Self {
                cost: 0.25,
                speed: 0.25,
                accuracy: 0.25,
                availability: 0.15,
                complexity: 0.10,
            },
        }
    }
}

#[derive(Debug, Clone)]
struct ScoredModel {
    option: ModelOption,
    total: f64,
    weighted_cost: f64,
    weighted_speed: f64,
    weighted_accuracy: f64,
    weighted_availability: f64,
    weighted_complexity: f64,
}

impl ScoredModel {
    fn dominant_factor(&self) -> &'static str {
        let components = [
            ("cost", self.weighted_cost),
            ("speed", self.weighted_speed),
            ("accuracy", self.weighted_accuracy),
            ("availability", self.weighted_availability),
            ("complexity match", self.weighted_complexity),
        ];
        components
            .iter()
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(name, _)| *name)
            .unwrap_or("accuracy")
    }
}

/// How well a model's quality tier fits the declared query complexity.
fn complexity_match_score(complexity: QueryComplexity, tier: ModelQualityTier) -> f64 {
    match (complexity, tier) {
        (QueryComplexity::Simple, ModelQualityTier::Low) => 0.9,
        (QueryComplexity::Simple, ModelQualityTier::Medium) => 1.0,
        (QueryComplexity::Simple, ModelQualityTier::High) => 0.7,
        (QueryComplexity::Moderate, ModelQualityTier::Low) => 0.6,
        (QueryComplexity::Moderate, ModelQualityTier::Medium) => 0.9,
        (QueryComplexity::Moderate, ModelQualityTier::High) => 1.0,
        (QueryComplexity::Complex, ModelQualityTier::Low) => 0.4,
        (QueryComplexity::Complex, ModelQualityTier::Medium) => 0.7,
        (QueryComplexity::Complex, ModelQualityTier::High) => 1.0,
        (QueryComplexity::VeryComplex, ModelQualityTier::Low) => 0.3,
        (QueryComplexity::VeryComplex, ModelQualityTier::Medium) => 0.6,
        (QueryComplexity::VeryComplex, ModelQualityTier::High) => 1.0,
    }
}

/// Scores every available model against the criteria and returns the top pick
/// with ranked alternatives and a human-readable justification.
pub struct ModelSelector {
    registry: Arc<ModelCapabilityRegistry>,
    availability: Arc<ProviderAvailabilityTracker>,
}

impl ModelSelector {
    pub fn new(
        registry: Arc<ModelCapabilityRegistry>,
        availability: Arc<ProviderAvailabilityTracker>,
    ) -> Self {
        Self {
            registry,
            availability,
        }
    }

    pub fn select_optimal(
        &self,
        criteria: &ModelSelectionCriteria,
    ) -> Result<ModelSelectionResult, PipelineError> {
        self.select_internal(criteria, &[])
    }

    /// Re-run selection with the given providers excluded and the priority
    /// forced to availability, so a degraded provider is deprioritized
    /// everywhere rather than skipped once.
    pub fn select_with_failover(
        &self,
        criteria: &ModelSelectionCriteria,
        exclude_providers: &[String],
    ) -> Result<ModelSelectionResult, PipelineError> {
        let mut failover_criteria = criteria.clone();
        failover_criteria.priority = SelectionPriority::Availability;
        self.select_internal(&failover_criteria, exclude_providers)
    }

    fn select_internal(
        &self,
        criteria: &ModelSelectionCriteria,
        exclude_providers: &[String],
    ) -> Result<ModelSelectionResult, PipelineError> {
        let weights = WeightProfile::for_priority(criteria.priority);

        let mut scored: Vec<ScoredModel> = self
            .registry
            .all()
            .into_iter()
            .filter(|m| m.is_available)
            .filter(|m| !exclude_providers.iter().any(|p| p == &m.provider))
            .filter(|m| self.availability.is_available(&m.provider))
            .map(|option| score_model(option, criteria, &weights))
            .collect();

        if scored.is_empty() {
            return Err(PipelineError::NoSuitableModel(
                "no available models match the selection criteria".to_string(),
            ));
        }

        // Highest total wins; key order breaks ties so repeated calls over an
        // identical snapshot stay deterministic.
        scored.sort_by(|a, b| {
            b.total
                .total_cmp(&a.total)
                .then_with(|| a.option.key().cmp(&b.option.key()))
        });

        for s in &scored {
            debug!("Model {} scored {:.4}", s.option.key(), s.total);
        }

        let winner = scored[0].clone();
        let alternatives: Vec<ModelAlternative> = scored
            .iter()
            .skip(1)
            .take(MAX_ALTERNATIVES)
            .map(|s| ModelAlternative {
                provider: s.option.provider.clone(),
                model: s.option.model.clone(),
                score: clamp_score(s.total),
            })
            .collect();

        let reasoning = format!(
            "Selected {}/{} (score {:.3}); dominant factor: {}. Capabilities: {} quality, {} max tokens, {} context window, streaming {}.",
            winner.option.provider,
            winner.option.model,
            winner.total,
            winner.dominant_factor(),
            winner.option.capabilities.quality_tier.as_str(),
            winner.option.capabilities.max_tokens,
            winner.option.capabilities.context_window,
            if winner.option.capabilities.supports_streaming {
                "supported"
            } else {
                "unsupported"
            },
        );

        info!("{}", reasoning);

        Ok(ModelSelectionResult {
            provider: winner.option.provider.clone(),
            model: winner.option.model.clone(),
            estimated_cost: winner.option.estimated_cost,
            estimated_latency_ms: winner.option.estimated_latency_ms,
            confidence: clamp_score(winner.total),
            alternatives,
            reasoning,
        })
    }
}

fn score_model(
    option: ModelOption,
    criteria: &ModelSelectionCriteria,
    weights: &WeightProfile,
) -> ScoredModel {
    // Inverse-linear against the ceilings, floored at zero
    let cost_score = if criteria.max_cost > 0.0 {
        (1.0 - option.estimated_cost / criteria.max_cost).max(0.0)
    } else {
        0.0
    };
    let speed_score = if criteria.max_latency_ms > 0 {
        (1.0 - option.estimated_latency_ms as f64 / criteria.max_latency_ms as f64).max(0.0)
    } else {
        0.0
    };

    // Accuracy below the floor contributes nothing
    let accuracy_score = if option.accuracy_score < criteria.min_accuracy {
        0.0
    } else {
        option.accuracy_score
    };

    let availability_score = if option.is_available { 1.0 } else { 0.0 };
    let complexity_score =
        complexity_match_score(criteria.complexity, option.capabilities.quality_tier);

    let weighted_cost = weights.cost * cost_score;
    let weighted_speed = weights.speed * speed_score;
    let weighted_accuracy = weights.accuracy * accuracy_score;
    let weighted_availability = weights.availability * availability_score;
    let weighted_complexity = weights.complexity * complexity_score;

    ScoredModel {
        option,
        total: weighted_cost
            + weighted_speed
            + weighted_accuracy
            + weighted_availability
            + weighted_complexity,
        weighted_cost,
        weighted_speed,
        weighted_accuracy,
        weighted_availability,
        weighted_complexity,
    }
}

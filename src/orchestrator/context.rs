use crate::types::{
    BusinessProfile, EnhancedContext, QueryComplexity, QueryIntent, QueryRequest,
};

/// Profile confidence floor for the enhanced fast path.
pub const MIN_PROFILE_CONFIDENCE: f64 = 0.10;

/// Minimum assembled prompt length for the enhanced fast path.
pub const MIN_PROMPT_CHARS: usize = 100;

/// Outcome of the one context validity check. The orchestrator matches on
/// this once instead of re-checking fields at each stage.
#[derive(Debug, Clone)]
pub enum ContextDecision {
    Enhanced(EnhancedContext),
    Basic { reason: String },
}

/// Decide which analysis path a request takes. The enhanced path requires a
/// context whose profile, schema snapshot, and assembled prompt are all usable
/// as a unit; any single violation selects the basic path with a specific
/// reason.
pub fn decide_context(request: &QueryRequest) -> ContextDecision {
    let context = match &request.enhanced_context {
        Some(context) => context,
        None => {
            return ContextDecision::Basic {
                reason: "no enhanced context attached".to_string(),
            }
        }
    };

    if context.profile.confidence < MIN_PROFILE_CONFIDENCE {
        return ContextDecision::Basic {
            reason: format!(
                "profile confidence {:.2} below the {:.2} floor",
                context.profile.confidence, MIN_PROFILE_CONFIDENCE
            ),
        };
    }

    if context.schema.tables.is_empty() {
        return ContextDecision::Basic {
            reason: "schema snapshot has no relevant tables".to_string(),
        };
    }

    if context.assembled_prompt.len() < MIN_PROMPT_CHARS {
        return ContextDecision::Basic {
            reason: format!(
                "assembled prompt is {} characters, below the {} minimum",
                context.assembled_prompt.len(),
                MIN_PROMPT_CHARS
            ),
        };
    }

    ContextDecision::Enhanced(context.clone())
}

/// Lightweight keyword profiling for the basic path's intent analysis stage.
pub fn analyze_intent(question: &str) -> BusinessProfile {
    let lowered = question.to_lowercase();

    let checks: [(&[&str], QueryIntent); 5] = [
        (
            &["total", "sum", "count", "average", "avg", "revenue by"],
            QueryIntent::Aggregation,
        ),
        (
            &["trend", "over time", "per month", "per year", "growth"],
            QueryIntent::Trend,
        ),
        (
            &["compare", "versus", "vs", "difference between"],
            QueryIntent::Comparison,
        ),
        (
            &["where", "only", "filter", "with more than", "at least"],
            QueryIntent::Filter,
        ),
        (&["show", "list", "what is", "which"], QueryIntent::Lookup),
    ];

    for (keywords, intent) in checks {
        if keywords.iter().any(|kw| lowered.contains(kw)) {
            return BusinessProfile {
                intent,
                domain: "analytics".to_string(),
                confidence: 0.6,
            };
        }
    }

    BusinessProfile {
        intent: QueryIntent::Unknown,
        domain: "analytics".to_string(),
        confidence: 0.2,
    }
}

/// Declare the query's complexity tier from the profile and question shape.
pub fn complexity_for(profile: &BusinessProfile, question: &str) -> QueryComplexity {
    let words = question.split_whitespace().count();
    match profile.intent {
        QueryIntent::Lookup if words <= 8 => QueryComplexity::Simple,
        QueryIntent::Lookup | QueryIntent::Filter => QueryComplexity::Moderate,
        QueryIntent::Aggregation if words <= 12 => QueryComplexity::Moderate,
        QueryIntent::Aggregation | QueryIntent::Comparison => QueryComplexity::Complex,
        QueryIntent::Trend => QueryComplexity::Complex,
        QueryIntent::Unknown if words > 20 => QueryComplexity::VeryComplex,
        QueryIntent::Unknown => QueryComplexity::Moderate,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ColumnSchema, SchemaSnapshot, TableSchema};

    fn usable_context() -> EnhancedContext {
        EnhancedContext {
            profile: BusinessProfile {
                intent: QueryIntent::Aggregation,
                domain: "sales".to_string(),
                confidence: 0.8,
            },
            schema: SchemaSnapshot {
                tables: vec![TableSchema {
                    name: "orders".to_string(),
                    columns: vec![ColumnSchema {
                        name: "amount".to_string(),
                        data_type: "DOUBLE".to_string(),
                        nullable: true,
                        primary_key: false,
                        foreign_key: false,
                    }],
                }],
            },
            assembled_prompt: "x".repeat(200),
        }
    }

    fn request_with(context: EnhancedContext) -> QueryRequest {
        QueryRequest::new("u1", "show revenue", "s1").with_enhanced_context(context)
    }

    #[test]
    fn missing_context_selects_basic_path() {
        let request = QueryRequest::new("u1", "show revenue", "s1");
        match decide_context(&request) {
            ContextDecision::Basic { reason } => {
                assert!(reason.contains("no enhanced context"))
            }
            _ => panic!("expected basic path"),
        }
    }

    #[test]
    fn low_confidence_selects_basic_path_with_reason() {
        let mut context = usable_context();
        context.profile.confidence = 0.05;
        match decide_context(&request_with(context)) {
            ContextDecision::Basic { reason } => assert!(reason.contains("confidence")),
            _ => panic!("expected basic path"),
        }
    }

    #[test]
    fn empty_schema_selects_basic_path_with_reason() {
        let mut context = usable_context();
        context.schema.tables.clear();
        match decide_context(&request_with(context)) {
            ContextDecision::Basic { reason } => assert!(reason.contains("no relevant tables")),
            _ => panic!("expected basic path"),
        }
    }

    #[test]
    fn short_prompt_selects_basic_path_with_reason() {
        let mut context = usable_context();
        context.assembled_prompt = "short prompt".to_string();
        match decide_context(&request_with(context)) {
            ContextDecision::Basic { reason } => assert!(reason.contains("prompt")),
            _ => panic!("expected basic path"),
        }
    }

    #[test]
    fn boundary_values_pass_the_predicate() {
        let mut context = usable_context();
        context.profile.confidence = MIN_PROFILE_CONFIDENCE;
        context.assembled_prompt = "y".repeat(MIN_PROMPT_CHARS);
        assert!(matches!(
            decide_context(&request_with(context)),
            ContextDecision::Enhanced(_)
        ));
    }

    #[test]
    fn aggregation_keywords_are_profiled() {
        let profile = analyze_intent("Show total revenue by country");
        assert_eq!(profile.intent, QueryIntent::Aggregation);
        assert!(profile.confidence > 0.0);
    }
}

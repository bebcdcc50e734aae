use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Clamp any confidence/score value into [0, 1].
pub fn clamp_score(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

// Pipeline request/response types

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub query_id: String,
    pub user_id: String,
    pub question: String,
    pub session_id: String,
    pub options: QueryOptions,
    pub enhanced_context: Option<EnhancedContext>,
}

impl QueryRequest {
    pub fn new(user_id: &str, question: &str, session_id: &str) -> Self {
        Self {
            query_id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            question: question.to_string(),
            session_id: session_id.to_string(),
            options: QueryOptions::default(),
            enhanced_context: None,
        }
    }

    pub fn with_options(mut self, options: QueryOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_enhanced_context(mut self, context: EnhancedContext) -> Self {
        self.enhanced_context = Some(context);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryOptions {
    pub enable_cache: bool,
    pub provider_override: Option<String>,
    pub model_override: Option<String>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            enable_cache: true,
            provider_override: None,
            model_override: None,
        }
    }
}

// Enhanced context supplied by the caller to skip intent/schema analysis

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnhancedContext {
    pub profile: BusinessProfile,
    pub schema: SchemaSnapshot,
    pub assembled_prompt: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusinessProfile {
    pub intent: QueryIntent,
    pub domain: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryIntent {
    Aggregation,
    Filter,
    Trend,
    Comparison,
    Lookup,
    Unknown,
}

// Schema snapshot produced by the schema collaborator, read-only for generation

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaSnapshot {
    pub tables: Vec<TableSchema>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnSchema>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    pub primary_key: bool,
    pub foreign_key: bool,
}

impl SchemaSnapshot {
    /// Render the snapshot as the markdown table format the generation
    /// providers expect in their prompts.
    pub fn to_prompt_format(&self) -> String {
        let mut out = String::from("# DATABASE SCHEMA\n\n");

        if self.tables.is_empty() {
            out.push_str("No tables available.\n");
            return out;
        }

        for table in &self.tables {
            out.push_str(&format!("### Table: {}\n\n", table.name));
            out.push_str("| Column Name | Data Type | Nullable | Key |\n");
            out.push_str("|------------|-----------|----------|-----|\n");

            for column in &table.columns {
                let key = if column.primary_key {
                    "PK"
                } else if column.foreign_key {
                    "FK"
                } else {
                    ""
                };
                out.push_str(&format!(
                    "| {} | {} | {} | {} |\n",
                    column.name,
                    column.data_type,
                    if column.nullable { "YES" } else { "NO" },
                    key
                ));
            }

            out.push('\n');
        }

        out
    }
}

// Per-stage artifacts

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationResult {
    pub sql: String,
    pub success: bool,
    pub confidence: f64,
    pub error: Option<String>,
    pub prompt_metadata: Option<String>,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub sql: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub rows: Vec<serde_json::Value>,
    pub row_count: usize,
    pub elapsed_ms: u64,
    pub success: bool,
    pub error: Option<String>,
}

/// Terminal artifact returned to the caller. Cached copies are reused verbatim
/// except for a fresh query id and a forced `cached = true`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub query_id: String,
    pub user_id: String,
    pub question: String,
    pub sql: String,
    pub result: Option<ExecutionResult>,
    pub confidence: f64,
    pub cached: bool,
    pub success: bool,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// What the result caches hold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedQueryResult {
    pub response: QueryResponse,
    pub expires_at: DateTime<Utc>,
}

// Progress reporting

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryProgressStage {
    CacheCheck,
    IntentAnalysis,
    SchemaRetrieval,
    IntelligenceAnalysis,
    SqlGeneration,
    SqlOptimization,
    SqlValidation,
    SqlExecution,
    ResponseBuild,
    StreamingNotify,
    CacheWrite,
    Complete,
    Failed,
}

impl QueryProgressStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryProgressStage::CacheCheck => "cache_check",
            QueryProgressStage::IntentAnalysis => "intent_analysis",
            QueryProgressStage::SchemaRetrieval => "schema_retrieval",
            QueryProgressStage::IntelligenceAnalysis => "intelligence_analysis",
            QueryProgressStage::SqlGeneration => "sql_generation",
            QueryProgressStage::SqlOptimization => "sql_optimization",
            QueryProgressStage::SqlValidation => "sql_validation",
            QueryProgressStage::SqlExecution => "sql_execution",
            QueryProgressStage::ResponseBuild => "response_build",
            QueryProgressStage::StreamingNotify => "streaming_notify",
            QueryProgressStage::CacheWrite => "cache_write",
            QueryProgressStage::Complete => "complete",
            QueryProgressStage::Failed => "failed",
        }
    }
}

// Model selection types

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelOption {
    pub provider: String,
    pub model: String,
    pub estimated_cost: f64,
    pub estimated_latency_ms: u64,
    pub accuracy_score: f64,
    pub is_available: bool,
    pub capabilities: ModelCapabilities,
}

impl ModelOption {
    pub fn key(&self) -> String {
        model_key(&self.provider, &self.model)
    }
}

/// Canonical key for a (provider, model) pair in the shared registries.
pub fn model_key(provider: &str, model: &str) -> String {
    format!("{}/{}", provider, model)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelCapabilities {
    pub max_tokens: u32,
    pub context_window: u32,
    pub quality_tier: ModelQualityTier,
    pub supports_streaming: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelQualityTier {
    Low,
    Medium,
    High,
}

impl ModelQualityTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelQualityTier::Low => "low",
            ModelQualityTier::Medium => "medium",
            ModelQualityTier::High => "high",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryComplexity {
    Simple,
    Moderate,
    Complex,
    VeryComplex,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectionPriority {
    Cost,
    Speed,
    Accuracy,
    Availability,
    Balanced,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSelectionCriteria {
    pub priority: SelectionPriority,
    pub max_cost: f64,
    pub max_latency_ms: u64,
    pub min_accuracy: f64,
    pub complexity: QueryComplexity,
}

impl Default for ModelSelectionCriteria {
    fn default() -> Self {
        Self {
            priority: SelectionPriority::Balanced,
            max_cost: 0.05,
            max_latency_ms: 10_000,
            min_accuracy: 0.0,
            complexity: QueryComplexity::Moderate,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSelectionResult {
    pub provider: String,
    pub model: String,
    pub estimated_cost: f64,
    pub estimated_latency_ms: u64,
    pub confidence: f64,
    pub alternatives: Vec<ModelAlternative>,
    pub reasoning: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelAlternative {
    pub provider: String,
    pub model: String,
    pub score: f64,
}

// Performance tracking

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceSample {
    pub accuracy: f64,
    pub duration_ms: u64,
    pub cost: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub sample_count: usize,
    pub avg_accuracy: f64,
    pub avg_duration_ms: f64,
    pub avg_cost: f64,
    pub window_days: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_score_bounds() {
        assert_eq!(clamp_score(1.7), 1.0);
        assert_eq!(clamp_score(-0.3), 0.0);
        assert_eq!(clamp_score(0.42), 0.42);
    }

    #[test]
    fn schema_prompt_format_lists_tables_and_columns() {
        let snapshot = SchemaSnapshot {
            tables: vec![TableSchema {
                name: "orders".to_string(),
                columns: vec![ColumnSchema {
                    name: "order_id".to_string(),
                    data_type: "BIGINT".to_string(),
                    nullable: false,
                    primary_key: true,
                    foreign_key: false,
                }],
            }],
        };

        let rendered = snapshot.to_prompt_format();
        assert!(rendered.contains("### Table: orders"));
        assert!(rendered.contains("| order_id | BIGINT | NO | PK |"));
    }
}

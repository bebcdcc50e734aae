use crate::error::PipelineError;
use crate::types::{
    CachedQueryResult, ExecutionResult, OptimizationResult, QueryProgressStage, SchemaSnapshot,
};
use async_trait::async_trait;
use std::collections::HashMap;
use tracing::info;

// Collaborator interfaces consumed by the orchestrator. Concrete backends live
// in executor.rs / schema.rs / llm; tests plug in their own.

#[async_trait]
pub trait SchemaProvider: Send + Sync {
    /// Return the schema subset relevant to the question.
    async fn relevant_schema(&self, question: &str) -> Result<SchemaSnapshot, PipelineError>;
}

#[async_trait]
pub trait SqlValidator: Send + Sync {
    async fn validate(&self, sql: &str) -> Result<bool, PipelineError>;
}

#[async_trait]
pub trait SqlExecutor: Send + Sync {
    async fn execute(&self, sql: &str) -> Result<ExecutionResult, PipelineError>;
}

#[async_trait]
pub trait SqlOptimizer: Send + Sync {
    /// Propose a rewritten query. The orchestrator only adopts the rewrite when
    /// its confidence clears the adoption floor.
    async fn optimize(
        &self,
        sql: &str,
        schema: &SchemaSnapshot,
    ) -> Result<OptimizationResult, PipelineError>;
}

#[async_trait]
pub trait ProgressObserver: Send + Sync {
    /// Report a stage transition. Failures here must never fail the pipeline;
    /// implementations swallow their own errors.
    async fn notify(
        &self,
        user_id: &str,
        query_id: &str,
        stage: QueryProgressStage,
        message: &str,
        percent: u8,
    );
}

#[async_trait]
pub trait SettingsProvider: Send + Sync {
    /// Admin-level boolean feature flags (caching on/off, semantic cache on/off).
    async fn get_bool(&self, name: &str) -> bool;
}

#[async_trait]
pub trait SemanticCache: Send + Sync {
    /// Similarity lookup over near-duplicate questions.
    async fn lookup(
        &self,
        question: &str,
        similarity_threshold: f64,
        max_results: usize,
    ) -> Result<Option<CachedQueryResult>, PipelineError>;

    async fn store(
        &self,
        question: &str,
        entry: CachedQueryResult,
    ) -> Result<(), PipelineError>;
}

#[async_trait]
pub trait ExactCache: Send + Sync {
    async fn lookup(&self, key: &str) -> Result<Option<CachedQueryResult>, PipelineError>;

    async fn store(&self, key: &str, entry: CachedQueryResult) -> Result<(), PipelineError>;
}

// Default collaborator implementations

/// Progress observer that only logs. The push transport is an external
/// collaborator; this stands in wherever none is wired.
pub struct LoggingProgressObserver;

#[async_trait]
impl ProgressObserver for LoggingProgressObserver {
    async fn notify(
        &self,
        user_id: &str,
        query_id: &str,
        stage: QueryProgressStage,
        message: &str,
        percent: u8,
    ) {
        info!(
            user_id,
            query_id,
            stage = stage.as_str(),
            percent,
            "{}",
            message
        );
    }
}

/// Fixed flag set, loaded once from configuration.
pub struct StaticSettings {
    flags: HashMap<String, bool>,
}

impl StaticSettings {
    pub fn new(flags: HashMap<String, bool>) -> Self {
        Self { flags }
    }
}

#[async_trait]
impl SettingsProvider for StaticSettings {
    async fn get_bool(&self, name: &str) -> bool {
        self.flags.get(name).copied().unwrap_or(false)
    }
}

/// Optimizer that never proposes a rewrite. Its confidence of 0.0 keeps the
/// originally generated SQL in play until a model-backed optimizer is wired.
pub struct PassthroughOptimizer;

#[async_trait]
impl SqlOptimizer for PassthroughOptimizer {
    async fn optimize(
        &self,
        sql: &str,
        _schema: &SchemaSnapshot,
    ) -> Result<OptimizationResult, PipelineError> {
        Ok(OptimizationResult {
            sql: sql.to_string(),
            confidence: 0.0,
        })
    }
}

pub mod context;

use crate::cache::CacheCoordinator;
use crate::error::PipelineError;
use crate::llm::{LlmError, LlmManager};
use crate::orchestrator::context::{analyze_intent, complexity_for, decide_context, ContextDecision};
use crate::selection::{ModelCapabilityRegistry, ModelSelector, PerformanceTracker, ProviderAvailabilityTracker};
use crate::traits::{ProgressObserver, SchemaProvider, SqlExecutor, SqlOptimizer, SqlValidator};
use crate::types::{
    clamp_score, EnhancedContext, GenerationResult, ModelSelectionCriteria, QueryComplexity,
    QueryProgressStage, QueryRequest, QueryResponse, SchemaSnapshot,
};
use chrono::{Duration, Utc};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// A rewritten query replaces the original only above this confidence.
pub const OPTIMIZED_SQL_CONFIDENCE_FLOOR: f64 = 0.8;

/// How long a provider stays blacklisted after a connection failure.
const PROVIDER_BLACKLIST_MINUTES: i64 = 5;

/// Drives one query end to end: cache check, context analysis, schema
/// retrieval, generation, optimization, validation, execution, and cache
/// write-back, reporting every stage transition to the progress observer.
/// A response object is always produced, never an unhandled fault.
pub struct QueryOrchestrator {
    llm: Arc<LlmManager>,
    registry: Arc<ModelCapabilityRegistry>,
    selector: Arc<ModelSelector>,
    performance: Arc<PerformanceTracker>,
    availability: Arc<ProviderAvailabilityTracker>,
    schema_provider: Arc<dyn SchemaProvider>,
    validator: Arc<dyn SqlValidator>,
    executor: Arc<dyn SqlExecutor>,
    optimizer: Arc<dyn SqlOptimizer>,
    progress: Arc<dyn ProgressObserver>,
    cache: Arc<CacheCoordinator>,
}

impl QueryOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        llm: Arc<LlmManager>,
        registry: Arc<ModelCapabilityRegistry>,
        selector: Arc<ModelSelector>,
        performance: Arc<PerformanceTracker>,
        availability: Arc<ProviderAvailabilityTracker>,
        schema_provider: Arc<dyn SchemaProvider>,
        validator: Arc<dyn SqlValidator>,
        executor: Arc<dyn SqlExecutor>,
        optimizer: Arc<dyn SqlOptimizer>,
        progress: Arc<dyn ProgressObserver>,
        cache: Arc<CacheCoordinator>,
    ) -> Self {
        Self {
            llm,
            registry,
            selector,
            performance,
            availability,
            schema_provider,
            validator,
            executor,
            optimizer,
            progress,
            cache,
        }
    }

    pub async fn process_query(&self, request: QueryRequest) -> QueryResponse {
        self.process_query_with_cancel(request, CancellationToken::new())
            .await
    }

    /// Process one request. Cancellation is cooperative: the token is checked
    /// between stages and an abort yields a terminal failure response.
    pub async fn process_query_with_cancel(
        &self,
        request: QueryRequest,
        cancel: CancellationToken,
    ) -> QueryResponse {
        info!(
            "Processing query {} for user {}: {}",
            request.query_id, request.user_id, request.question
        );

        let progress = ProgressGate::new(self.progress.as_ref());
        match self.run(&request, &cancel, &progress).await {
            Ok(response) => response,
            Err(e) => {
                error!("Query {} failed: {}", request.query_id, e);
                progress
                    .notify(&request, QueryProgressStage::Failed, &e.to_string(), 100)
                    .await;
                self.failure_response(&request, &e)
            }
        }
    }

    async fn run(
        &self,
        request: &QueryRequest,
        cancel: &CancellationToken,
        progress: &ProgressGate<'_>,
    ) -> Result<QueryResponse, PipelineError> {
        progress
            .notify(request, QueryProgressStage::CacheCheck, "Checking result caches", 5)
            .await;
        ensure_active(cancel)?;

        if let Some(hit) = self.cache.lookup(request).await {
            progress
                .notify(request, QueryProgressStage::Complete, "Served from cache", 100)
                .await;
            return Ok(hit);
        }

        match decide_context(request) {
            ContextDecision::Enhanced(context) => {
                match self.run_enhanced(request, context, cancel, progress).await {
                    Ok(response) => return Ok(response),
                    Err(PipelineError::Cancelled) => return Err(PipelineError::Cancelled),
                    Err(e) => {
                        // Full retry on the basic path, not a partial one
                        warn!("{}; retrying query {} on the basic path", e, request.query_id);
                    }
                }
            }
            ContextDecision::Basic { reason } => {
                debug!("Query {} takes the basic path: {}", request.query_id, reason);
            }
        }

        self.run_basic(request, cancel, progress).await
    }

    async fn run_basic(
        &self,
        request: &QueryRequest,
        cancel: &CancellationToken,
        progress: &ProgressGate<'_>,
    ) -> Result<QueryResponse, PipelineError> {
        progress
            .notify(
                request,
                QueryProgressStage::IntentAnalysis,
                "Analyzing question intent",
                10,
            )
            .await;
        ensure_active(cancel)?;
        let profile = analyze_intent(&request.question);

        progress
            .notify(
                request,
                QueryProgressStage::SchemaRetrieval,
                "Retrieving relevant schema",
                20,
            )
            .await;
        ensure_active(cancel)?;
        let schema = self.schema_provider.relevant_schema(&request.question).await?;

        progress
            .notify(
                request,
                QueryProgressStage::IntelligenceAnalysis,
                "Combining business context",
                25,
            )
            .await;
        ensure_active(cancel)?;
        let schema_text = schema.to_prompt_format();
        let complexity = complexity_for(&profile, &request.question);

        progress
            .notify(request, QueryProgressStage::SqlGeneration, "Generating SQL", 40)
            .await;
        ensure_active(cancel)?;
        let generation = self.generate(request, complexity, &schema_text, None).await?;

        self.finish_pipeline(request, generation, &schema, cancel, progress)
            .await
    }

    /// Fast path for a request carrying a usable enhanced context: intent and
    /// intelligence analysis are skipped and generation runs directly from the
    /// pre-assembled prompt. Every failure is surfaced as an
    /// `EnhancedContext` error so the caller can fall back to the basic path.
    async fn run_enhanced(
        &self,
        request: &QueryRequest,
        context: EnhancedContext,
        cancel: &CancellationToken,
        progress: &ProgressGate<'_>,
    ) -> Result<QueryResponse, PipelineError> {
        info!("Query {} takes the enhanced context fast path", request.query_id);

        progress
            .notify(
                request,
                QueryProgressStage::SqlGeneration,
                "Generating SQL from enhanced context",
                40,
            )
            .await;
        ensure_active(cancel)?;

        let schema_text = context.schema.to_prompt_format();
        let complexity = complexity_for(&context.profile, &request.question);

        let generation = self
            .generate(
                request,
                complexity,
                &schema_text,
                Some(&context.assembled_prompt),
            )
            .await
            .map_err(wrap_enhanced)?;

        self.finish_pipeline(request, generation, &context.schema, cancel, progress)
            .await
            .map_err(wrap_enhanced)
    }

    /// Select a model (unless the request overrides it), call the generation
    /// collaborator, and feed the outcome back into the performance tracker.
    async fn generate(
        &self,
        request: &QueryRequest,
        complexity: QueryComplexity,
        schema_text: &str,
        prompt_override: Option<&str>,
    ) -> Result<GenerationResult, PipelineError> {
        let (provider, model) = if let Some(provider) = &request.options.provider_override {
            (provider.clone(), request.options.model_override.clone())
        } else {
            let criteria = ModelSelectionCriteria {
                complexity,
                ..Default::default()
            };
            let selection = self.selector.select_optimal(&criteria)?;
            debug!("{}", selection.reasoning);
            (selection.provider, Some(selection.model))
        };

        let model_name = match &model {
            Some(m) => m.clone(),
            None => self.llm.default_model_for(&provider).unwrap_or_default(),
        };
        let estimated_cost = self
            .registry
            .get(&provider, &model_name)
            .map(|m| m.estimated_cost)
            .unwrap_or(0.0);

        let started = Instant::now();
        let outcome = self
            .llm
            .generate(
                Some(&provider),
                model.as_deref(),
                &request.question,
                schema_text,
                prompt_override,
            )
            .await;

        match outcome {
            Ok(generation) => {
                self.performance.track(
                    &provider,
                    &model_name,
                    generation.elapsed_ms,
                    estimated_cost,
                    generation.confidence,
                );
                if generation.sql.trim().is_empty() {
                    return Err(PipelineError::Generation(
                        "model returned empty SQL".to_string(),
                    ));
                }
                Ok(generation)
            }
            Err(LlmError::ConnectionError(msg)) => {
                // Blacklist the provider so later selections route around it
                self.availability
                    .mark_unavailable(&provider, Duration::minutes(PROVIDER_BLACKLIST_MINUTES));
                self.performance.track(
                    &provider,
                    &model_name,
                    started.elapsed().as_millis() as u64,
                    estimated_cost,
                    0.0,
                );
                Err(PipelineError::Generation(format!(
                    "provider {} unreachable: {}",
                    provider, msg
                )))
            }
            Err(e) => {
                self.performance.track(
                    &provider,
                    &model_name,
                    started.elapsed().as_millis() as u64,
                    estimated_cost,
                    0.0,
                );
                Err(PipelineError::Generation(e.to_string()))
            }
        }
    }

    /// Shared continuation for both analysis paths: optimize, validate,
    /// execute, build the response, notify, and write back to the caches.
    async fn finish_pipeline(
        &self,
        request: &QueryRequest,
        generation: GenerationResult,
        schema: &SchemaSnapshot,
        cancel: &CancellationToken,
        progress: &ProgressGate<'_>,
    ) -> Result<QueryResponse, PipelineError> {
        progress
            .notify(
                request,
                QueryProgressStage::SqlOptimization,
                "Optimizing generated SQL",
                50,
            )
            .await;
        ensure_active(cancel)?;

        let sql = match self.optimizer.optimize(&generation.sql, schema).await {
            Ok(opt) if opt.confidence > OPTIMIZED_SQL_CONFIDENCE_FLOOR => {
                debug!("Adopting optimized SQL (confidence {:.2})", opt.confidence);
                opt.sql
            }
            Ok(_) => generation.sql.clone(),
            Err(e) => {
                warn!("Optimizer failed, keeping generated SQL: {}", e);
                generation.sql.clone()
            }
        };

        progress
            .notify(request, QueryProgressStage::SqlValidation, "Validating SQL", 65)
            .await;
        ensure_active(cancel)?;

        let valid = match self.validator.validate(&sql).await {
            Ok(v) => v,
            Err(e) => {
                return Err(PipelineError::Validation {
                    message: e.to_string(),
                    sql,
                })
            }
        };
        if !valid {
            return Err(PipelineError::Validation {
                message: "SQL rejected by validator".to_string(),
                sql,
            });
        }

        progress
            .notify(request, QueryProgressStage::SqlExecution, "Executing SQL", 70)
            .await;
        ensure_active(cancel)?;

        let execution = match self.executor.execute(&sql).await {
            Ok(result) => result,
            Err(PipelineError::Execution { message, .. }) => {
                return Err(PipelineError::Execution { message, sql })
            }
            Err(e) => {
                return Err(PipelineError::Execution {
                    message: e.to_string(),
                    sql,
                })
            }
        };
        if !execution.success {
            let message = execution
                .error
                .clone()
                .unwrap_or_else(|| "execution failed".to_string());
            return Err(PipelineError::Execution { message, sql });
        }

        progress
            .notify(request, QueryProgressStage::ResponseBuild, "Building response", 90)
            .await;

        let response = QueryResponse {
            query_id: request.query_id.clone(),
            user_id: request.user_id.clone(),
            question: request.question.clone(),
            sql,
            result: Some(execution),
            confidence: clamp_score(generation.confidence),
            cached: false,
            success: true,
            error: None,
            timestamp: Utc::now(),
        };

        progress
            .notify(request, QueryProgressStage::StreamingNotify, "Results ready", 92)
            .await;

        self.cache.store(request, &response).await;
        debug!("Cache write-back finished for query {}", request.query_id);
        progress
            .notify(request, QueryProgressStage::CacheWrite, "Results cached", 92)
            .await;

        progress
            .notify(request, QueryProgressStage::Complete, "Query complete", 100)
            .await;
        Ok(response)
    }

    fn failure_response(&self, request: &QueryRequest, error: &PipelineError) -> QueryResponse {
        QueryResponse {
            query_id: request.query_id.clone(),
            user_id: request.user_id.clone(),
            question: request.question.clone(),
            sql: error.partial_sql().unwrap_or_default().to_string(),
            result: None,
            confidence: 0.0,
            cached: false,
            success: false,
            error: Some(error.to_string()),
            timestamp: Utc::now(),
        }
    }
}

/// Per-request progress reporting. A basic-path retry after a failed enhanced
/// attempt re-walks earlier stages; the floor keeps the reported percentage
/// from moving backwards within one request.
struct ProgressGate<'a> {
    observer: &'a dyn ProgressObserver,
    floor: AtomicU8,
}

impl<'a> ProgressGate<'a> {
    fn new(observer: &'a dyn ProgressObserver) -> Self {
        Self {
            observer,
            floor: AtomicU8::new(0),
        }
    }

    async fn notify(
        &self,
        request: &QueryRequest,
        stage: QueryProgressStage,
        message: &str,
        percent: u8,
    ) {
        let previous = self.floor.fetch_max(percent, Ordering::SeqCst);
        self.observer
            .notify(
                &request.user_id,
                &request.query_id,
                stage,
                message,
                percent.max(previous),
            )
            .await;
    }
}

fn ensure_active(cancel: &CancellationToken) -> Result<(), PipelineError> {
    if cancel.is_cancelled() {
        Err(PipelineError::Cancelled)
    } else {
        Ok(())
    }
}

fn wrap_enhanced(error: PipelineError) -> PipelineError {
    match error {
        PipelineError::Cancelled => PipelineError::Cancelled,
        other => PipelineError::EnhancedContext(other.to_string()),
    }
}

use clap::Parser;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info};

use querypilot::cache::{
    CacheCoordinator, InMemoryExactCache, SETTING_CACHING_ENABLED, SETTING_SEMANTIC_CACHE_ENABLED,
};
use querypilot::config::{AppConfig, CliArgs};
use querypilot::db::build_pool;
use querypilot::executor::DuckDbExecutor;
use querypilot::llm::LlmManager;
use querypilot::orchestrator::QueryOrchestrator;
use querypilot::schema::DuckDbSchemaProvider;
use querypilot::selection::{
    ModelCapabilityRegistry, ModelSelector, PerformanceTracker, ProviderAvailabilityTracker,
};
use querypilot::traits::{LoggingProgressObserver, PassthroughOptimizer, StaticSettings};
use querypilot::types::{QueryOptions, QueryRequest};
use querypilot::util::logging::init_tracing;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    init_tracing();

    // Parse command line arguments
    let args = CliArgs::parse();

    // Load configuration
    let config = match AppConfig::new(&args) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    info!("Initializing DuckDB connection pool");
    let pool = build_pool(&config.database.connection_string, config.database.pool_size)?;

    info!(
        "Initializing LLM manager with default provider: {}",
        config.llm.default_provider
    );
    let llm = Arc::new(LlmManager::new(&config.llm)?);

    let registry = Arc::new(ModelCapabilityRegistry::from_config(&config.selection.models));
    let availability = Arc::new(ProviderAvailabilityTracker::new());
    let performance = Arc::new(PerformanceTracker::new(registry.clone()));
    let selector = Arc::new(ModelSelector::new(registry.clone(), availability.clone()));

    let executor = Arc::new(DuckDbExecutor::new(pool.clone()));
    let schema_provider = Arc::new(DuckDbSchemaProvider::new(pool));

    let settings = Arc::new(StaticSettings::new(HashMap::from([
        (SETTING_CACHING_ENABLED.to_string(), config.cache.enabled),
        (
            SETTING_SEMANTIC_CACHE_ENABLED.to_string(),
            config.cache.semantic_enabled,
        ),
    ])));
    let cache = Arc::new(CacheCoordinator::new(
        None,
        Arc::new(InMemoryExactCache::new()),
        settings,
    ));

    let orchestrator = QueryOrchestrator::new(
        llm,
        registry,
        selector,
        performance,
        availability,
        schema_provider,
        executor.clone(),
        executor,
        Arc::new(PassthroughOptimizer),
        Arc::new(LoggingProgressObserver),
        cache,
    );

    let request = QueryRequest::new("cli", &args.question, "cli-session").with_options(QueryOptions {
        enable_cache: config.cache.enabled,
        provider_override: args.provider.clone(),
        model_override: args.model.clone(),
    });

    let response = orchestrator.process_query(request).await;
    println!("{}", serde_json::to_string_pretty(&response)?);

    if response.success {
        Ok(())
    } else {
        std::process::exit(1);
    }
}

use crate::error::PipelineError;
use crate::traits::{ExactCache, SemanticCache, SettingsProvider};
use crate::types::{CachedQueryResult, QueryRequest, QueryResponse};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Minimum similarity for a semantic hit.
pub const SEMANTIC_SIMILARITY_THRESHOLD: f64 = 0.85;

/// Result cap for one semantic lookup.
pub const SEMANTIC_MAX_RESULTS: usize = 5;

/// Write-back time-to-live.
pub const CACHE_TTL_HOURS: i64 = 24;

/// Admin flag gating all caching.
pub const SETTING_CACHING_ENABLED: &str = "caching_enabled";

/// Admin flag gating the semantic cache specifically.
pub const SETTING_SEMANTIC_CACHE_ENABLED: &str = "semantic_cache_enabled";

/// Cache key from the normalized question text. Two requests whose questions
/// differ only in whitespace or case address the same slot.
pub fn question_cache_key(question: &str) -> String {
    let normalized = question.trim().to_lowercase();
    let digest = Sha256::digest(normalized.as_bytes());
    format!("{:x}", digest)
}

/// Orchestrates the similarity-based and exact-hash result caches. Consulted
/// in a fixed order before generation and written to after success; every
/// cache failure is logged and treated as a miss.
pub struct CacheCoordinator {
    semantic: Option<Arc<dyn SemanticCache>>,
    exact: Arc<dyn ExactCache>,
    settings: Arc<dyn SettingsProvider>,
}

impl CacheCoordinator {
    pub fn new(
        semantic: Option<Arc<dyn SemanticCache>>,
        exact: Arc<dyn ExactCache>,
        settings: Arc<dyn SettingsProvider>,
    ) -> Self {
        Self {
            semantic,
            exact,
            settings,
        }
    }

    async fn caching_enabled_for(&self, request: &QueryRequest) -> bool {
        self.settings.get_bool(SETTING_CACHING_ENABLED).await && request.options.enable_cache
    }

    async fn semantic_enabled(&self) -> bool {
        self.semantic.is_some() && self.settings.get_bool(SETTING_SEMANTIC_CACHE_ENABLED).await
    }

    /// Look the question up, semantic cache first, then exact hash. A hit is
    /// returned with the requesting query's id and a forced `cached = true`.
    pub async fn lookup(&self, request: &QueryRequest) -> Option<QueryResponse> {
        if !self.caching_enabled_for(request).await {
            return None;
        }

        if self.semantic_enabled().await {
            if let Some(semantic) = &self.semantic {
                match semantic
                    .lookup(
                        &request.question,
                        SEMANTIC_SIMILARITY_THRESHOLD,
                        SEMANTIC_MAX_RESULTS,
                    )
                    .await
                {
                    Ok(Some(entry)) if entry.expires_at > Utc::now() => {
                        info!("Semantic cache hit for query {}", request.query_id);
                        return Some(rebind_cached_response(entry, request));
                    }
                    Ok(_) => debug!("Semantic cache miss"),
                    Err(e) => warn!("Semantic cache lookup failed, treating as miss: {}", e),
                }
            }
        }

        let key = question_cache_key(&request.question);
        match self.exact.lookup(&key).await {
            Ok(Some(entry)) if entry.expires_at > Utc::now() => {
                info!("Exact cache hit for query {}", request.query_id);
                Some(rebind_cached_response(entry, request))
            }
            Ok(_) => None,
            Err(e) => {
                warn!("Exact cache lookup failed, treating as miss: {}", e);
                None
            }
        }
    }

    /// Write a successful response to each enabled cache independently.
    pub async fn store(&self, request: &QueryRequest, response: &QueryResponse) {
        if !self.caching_enabled_for(request).await {
            return;
        }

        let entry = CachedQueryResult {
            response: response.clone(),
            expires_at: Utc::now() + Duration::hours(CACHE_TTL_HOURS),
        };

        if self.semantic_enabled().await {
            if let Some(semantic) = &self.semantic {
                if let Err(e) = semantic.store(&request.question, entry.clone()).await {
                    warn!("Semantic cache store failed: {}", e);
                }
            }
        }

        let key = question_cache_key(&request.question);
        if let Err(e) = self.exact.store(&key, entry).await {
            warn!("Exact cache store failed: {}", e);
        }
    }
}

fn rebind_cached_response(entry: CachedQueryResult, request: &QueryRequest) -> QueryResponse {
    let mut response = entry.response;
    response.query_id = request.query_id.clone();
    response.cached = true;
    response
}

/// Exact-hash cache backed by a process-local map. Stale entries are dropped
/// on the read that observes their expiry.
pub struct InMemoryExactCache {
    entries: DashMap<String, CachedQueryResult>,
}

impl InMemoryExactCache {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for InMemoryExactCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExactCache for InMemoryExactCache {
    async fn lookup(&self, key: &str) -> Result<Option<CachedQueryResult>, PipelineError> {
        let expired = match self.entries.get(key) {
            Some(entry) if entry.expires_at > Utc::now() => return Ok(Some(entry.clone())),
            Some(_) => true,
            None => return Ok(None),
        };

        if expired {
            self.entries.remove(key);
        }
        Ok(None)
    }

    async fn store(&self, key: &str, entry: CachedQueryResult) -> Result<(), PipelineError> {
        self.entries.insert(key.to_string(), entry);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::StaticSettings;
    use crate::types::QueryOptions;
    use std::collections::HashMap;

    fn settings(caching: bool, semantic: bool) -> Arc<dyn SettingsProvider> {
        let mut flags = HashMap::new();
        flags.insert(SETTING_CACHING_ENABLED.to_string(), caching);
        flags.insert(SETTING_SEMANTIC_CACHE_ENABLED.to_string(), semantic);
        Arc::new(StaticSettings::new(flags))
    }

    fn sample_response(request: &QueryRequest) -> QueryResponse {
        QueryResponse {
            query_id: request.query_id.clone(),
            user_id: request.user_id.clone(),
            question: request.question.clone(),
            sql: "SELECT 1".to_string(),
            result: None,
            confidence: 0.9,
            cached: false,
            success: true,
            error: None,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn normalized_questions_share_a_cache_key() {
        let a = question_cache_key("  Show Total Revenue by Country  ");
        let b = question_cache_key("show total revenue by country");
        assert_eq!(a, b);
        assert_ne!(a, question_cache_key("show total profit by country"));
    }

    #[tokio::test]
    async fn hit_rebinds_query_id_and_forces_cached_flag() {
        let coordinator = CacheCoordinator::new(
            None,
            Arc::new(InMemoryExactCache::new()),
            settings(true, false),
        );

        let first = QueryRequest::new("u1", "show revenue", "s1");
        coordinator.store(&first, &sample_response(&first)).await;

        let second = QueryRequest::new("u1", "Show Revenue", "s2");
        let hit = coordinator.lookup(&second).await.unwrap();
        assert!(hit.cached);
        assert_eq!(hit.query_id, second.query_id);
        assert_eq!(hit.sql, "SELECT 1");
    }

    #[tokio::test]
    async fn admin_flag_off_disables_both_lookup_and_store() {
        let exact = Arc::new(InMemoryExactCache::new());
        let coordinator =
            CacheCoordinator::new(None, Arc::clone(&exact) as Arc<dyn ExactCache>, settings(false, false));

        let request = QueryRequest::new("u1", "show revenue", "s1");
        coordinator.store(&request, &sample_response(&request)).await;
        assert!(exact.is_empty());
        assert!(coordinator.lookup(&request).await.is_none());
    }

    #[tokio::test]
    async fn request_flag_off_disables_caching_for_that_request() {
        let coordinator = CacheCoordinator::new(
            None,
            Arc::new(InMemoryExactCache::new()),
            settings(true, false),
        );

        let request = QueryRequest::new("u1", "show revenue", "s1").with_options(QueryOptions {
            enable_cache: false,
            ..QueryOptions::default()
        });
        coordinator.store(&request, &sample_response(&request)).await;
        assert!(coordinator.lookup(&request).await.is_none());
    }

    struct FailingSemanticCache;

    #[async_trait]
    impl SemanticCache for FailingSemanticCache {
        async fn lookup(
            &self,
            _question: &str,
            _similarity_threshold: f64,
            _max_results: usize,
        ) -> Result<Option<CachedQueryResult>, PipelineError> {
            Err(PipelineError::Cache("vector store unreachable".to_string()))
        }

        async fn store(
            &self,
            _question: &str,
            _entry: CachedQueryResult,
        ) -> Result<(), PipelineError> {
            Err(PipelineError::Cache("vector store unreachable".to_string()))
        }
    }

    struct RecordingSemanticCache {
        entry: CachedQueryResult,
        lookup_args: std::sync::Mutex<Option<(f64, usize)>>,
    }

    #[async_trait]
    impl SemanticCache for RecordingSemanticCache {
        async fn lookup(
            &self,
            _question: &str,
            similarity_threshold: f64,
            max_results: usize,
        ) -> Result<Option<CachedQueryResult>, PipelineError> {
            *self.lookup_args.lock().unwrap() = Some((similarity_threshold, max_results));
            Ok(Some(self.entry.clone()))
        }

        async fn store(
            &self,
            _question: &str,
            _entry: CachedQueryResult,
        ) -> Result<(), PipelineError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn semantic_hit_short_circuits_with_configured_constants() {
        let stored = QueryRequest::new("u1", "show revenue", "s1");
        let semantic = Arc::new(RecordingSemanticCache {
            entry: CachedQueryResult {
                response: sample_response(&stored),
                expires_at: Utc::now() + Duration::hours(1),
            },
            lookup_args: std::sync::Mutex::new(None),
        });
        let coordinator = CacheCoordinator::new(
            Some(Arc::clone(&semantic) as Arc<dyn SemanticCache>),
            Arc::new(InMemoryExactCache::new()),
            settings(true, true),
        );

        let request = QueryRequest::new("u2", "show the revenue", "s2");
        let hit = coordinator.lookup(&request).await.unwrap();

        assert!(hit.cached);
        assert_eq!(hit.query_id, request.query_id);
        assert_eq!(hit.sql, "SELECT 1");
        assert_eq!(
            *semantic.lookup_args.lock().unwrap(),
            Some((SEMANTIC_SIMILARITY_THRESHOLD, SEMANTIC_MAX_RESULTS))
        );
    }

    #[tokio::test]
    async fn expired_semantic_entry_is_a_miss() {
        let stored = QueryRequest::new("u1", "show revenue", "s1");
        let semantic = Arc::new(RecordingSemanticCache {
            entry: CachedQueryResult {
                response: sample_response(&stored),
                expires_at: Utc::now() - Duration::hours(1),
            },
            lookup_args: std::sync::Mutex::new(None),
        });
        let coordinator = CacheCoordinator::new(
            Some(semantic),
            Arc::new(InMemoryExactCache::new()),
            settings(true, true),
        );

        let request = QueryRequest::new("u1", "show revenue", "s1");
        assert!(coordinator.lookup(&request).await.is_none());
    }

    #[tokio::test]
    async fn semantic_tier_is_skipped_when_its_flag_is_off() {
        let stored = QueryRequest::new("u1", "show revenue", "s1");
        let semantic = Arc::new(RecordingSemanticCache {
            entry: CachedQueryResult {
                response: sample_response(&stored),
                expires_at: Utc::now() + Duration::hours(1),
            },
            lookup_args: std::sync::Mutex::new(None),
        });
        let coordinator = CacheCoordinator::new(
            Some(Arc::clone(&semantic) as Arc<dyn SemanticCache>),
            Arc::new(InMemoryExactCache::new()),
            settings(true, false),
        );

        let request = QueryRequest::new("u1", "show revenue", "s1");
        assert!(coordinator.lookup(&request).await.is_none());
        assert!(semantic.lookup_args.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn semantic_failure_degrades_to_exact_lookup() {
        let coordinator = CacheCoordinator::new(
            Some(Arc::new(FailingSemanticCache)),
            Arc::new(InMemoryExactCache::new()),
            settings(true, true),
        );

        let request = QueryRequest::new("u1", "show revenue", "s1");
        coordinator.store(&request, &sample_response(&request)).await;

        // The semantic tier errors on both store and lookup; the exact tier
        // still serves the hit.
        let hit = coordinator.lookup(&request).await.unwrap();
        assert!(hit.cached);
    }

    #[tokio::test]
    async fn expired_exact_entries_are_dropped_on_read() {
        let cache = InMemoryExactCache::new();
        let request = QueryRequest::new("u1", "show revenue", "s1");
        cache
            .store(
                "k",
                CachedQueryResult {
                    response: sample_response(&request),
                    expires_at: Utc::now() - Duration::hours(1),
                },
            )
            .await
            .unwrap();

        assert!(cache.lookup("k").await.unwrap().is_none());
        assert!(cache.is_empty());
    }
}

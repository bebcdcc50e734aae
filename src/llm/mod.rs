pub mod providers;

use crate::config::LlmConfig;
use crate::types::GenerationResult;
use async_trait::async_trait;
use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug)]
pub enum LlmError {
    ConnectionError(String),
    ResponseError(String),
    ConfigError(String),
}

impl fmt::Display for LlmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LlmError::ConnectionError(msg) => write!(f, "LLM connection error: {}", msg),
            LlmError::ResponseError(msg) => write!(f, "LLM response error: {}", msg),
            LlmError::ConfigError(msg) => write!(f, "LLM configuration error: {}", msg),
        }
    }
}

impl Error for LlmError {}

/// One generation attempt. When `prompt_override` is set the provider sends it
/// verbatim instead of assembling its own prompt from question + schema.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub model: String,
    pub question: String,
    pub schema_text: String,
    pub prompt_override: Option<String>,
}

#[async_trait]
pub trait SqlGenerator: Send + Sync {
    async fn generate_sql(&self, request: &GenerationRequest)
        -> Result<GenerationResult, LlmError>;
}

/// Extract SQL from a model response, returning the text plus a confidence
/// reflecting how cleanly it was found.
pub(crate) fn extract_sql(content: &str) -> (String, f64) {
    // Between ```sql and ``` markers
    if let Some(start) = content.find("```sql") {
        if let Some(end) = content.rfind("```") {
            if end > start + 6 {
                let sql = content[start + 6..end].trim();
                debug!("Extracted SQL from sql code block");
                return (sql.to_string(), 0.9);
            }
        }
    }

    // Plain ``` fences without a language specifier
    if let Some(start) = content.find("```") {
        let after = &content[start + 3..];
        if let Some(end) = after.find("```") {
            let sql = after[..end].trim();
            debug!("Extracted SQL from plain code block");
            return (sql.to_string(), 0.8);
        }
    }

    // Scan for a line starting with a SQL keyword and collect to the semicolon
    let sql_keywords = ["SELECT", "WITH", "INSERT", "UPDATE", "DELETE", "CREATE"];
    let lines: Vec<&str> = content.lines().collect();

    for (i, line) in lines.iter().enumerate() {
        let trimmed = line.trim().to_uppercase();
        if sql_keywords.iter().any(|kw| trimmed.starts_with(kw)) {
            let mut sql = line.trim().to_string();

            for next_line in lines.iter().skip(i + 1) {
                let next = next_line.trim();
                if next.starts_with("```") {
                    break;
                }
                sql.push(' ');
                sql.push_str(next);
                if next.ends_with(';') {
                    break;
                }
            }

            debug!("Extracted SQL by line scanning");
            return (sql, 0.6);
        }
    }

    // No structure recognized, return the content as-is with low confidence
    (content.trim().to_string(), 0.3)
}

/// Dispatches generation calls to the configured provider backends, honoring
/// per-request provider and model overrides.
pub struct LlmManager {
    generators: HashMap<String, Arc<dyn SqlGenerator>>,
    default_models: HashMap<String, String>,
    default_provider: String,
}

impl LlmManager {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let mut generators: HashMap<String, Arc<dyn SqlGenerator>> = HashMap::new();
        let mut default_models = HashMap::new();

        for provider in &config.providers {
            let generator: Arc<dyn SqlGenerator> = match provider.backend.as_str() {
                "remote" => Arc::new(providers::remote::RemoteLlmProvider::new(provider)?),
                "ollama" => Arc::new(providers::ollama::OllamaProvider::new(provider)?),
                other => {
                    return Err(LlmError::ConfigError(format!(
                        "Unsupported LLM backend: {}",
                        other
                    )))
                }
            };

            info!(
                "Registered LLM provider '{}' (backend: {}, default model: {})",
                provider.name, provider.backend, provider.model
            );
            generators.insert(provider.name.clone(), generator);
            default_models.insert(provider.name.clone(), provider.model.clone());
        }

        if !generators.contains_key(&config.default_provider) {
            return Err(LlmError::ConfigError(format!(
                "Default provider '{}' is not configured",
                config.default_provider
            )));
        }

        Ok(Self {
            generators,
            default_models,
            default_provider: config.default_provider.clone(),
        })
    }

    /// Build a manager around explicit generators. Used by tests and by
    /// callers wiring their own backends.
    pub fn with_generators(
        generators: HashMap<String, Arc<dyn SqlGenerator>>,
        default_models: HashMap<String, String>,
        default_provider: &str,
    ) -> Self {
        Self {
            generators,
            default_models,
            default_provider: default_provider.to_string(),
        }
    }

    pub fn default_provider(&self) -> &str {
        &self.default_provider
    }

    pub fn has_provider(&self, provider: &str) -> bool {
        self.generators.contains_key(provider)
    }

    pub fn default_model_for(&self, provider: &str) -> Option<String> {
        self.default_models.get(provider).cloned()
    }

    /// Generate SQL through the named provider and model. `None` for either
    /// falls back to the configured defaults.
    pub async fn generate(
        &self,
        provider: Option<&str>,
        model: Option<&str>,
        question: &str,
        schema_text: &str,
        prompt_override: Option<&str>,
    ) -> Result<GenerationResult, LlmError> {
        let provider_name = provider.unwrap_or(&self.default_provider);
        let generator = self.generators.get(provider_name).ok_or_else(|| {
            LlmError::ConfigError(format!("Unknown LLM provider: {}", provider_name))
        })?;

        let model_name = match model {
            Some(m) => m.to_string(),
            None => self
                .default_models
                .get(provider_name)
                .cloned()
                .unwrap_or_default(),
        };

        let request = GenerationRequest {
            model: model_name,
            question: question.to_string(),
            schema_text: schema_text.to_string(),
            prompt_override: prompt_override.map(|p| p.to_string()),
        };

        generator.generate_sql(&request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_fenced_sql_with_high_confidence() {
        let content = "Here you go:\n```sql\nSELECT 1;\n```\n";
        let (sql, confidence) = extract_sql(content);
        assert_eq!(sql, "SELECT 1;");
        assert_eq!(confidence, 0.9);
    }

    #[test]
    fn extracts_bare_statement_by_line_scan() {
        let content =
            "The query is:\nSELECT country, sum(revenue)\nFROM sales\nGROUP BY country;";
        let (sql, confidence) = extract_sql(content);
        assert!(sql.starts_with("SELECT country"));
        assert!(sql.ends_with("GROUP BY country;"));
        assert_eq!(confidence, 0.6);
    }

    #[test]
    fn falls_back_to_raw_content() {
        let (sql, confidence) = extract_sql("no sql here");
        assert_eq!(sql, "no sql here");
        assert_eq!(confidence, 0.3);
    }
}

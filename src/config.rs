use clap::Parser;
use config::{Config, ConfigError, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub connection_string: String,
    pub pool_size: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmProviderConfig {
    pub name: String,
    pub backend: String, // "remote" or "ollama"
    pub model: String,
    pub api_url: Option<String>,
    pub api_key: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    pub default_provider: String,
    pub providers: Vec<LlmProviderConfig>,
}

/// Declared attributes for one selectable model. Observed performance is
/// layered on top of these at runtime.
#[derive(Debug, Deserialize, Clone)]
pub struct ModelEntry {
    pub provider: String,
    pub model: String,
    pub cost: f64,
    pub latency_ms: u64,
    pub accuracy: f64,
    pub max_tokens: u32,
    pub context_window: u32,
    pub quality: String, // "low", "medium", or "high"
    pub streaming: bool,
}

impl Default for ModelEntry {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-3.5-turbo".to_string(),
            cost: 0.002,
            latency_ms: 2000,
            accuracy: 0.85,
            max_tokens: 4096,
            context_window: 16_385,
            quality: "medium".to_string(),
            streaming: true,
        }
    }
}

impl ModelEntry {
    /// Built-in model table used when no models are configured.
    pub fn builtin() -> Vec<ModelEntry> {
        vec![
            ModelEntry {
                provider: "openai".to_string(),
                model: "gpt-4".to_string(),
                cost: 0.03,
                latency_ms: 5000,
                accuracy: 0.95,
                max_tokens: 8192,
                context_window: 8192,
                quality: "high".to_string(),
                streaming: true,
            },
            ModelEntry {
                provider: "openai".to_string(),
                model: "gpt-3.5-turbo".to_string(),
                cost: 0.002,
                latency_ms: 2000,
                accuracy: 0.85,
                max_tokens: 4096,
                context_window: 16_385,
                quality: "medium".to_string(),
                streaming: true,
            },
            ModelEntry {
                provider: "anthropic".to_string(),
                model: "claude-3-5-sonnet".to_string(),
                cost: 0.015,
                latency_ms: 3500,
                accuracy: 0.93,
                max_tokens: 8192,
                context_window: 200_000,
                quality: "high".to_string(),
                streaming: true,
            },
            ModelEntry {
                provider: "ollama".to_string(),
                model: "sqlcoder".to_string(),
                cost: 0.0,
                latency_ms: 8000,
                accuracy: 0.70,
                max_tokens: 4096,
                context_window: 8192,
                quality: "low".to_string(),
                streaming: false,
            },
        ]
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct SelectionConfig {
    #[serde(default)]
    pub models: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    pub enabled: bool,
    pub semantic_enabled: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    #[serde(default)]
    pub selection: SelectionConfig,
    pub cache: CacheConfig,
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Override the LLM provider used for this run
    #[arg(long)]
    pub provider: Option<String>,

    /// Override the model used for this run
    #[arg(long)]
    pub model: Option<String>,

    /// Natural-language question to run through the pipeline
    pub question: String,
}

impl AppConfig {
    pub fn new(args: &CliArgs) -> Result<Self, ConfigError> {
        let mut config_builder = Config::builder();

        // Add configuration from file if specified
        if let Some(config_path) = &args.config {
            config_builder = config_builder.add_source(File::from(config_path.as_path()));
        } else {
            // Check for config in default locations
            let default_locations = vec![
                "config.toml",
                "config/config.toml",
                "/etc/querypilot/config.toml",
            ];

            for location in default_locations {
                if Path::new(location).exists() {
                    config_builder =
                        config_builder.add_source(File::new(location, config::FileFormat::Toml));
                    break;
                }
            }
        }

        let config: AppConfig = config_builder.build()?.try_deserialize()?;
        Ok(config)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                connection_string: "querypilot.db".to_string(),
                pool_size: 5,
            },
            llm: LlmConfig {
                default_provider: "ollama".to_string(),
                providers: vec![LlmProviderConfig {
                    name: "ollama".to_string(),
                    backend: "ollama".to_string(),
                    model: "sqlcoder".to_string(),
                    api_url: None,
                    api_key: None,
                }],
            },
            selection: SelectionConfig::default(),
            cache: CacheConfig {
                enabled: true,
                semantic_enabled: false,
            },
        }
    }
}

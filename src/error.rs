use std::error::Error;
use std::fmt;

/// Failure classes for the query pipeline. Validation and execution failures
/// carry the SQL in play so diagnostics keep the best-known partial result.
#[derive(Debug, Clone)]
pub enum PipelineError {
    Generation(String),
    Validation { message: String, sql: String },
    Execution { message: String, sql: String },
    Cache(String),
    EnhancedContext(String),
    NoSuitableModel(String),
    Cancelled,
}

impl PipelineError {
    /// The SQL that had been produced before the failure, if any.
    pub fn partial_sql(&self) -> Option<&str> {
        match self {
            PipelineError::Validation { sql, .. } | PipelineError::Execution { sql, .. } => {
                Some(sql.as_str())
            }
            _ => None,
        }
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::Generation(msg) => write!(f, "SQL generation failed: {}", msg),
            PipelineError::Validation { message, .. } => {
                write!(f, "SQL validation failed: {}", message)
            }
            PipelineError::Execution { message, .. } => {
                write!(f, "SQL execution failed: {}", message)
            }
            PipelineError::Cache(msg) => write!(f, "cache error: {}", msg),
            PipelineError::EnhancedContext(msg) => {
                write!(f, "enhanced context path failed: {}", msg)
            }
            PipelineError::NoSuitableModel(msg) => write!(f, "no suitable model: {}", msg),
            PipelineError::Cancelled => write!(f, "query was cancelled"),
        }
    }
}

impl Error for PipelineError {}

pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod executor;
pub mod llm;
pub mod orchestrator;
pub mod schema;
pub mod selection;
pub mod traits;
pub mod types;
pub mod util;

pub use error::PipelineError;
pub use orchestrator::QueryOrchestrator;
pub use types::{QueryRequest, QueryResponse};

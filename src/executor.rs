use crate::db::DuckDbConnectionManager;
use crate::error::PipelineError;
use crate::traits::{SqlExecutor, SqlValidator};
use crate::types::ExecutionResult;
use async_trait::async_trait;
use r2d2::Pool;
use std::time::Instant;
use tracing::{debug, error};

/// Executes generated SQL against the target DuckDB database through the
/// shared connection pool. Queries run in blocking tasks to keep DuckDB off
/// the async runtime.
pub struct DuckDbExecutor {
    pool: Pool<DuckDbConnectionManager>,
}

impl DuckDbExecutor {
    pub fn new(pool: Pool<DuckDbConnectionManager>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SqlExecutor for DuckDbExecutor {
    async fn execute(&self, sql: &str) -> Result<ExecutionResult, PipelineError> {
        let pool = self.pool.clone();
        let sql_to_execute = sql.to_string();
        let sql_for_error = sql.to_string();

        let task = tokio::task::spawn_blocking(move || -> Result<ExecutionResult, String> {
            let started = Instant::now();

            let conn = pool.get().map_err(|e| e.to_string())?;
            let mut stmt = conn.prepare(&sql_to_execute).map_err(|e| e.to_string())?;

            let column_count = stmt.column_count();
            let mut column_names = Vec::new();
            for i in 0..column_count {
                if let Ok(name) = stmt.column_name(i) {
                    column_names.push(name.to_string());
                }
            }

            let mut rows_out = Vec::new();
            let mut rows = stmt.query([]).map_err(|e| e.to_string())?;
            while let Some(row) = rows.next().map_err(|e| e.to_string())? {
                let mut object = serde_json::Map::new();
                for (i, name) in column_names.iter().enumerate() {
                    object.insert(name.clone(), column_value(row, i));
                }
                rows_out.push(serde_json::Value::Object(object));
            }

            let row_count = rows_out.len();
            Ok(ExecutionResult {
                rows: rows_out,
                row_count,
                elapsed_ms: started.elapsed().as_millis() as u64,
                success: true,
                error: None,
            })
        });

        match task.await {
            Ok(Ok(result)) => {
                debug!(
                    "Executed SQL in {}ms, {} rows",
                    result.elapsed_ms, result.row_count
                );
                Ok(result)
            }
            Ok(Err(message)) => {
                error!("SQL execution failed: {}", message);
                Err(PipelineError::Execution {
                    message,
                    sql: sql_for_error,
                })
            }
            Err(join_err) => {
                error!("Execution task join error: {}", join_err);
                Err(PipelineError::Execution {
                    message: format!("execution task failed: {}", join_err),
                    sql: sql_for_error,
                })
            }
        }
    }
}

/// Validates SQL by asking DuckDB to plan it. A statement that cannot be
/// explained is rejected, never executed.
#[async_trait]
impl SqlValidator for DuckDbExecutor {
    async fn validate(&self, sql: &str) -> Result<bool, PipelineError> {
        let pool = self.pool.clone();
        let explain_sql = format!("EXPLAIN {}", sql.trim_end_matches(';'));

        let task = tokio::task::spawn_blocking(move || -> Result<bool, String> {
            let conn = pool.get().map_err(|e| e.to_string())?;
            match conn.prepare(&explain_sql) {
                Ok(mut stmt) => match stmt.query([]) {
                    Ok(_) => Ok(true),
                    Err(e) => {
                        debug!("Validation rejected SQL: {}", e);
                        Ok(false)
                    }
                },
                Err(e) => {
                    debug!("Validation rejected SQL: {}", e);
                    Ok(false)
                }
            }
        });

        match task.await {
            Ok(Ok(valid)) => Ok(valid),
            Ok(Err(message)) => Err(PipelineError::Execution {
                message,
                sql: String::new(),
            }),
            Err(join_err) => Err(PipelineError::Execution {
                message: format!("validation task failed: {}", join_err),
                sql: String::new(),
            }),
        }
    }
}

fn column_value(row: &duckdb::Row<'_>, index: usize) -> serde_json::Value {
    match row.get_ref(index) {
        Ok(duckdb::types::ValueRef::Null) => serde_json::Value::Null,
        Ok(duckdb::types::ValueRef::Boolean(v)) => serde_json::Value::Bool(v),
        Ok(duckdb::types::ValueRef::Int(v)) => serde_json::Value::from(v),
        Ok(duckdb::types::ValueRef::BigInt(v)) => serde_json::Value::from(v),
        Ok(duckdb::types::ValueRef::Float(v)) => serde_json::Value::from(v),
        Ok(duckdb::types::ValueRef::Double(v)) => serde_json::Value::from(v),
        Ok(_) => match row.get::<_, String>(index) {
            Ok(v) => serde_json::Value::String(v),
            Err(_) => serde_json::Value::Null,
        },
        Err(_) => serde_json::Value::Null,
    }
}

use crate::db::DuckDbConnectionManager;
use crate::error::PipelineError;
use crate::traits::SchemaProvider;
use crate::types::{ColumnSchema, SchemaSnapshot, TableSchema};
use async_trait::async_trait;
use r2d2::Pool;
use std::collections::HashSet;
use tracing::{debug, error};

/// Builds schema snapshots by introspecting the target DuckDB database and
/// filtering tables down to the ones the question appears to touch.
pub struct DuckDbSchemaProvider {
    pool: Pool<DuckDbConnectionManager>,
}

impl DuckDbSchemaProvider {
    pub fn new(pool: Pool<DuckDbConnectionManager>) -> Self {
        Self { pool }
    }
}

fn introspect(pool: &Pool<DuckDbConnectionManager>) -> Result<Vec<TableSchema>, String> {
    let conn = pool.get().map_err(|e| e.to_string())?;

    // sqlite_master is the most reliable table listing for DuckDB
    let mut tables = Vec::new();
    let mut stmt = conn
        .prepare(
            "SELECT name FROM sqlite_master WHERE type='table' \
             AND name NOT LIKE 'sqlite_%' AND name NOT LIKE 'duck_%' AND name NOT LIKE 'pg_%'",
        )
        .map_err(|e| e.to_string())?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .map_err(|e| e.to_string())?;
    let table_names: Vec<String> = names.filter_map(Result::ok).collect();

    for table_name in &table_names {
        let mut col_stmt = conn
            .prepare(&format!("PRAGMA table_info(\"{}\")", table_name))
            .map_err(|e| e.to_string())?;

        let columns_iter = col_stmt
            .query_map([], |row| {
                Ok(ColumnSchema {
                    name: row.get::<_, String>(1)?,
                    data_type: row.get::<_, String>(2)?,
                    nullable: row.get::<_, i32>(3)? == 0,
                    primary_key: row.get::<_, bool>(5).unwrap_or(false),
                    foreign_key: false,
                })
            })
            .map_err(|e| e.to_string())?;

        let columns: Vec<ColumnSchema> = columns_iter.filter_map(Result::ok).collect();
        if !columns.is_empty() {
            tables.push(TableSchema {
                name: table_name.clone(),
                columns,
            });
        }
    }

    Ok(tables)
}

#[async_trait]
impl SchemaProvider for DuckDbSchemaProvider {
    async fn relevant_schema(&self, question: &str) -> Result<SchemaSnapshot, PipelineError> {
        let pool = self.pool.clone();

        let tables = tokio::task::spawn_blocking(move || introspect(&pool))
            .await
            .map_err(|join_err| PipelineError::Execution {
                message: format!("schema introspection task failed: {}", join_err),
                sql: String::new(),
            })?
            .map_err(|message| {
                error!("Schema introspection failed: {}", message);
                PipelineError::Execution {
                    message,
                    sql: String::new(),
                }
            })?;

        let relevant = filter_relevant(tables, question);
        debug!("Schema snapshot holds {} relevant tables", relevant.len());
        Ok(SchemaSnapshot { tables: relevant })
    }
}

/// Keep tables whose name or column names overlap the question's words. When
/// nothing overlaps, every table is considered relevant.
fn filter_relevant(tables: Vec<TableSchema>, question: &str) -> Vec<TableSchema> {
    let words: HashSet<String> = question
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 2)
        .map(|w| w.trim_end_matches('s').to_string())
        .collect();

    let matched: Vec<TableSchema> = tables
        .iter()
        .filter(|table| {
            let table_token = table.name.to_lowercase();
            let table_token = table_token.trim_end_matches('s');
            if words.contains(table_token) {
                return true;
            }
            table.columns.iter().any(|column| {
                let column_token = column.name.to_lowercase();
                words.contains(column_token.trim_end_matches('s'))
            })
        })
        .cloned()
        .collect();

    if matched.is_empty() {
        tables
    } else {
        matched
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(name: &str, columns: &[&str]) -> TableSchema {
        TableSchema {
            name: name.to_string(),
            columns: columns
                .iter()
                .map(|c| ColumnSchema {
                    name: c.to_string(),
                    data_type: "VARCHAR".to_string(),
                    nullable: true,
                    primary_key: false,
                    foreign_key: false,
                })
                .collect(),
        }
    }

    #[test]
    fn tables_matching_question_words_are_kept() {
        let tables = vec![
            table("orders", &["order_id", "revenue", "country"]),
            table("employees", &["employee_id", "salary"]),
        ];

        let relevant = filter_relevant(tables, "Show total revenue by country");
        assert_eq!(relevant.len(), 1);
        assert_eq!(relevant[0].name, "orders");
    }

    #[test]
    fn no_overlap_keeps_everything() {
        let tables = vec![table("orders", &["a"]), table("employees", &["b"])];
        let relevant = filter_relevant(tables, "what happened yesterday");
        assert_eq!(relevant.len(), 2);
    }
}

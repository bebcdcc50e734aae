use crate::config::LlmProviderConfig;
use crate::llm::{extract_sql, GenerationRequest, LlmError, SqlGenerator};
use crate::types::{clamp_score, GenerationResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, error, info};

pub struct OllamaProvider {
    client: reqwest::Client,
    api_url: String,
}

#[derive(Serialize, Debug)]
struct OllamaRequest {
    model: String,
    prompt: String,
    temperature: f32,
    stream: bool,
}

#[derive(Deserialize, Debug)]
struct OllamaResponse {
    response: String,
    #[serde(flatten)]
    _extra: std::collections::HashMap<String, serde_json::Value>,
}

impl OllamaProvider {
    pub fn new(config: &LlmProviderConfig) -> Result<Self, LlmError> {
        let api_url = config
            .api_url
            .clone()
            .unwrap_or_else(|| "http://localhost:11434/api/generate".to_string());

        let client = reqwest::Client::new();

        Ok(Self { client, api_url })
    }

    fn prepare_prompt(&self, question: &str, schema: &str) -> String {
        format!(
            r#"
### Instructions:
Your task is to convert a question into a SQL query, given a database schema.
Adhere to these rules:
- **Be careful with column names - they are case sensitive**
- **Use the exact spelling of column names as provided in the schema**
- **Deliberately go through the question and database schema word by word** to appropriately answer the question
- **Use Table Aliases** to prevent ambiguity. For example, `SELECT table1.col1, table2.col1 FROM table1 JOIN table2 ON table1.id = table2.id`.
- When creating a ratio, always cast the numerator as float

### Input:
Generate a SQL query that answers the question `{}`.
This query will run on a database with the following tables and columns:

{}

### Expected SQL Format:
- Use lowercase for SQL keywords (SELECT, FROM, WHERE, etc.)
- Reference column names exactly as shown in the schema
- Make sure to use double quotes around column names with spaces or special characters
- End your query with a semicolon

### Response:
Based on your instructions, here is the SQL query I have generated to answer the question `{}`:
```sql
"#,
            question, schema, question
        )
    }
}

#[async_trait]
impl SqlGenerator for OllamaProvider {
    async fn generate_sql(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResult, LlmError> {
        let prompt = match &request.prompt_override {
            Some(p) => p.clone(),
            None => self.prepare_prompt(&request.question, &request.schema_text),
        };

        info!("Sending request to Ollama with model: {}", request.model);
        debug!("API URL: {}", self.api_url);

        let started = Instant::now();
        let body = OllamaRequest {
            model: request.model.clone(),
            prompt: prompt.clone(),
            temperature: 0.1,
            stream: false,
        };

        let response = self
            .client
            .post(&self.api_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::ConnectionError(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_body = match response.text().await {
                Ok(body) => format!(" - Response body: {}", body),
                Err(_) => String::new(),
            };

            error!("Ollama API responded with status code: {}{}", status, error_body);
            return Err(LlmError::ResponseError(format!(
                "Ollama API responded with status code: {}{}",
                status, error_body
            )));
        }

        let response_text = response
            .text()
            .await
            .map_err(|e| LlmError::ResponseError(format!("Failed to read response body: {}", e)))?;

        let ollama_response = match serde_json::from_str::<OllamaResponse>(&response_text) {
            Ok(resp) => resp,
            Err(e) => {
                error!(
                    "Failed to parse Ollama response: {} - Response was: {}",
                    e, response_text
                );
                return Err(LlmError::ResponseError(format!(
                    "Failed to parse Ollama response: {}",
                    e
                )));
            }
        };

        let (sql, confidence) = extract_sql(&ollama_response.response);

        if sql.trim().is_empty() {
            return Err(LlmError::ResponseError(
                "Failed to extract valid SQL from response".to_string(),
            ));
        }

        Ok(GenerationResult {
            sql,
            success: true,
            confidence: clamp_score(confidence),
            error: None,
            prompt_metadata: Some(format!(
                "ollama model={} prompt_chars={}",
                request.model,
                prompt.len()
            )),
            elapsed_ms: started.elapsed().as_millis() as u64,
        })
    }
}

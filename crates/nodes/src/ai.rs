//! The `ai` step handler (spec.md §4.3) — a chat-completion client against
//! an OpenAI-compatible local inference endpoint (`LM_STUDIO_URL`).

use std::time::Duration;

use async_trait::async_trait;
use db::models::ExecutionContext;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::instrument;

use crate::error::{classify_error, ClassifiedError, ErrorCategory};
use crate::traits::StepHandler;

const AI_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AiConfig {
    #[serde(default = "default_model")]
    model: String,
    prompt: String,
    #[serde(default)]
    system_prompt: Option<String>,
    #[serde(default)]
    max_tokens: Option<u32>,
    #[serde(default)]
    temperature: Option<f32>,
    output_key: String,
}

fn default_model() -> String {
    "default".to_string()
}

pub struct AiHandler {
    client: reqwest::Client,
    endpoint: String,
}

impl AiHandler {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl StepHandler for AiHandler {
    #[instrument(skip(self, resolved_config, _context))]
    async fn execute(&self, resolved_config: &Value, _context: &ExecutionContext) -> Result<Value, ClassifiedError> {
        let config: AiConfig = serde_json::from_value(resolved_config.clone())
            .map_err(|e| ClassifiedError::new("INVALID_AI_CONFIG", e.to_string(), ErrorCategory::Validation))?;

        let mut messages = Vec::new();
        if let Some(system) = &config.system_prompt {
            messages.push(json!({ "role": "system", "content": system }));
        }
        messages.push(json!({ "role": "user", "content": config.prompt }));

        let mut payload = json!({
            "model": config.model,
            "messages": messages,
        });
        if let Some(max_tokens) = config.max_tokens {
            payload["max_tokens"] = json!(max_tokens);
        }
        if let Some(temperature) = config.temperature {
            payload["temperature"] = json!(temperature);
        }

        let url = format!("{}/v1/chat/completions", self.endpoint.trim_end_matches('/'));

        let response = self
            .client
            .post(&url)
            .timeout(AI_TIMEOUT)
            .json(&payload)
            .send()
            .await
            .map_err(|e| classify_ai_transport_error(&e))?;

        let status = response.status().as_u16();
        let body: Value = response.json().await.unwrap_or(Value::Null);

        if !(200..300).contains(&status) {
            return Err(crate::error::classify_http_error(status, body));
        }

        let choices = body["choices"].as_array().cloned().unwrap_or_default();
        if choices.is_empty() {
            return Err(ClassifiedError::new(
                "AI_NO_RESPONSE",
                "completion returned zero choices",
                ErrorCategory::Transient,
            ));
        }

        let content = choices[0]["message"]["content"].as_str().unwrap_or("").to_string();
        let usage = body.get("usage").cloned().unwrap_or(Value::Null);

        Ok(json!({ config.output_key: content, "_meta": { "usage": usage } }))
    }
}

fn classify_ai_transport_error(err: &reqwest::Error) -> ClassifiedError {
    if err.is_connect() {
        return ClassifiedError::new("AI_UNAVAILABLE", err.to_string(), ErrorCategory::Transient);
    }
    if err.is_timeout() {
        return ClassifiedError::new("AI_TIMEOUT", "AI request exceeded its deadline", ErrorCategory::Transient);
    }
    classify_error(&err.to_string(), None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use db::models::TriggerData;

    fn ctx() -> ExecutionContext {
        ExecutionContext::new(TriggerData {
            method: "POST".into(),
            headers: Default::default(),
            body: Value::Null,
            query: Default::default(),
            received_at: chrono::Utc::now(),
            source_ip: None,
        })
    }

    #[tokio::test]
    async fn successful_completion_returns_content_and_usage() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"choices":[{"message":{"content":"hi there"}}],"usage":{"total_tokens":12}}"#)
            .create_async()
            .await;

        let handler = AiHandler::new(server.url());
        let config = json!({ "prompt": "say hi", "outputKey": "reply" });

        let output = handler.execute(&config, &ctx()).await.unwrap();
        assert_eq!(output["reply"], "hi there");
        assert_eq!(output["_meta"]["usage"]["total_tokens"], 12);
    }

    #[tokio::test]
    async fn zero_choices_is_transient_no_response_error() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"choices":[]}"#)
            .create_async()
            .await;

        let handler = AiHandler::new(server.url());
        let config = json!({ "prompt": "say hi", "outputKey": "reply" });

        let err = handler.execute(&config, &ctx()).await.unwrap_err();
        assert!(err.retryable());
        assert_eq!(err.code, "AI_NO_RESPONSE");
    }

    #[tokio::test]
    async fn connection_refused_is_transient_ai_unavailable() {
        // Nothing is listening on this port.
        let handler = AiHandler::new("http://127.0.0.1:1");
        let config = json!({ "prompt": "say hi", "outputKey": "reply" });

        let err = handler.execute(&config, &ctx()).await.unwrap_err();
        assert!(err.retryable());
        assert_eq!(err.code, "AI_UNAVAILABLE");
    }
}

//! The `http` step handler (spec.md §4.3).

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use db::models::ExecutionContext;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::instrument;

use crate::error::{classify_error, classify_http_error, ClassifiedError};
use crate::traits::StepHandler;

const DEFAULT_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HttpConfig {
    method: String,
    url: String,
    #[serde(default)]
    headers: HashMap<String, String>,
    #[serde(default)]
    body: Option<Value>,
    #[serde(default)]
    timeout_ms: Option<u64>,
}

pub struct HttpHandler {
    client: reqwest::Client,
}

impl Default for HttpHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpHandler {
    pub fn new() -> Self {
        Self { client: reqwest::Client::new() }
    }
}

#[async_trait]
impl StepHandler for HttpHandler {
    #[instrument(skip(self, resolved_config, _context), fields(url))]
    async fn execute(&self, resolved_config: &Value, _context: &ExecutionContext) -> Result<Value, ClassifiedError> {
        let config: HttpConfig = serde_json::from_value(resolved_config.clone())
            .map_err(|e| ClassifiedError::new("INVALID_HTTP_CONFIG", e.to_string(), crate::error::ErrorCategory::Validation))?;

        tracing::Span::current().record("url", config.url.as_str());

        let method: reqwest::Method = config.method.parse().map_err(|_| {
            ClassifiedError::new(
                "INVALID_HTTP_METHOD",
                format!("unsupported HTTP method `{}`", config.method),
                crate::error::ErrorCategory::Validation,
            )
        })?;

        let mut header_map = reqwest::header::HeaderMap::new();
        header_map.insert(reqwest::header::CONTENT_TYPE, reqwest::header::HeaderValue::from_static("application/json"));
        for (k, v) in &config.headers {
            let name = reqwest::header::HeaderName::from_bytes(k.as_bytes()).map_err(|e| {
                ClassifiedError::new("INVALID_HTTP_CONFIG", format!("invalid header name `{k}`: {e}"), crate::error::ErrorCategory::Validation)
            })?;
            let value = reqwest::header::HeaderValue::from_str(v).map_err(|e| {
                ClassifiedError::new("INVALID_HTTP_CONFIG", format!("invalid header value for `{k}`: {e}"), crate::error::ErrorCategory::Validation)
            })?;
            header_map.insert(name, value);
        }

        let mut builder = self
            .client
            .request(method.clone(), &config.url)
            .timeout(Duration::from_millis(config.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS)))
            .headers(header_map);

        if method != reqwest::Method::GET {
            if let Some(body) = &config.body {
                builder = builder.json(body);
            }
        }

        let response = builder.send().await.map_err(|e| classify_reqwest_error(&e))?;

        let status = response.status().as_u16();
        let is_json = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.contains("application/json"))
            .unwrap_or(false);

        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), v.to_string())))
            .collect();

        let body = if is_json {
            response.json::<Value>().await.unwrap_or(Value::Null)
        } else {
            response.text().await.map(Value::String).unwrap_or(Value::Null)
        };

        if !(200..300).contains(&status) {
            return Err(classify_http_error(status, body));
        }

        Ok(json!({ "status": status, "headers": headers, "body": body }))
    }
}

fn classify_reqwest_error(err: &reqwest::Error) -> ClassifiedError {
    if err.is_timeout() {
        return classify_error("request timeout", Some("TimeoutError"));
    }
    if err.is_connect() {
        return classify_error(&format!("ECONNREFUSED: {err}"), None);
    }
    classify_error(&err.to_string(), None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_request_returns_parsed_json_body() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/echo")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"value":7}"#)
            .create_async()
            .await;

        let handler = HttpHandler::new();
        let config = json!({ "method": "GET", "url": format!("{}/echo", server.url()) });
        let ctx = ExecutionContext::new(sample_trigger());

        let output = handler.execute(&config, &ctx).await.unwrap();
        assert_eq!(output["status"], 200);
        assert_eq!(output["body"]["value"], 7);
    }

    #[tokio::test]
    async fn non_ok_response_is_classified_as_transient_for_5xx() {
        let mut server = mockito::Server::new_async().await;
        let _m = server.mock("GET", "/boom").with_status(500).create_async().await;

        let handler = HttpHandler::new();
        let config = json!({ "method": "GET", "url": format!("{}/boom", server.url()) });
        let ctx = ExecutionContext::new(sample_trigger());

        let err = handler.execute(&config, &ctx).await.unwrap_err();
        assert!(err.retryable());
        assert_eq!(err.code, "HTTP_500");
    }

    #[tokio::test]
    async fn not_found_response_is_non_retryable() {
        let mut server = mockito::Server::new_async().await;
        let _m = server.mock("GET", "/missing").with_status(404).create_async().await;

        let handler = HttpHandler::new();
        let config = json!({ "method": "GET", "url": format!("{}/missing", server.url()) });
        let ctx = ExecutionContext::new(sample_trigger());

        let err = handler.execute(&config, &ctx).await.unwrap_err();
        assert!(!err.retryable());
        assert_eq!(err.code, "HTTP_404");
    }

    #[tokio::test]
    async fn post_sends_json_body() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/items")
            .match_body(mockito::Matcher::Json(json!({"name": "widget"})))
            .with_status(201)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id":1}"#)
            .create_async()
            .await;

        let handler = HttpHandler::new();
        let config = json!({
            "method": "POST",
            "url": format!("{}/items", server.url()),
            "body": {"name": "widget"},
        });
        let ctx = ExecutionContext::new(sample_trigger());

        let output = handler.execute(&config, &ctx).await.unwrap();
        assert_eq!(output["status"], 201);
    }

    fn sample_trigger() -> db::models::TriggerData {
        db::models::TriggerData {
            method: "POST".into(),
            headers: Default::default(),
            body: Value::Null,
            query: Default::default(),
            received_at: chrono::Utc::now(),
            source_ip: None,
        }
    }
}

//! Webhook admission (spec.md §4.6): turns an inbound `POST /webhooks/:slug`
//! into a `StartRun` message, after a secret check and an idempotency check.

use std::collections::BTreeMap;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use super::AppState;
use db::models::TriggerData;
use queue::{Message, QueueName};

type HmacSha256 = Hmac<Sha256>;

fn err(status: StatusCode, code: &str, message: impl Into<String>) -> (StatusCode, Json<Value>) {
    (status, Json(json!({"error": code, "message": message.into()})))
}

fn signature_valid(secret: &str, raw_body: &[u8], header_value: &str) -> bool {
    let Some(hex_sig) = header_value.strip_prefix("sha256=") else {
        return false;
    };
    let Ok(given) = hex::decode(hex_sig) else {
        return false;
    };

    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(raw_body);
    let expected = mac.finalize().into_bytes();

    expected.ct_eq(&given).into()
}

fn headers_to_map(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .iter()
        .map(|(name, value)| (name.as_str().to_string(), value.to_str().unwrap_or("").to_string()))
        .collect()
}

/// `POST /webhooks/:slug`
pub async fn handle_webhook(
    Path(slug): Path<String>,
    State(state): State<AppState>,
    Query(query): Query<BTreeMap<String, String>>,
    headers: HeaderMap,
    raw_body: Bytes,
) -> Result<(StatusCode, Json<Value>), (StatusCode, Json<Value>)> {
    let workflow = db::repository::workflows::find_by_slug(&state.pool, &slug)
        .await
        .map_err(|e| err(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", e.to_string()))?
        .ok_or_else(|| err(StatusCode::NOT_FOUND, "WORKFLOW_NOT_FOUND", "no workflow matches this webhook path"))?;

    if !workflow.enabled {
        return Err(err(StatusCode::BAD_REQUEST, "WORKFLOW_DISABLED", "workflow is disabled"));
    }

    if let Some(secret) = &workflow.webhook_secret {
        let signature = headers
            .get("x-webhook-signature")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| err(StatusCode::UNAUTHORIZED, "MISSING_SIGNATURE", "X-Webhook-Signature header is required"))?;

        if !signature_valid(secret, &raw_body, signature) {
            return Err(err(StatusCode::UNAUTHORIZED, "BAD_SIGNATURE", "webhook signature does not match"));
        }
    }

    let idempotency_key = headers.get("x-idempotency-key").and_then(|v| v.to_str().ok()).map(str::to_string);

    if let Some(key) = &idempotency_key {
        if let Some(existing_run_id) = db::repository::idempotency::find_active(&state.pool, key)
            .await
            .map_err(|e| err(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", e.to_string()))?
        {
            let run = db::repository::runs::get_run(&state.pool, existing_run_id)
                .await
                .map_err(|e| err(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", e.to_string()))?;

            return Ok((
                StatusCode::OK,
                Json(json!({
                    "runId": run.id,
                    "status": run.status,
                    "message": "Duplicate request",
                })),
            ));
        }
    }

    let body: Value = serde_json::from_slice(&raw_body).unwrap_or(Value::Null);
    let source_ip = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()).map(str::to_string);

    let trigger_data = TriggerData {
        method: "POST".to_string(),
        headers: headers_to_map(&headers),
        body,
        query,
        received_at: Utc::now(),
        source_ip,
    };

    let run = db::repository::runs::create_run(&state.pool, workflow.id, trigger_data)
        .await
        .map_err(|e| err(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", e.to_string()))?;

    let winning_run_id = if let Some(key) = &idempotency_key {
        db::repository::idempotency::bind(&state.pool, key, run.id)
            .await
            .map_err(|e| err(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", e.to_string()))?
    } else {
        run.id
    };

    if winning_run_id != run.id {
        let winner = db::repository::runs::get_run(&state.pool, winning_run_id)
            .await
            .map_err(|e| err(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", e.to_string()))?;

        return Ok((
            StatusCode::OK,
            Json(json!({
                "runId": winner.id,
                "status": winner.status,
                "message": "Duplicate request",
            })),
        ));
    }

    state
        .queue
        .enqueue(QueueName::Execute, &Message::StartRun { run_id: run.id, workflow_id: workflow.id }, 0)
        .await
        .map_err(|e| err(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", e.to_string()))?;

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "runId": run.id,
            "status": run.status,
            "workflowId": workflow.id,
        })),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_accepts_matching_hmac() {
        let mut mac = HmacSha256::new_from_slice(b"topsecret").unwrap();
        mac.update(b"hello world");
        let digest = hex::encode(mac.finalize().into_bytes());
        let header = format!("sha256={digest}");

        assert!(signature_valid("topsecret", b"hello world", &header));
    }

    #[test]
    fn signature_rejects_wrong_secret() {
        let mut mac = HmacSha256::new_from_slice(b"topsecret").unwrap();
        mac.update(b"hello world");
        let digest = hex::encode(mac.finalize().into_bytes());
        let header = format!("sha256={digest}");

        assert!(!signature_valid("othersecret", b"hello world", &header));
    }

    #[test]
    fn signature_rejects_missing_prefix() {
        assert!(!signature_valid("topsecret", b"hello world", "deadbeef"));
    }

    #[test]
    fn signature_rejects_malformed_hex() {
        assert!(!signature_valid("topsecret", b"hello world", "sha256=not-hex"));
    }
}

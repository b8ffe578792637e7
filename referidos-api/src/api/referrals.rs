//! Public referral endpoints
//!
//! `POST /api/referrals/create` carries two operations: a referral
//! submission, or `{ "action": "claim", "accessToken": ... }`.

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use tracing::warn;

use crate::api::auth::bearer_token;
use crate::error::{ApiError, ApiResult};
use crate::services::{claim, portal, submission};
use crate::AppState;

pub const MSG_UNEXPECTED: &str = "Error inesperado.";

fn parse_body(body: &Bytes) -> ApiResult<Value> {
    serde_json::from_slice(body).map_err(|e| {
        warn!("Unreadable request body: {}", e);
        ApiError::internal(MSG_UNEXPECTED)
    })
}

async fn handle_create(state: &AppState, body: Bytes) -> ApiResult<Value> {
    let value = parse_body(&body)?;

    if value.get("action").and_then(Value::as_str) == Some("claim") {
        let claimed = claim::claim_referrals(state, value.get("accessToken")).await?;
        return Ok(json!({ "ok": true, "claimed": claimed }));
    }

    let request: submission::SubmissionRequest = serde_json::from_value(value).map_err(|e| {
        warn!("Submission body is not an object: {}", e);
        ApiError::internal(MSG_UNEXPECTED)
    })?;

    let outcome = submission::submit_referral(state, request).await?;
    Ok(json!({
        "ok": true,
        "email_sent": outcome.notifications.email_sent,
        "internal_email_sent": outcome.notifications.internal_email_sent,
    }))
}

/// POST /api/referrals/create
pub async fn create_referral(State(state): State<AppState>, body: Bytes) -> Response {
    match handle_create(&state, body).await {
        Ok(payload) => Json(payload).into_response(),
        Err(e) => e.into_response(),
    }
}

/// GET /api/referrals/mine
pub async fn my_referrals(State(state): State<AppState>, headers: HeaderMap) -> Response {
    match portal::my_referrals(&state, bearer_token(&headers)).await {
        Ok(data) => Json(json!({ "ok": true, "data": data })).into_response(),
        Err(e) => e.into_response(),
    }
}

//! Referral claim operation
//!
//! Attaches referrals created anonymously (by referrer email) to the signed-in
//! identity with that email. Running it again finds nothing left to claim.

use serde_json::Value;
use tracing::{error, info};

use crate::db::referrals::claim_for_user;
use crate::error::{ApiError, ApiResult};
use crate::identity::{resolve_user, AuthUser};
use crate::AppState;

pub const MSG_TOKEN_REQUIRED: &str = "Access token requerido.";
pub const MSG_INVALID_SESSION: &str = "Sesión inválida.";
pub const MSG_NO_EMAIL: &str = "Tu usuario no tiene email.";
pub const MSG_CLAIM_FAILED: &str = "No se pudo asociar tus referidos.";

/// Claim for an already resolved identity. Returns the number of rows updated.
pub async fn claim_for_identity(state: &AppState, user: &AuthUser) -> ApiResult<u64> {
    let email = user
        .email
        .as_deref()
        .filter(|e| !e.is_empty())
        .ok_or_else(|| ApiError::validation(MSG_NO_EMAIL))?;

    let claimed = claim_for_user(&state.db, &user.id, email).await.map_err(|e| {
        error!(user_id = %user.id, "Claim update failed: {}", e);
        ApiError::internal(MSG_CLAIM_FAILED)
    })?;

    if claimed > 0 {
        info!(user_id = %user.id, claimed, "Anonymous referrals claimed");
    }
    Ok(claimed)
}

/// Claim using the `accessToken` from a request body
pub async fn claim_referrals(state: &AppState, access_token: Option<&Value>) -> ApiResult<u64> {
    let token = access_token
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::validation(MSG_TOKEN_REQUIRED))?;

    let user = resolve_user(state.identity.as_ref(), token)
        .await
        .ok_or_else(|| ApiError::Unauthorized(MSG_INVALID_SESSION.to_string()))?;

    claim_for_identity(state, &user).await
}

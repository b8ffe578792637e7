//! Referrer portal: the signed-in referrer's own referrals

use referidos_common::Referral;
use tracing::{error, warn};

use crate::db::referrals::list_by_user;
use crate::error::{ApiError, ApiResult};
use crate::identity::resolve_user;
use crate::services::claim::{claim_for_identity, MSG_INVALID_SESSION};
use crate::AppState;

pub const MSG_LOAD_FAILED: &str = "No pudimos cargar tus referidos.";

/// Claim anonymous referrals (best-effort), then list the caller's referrals
pub async fn my_referrals(state: &AppState, bearer: Option<&str>) -> ApiResult<Vec<Referral>> {
    let token = bearer
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::Unauthorized(MSG_INVALID_SESSION.to_string()))?;

    let user = resolve_user(state.identity.as_ref(), token)
        .await
        .ok_or_else(|| ApiError::Unauthorized(MSG_INVALID_SESSION.to_string()))?;

    if let Err(e) = claim_for_identity(state, &user).await {
        warn!(user_id = %user.id, "Claim before listing skipped: {}", e);
    }

    list_by_user(&state.db, &user.id).await.map_err(|e| {
        error!(user_id = %user.id, "Portal listing failed: {}", e);
        ApiError::internal(MSG_LOAD_FAILED)
    })
}

//! Admin query and mutation pipelines
//!
//! Both start with the same gate: a bearer token that resolves to an identity
//! whose profile role is `admin`.

use referidos_common::{AdminReferral, Referral, ReferralStatus, ReferrerProfile};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::SqlitePool;
use std::collections::{BTreeSet, HashMap};
use tracing::{error, info};

use crate::db::profiles::{get_profile, profiles_by_ids};
use crate::db::referrals::{self, ReferralFilter};
use crate::error::{ApiError, ApiResult};
use crate::identity::{resolve_user, AuthUser};
use crate::pagination::PageRequest;
use crate::AppState;

pub const MSG_UNAUTHORIZED: &str = "No autorizado.";
pub const MSG_PERMISSION_CHECK_FAILED: &str = "Error validando permisos.";
pub const MSG_NOT_ADMIN: &str = "Sin permisos de admin.";
pub const MSG_LIST_FAILED: &str = "Error cargando referidos.";
pub const MSG_ID_REQUIRED: &str = "ID requerido.";
pub const MSG_INVALID_STATUS: &str = "Estado inválido.";
pub const MSG_UPDATE_FAILED: &str = "No pudimos actualizar el estado.";

/// One page of the admin listing
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReferralPage {
    pub data: Vec<AdminReferral>,
    /// Rows matching the filter, ignoring pagination
    pub total: i64,
}

/// Status change request body
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatusUpdate {
    pub id: Option<Value>,
    pub status: Option<Value>,
}

/// Resolve the bearer token and require the admin role
pub async fn require_admin(state: &AppState, bearer: Option<&str>) -> ApiResult<AuthUser> {
    let unauthorized = || ApiError::Unauthorized(MSG_UNAUTHORIZED.to_string());

    let token = bearer.filter(|t| !t.is_empty()).ok_or_else(unauthorized)?;
    let user = resolve_user(state.identity.as_ref(), token)
        .await
        .ok_or_else(unauthorized)?;

    let profile = get_profile(&state.db, &user.id).await.map_err(|e| {
        error!(user_id = %user.id, "Profile lookup failed: {}", e);
        ApiError::internal(MSG_PERMISSION_CHECK_FAILED)
    })?;

    match profile {
        Some(p) if p.is_admin() => Ok(user),
        _ => {
            info!(user_id = %user.id, "Admin access denied");
            Err(ApiError::Forbidden(MSG_NOT_ADMIN.to_string()))
        }
    }
}

/// Attach referrer profiles with a second query keyed by the page's user ids
async fn enrich(pool: &SqlitePool, rows: Vec<Referral>) -> Result<Vec<AdminReferral>, sqlx::Error> {
    let ids: Vec<String> = rows
        .iter()
        .filter_map(|r| r.referrer_user_id.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let by_id: HashMap<String, ReferrerProfile> = profiles_by_ids(pool, &ids)
        .await?
        .iter()
        .map(|p| (p.id.clone(), ReferrerProfile::from(p)))
        .collect();

    Ok(rows
        .into_iter()
        .map(|referral| {
            let referrer_profile = referral
                .referrer_user_id
                .as_ref()
                .and_then(|id| by_id.get(id).cloned());
            AdminReferral {
                referral,
                referrer_profile,
            }
        })
        .collect())
}

/// Count, fetch and enrich one page. `limit` is not clamped here.
pub async fn fetch_page(
    pool: &SqlitePool,
    filter: &ReferralFilter,
    limit: i64,
    offset: i64,
) -> Result<ReferralPage, sqlx::Error> {
    let total = referrals::count_referrals(pool, filter).await?;
    let rows = referrals::list_referrals(pool, filter, limit, offset).await?;
    let data = enrich(pool, rows).await?;
    Ok(ReferralPage { data, total })
}

/// Admin listing
pub async fn list_referrals(
    state: &AppState,
    bearer: Option<&str>,
    filter: &ReferralFilter,
    page: PageRequest,
) -> ApiResult<ReferralPage> {
    require_admin(state, bearer).await?;

    fetch_page(&state.db, filter, page.limit, page.offset)
        .await
        .map_err(|e| {
            error!("Admin listing failed: {}", e);
            ApiError::internal(MSG_LIST_FAILED)
        })
}

fn trimmed_string(value: &Option<Value>) -> String {
    match value {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

/// Admin status change. Last writer wins.
pub async fn update_status(
    state: &AppState,
    bearer: Option<&str>,
    update: StatusUpdate,
) -> ApiResult<Referral> {
    let admin = require_admin(state, bearer).await?;

    let id = trimmed_string(&update.id);
    if id.is_empty() {
        return Err(ApiError::validation(MSG_ID_REQUIRED));
    }
    let status = ReferralStatus::parse_admin_settable(&trimmed_string(&update.status))
        .ok_or_else(|| ApiError::validation(MSG_INVALID_STATUS))?;

    match referrals::update_status(&state.db, &id, status).await {
        Ok(Some(referral)) => {
            info!(referral_id = %referral.id, status = %status, admin = %admin.id, "Referral status updated");
            Ok(referral)
        }
        Ok(None) => {
            info!(referral_id = %id, "Status update for unknown referral");
            Err(ApiError::internal(MSG_UPDATE_FAILED))
        }
        Err(e) => {
            error!(referral_id = %id, "Status update failed: {}", e);
            Err(ApiError::internal(MSG_UPDATE_FAILED))
        }
    }
}

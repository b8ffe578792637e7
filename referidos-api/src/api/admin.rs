//! Admin endpoints: listing, status change and CSV export

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header, HeaderMap},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::api::auth::bearer_token;
use crate::db::referrals::ReferralFilter;
use crate::export;
use crate::pagination::PageRequest;
use crate::services::admin::{self, StatusUpdate};
use crate::AppState;

/// Query string for the listing and export
///
/// Read from raw key/value pairs so that repeated keys or bad numbers fall
/// back to defaults instead of rejecting the request. The first occurrence
/// of a key wins.
#[derive(Debug, Default, PartialEq)]
pub struct ListQuery {
    pub q: Option<String>,
    pub status: Option<String>,
    pub limit: Option<String>,
    pub offset: Option<String>,
}

/// Raw query pairs; an undecodable query string reads as empty
type QueryPairs = Option<Query<Vec<(String, String)>>>;

impl ListQuery {
    fn from_pairs(pairs: QueryPairs) -> Self {
        let mut query = ListQuery::default();
        for (key, value) in pairs.map(|Query(p)| p).unwrap_or_default() {
            let slot = match key.as_str() {
                "q" => &mut query.q,
                "status" => &mut query.status,
                "limit" => &mut query.limit,
                "offset" => &mut query.offset,
                _ => continue,
            };
            slot.get_or_insert(value);
        }
        query
    }

    fn filter(&self) -> ReferralFilter {
        ReferralFilter::new(self.q.as_deref(), self.status.as_deref())
    }
}

/// GET /api/admin/referrals/list?q=&status=&limit=&offset=
pub async fn list_referrals(
    State(state): State<AppState>,
    headers: HeaderMap,
    pairs: QueryPairs,
) -> Response {
    let query = ListQuery::from_pairs(pairs);
    let page = PageRequest::from_query(query.limit.as_deref(), query.offset.as_deref());
    match admin::list_referrals(&state, bearer_token(&headers), &query.filter(), page).await {
        Ok(page) => Json(json!({ "ok": true, "data": page.data, "total": page.total })).into_response(),
        Err(e) => e.into_response(),
    }
}

/// PATCH /api/admin/referrals/update-status
///
/// An unreadable body is treated as empty, so it fails on the id check.
pub async fn update_referral_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let update: StatusUpdate = serde_json::from_slice(&body).unwrap_or_default();
    match admin::update_status(&state, bearer_token(&headers), update).await {
        Ok(referral) => Json(json!({ "ok": true, "data": referral })).into_response(),
        Err(e) => e.into_response(),
    }
}

/// GET /api/admin/referrals/export?q=&status=
pub async fn export_referrals(
    State(state): State<AppState>,
    headers: HeaderMap,
    pairs: QueryPairs,
) -> Response {
    let query = ListQuery::from_pairs(pairs);
    match export::export_referrals(&state, bearer_token(&headers), &query.filter()).await {
        Ok(csv) => (
            [
                (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{}\"", csv.filename),
                ),
            ],
            csv.content,
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

//! referidos-api library - referral program HTTP service
//!
//! Public submission and claim endpoints, the referrer portal listing and
//! the admin listing / status / export endpoints.

use axum::Router;
use referidos_common::config::EmailSettings;
use referidos_common::time::{Clock, SystemClock};
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod db;
pub mod error;
pub mod export;
pub mod identity;
pub mod mailer;
pub mod notifications;
pub mod pagination;
pub mod services;

use identity::IdentityProvider;
use mailer::Mailer;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Resolves access tokens to identities
    pub identity: Arc<dyn IdentityProvider>,
    /// Transactional email sender
    pub mailer: Arc<dyn Mailer>,
    /// Sender address and internal recipient, loaded once at startup
    pub email: EmailSettings,
    /// Time source for cooldown windows and export stamps
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    pub fn new(
        db: SqlitePool,
        identity: Arc<dyn IdentityProvider>,
        mailer: Arc<dyn Mailer>,
        email: EmailSettings,
    ) -> Self {
        Self {
            db,
            identity,
            mailer,
            email,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the time source
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::{get, patch, post};

    let referrals = Router::new()
        .route("/api/referrals/create", post(api::create_referral))
        .route("/api/referrals/mine", get(api::my_referrals));

    let admin = Router::new()
        .route("/api/admin/referrals/list", get(api::list_referrals))
        .route("/api/admin/referrals/update-status", patch(api::update_referral_status))
        .route("/api/admin/referrals/export", get(api::export_referrals));

    Router::new()
        .merge(referrals)
        .merge(admin)
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

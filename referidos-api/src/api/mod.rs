//! HTTP API handlers

pub mod admin;
pub mod auth;
pub mod health;
pub mod referrals;

pub use admin::{export_referrals, list_referrals, update_referral_status};
pub use auth::bearer_token;
pub use health::health_routes;
pub use referrals::{create_referral, my_referrals};

//! # Referidos Common Library
//!
//! Shared code for the referral program service:
//! - Referral and profile models
//! - Input normalization and validation
//! - Layered configuration loading
//! - Database initialization (schema, unique constraints)
//! - Clock abstraction used for cooldown windows

pub mod config;
#[cfg(feature = "sqlx")]
pub mod db;
pub mod error;
pub mod models;
pub mod time;
pub mod validation;

pub use error::{Error, Result};
pub use models::{
    AdminReferral, NewReferral, Profile, RawTracking, Referral, ReferralStatus, ReferrerProfile,
    Tracking,
};

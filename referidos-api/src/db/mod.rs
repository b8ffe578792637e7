//! Database access layer for referidos-api
//!
//! Thin query functions over the shared SQLite pool. They return
//! `sqlx::Error` unchanged; the service layer decides what each failure means
//! to the caller.

pub mod profiles;
pub mod referrals;

pub use profiles::{get_profile, profiles_by_ids, upsert_profile};
pub use referrals::{
    classify_unique_violation, DuplicateField, ReferralFilter, ReferrerKey,
};

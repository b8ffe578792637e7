//! Database initialization
//!
//! Creates the `referrals` and `profiles` tables on first run. All statements
//! are idempotent, so every start re-applies them safely.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Name of the unique index on `referrals.referred_email`
pub const REFERRED_EMAIL_UNIQUE_INDEX: &str = "referrals_referred_email_uq";

/// Name of the unique index on `referrals.referred_phone`
pub const REFERRED_PHONE_UNIQUE_INDEX: &str = "referrals_referred_phone_uq";

/// Open (creating if needed) the database file and apply the schema
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    // WAL allows concurrent readers with one writer
    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(&pool)
        .await?;

    create_schema(&pool).await?;

    Ok(pool)
}

/// In-memory database with the full schema. Single connection, so every
/// query sees the same database.
pub async fn init_memory_database() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    create_schema(&pool).await?;
    Ok(pool)
}

/// Apply the schema to an open pool
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query("PRAGMA foreign_keys = ON").execute(pool).await?;
    create_profiles_table(pool).await?;
    create_referrals_table(pool).await?;
    Ok(())
}

async fn create_profiles_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS profiles (
            id TEXT PRIMARY KEY,
            role TEXT,
            full_name TEXT,
            dni TEXT,
            has_verisure INTEGER
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_referrals_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS referrals (
            id TEXT PRIMARY KEY,
            created_at TEXT NOT NULL,
            referrer_user_id TEXT,
            referrer_email TEXT,
            referred_name TEXT NOT NULL,
            referred_email TEXT,
            referred_phone TEXT NOT NULL,
            consent INTEGER NOT NULL CHECK (consent = 1),
            status TEXT NOT NULL DEFAULT 'registered'
                CHECK (status IN ('registered', 'contacted', 'quoted', 'contracted', 'invalid')),
            notes TEXT,
            camp TEXT,
            utm_source TEXT,
            utm_medium TEXT,
            utm_campaign TEXT,
            utm_term TEXT,
            utm_content TEXT,
            landing_path TEXT,
            referer TEXT,
            search_text TEXT NOT NULL DEFAULT '',
            CHECK (referrer_user_id IS NOT NULL OR referrer_email IS NOT NULL)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // NULL referred emails never collide under a SQLite unique index
    sqlx::query(&format!(
        "CREATE UNIQUE INDEX IF NOT EXISTS {} ON referrals (referred_email)",
        REFERRED_EMAIL_UNIQUE_INDEX
    ))
    .execute(pool)
    .await?;

    sqlx::query(&format!(
        "CREATE UNIQUE INDEX IF NOT EXISTS {} ON referrals (referred_phone)",
        REFERRED_PHONE_UNIQUE_INDEX
    ))
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS referrals_created_at_idx ON referrals (created_at)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS referrals_referrer_user_idx ON referrals (referrer_user_id)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS referrals_referrer_email_idx ON referrals (referrer_email)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

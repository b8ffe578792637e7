//! Tests for database initialization and schema constraints

use referidos_common::db::init::{init_database, init_memory_database};
use sqlx::SqlitePool;

async fn insert(pool: &SqlitePool, id: &str, email: Option<&str>, phone: &str) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO referrals (id, created_at, referrer_email, referred_name, referred_email, referred_phone, consent, status)
         VALUES (?, '2025-01-01T00:00:00.000000Z', 'a@b.com', 'Ana', ?, ?, 1, 'registered')",
    )
    .bind(id)
    .bind(email)
    .bind(phone)
    .execute(pool)
    .await
    .map(|_| ())
}

#[tokio::test]
async fn test_database_creation_when_missing() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("nested").join("referidos.db");

    let pool = init_database(&db_path).await;
    assert!(pool.is_ok(), "Database initialization failed: {:?}", pool.err());
    assert!(db_path.exists(), "Database file was not created");
}

#[tokio::test]
async fn test_database_opens_existing() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("referidos.db");

    let pool1 = init_database(&db_path).await.unwrap();
    insert(&pool1, "r1", None, "987654321").await.unwrap();
    pool1.close().await;

    // Re-applying the schema keeps existing rows
    let pool2 = init_database(&db_path).await.unwrap();
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM referrals")
        .fetch_one(&pool2)
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn test_phone_is_unique() {
    let pool = init_memory_database().await.unwrap();
    insert(&pool, "r1", None, "987654321").await.unwrap();

    let err = insert(&pool, "r2", None, "987654321").await.unwrap_err();
    let db_err = err.as_database_error().expect("database error");
    assert!(db_err.is_unique_violation());
    assert!(db_err.message().contains("referred_phone"));
}

#[tokio::test]
async fn test_email_is_unique_but_nulls_do_not_collide() {
    let pool = init_memory_database().await.unwrap();
    insert(&pool, "r1", None, "900000001").await.unwrap();
    insert(&pool, "r2", None, "900000002").await.unwrap();
    insert(&pool, "r3", Some("x@y.com"), "900000003").await.unwrap();

    let err = insert(&pool, "r4", Some("x@y.com"), "900000004").await.unwrap_err();
    let db_err = err.as_database_error().expect("database error");
    assert!(db_err.is_unique_violation());
    assert!(db_err.message().contains("referred_email"));
}

#[tokio::test]
async fn test_referrer_attribution_required() {
    let pool = init_memory_database().await.unwrap();
    let result = sqlx::query(
        "INSERT INTO referrals (id, created_at, referred_name, referred_phone, consent)
         VALUES ('r1', '2025-01-01T00:00:00.000000Z', 'Ana', '987654321', 1)",
    )
    .execute(&pool)
    .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_status_restricted_to_enumeration() {
    let pool = init_memory_database().await.unwrap();
    insert(&pool, "r1", None, "987654321").await.unwrap();

    let ok = sqlx::query("UPDATE referrals SET status = 'invalid' WHERE id = 'r1'")
        .execute(&pool)
        .await;
    assert!(ok.is_ok());

    let bad = sqlx::query("UPDATE referrals SET status = 'archived' WHERE id = 'r1'")
        .execute(&pool)
        .await;
    assert!(bad.is_err());
}

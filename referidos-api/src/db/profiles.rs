//! Profile lookups

use referidos_common::Profile;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

fn profile_from_row(row: &SqliteRow) -> Result<Profile, sqlx::Error> {
    Ok(Profile {
        id: row.try_get("id")?,
        role: row.try_get("role")?,
        full_name: row.try_get("full_name")?,
        dni: row.try_get("dni")?,
        has_verisure: row.try_get("has_verisure")?,
    })
}

/// Fetch a single profile by identity id
pub async fn get_profile(pool: &SqlitePool, id: &str) -> Result<Option<Profile>, sqlx::Error> {
    let row = sqlx::query("SELECT id, role, full_name, dni, has_verisure FROM profiles WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(profile_from_row).transpose()
}

/// Fetch every profile whose id is in `ids`
pub async fn profiles_by_ids(pool: &SqlitePool, ids: &[String]) -> Result<Vec<Profile>, sqlx::Error> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut qb: QueryBuilder<Sqlite> =
        QueryBuilder::new("SELECT id, role, full_name, dni, has_verisure FROM profiles WHERE id IN (");
    let mut separated = qb.separated(", ");
    for id in ids {
        separated.push_bind(id);
    }
    separated.push_unseparated(")");

    let rows = qb.build().fetch_all(pool).await?;
    rows.iter().map(profile_from_row).collect()
}

/// Insert or replace a profile row
pub async fn upsert_profile(pool: &SqlitePool, profile: &Profile) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO profiles (id, role, full_name, dni, has_verisure) VALUES (?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
            role = excluded.role,
            full_name = excluded.full_name,
            dni = excluded.dni,
            has_verisure = excluded.has_verisure",
    )
    .bind(&profile.id)
    .bind(&profile.role)
    .bind(&profile.full_name)
    .bind(&profile.dni)
    .bind(profile.has_verisure)
    .execute(pool)
    .await?;

    Ok(())
}

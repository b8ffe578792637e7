//! Referral queries

use chrono::{DateTime, Utc};
use referidos_common::time::{from_storage, to_storage};
use referidos_common::{NewReferral, Referral, ReferralStatus, Tracking};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use uuid::Uuid;

const REFERRAL_COLUMNS: &str = "id, created_at, status, referrer_user_id, referrer_email, \
     referred_name, referred_email, referred_phone, consent, notes, camp, utm_source, \
     utm_medium, utm_campaign, utm_term, utm_content, landing_path, referer";

/// How a referrer is identified for cooldown checks
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferrerKey {
    UserId(String),
    Email(String),
}

/// Which unique constraint an insert collided with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateField {
    Phone,
    Email,
    Unknown,
}

/// Admin listing filter
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferralFilter {
    /// Case-insensitive "contains" over referred name/email/phone and referrer email
    pub q: Option<String>,
    /// Exact status match
    pub status: Option<String>,
}

impl ReferralFilter {
    /// Build from raw query values; blank values mean "no filter"
    pub fn new(q: Option<&str>, status: Option<&str>) -> Self {
        let clean = |v: Option<&str>| {
            v.map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        Self {
            q: clean(q),
            status: clean(status),
        }
    }
}

fn decode_error(column: &str, msg: String) -> sqlx::Error {
    sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: msg.into(),
    }
}

fn referral_from_row(row: &SqliteRow) -> Result<Referral, sqlx::Error> {
    let id: String = row.try_get("id")?;
    let created_at: String = row.try_get("created_at")?;
    let status: String = row.try_get("status")?;

    Ok(Referral {
        id: Uuid::parse_str(&id).map_err(|e| decode_error("id", e.to_string()))?,
        created_at: from_storage(&created_at)
            .ok_or_else(|| decode_error("created_at", format!("bad timestamp: {}", created_at)))?,
        status: status.parse::<ReferralStatus>().map_err(|e| decode_error("status", e))?,
        referrer_user_id: row.try_get("referrer_user_id")?,
        referrer_email: row.try_get("referrer_email")?,
        referred_name: row.try_get("referred_name")?,
        referred_email: row.try_get("referred_email")?,
        referred_phone: row.try_get("referred_phone")?,
        consent: row.try_get("consent")?,
        notes: row.try_get("notes")?,
        tracking: Tracking {
            camp: row.try_get("camp")?,
            utm_source: row.try_get("utm_source")?,
            utm_medium: row.try_get("utm_medium")?,
            utm_campaign: row.try_get("utm_campaign")?,
            utm_term: row.try_get("utm_term")?,
            utm_content: row.try_get("utm_content")?,
            landing_path: row.try_get("landing_path")?,
            referer: row.try_get("referer")?,
        },
    })
}

/// Case-folded searchable fields, one per line.
///
/// SQLite's `LOWER` only folds ASCII, so folding happens here with Unicode
/// rules and the admin search matches against this column.
fn search_text(new: &NewReferral) -> String {
    [
        Some(new.referred_name.as_str()),
        new.referred_email.as_deref(),
        Some(new.referred_phone.as_str()),
        new.referrer_email.as_deref(),
    ]
    .iter()
    .flatten()
    .map(|field| field.to_lowercase())
    .collect::<Vec<_>>()
    .join("\n")
}

/// Insert a new referral with status `registered` and consent set
pub async fn insert_referral(
    pool: &SqlitePool,
    id: Uuid,
    created_at: DateTime<Utc>,
    new: &NewReferral,
) -> Result<Referral, sqlx::Error> {
    let t = &new.tracking;
    sqlx::query(
        "INSERT INTO referrals (
            id, created_at, status, referrer_user_id, referrer_email,
            referred_name, referred_email, referred_phone, consent,
            camp, utm_source, utm_medium, utm_campaign, utm_term, utm_content, landing_path, referer,
            search_text
         ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, 1, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(id.to_string())
    .bind(to_storage(&created_at))
    .bind(ReferralStatus::Registered.as_str())
    .bind(&new.referrer_user_id)
    .bind(&new.referrer_email)
    .bind(&new.referred_name)
    .bind(&new.referred_email)
    .bind(&new.referred_phone)
    .bind(&t.camp)
    .bind(&t.utm_source)
    .bind(&t.utm_medium)
    .bind(&t.utm_campaign)
    .bind(&t.utm_term)
    .bind(&t.utm_content)
    .bind(&t.landing_path)
    .bind(&t.referer)
    .bind(search_text(new))
    .execute(pool)
    .await?;

    Ok(Referral {
        id,
        created_at,
        status: ReferralStatus::Registered,
        referrer_user_id: new.referrer_user_id.clone(),
        referrer_email: new.referrer_email.clone(),
        referred_name: new.referred_name.clone(),
        referred_email: new.referred_email.clone(),
        referred_phone: new.referred_phone.clone(),
        consent: true,
        notes: None,
        tracking: new.tracking.clone(),
    })
}

/// Map a unique-constraint failure to the colliding field.
///
/// Returns `None` when the error is not a uniqueness violation. The phone
/// constraint is checked first.
pub fn classify_unique_violation(err: &sqlx::Error) -> Option<DuplicateField> {
    let db_err = err.as_database_error()?;
    let message = db_err.message().to_lowercase();
    let code = db_err.code().map(|c| c.into_owned()).unwrap_or_default();

    let unique = db_err.is_unique_violation()
        || code == "23505"
        || code == "2067"
        || message.contains("duplicate key")
        || message.contains("unique constraint failed");
    if !unique {
        return None;
    }

    let haystack = format!(
        "{} {}",
        message,
        db_err.constraint().unwrap_or_default().to_lowercase()
    );
    if haystack.contains("referred_phone") {
        Some(DuplicateField::Phone)
    } else if haystack.contains("referred_email") {
        Some(DuplicateField::Email)
    } else {
        Some(DuplicateField::Unknown)
    }
}

/// True if the referrer created a referral at or after `since`
pub async fn has_recent_referral(
    pool: &SqlitePool,
    referrer: &ReferrerKey,
    since: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    let (column, value) = match referrer {
        ReferrerKey::UserId(id) => ("referrer_user_id", id),
        ReferrerKey::Email(email) => ("referrer_email", email),
    };

    let sql = format!(
        "SELECT id FROM referrals WHERE created_at >= ? AND {} = ? LIMIT 1",
        column
    );
    let row = sqlx::query(&sql)
        .bind(to_storage(&since))
        .bind(value)
        .fetch_optional(pool)
        .await?;

    Ok(row.is_some())
}

/// True if a referral already uses this referred email
pub async fn exists_by_referred_email(pool: &SqlitePool, email: &str) -> Result<bool, sqlx::Error> {
    let row = sqlx::query("SELECT id FROM referrals WHERE referred_email = ? LIMIT 1")
        .bind(email)
        .fetch_optional(pool)
        .await?;
    Ok(row.is_some())
}

/// True if a referral already uses this referred phone
pub async fn exists_by_referred_phone(pool: &SqlitePool, phone: &str) -> Result<bool, sqlx::Error> {
    let row = sqlx::query("SELECT id FROM referrals WHERE referred_phone = ? LIMIT 1")
        .bind(phone)
        .fetch_optional(pool)
        .await?;
    Ok(row.is_some())
}

/// Attach unattributed referrals with a matching referrer email to `user_id`.
/// Returns the number of rows updated.
pub async fn claim_for_user(pool: &SqlitePool, user_id: &str, email: &str) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE referrals SET referrer_user_id = ?
         WHERE referrer_user_id IS NULL AND referrer_email = ?",
    )
    .bind(user_id)
    .bind(email)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Escape LIKE wildcards so user input matches literally
fn escape_like(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn push_filter<'a>(qb: &mut QueryBuilder<'a, Sqlite>, filter: &'a ReferralFilter) {
    let mut has_where = false;

    if let Some(status) = &filter.status {
        qb.push(" WHERE status = ");
        qb.push_bind(status);
        has_where = true;
    }

    if let Some(q) = &filter.q {
        let pattern = format!("%{}%", escape_like(&q.to_lowercase()));
        qb.push(if has_where { " AND " } else { " WHERE " });
        qb.push("search_text LIKE ");
        qb.push_bind(pattern);
        qb.push(" ESCAPE '\\'");
    }
}

/// Count referrals matching the filter
pub async fn count_referrals(pool: &SqlitePool, filter: &ReferralFilter) -> Result<i64, sqlx::Error> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT COUNT(*) FROM referrals");
    push_filter(&mut qb, filter);
    qb.build_query_scalar::<i64>().fetch_one(pool).await
}

/// One page of referrals matching the filter, newest first
pub async fn list_referrals(
    pool: &SqlitePool,
    filter: &ReferralFilter,
    limit: i64,
    offset: i64,
) -> Result<Vec<Referral>, sqlx::Error> {
    let mut qb: QueryBuilder<Sqlite> =
        QueryBuilder::new(format!("SELECT {} FROM referrals", REFERRAL_COLUMNS));
    push_filter(&mut qb, filter);
    qb.push(" ORDER BY created_at DESC, id DESC LIMIT ");
    qb.push_bind(limit);
    qb.push(" OFFSET ");
    qb.push_bind(offset);

    let rows = qb.build().fetch_all(pool).await?;
    rows.iter().map(referral_from_row).collect()
}

/// All referrals attributed to an identity, newest first
pub async fn list_by_user(pool: &SqlitePool, user_id: &str) -> Result<Vec<Referral>, sqlx::Error> {
    let sql = format!(
        "SELECT {} FROM referrals WHERE referrer_user_id = ? ORDER BY created_at DESC, id DESC",
        REFERRAL_COLUMNS
    );
    let rows = sqlx::query(&sql).bind(user_id).fetch_all(pool).await?;
    rows.iter().map(referral_from_row).collect()
}

/// Fetch one referral
pub async fn get_referral(pool: &SqlitePool, id: &str) -> Result<Option<Referral>, sqlx::Error> {
    let sql = format!("SELECT {} FROM referrals WHERE id = ?", REFERRAL_COLUMNS);
    let row = sqlx::query(&sql).bind(id).fetch_optional(pool).await?;
    row.as_ref().map(referral_from_row).transpose()
}

/// Set a referral's status. Returns the updated row, or `None` if no row has this id.
pub async fn update_status(
    pool: &SqlitePool,
    id: &str,
    status: ReferralStatus,
) -> Result<Option<Referral>, sqlx::Error> {
    let result = sqlx::query("UPDATE referrals SET status = ? WHERE id = ?")
        .bind(status.as_str())
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Ok(None);
    }
    get_referral(pool, id).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use referidos_common::db::init_memory_database;

    fn new_referral(phone: &str, email: Option<&str>, referrer: &str) -> NewReferral {
        NewReferral {
            referrer_user_id: None,
            referrer_email: Some(referrer.to_string()),
            referred_name: format!("Referido {}", phone),
            referred_email: email.map(str::to_string),
            referred_phone: phone.to_string(),
            tracking: Tracking::default(),
        }
    }

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 10, minute, 0).unwrap()
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
        assert_eq!(escape_like("ana"), "ana");
    }

    #[test]
    fn test_filter_blank_values_ignored() {
        assert_eq!(ReferralFilter::new(Some("  "), Some("")), ReferralFilter::default());
        let f = ReferralFilter::new(Some(" Ana "), Some("quoted"));
        assert_eq!(f.q.as_deref(), Some("Ana"));
        assert_eq!(f.status.as_deref(), Some("quoted"));
    }

    #[tokio::test]
    async fn test_insert_and_read_back() {
        let pool = init_memory_database().await.unwrap();
        let mut new = new_referral("987654321", Some("ana@example.com"), "a@b.com");
        new.tracking.utm_source = Some("facebook".into());

        let id = Uuid::new_v4();
        let stored = insert_referral(&pool, id, at(0), &new).await.unwrap();
        let loaded = get_referral(&pool, &id.to_string()).await.unwrap().unwrap();
        assert_eq!(stored, loaded);
        assert_eq!(loaded.status, ReferralStatus::Registered);
        assert!(loaded.consent);
        assert_eq!(loaded.tracking.utm_source.as_deref(), Some("facebook"));
    }

    #[tokio::test]
    async fn test_duplicate_phone_classified() {
        let pool = init_memory_database().await.unwrap();
        insert_referral(&pool, Uuid::new_v4(), at(0), &new_referral("987654321", None, "a@b.com"))
            .await
            .unwrap();

        let err = insert_referral(&pool, Uuid::new_v4(), at(1), &new_referral("987654321", None, "c@d.com"))
            .await
            .unwrap_err();
        assert_eq!(classify_unique_violation(&err), Some(DuplicateField::Phone));
    }

    #[tokio::test]
    async fn test_duplicate_email_classified() {
        let pool = init_memory_database().await.unwrap();
        insert_referral(&pool, Uuid::new_v4(), at(0), &new_referral("900000001", Some("x@y.com"), "a@b.com"))
            .await
            .unwrap();

        let err = insert_referral(&pool, Uuid::new_v4(), at(1), &new_referral("900000002", Some("x@y.com"), "c@d.com"))
            .await
            .unwrap_err();
        assert_eq!(classify_unique_violation(&err), Some(DuplicateField::Email));
    }

    #[test]
    fn test_non_database_error_not_classified() {
        assert_eq!(classify_unique_violation(&sqlx::Error::RowNotFound), None);
    }

    #[tokio::test]
    async fn test_recent_referral_window() {
        let pool = init_memory_database().await.unwrap();
        insert_referral(&pool, Uuid::new_v4(), at(10), &new_referral("987654321", None, "a@b.com"))
            .await
            .unwrap();

        let key = ReferrerKey::Email("a@b.com".into());
        assert!(has_recent_referral(&pool, &key, at(10) - Duration::minutes(5)).await.unwrap());
        assert!(!has_recent_referral(&pool, &key, at(11)).await.unwrap());
        let other = ReferrerKey::Email("z@b.com".into());
        assert!(!has_recent_referral(&pool, &other, at(0)).await.unwrap());
        let user = ReferrerKey::UserId("u1".into());
        assert!(!has_recent_referral(&pool, &user, at(0)).await.unwrap());
    }

    #[tokio::test]
    async fn test_claim_only_touches_unattributed_matching_rows() {
        let pool = init_memory_database().await.unwrap();
        insert_referral(&pool, Uuid::new_v4(), at(0), &new_referral("900000001", None, "a@b.com"))
            .await
            .unwrap();
        insert_referral(&pool, Uuid::new_v4(), at(6), &new_referral("900000002", None, "a@b.com"))
            .await
            .unwrap();
        insert_referral(&pool, Uuid::new_v4(), at(12), &new_referral("900000003", None, "other@b.com"))
            .await
            .unwrap();

        assert_eq!(claim_for_user(&pool, "u1", "a@b.com").await.unwrap(), 2);
        assert_eq!(claim_for_user(&pool, "u2", "a@b.com").await.unwrap(), 0);
        assert_eq!(list_by_user(&pool, "u1").await.unwrap().len(), 2);
        assert!(list_by_user(&pool, "u2").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_filters_and_orders() {
        let pool = init_memory_database().await.unwrap();
        for (i, phone) in ["900000001", "900000002", "900000003"].iter().enumerate() {
            let mut new = new_referral(phone, None, "a@b.com");
            new.referred_name = format!("Cliente {}", i);
            insert_referral(&pool, Uuid::new_v4(), at(i as u32 * 6), &new).await.unwrap();
        }
        let mut pct = new_referral("900000009", None, "promo@b.com");
        pct.referred_name = "100% Cliente".into();
        insert_referral(&pool, Uuid::new_v4(), at(30), &pct).await.unwrap();

        let all = ReferralFilter::default();
        assert_eq!(count_referrals(&pool, &all).await.unwrap(), 4);
        let page = list_referrals(&pool, &all, 2, 0).await.unwrap();
        assert_eq!(page.len(), 2);
        assert!(page[0].created_at > page[1].created_at);

        let by_phone = ReferralFilter::new(Some("0000002"), None);
        assert_eq!(count_referrals(&pool, &by_phone).await.unwrap(), 1);

        let by_name = ReferralFilter::new(Some("CLIENTE"), None);
        assert_eq!(count_referrals(&pool, &by_name).await.unwrap(), 4);

        // `%` in the search term is literal
        let literal = ReferralFilter::new(Some("100%"), None);
        assert_eq!(count_referrals(&pool, &literal).await.unwrap(), 1);

        let quoted = ReferralFilter::new(None, Some("quoted"));
        assert_eq!(count_referrals(&pool, &quoted).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_search_folds_accented_case() {
        let pool = init_memory_database().await.unwrap();
        let mut upper = new_referral("900000001", None, "a@b.com");
        upper.referred_name = "JOSÉ ÁLVAREZ".into();
        insert_referral(&pool, Uuid::new_v4(), at(0), &upper).await.unwrap();
        let mut lower = new_referral("900000002", Some("núñez@example.com"), "c@d.com");
        lower.referred_name = "maría peña".into();
        insert_referral(&pool, Uuid::new_v4(), at(6), &lower).await.unwrap();

        for (q, expected) in [
            ("jos", 1),
            ("josé", 1),
            ("JOSÉ", 1),
            ("Álvarez", 1),
            ("MARÍA PEÑA", 1),
            ("peña", 1),
            ("NÚÑEZ@", 1),
            ("é", 1),
            ("zz", 0),
        ] {
            let filter = ReferralFilter::new(Some(q), None);
            assert_eq!(count_referrals(&pool, &filter).await.unwrap(), expected, "q={}", q);
        }
    }

    #[tokio::test]
    async fn test_update_status() {
        let pool = init_memory_database().await.unwrap();
        let id = Uuid::new_v4();
        insert_referral(&pool, id, at(0), &new_referral("987654321", None, "a@b.com"))
            .await
            .unwrap();

        let updated = update_status(&pool, &id.to_string(), ReferralStatus::Quoted)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.status, ReferralStatus::Quoted);
        assert!(update_status(&pool, "missing", ReferralStatus::Quoted).await.unwrap().is_none());
    }
}

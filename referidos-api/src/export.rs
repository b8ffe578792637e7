//! CSV export of the admin listing
//!
//! The file is built for spreadsheet tools: UTF-8 with a BOM, every field
//! quoted, dates in Peru local time (UTC-5, no DST).

use chrono::{DateTime, FixedOffset, Utc};
use std::future::Future;
use tracing::{error, info};

use referidos_common::AdminReferral;

use crate::db::referrals::ReferralFilter;
use crate::error::{ApiError, ApiResult};
use crate::services::admin::{fetch_page, require_admin, ReferralPage};
use crate::AppState;

/// Rows fetched per round trip while exporting
pub const EXPORT_CHUNK_SIZE: i64 = 500;

pub const MSG_EXPORT_PREPARE_FAILED: &str = "No pudimos preparar la exportación.";
pub const MSG_EXPORT_FAILED: &str = "Error exportando los referidos.";

const FNV_OFFSET_BASIS: u32 = 0x811c9dc5;
const FNV_ALT_SEED: u32 = 0x9747b28c;
const FNV_PRIME: u32 = 0x0100_0193;

const PERU_OFFSET_SECS: i32 = 5 * 3600;

pub const CSV_HEADERS: [&str; 12] = [
    "Fecha registro",
    "Estado",
    "Código",
    "Referidor",
    "Correo referidor",
    "¿Tiene Verisure?",
    "Referido",
    "Teléfono referido",
    "Correo referido",
    "Campaña",
    "Landing",
    "Notas",
];

/// Finished export
#[derive(Debug, Clone)]
pub struct CsvExport {
    pub filename: String,
    pub content: String,
}

/// FNV-1a (32-bit) over UTF-16 code units
pub fn fnv1a32(input: &str, seed: u32) -> u32 {
    input.encode_utf16().fold(seed, |h, unit| {
        (h ^ u32::from(unit)).wrapping_mul(FNV_PRIME)
    })
}

/// Numeric reference code derived from a referral id
///
/// Zero-padded to at least 15 digits. Large first hashes yield 16 digits.
pub fn reference_code(id: &str) -> String {
    let id = id.trim();
    if id.is_empty() {
        return "0".repeat(15);
    }
    let h1 = u64::from(fnv1a32(id, FNV_OFFSET_BASIS));
    let h2 = u64::from(fnv1a32(id, FNV_ALT_SEED));
    format!("{:015}", h1 * 1_000_000 + h2 % 1_000_000)
}

/// `dd/mm/yyyy, HH:MM` in Peru time
pub fn format_peru_datetime(ts: &DateTime<Utc>) -> String {
    match FixedOffset::west_opt(PERU_OFFSET_SECS) {
        Some(offset) => ts.with_timezone(&offset).format("%d/%m/%Y, %H:%M").to_string(),
        None => ts.format("%d/%m/%Y, %H:%M").to_string(),
    }
}

pub fn format_yes_no(value: Option<bool>) -> &'static str {
    match value {
        Some(true) => "Sí",
        Some(false) => "No",
        None => "—",
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Display name for a referrer: profile name, else a name guessed from the email
pub fn referrer_display_name(full_name: Option<&str>, email: Option<&str>) -> String {
    let name = full_name.map(str::trim).unwrap_or_default();
    if !name.is_empty() {
        return name.to_string();
    }

    let email = email.map(str::trim).unwrap_or_default();
    if email.is_empty() {
        return "—".to_string();
    }

    let local = email.split('@').next().unwrap_or_default();
    let words: Vec<String> = local
        .split(|c: char| c == '.' || c == '_' || c == '-' || c.is_whitespace())
        .filter(|w| !w.is_empty())
        .map(capitalize)
        .collect();

    if words.is_empty() {
        email.to_string()
    } else {
        words.join(" ")
    }
}

fn csv_row(row: &AdminReferral) -> [String; 12] {
    let r = &row.referral;
    let profile = row.referrer_profile.as_ref();
    [
        format_peru_datetime(&r.created_at),
        r.status.label().to_string(),
        reference_code(&r.id.to_string()),
        referrer_display_name(
            profile.and_then(|p| p.full_name.as_deref()),
            r.referrer_email.as_deref(),
        ),
        r.referrer_email.clone().unwrap_or_default(),
        format_yes_no(profile.and_then(|p| p.has_verisure)).to_string(),
        r.referred_name.clone(),
        r.referred_phone.clone(),
        r.referred_email.clone().unwrap_or_default(),
        r.tracking.camp.clone().unwrap_or_default(),
        r.tracking.landing_path.clone().unwrap_or_default(),
        r.notes.clone().unwrap_or_default(),
    ]
}

/// Encode rows as CSV with a leading BOM
///
/// Every field is quoted and records are separated by a bare `\n` with no
/// trailing newline.
pub fn encode_csv(rows: &[AdminReferral]) -> Result<String, csv::Error> {
    let mut writer = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Always)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    writer.write_record(CSV_HEADERS)?;
    for row in rows {
        writer.write_record(csv_row(row))?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| csv::Error::from(e.into_error()))?;
    let body = String::from_utf8_lossy(&bytes).into_owned();
    Ok(format!("\u{feff}{}", body.strip_suffix('\n').unwrap_or(&body)))
}

/// Download name stamped with the export time (UTC)
pub fn export_filename(now: &DateTime<Utc>) -> String {
    format!("referidos-export-{}.csv", now.format("%Y-%m-%d-%H-%M-%S"))
}

/// Fetch every row matching a filter in fixed-size chunks
///
/// A one-row probe reads `total`; chunks then run sequentially until the
/// offset reaches it. An empty chunk ends the loop early.
pub async fn collect_all<F, Fut, E>(chunk_size: i64, mut fetch: F) -> Result<Vec<AdminReferral>, E>
where
    F: FnMut(i64, i64) -> Fut,
    Fut: Future<Output = Result<ReferralPage, E>>,
{
    let chunk_size = chunk_size.max(1);
    let total = fetch(1, 0).await?.total;

    let mut all = Vec::with_capacity(usize::try_from(total).unwrap_or_default());
    let mut offset = 0;
    while offset < total {
        let page = fetch(chunk_size, offset).await?;
        if page.data.is_empty() {
            break;
        }
        all.extend(page.data);
        offset += chunk_size;
    }
    Ok(all)
}

/// Admin export of every row matching the filter
pub async fn export_referrals(
    state: &AppState,
    bearer: Option<&str>,
    filter: &ReferralFilter,
) -> ApiResult<CsvExport> {
    require_admin(state, bearer).await?;

    let mut probed = false;
    let rows = collect_all(EXPORT_CHUNK_SIZE, |limit, offset| {
        let first = !probed;
        probed = true;
        let pool = state.db.clone();
        let filter = filter.clone();
        async move {
            fetch_page(&pool, &filter, limit, offset).await.map_err(|e| {
                error!(offset, "Export chunk failed: {}", e);
                if first {
                    ApiError::internal(MSG_EXPORT_PREPARE_FAILED)
                } else {
                    ApiError::internal(MSG_EXPORT_FAILED)
                }
            })
        }
    })
    .await?;

    let content = encode_csv(&rows).map_err(|e| {
        error!("CSV encoding failed: {}", e);
        ApiError::internal(MSG_EXPORT_FAILED)
    })?;
    info!(rows = rows.len(), "Referral export built");

    Ok(CsvExport {
        filename: export_filename(&state.clock.now()),
        content,
    })
}

//! Referral submission pipeline
//!
//! Gates run in a fixed order and the first failure wins. Nothing is written
//! before the insert; notifications go out only after it succeeds.

use chrono::Duration;
use referidos_common::validation::{is_email_format, is_pe_mobile, normalize_email, normalize_phone};
use referidos_common::{NewReferral, RawTracking, Referral, Tracking};
use serde::Deserialize;
use serde_json::Value;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::db::referrals::{
    classify_unique_violation, exists_by_referred_email, exists_by_referred_phone,
    has_recent_referral, insert_referral, DuplicateField, ReferrerKey,
};
use crate::error::{ApiError, ApiResult};
use crate::identity::resolve_user;
use crate::notifications::{self, NotificationOutcome};
use crate::AppState;

/// Minimum time between two referrals from the same referrer
pub const REGISTER_COOLDOWN_MINUTES: i64 = 5;

pub const MSG_NAME_REQUIRED: &str = "Nombre del referido requerido.";
pub const MSG_REFERRED_EMAIL_INVALID: &str = "Correo del referido inválido.";
pub const MSG_PHONE_INVALID: &str = "Teléfono del referido inválido (9 dígitos, solo números).";
pub const MSG_CONSENT_REQUIRED: &str = "Debes confirmar la autorización del referido.";
pub const MSG_REFERRER_EMAIL_INVALID: &str = "Ingresa tu correo (referidor) válido.";
pub const MSG_COOLDOWN: &str = "Por seguridad, espera 5 minutos antes de registrar otro referido.";
pub const MSG_COOLDOWN_CHECK_FAILED: &str =
    "No pudimos validar seguridad del registro. Intenta nuevamente.";
pub const MSG_DUP_EMAIL_CHECK_FAILED: &str = "Error validando duplicados (correo).";
pub const MSG_DUP_PHONE_CHECK_FAILED: &str = "Error validando duplicados (teléfono).";
pub const MSG_EMAIL_TAKEN: &str = "Este correo ya fue registrado.";
pub const MSG_PHONE_TAKEN: &str = "Este teléfono ya fue registrado.";
pub const MSG_REFERRAL_TAKEN: &str = "Este referido ya fue registrado.";
pub const MSG_INSERT_FAILED: &str = "Error guardando el referido.";

/// Referral creation request.
///
/// Fields are kept as raw JSON values: a field of the wrong JSON type is
/// treated as missing rather than rejected by the deserializer.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionRequest {
    pub referrer_email: Option<Value>,
    pub referred_name: Option<Value>,
    pub referred_email: Option<Value>,
    pub referred_phone: Option<Value>,
    pub consent: Option<Value>,
    pub access_token: Option<Value>,
    #[serde(flatten)]
    pub tracking: RawTracking,
}

/// Successful submission
#[derive(Debug, Clone)]
pub struct SubmissionOutcome {
    pub referral: Referral,
    pub notifications: NotificationOutcome,
}

fn str_field(value: &Option<Value>) -> Option<&str> {
    value.as_ref().and_then(Value::as_str)
}

fn duplicate_message(field: DuplicateField) -> &'static str {
    match field {
        DuplicateField::Phone => MSG_PHONE_TAKEN,
        DuplicateField::Email => MSG_EMAIL_TAKEN,
        DuplicateField::Unknown => MSG_REFERRAL_TAKEN,
    }
}

/// Validated referred-party fields
#[derive(Debug)]
struct ReferredParty {
    name: String,
    email: Option<String>,
    phone: String,
}

/// Gates 1-5: shape and format of the referred party plus consent
fn validate_referred(req: &SubmissionRequest) -> ApiResult<ReferredParty> {
    let email = str_field(&req.referred_email).and_then(normalize_email);
    let raw_phone = str_field(&req.referred_phone);
    let phone = normalize_phone(raw_phone.unwrap_or_default());

    let name = str_field(&req.referred_name)
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .ok_or_else(|| ApiError::validation(MSG_NAME_REQUIRED))?;

    if let Some(email) = &email {
        if !is_email_format(email) {
            return Err(ApiError::validation(MSG_REFERRED_EMAIL_INVALID));
        }
    }

    if raw_phone.is_none() || !is_pe_mobile(&phone) {
        return Err(ApiError::validation(MSG_PHONE_INVALID));
    }

    if req.consent != Some(Value::Bool(true)) {
        return Err(ApiError::validation(MSG_CONSENT_REQUIRED));
    }

    Ok(ReferredParty {
        name: name.to_string(),
        email,
        phone,
    })
}

/// Gate 6: session identity if the token resolves, else the typed referrer email
async fn resolve_referrer(
    state: &AppState,
    req: &SubmissionRequest,
) -> ApiResult<(Option<String>, Option<String>)> {
    if let Some(token) = str_field(&req.access_token) {
        if let Some(user) = resolve_user(state.identity.as_ref(), token).await {
            let email = user.email.filter(|e| !e.is_empty());
            return Ok((Some(user.id), email));
        }
    }

    let email = str_field(&req.referrer_email)
        .and_then(normalize_email)
        .filter(|e| is_email_format(e))
        .ok_or_else(|| ApiError::validation(MSG_REFERRER_EMAIL_INVALID))?;

    Ok((None, Some(email)))
}

/// Create a referral
pub async fn submit_referral(state: &AppState, req: SubmissionRequest) -> ApiResult<SubmissionOutcome> {
    let tracking = Tracking::from_raw(&req.tracking);
    let referred = validate_referred(&req)?;
    let (referrer_user_id, referrer_email) = resolve_referrer(state, &req).await?;

    // Cooldown: identity id when signed in, else the referrer email
    let key = match (&referrer_user_id, &referrer_email) {
        (Some(id), _) => ReferrerKey::UserId(id.clone()),
        (None, Some(email)) => ReferrerKey::Email(email.clone()),
        (None, None) => return Err(ApiError::validation(MSG_REFERRER_EMAIL_INVALID)),
    };

    let now = state.clock.now();
    let since = now - Duration::minutes(REGISTER_COOLDOWN_MINUTES);
    match has_recent_referral(&state.db, &key, since).await {
        Ok(false) => {}
        Ok(true) => {
            info!(referrer = ?key, "Referral rejected by cooldown");
            return Err(ApiError::RateLimited(MSG_COOLDOWN.to_string()));
        }
        Err(e) => {
            error!("Cooldown check failed: {}", e);
            return Err(ApiError::internal(MSG_COOLDOWN_CHECK_FAILED));
        }
    }

    // Fast-path duplicate checks; the unique indexes remain authoritative
    let email_check = async {
        match &referred.email {
            Some(email) => exists_by_referred_email(&state.db, email).await,
            None => Ok(false),
        }
    };
    let phone_check = exists_by_referred_phone(&state.db, &referred.phone);
    let (email_dup, phone_dup) = tokio::join!(email_check, phone_check);

    let email_dup = email_dup.map_err(|e| {
        error!("Duplicate email check failed: {}", e);
        ApiError::internal(MSG_DUP_EMAIL_CHECK_FAILED)
    })?;
    let phone_dup = phone_dup.map_err(|e| {
        error!("Duplicate phone check failed: {}", e);
        ApiError::internal(MSG_DUP_PHONE_CHECK_FAILED)
    })?;
    if email_dup {
        return Err(ApiError::Conflict(MSG_EMAIL_TAKEN.to_string()));
    }
    if phone_dup {
        return Err(ApiError::Conflict(MSG_PHONE_TAKEN.to_string()));
    }

    let new = NewReferral {
        referrer_user_id,
        referrer_email,
        referred_name: referred.name,
        referred_email: referred.email,
        referred_phone: referred.phone,
        tracking,
    };

    let referral = match insert_referral(&state.db, Uuid::new_v4(), now, &new).await {
        Ok(referral) => referral,
        Err(e) => {
            if let Some(field) = classify_unique_violation(&e) {
                warn!(?field, "Insert lost a race on a unique constraint");
                return Err(ApiError::Conflict(duplicate_message(field).to_string()));
            }
            error!("Referral insert failed: {}", e);
            return Err(ApiError::internal(MSG_INSERT_FAILED));
        }
    };

    info!(
        referral_id = %referral.id,
        authenticated = referral.referrer_user_id.is_some(),
        "Referral registered"
    );

    let notifications = notifications::dispatch(state.mailer.as_ref(), &state.email, &referral).await;

    Ok(SubmissionOutcome {
        referral,
        notifications,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(value: Value) -> SubmissionRequest {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_request_accepts_mixed_case_fields() {
        let req = request(json!({
            "referredName": "Ana",
            "referredPhone": "987654321",
            "consent": true,
            "utm_source": "fb",
            "landing_path": "/promo"
        }));
        assert_eq!(str_field(&req.referred_name), Some("Ana"));
        assert_eq!(req.tracking.utm_source, Some(json!("fb")));
    }

    #[test]
    fn test_gate_order() {
        // Name is checked before phone and consent
        let err = validate_referred(&request(json!({ "referredPhone": "1", "consent": false }))).unwrap_err();
        assert_eq!(err, ApiError::validation(MSG_NAME_REQUIRED));

        let err = validate_referred(&request(json!({
            "referredName": "Ana", "referredEmail": "bad@", "referredPhone": "1"
        })))
        .unwrap_err();
        assert_eq!(err, ApiError::validation(MSG_REFERRED_EMAIL_INVALID));

        let err = validate_referred(&request(json!({
            "referredName": "Ana", "referredPhone": "98765432", "consent": true
        })))
        .unwrap_err();
        assert_eq!(err, ApiError::validation(MSG_PHONE_INVALID));
    }

    #[test]
    fn test_consent_must_be_literal_true() {
        for consent in [json!(false), json!("true"), json!(1), Value::Null] {
            let err = validate_referred(&request(json!({
                "referredName": "Ana", "referredPhone": "987654321", "consent": consent
            })))
            .unwrap_err();
            assert_eq!(err, ApiError::validation(MSG_CONSENT_REQUIRED));
        }
    }

    #[test]
    fn test_phone_must_be_string() {
        let err = validate_referred(&request(json!({
            "referredName": "Ana", "referredPhone": 987654321, "consent": true
        })))
        .unwrap_err();
        assert_eq!(err, ApiError::validation(MSG_PHONE_INVALID));
    }

    #[test]
    fn test_missing_or_blank_phone_is_invalid() {
        for body in [
            json!({ "referredName": "Ana", "consent": true }),
            json!({ "referredName": "Ana", "referredPhone": "", "consent": true }),
            json!({ "referredName": "Ana", "referredPhone": " - ", "consent": true }),
        ] {
            let err = validate_referred(&request(body)).unwrap_err();
            assert_eq!(err, ApiError::validation(MSG_PHONE_INVALID));
        }
    }

    #[test]
    fn test_valid_party_is_normalized() {
        let party = validate_referred(&request(json!({
            "referredName": "  Ana Lopez ",
            "referredEmail": " Ana@Example.com ",
            "referredPhone": "987 654 321",
            "consent": true
        })))
        .unwrap();
        assert_eq!(party.name, "Ana Lopez");
        assert_eq!(party.email.as_deref(), Some("ana@example.com"));
        assert_eq!(party.phone, "987654321");
    }

    #[test]
    fn test_blank_referred_email_is_optional() {
        let party = validate_referred(&request(json!({
            "referredName": "Ana", "referredEmail": "  ", "referredPhone": "987654321", "consent": true
        })))
        .unwrap();
        assert_eq!(party.email, None);
    }

    #[test]
    fn test_duplicate_messages() {
        assert_eq!(duplicate_message(DuplicateField::Phone), MSG_PHONE_TAKEN);
        assert_eq!(duplicate_message(DuplicateField::Email), MSG_EMAIL_TAKEN);
        assert_eq!(duplicate_message(DuplicateField::Unknown), MSG_REFERRAL_TAKEN);
    }
}

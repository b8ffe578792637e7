//! Input normalization and validation
//!
//! Every function here is pure and total: bad input yields `None`/`false`,
//! never a panic or an error.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// Maximum accepted email length (RFC 5321 path limit)
pub const MAX_EMAIL_LEN: usize = 254;

/// Digits in a Peruvian mobile number
pub const PE_MOBILE_DIGITS: usize = 9;

/// Digits in a Peruvian national ID (DNI)
pub const PE_DNI_DIGITS: usize = 8;

/// `local@domain.tld` with a TLD of at least two letters
static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9-]+(?:\.[a-zA-Z0-9-]+)*\.[a-zA-Z]{2,}$",
    )
    .expect("email pattern is valid")
});

/// Trim and lowercase an email; blank input becomes `None`
pub fn normalize_email(input: &str) -> Option<String> {
    let v = input.trim().to_lowercase();
    if v.is_empty() {
        None
    } else {
        Some(v)
    }
}

/// Syntactic email check. Does not verify that the mailbox exists.
pub fn is_email_format(email: &str) -> bool {
    if email.is_empty() || email.len() > MAX_EMAIL_LEN {
        return false;
    }
    if email.contains("..") {
        return false;
    }
    EMAIL_RE.is_match(email)
}

fn digits_only(input: &str, max: usize) -> String {
    input.chars().filter(|c| c.is_ascii_digit()).take(max).collect()
}

/// Keep ASCII digits only, truncated to 9 characters
pub fn normalize_phone(input: &str) -> String {
    digits_only(input, PE_MOBILE_DIGITS)
}

/// True iff the normalized phone is exactly 9 digits
pub fn is_pe_mobile(phone: &str) -> bool {
    normalize_phone(phone).len() == PE_MOBILE_DIGITS
}

/// Keep ASCII digits only, truncated to 8 characters
pub fn normalize_dni(input: &str) -> String {
    digits_only(input, PE_DNI_DIGITS)
}

/// True iff the normalized DNI is exactly 8 digits
pub fn is_pe_dni8(dni: &str) -> bool {
    normalize_dni(dni).len() == PE_DNI_DIGITS
}

/// Clean a campaign / UTM / path field taken from a JSON body.
///
/// Only JSON strings pass. The value is trimmed and cut to `max_len`
/// characters; blank values become `None`.
pub fn clean_tracking_field(value: Option<&Value>, max_len: usize) -> Option<String> {
    let v = value?.as_str()?.trim();
    if v.is_empty() {
        return None;
    }
    Some(v.chars().take(max_len).collect())
}

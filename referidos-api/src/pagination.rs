//! Pagination parameters for the admin listing
//!
//! Query-string values are parsed leniently: anything unparsable falls back
//! to the default, out-of-range values are clamped.

/// Page size when `limit` is absent
pub const DEFAULT_LIMIT: i64 = 50;

/// Largest page the HTTP listing will return
pub const MAX_LIMIT: i64 = 100;

/// Sanitized limit/offset pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub limit: i64,
    pub offset: i64,
}

fn parse_number(raw: Option<&str>) -> Option<i64> {
    let raw = raw?.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(v) = raw.parse::<i64>() {
        return Some(v);
    }
    // Accept "20.0"-style values by truncating toward zero
    raw.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .map(|v| v.trunc() as i64)
}

/// Clamp `limit` to [1, MAX_LIMIT], default DEFAULT_LIMIT
pub fn clamp_limit(raw: Option<&str>) -> i64 {
    parse_number(raw)
        .unwrap_or(DEFAULT_LIMIT)
        .clamp(1, MAX_LIMIT)
}

/// Clamp `offset` to >= 0, default 0
pub fn clamp_offset(raw: Option<&str>) -> i64 {
    parse_number(raw).unwrap_or(0).max(0)
}

impl PageRequest {
    pub fn from_query(limit: Option<&str>, offset: Option<&str>) -> Self {
        Self {
            limit: clamp_limit(limit),
            offset: clamp_offset(offset),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        assert_eq!(
            PageRequest::from_query(None, None),
            PageRequest { limit: 50, offset: 0 }
        );
    }

    #[test]
    fn test_limit_clamped() {
        assert_eq!(clamp_limit(Some("0")), 1);
        assert_eq!(clamp_limit(Some("-5")), 1);
        assert_eq!(clamp_limit(Some("500")), 100);
        assert_eq!(clamp_limit(Some("10")), 10);
        assert_eq!(clamp_limit(Some("20.7")), 20);
    }

    #[test]
    fn test_unparsable_falls_back() {
        assert_eq!(clamp_limit(Some("abc")), DEFAULT_LIMIT);
        assert_eq!(clamp_limit(Some("")), DEFAULT_LIMIT);
        assert_eq!(clamp_offset(Some("NaN")), 0);
    }

    #[test]
    fn test_offset_non_negative() {
        assert_eq!(clamp_offset(Some("-1")), 0);
        assert_eq!(clamp_offset(Some("30")), 30);
    }
}

//! Referral and profile models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::validation::clean_tracking_field;

/// Referral lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferralStatus {
    Registered,
    Contacted,
    Quoted,
    Contracted,
    /// Shown in the portal; only set by direct database edits
    Invalid,
}

impl ReferralStatus {
    /// Statuses an admin may assign through the API
    pub const ADMIN_SETTABLE: [ReferralStatus; 4] = [
        ReferralStatus::Registered,
        ReferralStatus::Contacted,
        ReferralStatus::Quoted,
        ReferralStatus::Contracted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReferralStatus::Registered => "registered",
            ReferralStatus::Contacted => "contacted",
            ReferralStatus::Quoted => "quoted",
            ReferralStatus::Contracted => "contracted",
            ReferralStatus::Invalid => "invalid",
        }
    }

    /// Spanish label used in exports and notifications
    pub fn label(&self) -> &'static str {
        match self {
            ReferralStatus::Registered => "Registrado",
            ReferralStatus::Contacted => "Contactado",
            ReferralStatus::Quoted => "Cotización",
            ReferralStatus::Contracted => "Contratado",
            ReferralStatus::Invalid => "No válido",
        }
    }

    pub fn is_admin_settable(&self) -> bool {
        Self::ADMIN_SETTABLE.contains(self)
    }

    /// Parse a status an admin is allowed to set; `invalid` is rejected
    pub fn parse_admin_settable(value: &str) -> Option<Self> {
        value.parse::<Self>().ok().filter(|s| s.is_admin_settable())
    }
}

impl fmt::Display for ReferralStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReferralStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "registered" => Ok(ReferralStatus::Registered),
            "contacted" => Ok(ReferralStatus::Contacted),
            "quoted" => Ok(ReferralStatus::Quoted),
            "contracted" => Ok(ReferralStatus::Contracted),
            "invalid" => Ok(ReferralStatus::Invalid),
            other => Err(format!("unknown referral status: {}", other)),
        }
    }
}

/// Campaign / UTM metadata captured when a referral is created
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tracking {
    pub camp: Option<String>,
    pub utm_source: Option<String>,
    pub utm_medium: Option<String>,
    pub utm_campaign: Option<String>,
    pub utm_term: Option<String>,
    pub utm_content: Option<String>,
    pub landing_path: Option<String>,
    pub referer: Option<String>,
}

impl Tracking {
    /// Build from raw JSON values, applying per-field length limits
    pub fn from_raw(raw: &RawTracking) -> Self {
        Self {
            camp: clean_tracking_field(raw.camp.as_ref(), 80),
            utm_source: clean_tracking_field(raw.utm_source.as_ref(), 80),
            utm_medium: clean_tracking_field(raw.utm_medium.as_ref(), 80),
            utm_campaign: clean_tracking_field(raw.utm_campaign.as_ref(), 120),
            utm_term: clean_tracking_field(raw.utm_term.as_ref(), 120),
            utm_content: clean_tracking_field(raw.utm_content.as_ref(), 120),
            landing_path: clean_tracking_field(raw.landing_path.as_ref(), 200),
            referer: clean_tracking_field(raw.referer.as_ref(), 300),
        }
    }
}

/// Tracking fields as they arrive in a request body, before cleaning
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawTracking {
    pub camp: Option<serde_json::Value>,
    pub utm_source: Option<serde_json::Value>,
    pub utm_medium: Option<serde_json::Value>,
    pub utm_campaign: Option<serde_json::Value>,
    pub utm_term: Option<serde_json::Value>,
    pub utm_content: Option<serde_json::Value>,
    pub landing_path: Option<serde_json::Value>,
    pub referer: Option<serde_json::Value>,
}

/// A referral record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Referral {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub status: ReferralStatus,
    pub referrer_user_id: Option<String>,
    pub referrer_email: Option<String>,
    pub referred_name: String,
    pub referred_email: Option<String>,
    pub referred_phone: String,
    pub consent: bool,
    pub notes: Option<String>,
    #[serde(flatten)]
    pub tracking: Tracking,
}

/// Values for a referral that has not been stored yet
#[derive(Debug, Clone)]
pub struct NewReferral {
    pub referrer_user_id: Option<String>,
    pub referrer_email: Option<String>,
    pub referred_name: String,
    pub referred_email: Option<String>,
    pub referred_phone: String,
    pub tracking: Tracking,
}

/// Profile row owned by the identity side
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub role: Option<String>,
    pub full_name: Option<String>,
    pub dni: Option<String>,
    pub has_verisure: Option<bool>,
}

impl Profile {
    pub fn is_admin(&self) -> bool {
        self.role.as_deref() == Some("admin")
    }
}

/// Referrer profile fields attached to admin listings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferrerProfile {
    pub full_name: Option<String>,
    pub has_verisure: Option<bool>,
    pub role: Option<String>,
}

impl From<&Profile> for ReferrerProfile {
    fn from(p: &Profile) -> Self {
        Self {
            full_name: p.full_name.clone(),
            has_verisure: p.has_verisure,
            role: p.role.clone(),
        }
    }
}

/// Referral enriched with its referrer's profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdminReferral {
    #[serde(flatten)]
    pub referral: Referral,
    pub referrer_profile: Option<ReferrerProfile>,
}

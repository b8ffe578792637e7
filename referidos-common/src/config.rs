//! Configuration loading and resolution
//!
//! Resolution priority for every key:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)
//!
//! Tiers 1 and 2 are merged by the binary's argument parser and arrive here
//! as [`ConfigOverrides`].

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Default listen address
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:5780";

/// Sender used when none is configured
pub const DEFAULT_EMAIL_FROM: &str = "onboarding@resend.dev";

/// Logging section of the TOML file
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Filter directive, e.g. `info` or `referidos_api=debug`
    pub level: Option<String>,
}

/// On-disk TOML configuration. Every key is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TomlConfig {
    pub bind_addr: Option<String>,
    pub database_path: Option<PathBuf>,
    pub auth_url: Option<String>,
    pub auth_api_key: Option<String>,
    pub resend_api_key: Option<String>,
    pub email_from: Option<String>,
    pub email_internal_to: Option<String>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Values supplied on the command line or through the environment
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub bind_addr: Option<String>,
    pub database_path: Option<PathBuf>,
    pub auth_url: Option<String>,
    pub auth_api_key: Option<String>,
    pub resend_api_key: Option<String>,
    pub email_from: Option<String>,
    pub email_internal_to: Option<String>,
    pub log_level: Option<String>,
}

/// Identity provider connection settings
#[derive(Debug, Clone, PartialEq)]
pub struct AuthSettings {
    /// Base URL of the GoTrue-compatible auth service
    pub url: Option<String>,
    /// Project API key sent as the `apikey` header
    pub api_key: Option<String>,
}

/// Transactional email settings
#[derive(Debug, Clone, PartialEq)]
pub struct EmailSettings {
    pub resend_api_key: Option<String>,
    pub from: String,
    /// Operations mailbox; `None` disables internal notifications
    pub internal_to: Option<String>,
}

/// Fully resolved service configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    pub bind_addr: String,
    pub database_path: PathBuf,
    pub auth: AuthSettings,
    pub email: EmailSettings,
    pub log_level: String,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|v| {
        let v = v.trim().to_string();
        if v.is_empty() {
            None
        } else {
            Some(v)
        }
    })
}

impl ServiceConfig {
    /// Merge overrides on top of the TOML file on top of compiled defaults
    pub fn resolve(overrides: ConfigOverrides, toml: TomlConfig) -> Self {
        let pick = |o: Option<String>, t: Option<String>| non_blank(o).or_else(|| non_blank(t));

        Self {
            bind_addr: pick(overrides.bind_addr, toml.bind_addr)
                .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            database_path: overrides
                .database_path
                .or(toml.database_path)
                .unwrap_or_else(default_database_path),
            auth: AuthSettings {
                url: pick(overrides.auth_url, toml.auth_url)
                    .map(|u| u.trim_end_matches('/').to_string()),
                api_key: pick(overrides.auth_api_key, toml.auth_api_key),
            },
            email: EmailSettings {
                resend_api_key: pick(overrides.resend_api_key, toml.resend_api_key),
                from: pick(overrides.email_from, toml.email_from)
                    .unwrap_or_else(|| DEFAULT_EMAIL_FROM.to_string()),
                internal_to: pick(overrides.email_internal_to, toml.email_internal_to),
            },
            log_level: pick(overrides.log_level, toml.logging.level)
                .unwrap_or_else(|| "info".to_string()),
        }
    }

    /// One-line summary with secrets redacted
    pub fn summary(&self) -> String {
        let set = |v: &Option<String>| if v.is_some() { "set" } else { "unset" };
        format!(
            "bind_addr={} database={} auth_url={} auth_api_key={} resend_api_key={} email_from={} internal_to={}",
            self.bind_addr,
            self.database_path.display(),
            self.auth.url.as_deref().unwrap_or("-"),
            set(&self.auth.api_key),
            set(&self.email.resend_api_key),
            self.email.from,
            self.email.internal_to.as_deref().unwrap_or("-"),
        )
    }
}

/// `~/.config/referidos/config.toml` (platform equivalent)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("referidos").join("config.toml"))
}

/// `~/.local/share/referidos/referidos.db` (platform equivalent)
pub fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("referidos"))
        .unwrap_or_else(|| PathBuf::from("./referidos_data"))
        .join("referidos.db")
}

/// Parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
}

/// Load the TOML tier.
///
/// An explicitly requested file must exist and parse. The default file is
/// optional: when missing or broken the service starts on defaults with a
/// warning.
pub fn load_toml_tier(explicit: Option<&Path>) -> Result<TomlConfig> {
    if let Some(path) = explicit {
        let config = load_toml_config(path)?;
        info!("Loaded configuration from {}", path.display());
        return Ok(config);
    }

    let Some(path) = default_config_path() else {
        return Ok(TomlConfig::default());
    };
    if !path.exists() {
        return Ok(TomlConfig::default());
    }

    match load_toml_config(&path) {
        Ok(config) => {
            info!("Loaded configuration from {}", path.display());
            Ok(config)
        }
        Err(e) => {
            warn!("Ignoring config file: {}", e);
            Ok(TomlConfig::default())
        }
    }
}

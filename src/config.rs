use secrecy::SecretString;
use std::env;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_DB_FILE: &str = "storefront.db";
pub const DEFAULT_RAZORPAY_API_BASE: &str = "https://api.razorpay.com/v1";
pub const DEFAULT_CURRENCY: &str = "INR";
pub const DEFAULT_SESSION_TTL_HOURS: u64 = 24 * 7;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

/// Credentials for the remote payment gateway.
#[derive(Debug)]
pub struct GatewayConfig {
    pub key_id: String,
    pub key_secret: SecretString,
    pub api_base: String,
}

#[derive(Debug)]
pub struct Config {
    /// `None` lets the caller pick a location (the desktop shell uses its
    /// app data dir).
    pub db_path: Option<PathBuf>,
    pub gateway: GatewayConfig,
    pub currency: String,
    pub session_secret: SecretString,
    pub session_ttl_hours: u64,
    pub log_json: bool,
}

impl Config {
    /// Loads `.env` (if any) and reads the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds a config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &'static str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::Missing(name))
        };

        let session_ttl_hours = match lookup("SESSION_TTL_HOURS") {
            Some(v) => v.trim().parse::<u64>().map_err(|_| ConfigError::Invalid {
                name: "SESSION_TTL_HOURS",
                value: v.clone(),
            })?,
            None => DEFAULT_SESSION_TTL_HOURS,
        };

        let log_json = match lookup("STOREFRONT_LOG_JSON") {
            Some(v) => parse_bool(&v).ok_or(ConfigError::Invalid {
                name: "STOREFRONT_LOG_JSON",
                value: v.clone(),
            })?,
            None => false,
        };

        Ok(Config {
            db_path: lookup("STOREFRONT_DB_PATH").map(PathBuf::from),
            gateway: GatewayConfig {
                key_id: required("RAZORPAY_KEY_ID")?,
                key_secret: SecretString::from(required("RAZORPAY_KEY_SECRET")?),
                api_base: lookup("RAZORPAY_API_BASE")
                    .unwrap_or_else(|| DEFAULT_RAZORPAY_API_BASE.to_string()),
            },
            currency: lookup("STOREFRONT_CURRENCY")
                .map(|c| c.trim().to_uppercase())
                .unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
            session_secret: SecretString::from(required("SESSION_SECRET")?),
            session_ttl_hours,
            log_json,
        })
    }

    /// Configured database path, or the default file name under `data_dir`.
    pub fn db_path_in(&self, data_dir: &Path) -> PathBuf {
        self.db_path
            .clone()
            .unwrap_or_else(|| data_dir.join(DEFAULT_DB_FILE))
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim() {
        "1" | "true" | "TRUE" | "yes" | "YES" => Some(true),
        "0" | "false" | "FALSE" | "no" | "NO" => Some(false),
        _ => None,
    }
}

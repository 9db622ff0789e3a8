//! Environment-driven settings. `.env` is loaded by `main` through dotenvy.

use rust_decimal::Decimal;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {key}: '{value}'")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Absent means the in-memory store.
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub nats_url: Option<String>,
    pub event_prefix: String,
    pub port: u16,
    pub upload_dir: PathBuf,
    pub max_proof_bytes: usize,
    pub currency: String,
    pub return_window_days: i64,
    pub session_ttl_minutes: i64,
    /// Percent applied when no commission rule matches.
    pub default_commission_rate: Decimal,
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            database_max_connections: 10,
            nats_url: None,
            event_prefix: "simone".to_string(),
            port: 8083,
            upload_dir: PathBuf::from("./uploads/pagos"),
            max_proof_bytes: 5 * 1024 * 1024,
            currency: "PEN".to_string(),
            return_window_days: 15,
            session_ttl_minutes: 480,
            default_commission_rate: Decimal::TEN,
            admin_email: None,
            admin_password: None,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the settings from any key lookup; unset keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let text = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        Ok(Self {
            database_url: text("DATABASE_URL"),
            database_max_connections: parsed(&lookup, "DATABASE_MAX_CONNECTIONS", defaults.database_max_connections)?,
            nats_url: text("NATS_URL"),
            event_prefix: text("EVENT_PREFIX").unwrap_or(defaults.event_prefix),
            port: parsed(&lookup, "PORT", defaults.port)?,
            upload_dir: text("UPLOAD_DIR").map(PathBuf::from).unwrap_or(defaults.upload_dir),
            max_proof_bytes: parsed(&lookup, "MAX_PROOF_BYTES", defaults.max_proof_bytes)?,
            currency: text("CURRENCY").map(|c| c.to_uppercase()).unwrap_or(defaults.currency),
            return_window_days: parsed(&lookup, "RETURN_WINDOW_DAYS", defaults.return_window_days)?,
            session_ttl_minutes: parsed(&lookup, "SESSION_TTL_MINUTES", defaults.session_ttl_minutes)?,
            default_commission_rate: parsed(&lookup, "DEFAULT_COMMISSION_RATE", defaults.default_commission_rate)?,
            admin_email: text("ADMIN_EMAIL"),
            admin_password: text("ADMIN_PASSWORD"),
        })
    }

    pub fn session_ttl(&self) -> std::time::Duration {
        std::time::Duration::from_secs(u64::try_from(self.session_ttl_minutes.max(1)).unwrap_or(1) * 60)
    }
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &'static str, default: T) -> Result<T, ConfigError> {
    match lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) {
        None => Ok(default),
        Some(value) => value.parse().map_err(|_| ConfigError::Invalid { key, value }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.port, 8083);
        assert_eq!(config.currency, "PEN");
        assert_eq!(config.return_window_days, 15);
        assert_eq!(config.default_commission_rate, Decimal::TEN);
        assert!(config.database_url.is_none());
    }

    #[test]
    fn test_overrides_and_errors() {
        let config = AppConfig::from_lookup(lookup(&[("PORT", "9000"), ("CURRENCY", "usd"), ("DATABASE_URL", "  ")])).unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.currency, "USD");
        assert!(config.database_url.is_none());

        let err = AppConfig::from_lookup(lookup(&[("MAX_PROOF_BYTES", "lots")])).unwrap_err();
        assert!(err.to_string().contains("MAX_PROOF_BYTES"));
    }
}

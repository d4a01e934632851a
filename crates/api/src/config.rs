//! API configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `KITSHOP_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//! - `JWT_SECRET` - Token signing secret (min 32 chars, high entropy)
//!
//! ## Optional
//! - `KITSHOP_HOST` - Bind address (default: 127.0.0.1)
//! - `KITSHOP_PORT` - Listen port (default: 4000)
//! - `JWT_EXPIRY_DAYS` - Token lifetime in days (default: 7)
//! - `CORS_ALLOWED_ORIGINS` - Comma separated origins allowed to call the API
//! - `FREE_SHIPPING_THRESHOLD` - Subtotal from which shipping is free (default: 50.00)
//! - `FLAT_SHIPPING_FEE` - Shipping below the threshold (default: 5.00)
//! - `TAX_RATE` - Tax rate between 0 and 1 (default: 0.15)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name
//! - `SENTRY_SAMPLE_RATE` / `SENTRY_TRACES_SAMPLE_RATE` - Sampling (default: 1.0 / 0.1)
//! - `LOG_FORMAT` - `json` for structured logs, anything else for text

use std::collections::BTreeMap;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use kitshop_core::{Money, PricingPolicy};
use rust_decimal::Decimal;
use secrecy::SecretString;
use thiserror::Error;

const MIN_JWT_SECRET_LENGTH: usize = 32;
const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

/// Substrings that give away a copied sample value.
const PLACEHOLDER_WORDS: &[&str] = &[
    "changeme",
    "change-me",
    "placeholder",
    "example",
    "secret",
    "password",
    "your-",
    "xxx",
    "todo",
    "kitshop",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Text
        }
    }
}

/// API application configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// HS256 signing secret for bearer tokens
    pub jwt_secret: SecretString,
    /// Token lifetime in days
    pub jwt_expiry_days: i64,
    /// Origins allowed by CORS; empty means same-origin only
    pub cors_allowed_origins: Vec<String>,
    /// Shipping and tax parameters
    pub pricing: PricingPolicy,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    pub sentry_environment: Option<String>,
    pub sentry_sample_rate: f32,
    pub sentry_traces_sample_rate: f32,
    pub log_format: LogFormat,
}

impl ApiConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if secrets fail validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database_url = get_database_url("KITSHOP_DATABASE_URL")?;
        let host = parse_env::<IpAddr>("KITSHOP_HOST", "127.0.0.1")?;
        let port = parse_env::<u16>("KITSHOP_PORT", "4000")?;

        let jwt_secret = get_jwt_secret("JWT_SECRET")?;
        let jwt_expiry_days = parse_env::<i64>("JWT_EXPIRY_DAYS", "7")?;
        if jwt_expiry_days < 1 {
            return Err(ConfigError::InvalidEnvVar(
                "JWT_EXPIRY_DAYS".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        let cors_allowed_origins =
            parse_origins(&get_optional_env("CORS_ALLOWED_ORIGINS").unwrap_or_default());

        let pricing = parse_pricing(
            &get_env_or_default("FREE_SHIPPING_THRESHOLD", "50.00"),
            &get_env_or_default("FLAT_SHIPPING_FEE", "5.00"),
            &get_env_or_default("TAX_RATE", "0.15"),
        )?;

        Ok(Self {
            database_url,
            host,
            port,
            jwt_secret,
            jwt_expiry_days,
            cors_allowed_origins,
            pricing,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
            sentry_sample_rate: parse_env::<f32>("SENTRY_SAMPLE_RATE", "1.0")?,
            sentry_traces_sample_rate: parse_env::<f32>("SENTRY_TRACES_SAMPLE_RATE", "0.1")?,
            log_format: LogFormat::parse(&get_env_or_default("LOG_FORMAT", "text")),
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

#[cfg(test)]
impl ApiConfig {
    /// Configuration for unit and router tests. Never connects anywhere by itself.
    pub(crate) fn for_tests() -> Self {
        Self {
            database_url: SecretString::from("postgres://localhost/kitshop_test"),
            host: IpAddr::from([127, 0, 0, 1]),
            port: 4000,
            jwt_secret: SecretString::from("aB3$xY9!mK2@nL5#pQ7&rT0*uW4^zC6%"),
            jwt_expiry_days: 7,
            cors_allowed_origins: vec![],
            pricing: PricingPolicy::default(),
            sentry_dsn: None,
            sentry_environment: None,
            sentry_sample_rate: 1.0,
            sentry_traces_sample_rate: 0.1,
            log_format: LogFormat::Text,
        }
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get database URL with fallback to generic `DATABASE_URL`.
fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    if let Ok(value) = std::env::var(primary_key) {
        return Ok(SecretString::from(value));
    }
    if let Ok(value) = std::env::var("DATABASE_URL") {
        return Ok(SecretString::from(value));
    }
    Err(ConfigError::MissingEnvVar(primary_key.to_string()))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse an environment variable (or its default) into `T`.
fn parse_env<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get_env_or_default(key, default)
        .trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

/// Split a comma separated origin list, dropping blanks and trailing slashes.
fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|o| o.trim().trim_end_matches('/'))
        .filter(|o| !o.is_empty())
        .map(String::from)
        .collect()
}

/// Build the pricing policy from its three textual settings.
fn parse_pricing(threshold: &str, fee: &str, rate: &str) -> Result<PricingPolicy, ConfigError> {
    let threshold = Money::from_str(threshold).map_err(|e| {
        ConfigError::InvalidEnvVar("FREE_SHIPPING_THRESHOLD".to_string(), e.to_string())
    })?;
    let fee = Money::from_str(fee)
        .map_err(|e| ConfigError::InvalidEnvVar("FLAT_SHIPPING_FEE".to_string(), e.to_string()))?;
    let rate = Decimal::from_str(rate.trim())
        .map_err(|e| ConfigError::InvalidEnvVar("TAX_RATE".to_string(), e.to_string()))?;

    PricingPolicy::new(threshold, fee, rate)
        .map_err(|e| ConfigError::InvalidEnvVar("TAX_RATE".to_string(), e.to_string()))
}

/// Read the token signing secret and refuse ones that are easy to guess.
fn get_jwt_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    check_secret(&value).map_err(|reason| ConfigError::InsecureSecret(key.to_string(), reason))?;
    Ok(SecretString::from(value))
}

/// Length, placeholder and entropy checks for a signing secret.
fn check_secret(secret: &str) -> Result<(), String> {
    let len = secret.chars().count();
    if len < MIN_JWT_SECRET_LENGTH {
        return Err(format!(
            "must be at least {MIN_JWT_SECRET_LENGTH} characters (got {len})"
        ));
    }

    let lower = secret.to_lowercase();
    if let Some(word) = PLACEHOLDER_WORDS.iter().find(|w| lower.contains(*w)) {
        return Err(format!("looks like a placeholder (contains '{word}')"));
    }

    let entropy = bits_per_char(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(format!(
            "too predictable ({entropy:.2} bits/char, need {MIN_ENTROPY_BITS_PER_CHAR:.1}); generate it randomly"
        ));
    }
    Ok(())
}

/// Shannon entropy of the character distribution.
fn bits_per_char(s: &str) -> f64 {
    let mut counts: BTreeMap<char, u32> = BTreeMap::new();
    for c in s.chars() {
        *counts.entry(c).or_default() += 1;
    }
    let total: u32 = counts.values().sum();
    if total == 0 {
        return 0.0;
    }

    counts
        .values()
        .map(|&n| f64::from(n) / f64::from(total))
        .map(|p| -p * p.log2())
        .sum()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_bits_per_char() {
        assert!(bits_per_char("").abs() < f64::EPSILON);
        assert!((bits_per_char("abab") - 1.0).abs() < 1e-9);
        assert!(bits_per_char("aaaa").abs() < f64::EPSILON);
    }

    #[test]
    fn test_check_secret() {
        assert!(check_secret("too-short").unwrap_err().contains("at least 32"));
        assert!(
            check_secret("changeme-changeme-changeme-changeme")
                .unwrap_err()
                .contains("placeholder")
        );
        assert!(
            check_secret(&"ab".repeat(20))
                .unwrap_err()
                .contains("predictable")
        );
        assert!(check_secret("aB3$xY9!mK2@nL5#pQ7&rT0*uW4^zC6%").is_ok());
    }

    #[test]
    fn test_missing_secret_reported_by_name() {
        assert!(matches!(
            get_jwt_secret("KITSHOP_TEST_UNSET_SECRET"),
            Err(ConfigError::MissingEnvVar(name)) if name == "KITSHOP_TEST_UNSET_SECRET"
        ));
    }

    #[test]
    fn test_parse_pricing_defaults() {
        let policy = parse_pricing("50.00", "5.00", "0.15").unwrap();
        assert_eq!(policy, PricingPolicy::default());
    }

    #[test]
    fn test_parse_pricing_rejects_bad_values() {
        assert!(parse_pricing("fifty", "5.00", "0.15").is_err());
        assert!(parse_pricing("50.00", "-5.00", "0.15").is_err());
        assert!(parse_pricing("50.00", "5.00", "1.5").is_err());
        assert!(parse_pricing("50.001", "5.00", "0.15").is_err());
    }

    #[test]
    fn test_parse_origins() {
        assert_eq!(
            parse_origins(" https://shop.example.org/, http://localhost:5173 ,,"),
            vec!["https://shop.example.org", "http://localhost:5173"]
        );
        assert!(parse_origins("").is_empty());
    }

    #[test]
    fn test_log_format_parse() {
        assert_eq!(LogFormat::parse("JSON"), LogFormat::Json);
        assert_eq!(LogFormat::parse("pretty"), LogFormat::Text);
    }

    #[test]
    fn test_socket_addr() {
        let addr = ApiConfig::for_tests().socket_addr();
        assert_eq!(addr.ip().to_string(), "127.0.0.1");
        assert_eq!(addr.port(), 4000);
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let debug_output = format!("{:?}", ApiConfig::for_tests());
        assert!(!debug_output.contains("kitshop_test"));
        assert!(!debug_output.contains("aB3$xY9"));
    }
}

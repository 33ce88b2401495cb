//! Server configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `MARKETSTALL_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//! - `MARKETSTALL_TOKEN_SECRET` - HMAC signing secret for access/refresh tokens (min 32 chars, high entropy)
//! - `STRIPE_SECRET_KEY` - Payment provider secret key
//!
//! ## Optional
//! - `MARKETSTALL_HOST` - Bind address (default: 127.0.0.1)
//! - `MARKETSTALL_PORT` - Listen port (default: 3000)
//! - `MARKETSTALL_ACCESS_TOKEN_TTL_SECS` - Access token validity (default: 3600)
//! - `MARKETSTALL_REFRESH_TOKEN_TTL_SECS` - Refresh token validity (default: 30 days)
//! - `MARKETSTALL_SESSION_CACHE_TTL_SECS` - Refresh/user cache entry TTL (default: 1 day)
//! - `MARKETSTALL_SESSION_CACHE_CAPACITY` - Max cached entries (default: 100000)
//! - `MARKETSTALL_PASSWORD_MIN_LENGTH` - Minimum password length (default: 8)
//! - `MARKETSTALL_SECURE_COOKIES` - Mark the refresh cookie `Secure` (default: true)
//! - `MARKETSTALL_CURRENCY` - ISO 4217 checkout currency (default: USD)
//! - `STRIPE_API_BASE` - Payment API base URL (default: <https://api.stripe.com>)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment tag

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

use marketstall_core::CurrencyCode;

const MIN_SIGNING_SECRET_LENGTH: usize = 32;
const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "secret",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
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

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Token issuance and session cache settings
    pub auth: AuthConfig,
    /// Payment provider settings
    pub payments: PaymentConfig,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment tag
    pub sentry_environment: Option<String>,
}

/// Token lifecycle configuration.
///
/// Implements `Debug` manually to redact the signing secret.
#[derive(Clone)]
pub struct AuthConfig {
    /// Shared HMAC secret for signing tokens
    pub token_secret: SecretString,
    /// Validity window of access tokens (also their cache TTL)
    pub access_token_ttl: Duration,
    /// Validity window of refresh tokens (also the refresh cookie max-age)
    pub refresh_token_ttl: Duration,
    /// TTL of refresh-token and user snapshot cache entries
    pub session_cache_ttl: Duration,
    /// Upper bound on cached entries
    pub session_cache_capacity: u64,
    /// Minimum accepted password length
    pub password_min_length: usize,
    /// Whether the refresh cookie carries the `Secure` attribute
    pub secure_cookies: bool,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("token_secret", &"[REDACTED]")
            .field("access_token_ttl", &self.access_token_ttl)
            .field("refresh_token_ttl", &self.refresh_token_ttl)
            .field("session_cache_ttl", &self.session_cache_ttl)
            .field("session_cache_capacity", &self.session_cache_capacity)
            .field("password_min_length", &self.password_min_length)
            .field("secure_cookies", &self.secure_cookies)
            .finish()
    }
}

/// Payment provider configuration.
///
/// Implements `Debug` manually to redact the API key.
#[derive(Clone)]
pub struct PaymentConfig {
    /// Provider API base URL
    pub api_base: String,
    /// Provider secret key (server-side only)
    pub secret_key: SecretString,
    /// Currency every checkout is charged in
    pub currency: CurrencyCode,
}

impl std::fmt::Debug for PaymentConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentConfig")
            .field("api_base", &self.api_base)
            .field("secret_key", &"[REDACTED]")
            .field("currency", &self.currency)
            .finish()
    }
}

impl ServerConfig {
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

        let database_url = get_database_url("MARKETSTALL_DATABASE_URL")?;
        let host = parse_env_or_default::<IpAddr>("MARKETSTALL_HOST", "127.0.0.1")?;
        let port = parse_env_or_default::<u16>("MARKETSTALL_PORT", "3000")?;

        Ok(Self {
            database_url,
            host,
            port,
            auth: AuthConfig::from_env()?,
            payments: PaymentConfig::from_env()?,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl AuthConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let token_secret = get_validated_secret("MARKETSTALL_TOKEN_SECRET")?;
        validate_signing_secret(&token_secret, "MARKETSTALL_TOKEN_SECRET")?;

        Ok(Self {
            token_secret,
            access_token_ttl: Duration::from_secs(parse_env_or_default(
                "MARKETSTALL_ACCESS_TOKEN_TTL_SECS",
                "3600",
            )?),
            refresh_token_ttl: Duration::from_secs(parse_env_or_default(
                "MARKETSTALL_REFRESH_TOKEN_TTL_SECS",
                "2592000",
            )?),
            session_cache_ttl: Duration::from_secs(parse_env_or_default(
                "MARKETSTALL_SESSION_CACHE_TTL_SECS",
                "86400",
            )?),
            session_cache_capacity: parse_env_or_default(
                "MARKETSTALL_SESSION_CACHE_CAPACITY",
                "100000",
            )?,
            password_min_length: parse_env_or_default("MARKETSTALL_PASSWORD_MIN_LENGTH", "8")?,
            secure_cookies: parse_env_or_default("MARKETSTALL_SECURE_COOKIES", "true")?,
        })
    }
}

impl PaymentConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            api_base: get_env_or_default("STRIPE_API_BASE", "https://api.stripe.com"),
            secret_key: get_validated_secret("STRIPE_SECRET_KEY")?,
            currency: parse_env_or_default("MARKETSTALL_CURRENCY", "USD")?,
        })
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
    std::env::var(key).ok()
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse an environment variable (or its default) into `T`.
fn parse_env_or_default<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get_env_or_default(key, default)
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

/// Validate that a signing secret meets minimum length requirements.
fn validate_signing_secret(secret: &SecretString, var_name: &str) -> Result<(), ConfigError> {
    let value = secret.expose_secret();
    if value.len() < MIN_SIGNING_SECRET_LENGTH {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "must be at least {} characters (got {})",
                MIN_SIGNING_SECRET_LENGTH,
                value.len()
            ),
        ));
    }
    Ok(())
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.len() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use a randomly generated secret."
            ),
        ));
    }

    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn auth_config() -> AuthConfig {
        AuthConfig {
            token_secret: SecretString::from("k3Y!r8#Qz@1vLm^p7&Xw2*Nd5$Tg9%Hb"),
            access_token_ttl: Duration::from_secs(3600),
            refresh_token_ttl: Duration::from_secs(2_592_000),
            session_cache_ttl: Duration::from_secs(86_400),
            session_cache_capacity: 1000,
            password_min_length: 8,
            secure_cookies: true,
        }
    }

    #[test]
    fn test_shannon_entropy_bounds() {
        assert!((shannon_entropy("") - 0.0).abs() < f64::EPSILON);
        assert!((shannon_entropy("aaaaaaa") - 0.0).abs() < f64::EPSILON);
        assert!((shannon_entropy("ab") - 1.0).abs() < 0.01);
        assert!(shannon_entropy("aB3$xY9!mK2@nL5#") > MIN_ENTROPY_BITS_PER_CHAR);
    }

    #[test]
    fn test_placeholder_secrets_rejected() {
        for candidate in ["your-token-secret", "changeme123", "sk_test_example_key"] {
            let err = validate_secret_strength(candidate, "TEST_VAR").unwrap_err();
            assert!(matches!(err, ConfigError::InsecureSecret(_, _)));
        }
    }

    #[test]
    fn test_low_entropy_secret_rejected() {
        let result = validate_secret_strength(&"ab".repeat(20), "TEST_VAR");
        assert!(result.is_err());
    }

    #[test]
    fn test_signing_secret_length() {
        let short = SecretString::from("aB3$xY9!mK2@");
        assert!(validate_signing_secret(&short, "TEST_SECRET").is_err());
        assert!(validate_signing_secret(&auth_config().token_secret, "TEST_SECRET").is_ok());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let auth = format!("{:?}", auth_config());
        assert!(auth.contains("[REDACTED]"));
        assert!(!auth.contains("k3Y!r8"));

        let payments = PaymentConfig {
            api_base: "https://api.stripe.com".to_string(),
            secret_key: SecretString::from("sk_live_super_private_value"),
            currency: CurrencyCode::USD,
        };
        let debug_output = format!("{payments:?}");
        assert!(debug_output.contains("api.stripe.com"));
        assert!(!debug_output.contains("super_private"));
    }

    #[test]
    fn test_socket_addr() {
        let config = ServerConfig {
            database_url: SecretString::from("postgres://localhost/marketstall"),
            host: "127.0.0.1".parse().unwrap(),
            port: 3000,
            auth: auth_config(),
            payments: PaymentConfig {
                api_base: "https://api.stripe.com".to_string(),
                secret_key: SecretString::from("sk"),
                currency: CurrencyCode::USD,
            },
            sentry_dsn: None,
            sentry_environment: None,
        };

        let addr = config.socket_addr();
        assert_eq!(addr.ip().to_string(), "127.0.0.1");
        assert_eq!(addr.port(), 3000);
    }
}

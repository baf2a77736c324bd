//! Storefront configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `STOREFRONT_BASE_URL` - Public URL for the storefront
//! - `CATALOG_WEBAPP_BASE` - Base URL of the catalog/signing web app
//!   (no trailing slash; `?action=catalog` and `?action=sign` are derived)
//!
//! ## Optional
//! - `STOREFRONT_HOST` - Bind address (default: 127.0.0.1)
//! - `STOREFRONT_PORT` - Listen port (default: 3000)
//! - `STOREFRONT_BRAND` - Brand name shown to the gateway (default: StudyHub)
//! - `STOREFRONT_CURRENCY` - ISO 4217 currency code (default: ZAR)
//! - `STOREFRONT_WHATSAPP` - WhatsApp contact number (dial prefix + number)
//! - `CATALOG_STATIC_URL` - Direct-GET catalog source; when set the catalog
//!   is fetched with a plain HTTP GET instead of the bridged web app call
//! - `PAYFAST_MODE` - `live` or `sandbox` (default: sandbox)
//! - `PAYFAST_MERCHANT_ID` - Merchant account id (fallback handoff field)
//! - `PAYFAST_MERCHANT_KEY` - Merchant key (fallback handoff field, secret)
//! - `PAYFAST_RETURN_URL` / `PAYFAST_CANCEL_URL` - Buyer redirect targets
//!   (default: `{base_url}/cart?status=success|cancel`)
//! - `PAYFAST_NOTIFY_URL` - ITN target (default: the catalog web app base)
//! - `DIAL_PREFIX` - International prefix replacing a leading local 0
//!   (default: 27)
//! - `SENTRY_DSN` - Sentry error tracking DSN

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.0;

/// Blocklist of common placeholder patterns (case-insensitive).
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "replace_me",
    "changeme",
    "placeholder",
    "example",
    "your-",
    "xxx",
    "todo",
    "fixme",
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

/// Storefront application configuration.
#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL for the storefront
    pub base_url: String,
    /// Brand name sent to the payment gateway (`name_last` field)
    pub brand: String,
    /// ISO 4217 currency code
    pub currency: String,
    /// WhatsApp contact number, dial prefix + number, no `+` or spaces
    pub whatsapp_number: Option<String>,
    /// Catalog provider configuration
    pub catalog: CatalogConfig,
    /// PayFast gateway configuration
    pub payfast: PayfastConfig,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
}

/// Catalog provider configuration.
#[derive(Debug, Clone)]
pub struct CatalogConfig {
    /// Web app base URL; catalog and signing endpoints are derived from it
    pub webapp_base: String,
    /// Direct-GET catalog source, bypassing the bridged web app call
    pub static_url: Option<String>,
}

impl CatalogConfig {
    /// Bridged catalog endpoint (`?action=catalog`).
    #[must_use]
    pub fn catalog_endpoint(&self) -> String {
        format!("{}?action=catalog", self.webapp_base)
    }

    /// Signing endpoint (`?action=sign`).
    #[must_use]
    pub fn sign_endpoint(&self) -> String {
        format!("{}?action=sign", self.webapp_base)
    }
}

/// PayFast processing mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PayfastMode {
    Live,
    #[default]
    Sandbox,
}

impl PayfastMode {
    /// The fixed process endpoint for this mode.
    #[must_use]
    pub const fn process_url(self) -> &'static str {
        match self {
            Self::Live => "https://www.payfast.co.za/eng/process",
            Self::Sandbox => "https://sandbox.payfast.co.za/eng/process",
        }
    }
}

/// PayFast gateway configuration.
///
/// Implements `Debug` manually to redact the merchant key.
#[derive(Clone)]
pub struct PayfastConfig {
    /// Live or sandbox process endpoint selection
    pub mode: PayfastMode,
    /// Merchant account id, used when the signer's params omit it
    pub merchant_id: Option<String>,
    /// Merchant key, used when the signer's params omit it
    pub merchant_key: Option<SecretString>,
    /// Buyer redirect target after successful payment
    pub return_url: String,
    /// Buyer redirect target after cancelled payment
    pub cancel_url: String,
    /// Server-to-server payment notification target
    pub notify_url: String,
    /// International dialing prefix substituted for a leading local 0
    pub dial_prefix: String,
}

impl std::fmt::Debug for PayfastConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PayfastConfig")
            .field("mode", &self.mode)
            .field("merchant_id", &self.merchant_id)
            .field(
                "merchant_key",
                &self.merchant_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("return_url", &self.return_url)
            .field("cancel_url", &self.cancel_url)
            .field("notify_url", &self.notify_url)
            .field("dial_prefix", &self.dial_prefix)
            .finish()
    }
}

impl StorefrontConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if the merchant key fails validation (placeholder detection, entropy
    /// check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let host = get_env_or_default("STOREFRONT_HOST", "127.0.0.1")
            .parse::<IpAddr>()
            .map_err(|e| {
                ConfigError::InvalidEnvVar("STOREFRONT_HOST".to_string(), e.to_string())
            })?;
        let port = get_env_or_default("STOREFRONT_PORT", "3000")
            .parse::<u16>()
            .map_err(|e| {
                ConfigError::InvalidEnvVar("STOREFRONT_PORT".to_string(), e.to_string())
            })?;
        let base_url = get_required_env("STOREFRONT_BASE_URL")?;
        let brand = get_env_or_default("STOREFRONT_BRAND", "StudyHub");
        let currency = get_env_or_default("STOREFRONT_CURRENCY", "ZAR");
        let whatsapp_number = get_optional_env("STOREFRONT_WHATSAPP");

        let catalog = CatalogConfig {
            webapp_base: get_required_env("CATALOG_WEBAPP_BASE")?,
            static_url: get_optional_env("CATALOG_STATIC_URL"),
        };

        let payfast = PayfastConfig::from_env(&base_url, &catalog.webapp_base)?;
        let sentry_dsn = get_optional_env("SENTRY_DSN");

        Ok(Self {
            host,
            port,
            base_url,
            brand,
            currency,
            whatsapp_number,
            catalog,
            payfast,
            sentry_dsn,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl PayfastConfig {
    fn from_env(base_url: &str, webapp_base: &str) -> Result<Self, ConfigError> {
        let mode = match get_env_or_default("PAYFAST_MODE", "sandbox").as_str() {
            "live" => PayfastMode::Live,
            "sandbox" => PayfastMode::Sandbox,
            other => {
                return Err(ConfigError::InvalidEnvVar(
                    "PAYFAST_MODE".to_string(),
                    format!("expected 'live' or 'sandbox', got '{other}'"),
                ));
            }
        };

        let merchant_key = match get_optional_env("PAYFAST_MERCHANT_KEY") {
            Some(value) => {
                validate_secret_strength(&value, "PAYFAST_MERCHANT_KEY")?;
                Some(SecretString::from(value))
            }
            None => None,
        };

        Ok(Self {
            mode,
            merchant_id: get_optional_env("PAYFAST_MERCHANT_ID"),
            merchant_key,
            return_url: get_optional_env("PAYFAST_RETURN_URL")
                .unwrap_or_else(|| format!("{base_url}/cart?status=success")),
            cancel_url: get_optional_env("PAYFAST_CANCEL_URL")
                .unwrap_or_else(|| format!("{base_url}/cart?status=cancel")),
            notify_url: get_optional_env("PAYFAST_NOTIFY_URL")
                .unwrap_or_else(|| webapp_base.to_string()),
            dial_prefix: get_env_or_default("DIAL_PREFIX", "27"),
        })
    }

    /// Expose the merchant key for handoff-field construction.
    #[must_use]
    pub fn merchant_key_value(&self) -> Option<String> {
        self.merchant_key
            .as_ref()
            .map(|key| key.expose_secret().to_string())
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get an optional environment variable; empty values count as unset.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
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
            #[allow(clippy::cast_precision_loss)]
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
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use the real merchant key."
            ),
        ));
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn process_url_follows_mode() {
        assert_eq!(
            PayfastMode::Sandbox.process_url(),
            "https://sandbox.payfast.co.za/eng/process"
        );
        assert_eq!(
            PayfastMode::Live.process_url(),
            "https://www.payfast.co.za/eng/process"
        );
    }

    #[test]
    fn derived_endpoints_append_action() {
        let catalog = CatalogConfig {
            webapp_base: "https://script.example.com/exec".to_string(),
            static_url: None,
        };
        assert_eq!(
            catalog.catalog_endpoint(),
            "https://script.example.com/exec?action=catalog"
        );
        assert_eq!(
            catalog.sign_endpoint(),
            "https://script.example.com/exec?action=sign"
        );
    }

    #[test]
    fn placeholder_merchant_key_is_rejected() {
        let result = validate_secret_strength("REPLACE_ME", "PAYFAST_MERCHANT_KEY");
        assert!(matches!(result, Err(ConfigError::InsecureSecret(_, _))));
    }

    #[test]
    fn low_entropy_merchant_key_is_rejected() {
        let result = validate_secret_strength("aaaaaaaaaaaaaaaa", "PAYFAST_MERCHANT_KEY");
        assert!(matches!(result, Err(ConfigError::InsecureSecret(_, _))));
    }

    #[test]
    fn realistic_merchant_key_passes() {
        assert!(validate_secret_strength("46f0cd694581a", "PAYFAST_MERCHANT_KEY").is_ok());
    }

    #[test]
    fn payfast_debug_redacts_merchant_key() {
        let config = PayfastConfig {
            mode: PayfastMode::Sandbox,
            merchant_id: Some("10000100".to_string()),
            merchant_key: Some(SecretString::from("46f0cd694581a")),
            return_url: "https://shop.example/cart?status=success".to_string(),
            cancel_url: "https://shop.example/cart?status=cancel".to_string(),
            notify_url: "https://script.example.com/exec".to_string(),
            dial_prefix: "27".to_string(),
        };
        let debug_output = format!("{config:?}");
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("46f0cd694581a"));
    }
}

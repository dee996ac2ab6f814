//! Application configuration loaded from environment variables.
//!
//! # Configuration Hierarchy
//!
//! All configuration is loaded from environment variables with sensible defaults
//! for development. In production, configure via environment variables or a `.env` file.
//!
//! # Security Configuration
//!
//! - `BASIC_AUTH_USERNAME` / `BASIC_AUTH_PASSWORD`: When both are set, `/v0` routes
//!   require HTTP basic authentication
//! - `FORCE_HTTPS`: Redirect requests not forwarded as `https` (default: false)
//! - `TLS_CERT_PATH` / `TLS_KEY_PATH` / `TLS_CA_PATH`: Serve mutual TLS directly
//!
//! # Observability
//!
//! - `LOG_ROUTE_PREFIX`: Requests whose URL starts with this are audit-logged (default: `/v0`)
//! - `LOG_COMPONENT`: Component name attached to middleware log events
//! - `MAX_LOGGED_BODY_SIZE`: Largest request body accepted on audit-logged routes,
//!   and most response bytes kept per record (default: 10MB)
//! - `RUST_LOG`: Log filter (default: `info`), also read from `.env`

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

use crate::client::ClientSettings;
use crate::error::{AppError, AppResult};
use crate::middleware::logging::DEFAULT_MAX_BODY_SIZE;

/// Application configuration loaded from environment variables.
///
/// # Example
///
/// ```rust,ignore
/// let config = Config::from_env()?;
/// println!("Server will listen on {}", config.server_addr());
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Server host address (default: "0.0.0.0")
    pub host: String,

    /// Server port (default: 3000)
    pub port: u16,

    // =========================================================================
    // Security Configuration
    // =========================================================================
    /// Basic auth username; must be set together with the password
    pub basic_auth_username: Option<String>,

    /// Basic auth password
    pub basic_auth_password: Option<String>,

    /// Redirect plain HTTP requests to HTTPS (default: false)
    pub force_https: bool,

    /// PEM certificate chain served to clients
    pub tls_cert_path: Option<PathBuf>,

    /// PEM private key for `tls_cert_path`
    pub tls_key_path: Option<PathBuf>,

    /// PEM CA bundle trusted for client certificates
    pub tls_ca_path: Option<PathBuf>,

    // =========================================================================
    // HTTP Client Configuration
    // =========================================================================
    /// Overall timeout for outbound requests (default: 30 seconds)
    pub client_timeout: Duration,

    // =========================================================================
    // Observability Configuration
    // =========================================================================
    /// URL prefix selecting requests for the audit log (default: "/v0")
    pub log_route_prefix: String,

    /// Component name attached to middleware log events
    pub log_component: String,

    /// Body size cap for audit-logged routes, in bytes (default: 10MB)
    pub max_logged_body_size: usize,

    /// Log filter directives (e.g., "info", "hardened_http=debug")
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables with sensible defaults.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if any value cannot be parsed or the
    /// combination is inconsistent (see [`Config::validate`]).
    pub fn from_env() -> AppResult<Self> {
        // Load an .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let config = Self {
            // Server
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: Self::parse_env("PORT", 3000)?,

            // Security
            basic_auth_username: Self::optional_env("BASIC_AUTH_USERNAME"),
            basic_auth_password: Self::optional_env("BASIC_AUTH_PASSWORD"),
            force_https: Self::parse_env("FORCE_HTTPS", false)?,
            tls_cert_path: Self::optional_env("TLS_CERT_PATH").map(PathBuf::from),
            tls_key_path: Self::optional_env("TLS_KEY_PATH").map(PathBuf::from),
            tls_ca_path: Self::optional_env("TLS_CA_PATH").map(PathBuf::from),

            // HTTP client
            client_timeout: Duration::from_secs(Self::parse_env("CLIENT_TIMEOUT_SECS", 30)?),

            // Observability
            log_route_prefix: env::var("LOG_ROUTE_PREFIX").unwrap_or_else(|_| "/v0".to_string()),
            log_component: env::var("LOG_COMPONENT")
                .unwrap_or_else(|_| env!("CARGO_PKG_NAME").to_string()),
            max_logged_body_size: Self::parse_env("MAX_LOGGED_BODY_SIZE", DEFAULT_MAX_BODY_SIZE)?,
            log_level: env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        };

        // Validate configuration before returning
        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values for consistency and correctness.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if validation fails.
    pub fn validate(&self) -> AppResult<()> {
        if self.basic_auth_username.is_some() != self.basic_auth_password.is_some() {
            return Err(AppError::ConfigError(
                "BASIC_AUTH_USERNAME and BASIC_AUTH_PASSWORD must be set together".to_string(),
            ));
        }

        let tls_paths_set = [&self.tls_cert_path, &self.tls_key_path, &self.tls_ca_path]
            .iter()
            .filter(|p| p.is_some())
            .count();
        if tls_paths_set != 0 && tls_paths_set != 3 {
            return Err(AppError::ConfigError(
                "TLS_CERT_PATH, TLS_KEY_PATH and TLS_CA_PATH must be set together".to_string(),
            ));
        }

        if !self.log_route_prefix.starts_with('/') {
            return Err(AppError::ConfigError(format!(
                "LOG_ROUTE_PREFIX must start with '/': {:?}",
                self.log_route_prefix
            )));
        }

        if self.client_timeout.is_zero() {
            return Err(AppError::ConfigError(
                "CLIENT_TIMEOUT_SECS must be greater than 0".to_string(),
            ));
        }

        if self.max_logged_body_size == 0 {
            return Err(AppError::ConfigError(
                "MAX_LOGGED_BODY_SIZE must be greater than 0".to_string(),
            ));
        }

        self.env_filter()?;

        Ok(())
    }

    /// Get the full server address for binding.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if basic authentication is enabled.
    pub fn auth_enabled(&self) -> bool {
        self.basic_auth_username.is_some() && self.basic_auth_password.is_some()
    }

    /// Check if the server terminates mutual TLS itself.
    pub fn tls_enabled(&self) -> bool {
        self.tls_paths().is_some()
    }

    /// Certificate, key and CA paths, when all three are configured.
    pub fn tls_paths(&self) -> Option<(&PathBuf, &PathBuf, &PathBuf)> {
        Some((
            self.tls_cert_path.as_ref()?,
            self.tls_key_path.as_ref()?,
            self.tls_ca_path.as_ref()?,
        ))
    }

    /// Tracing filter built from [`Config::log_level`].
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if the directives do not parse.
    pub fn env_filter(&self) -> AppResult<EnvFilter> {
        EnvFilter::try_new(&self.log_level)
            .map_err(|e| AppError::ConfigError(format!("Invalid RUST_LOG: {e}")))
    }

    /// Settings for [`ClientFactory`](crate::client::ClientFactory).
    pub fn client_settings(&self) -> ClientSettings {
        ClientSettings {
            timeout: self.client_timeout,
            ..ClientSettings::default()
        }
    }

    /// Parse an environment variable into the specified type with a default value.
    fn parse_env<T>(name: &str, default: T) -> AppResult<T>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        match env::var(name) {
            Ok(val) => val
                .trim()
                .parse()
                .map_err(|e| AppError::ConfigError(format!("Invalid {name}: {e}"))),
            Err(_) => Ok(default),
        }
    }

    /// Read an environment variable, treating empty as unset.
    fn optional_env(name: &str) -> Option<String> {
        env::var(name).ok().filter(|v| !v.is_empty())
    }
}

/// Default configuration for testing and development.
///
/// Production deployments should use `Config::from_env()` instead.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Server
            host: "0.0.0.0".to_string(),
            port: 3000,
            // Security
            basic_auth_username: None,
            basic_auth_password: None,
            force_https: false,
            tls_cert_path: None,
            tls_key_path: None,
            tls_ca_path: None,
            // HTTP client
            client_timeout: Duration::from_secs(30),
            // Observability
            log_route_prefix: "/v0".to_string(),
            log_component: env!("CARGO_PKG_NAME").to_string(),
            max_logged_body_size: DEFAULT_MAX_BODY_SIZE, // 10MB
            log_level: "info".to_string(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        let config = Config::default();

        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.log_route_prefix, "/v0");
        assert_eq!(config.client_timeout, Duration::from_secs(30));
        assert_eq!(config.max_logged_body_size, 10 * 1024 * 1024);
        assert_eq!(config.log_level, "info");
        assert!(!config.force_https);
        assert!(!config.auth_enabled());
        assert!(!config.tls_enabled());
    }

    #[test]
    fn test_server_addr_format() {
        let config = Config {
            host: "localhost".to_string(),
            port: 3000,
            ..Config::default()
        };

        assert_eq!(config.server_addr(), "localhost:3000");
    }

    #[test]
    fn test_auth_enabled() {
        let config = Config {
            basic_auth_username: Some("admin".to_string()),
            basic_auth_password: Some("secret".to_string()),
            ..Config::default()
        };
        assert!(config.auth_enabled());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_partial_credentials() {
        let config = Config {
            basic_auth_username: Some("admin".to_string()),
            ..Config::default()
        };

        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("BASIC_AUTH_PASSWORD"));
    }

    #[test]
    fn test_validate_partial_tls_paths() {
        let config = Config {
            tls_cert_path: Some(PathBuf::from("cert.pem")),
            tls_key_path: Some(PathBuf::from("key.pem")),
            ..Config::default()
        };

        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("TLS_CA_PATH"));
        assert!(!config.tls_enabled());
    }

    #[test]
    fn test_tls_paths_all_set() {
        let config = Config {
            tls_cert_path: Some(PathBuf::from("cert.pem")),
            tls_key_path: Some(PathBuf::from("key.pem")),
            tls_ca_path: Some(PathBuf::from("ca.pem")),
            ..Config::default()
        };

        assert!(config.validate().is_ok());
        let (cert, key, ca) = config.tls_paths().unwrap();
        assert_eq!(cert, &PathBuf::from("cert.pem"));
        assert_eq!(key, &PathBuf::from("key.pem"));
        assert_eq!(ca, &PathBuf::from("ca.pem"));
    }

    #[test]
    fn test_validate_route_prefix() {
        let config = Config {
            log_route_prefix: "v0".to_string(),
            ..Config::default()
        };

        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("LOG_ROUTE_PREFIX"));
    }

    #[test]
    fn test_validate_zero_timeout() {
        let config = Config {
            client_timeout: Duration::ZERO,
            ..Config::default()
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_zero_body_size() {
        let config = Config {
            max_logged_body_size: 0,
            ..Config::default()
        };

        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("MAX_LOGGED_BODY_SIZE"));
    }

    #[test]
    fn test_validate_log_level() {
        let config = Config {
            log_level: "hardened_http=debug,info".to_string(),
            ..Config::default()
        };
        assert!(config.validate().is_ok());
        assert!(config.env_filter().is_ok());

        let config = Config {
            log_level: "hardened_http=loud".to_string(),
            ..Config::default()
        };
        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("RUST_LOG"));
    }

    #[test]
    fn test_client_settings_carry_timeout() {
        let config = Config {
            client_timeout: Duration::from_secs(5),
            ..Config::default()
        };

        assert_eq!(config.client_settings().timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_validate_valid_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }
}

//! Configuration loading
//!
//! Config file path resolution follows a priority order:
//! 1. Command-line argument (highest priority)
//! 2. `CASEHUB_CONFIG` environment variable
//! 3. Compiled default (`casehub.toml` in the working directory)
//!
//! Gateway secrets may additionally be overridden from the environment so
//! they never have to live in the config file.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Default number of free sessions unlocked for anonymous callers
pub const DEFAULT_FREE_SESSION_LIMIT: usize = 2;

/// Top-level service configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub access: AccessConfig,
    #[serde(default)]
    pub razorpay: RazorpayConfig,
    #[serde(default)]
    pub paypal: PaypalConfig,
}

/// HTTP server and database settings
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_db_path")]
    pub database_path: PathBuf,
    /// Base URL the payment capture flow redirects back to
    #[serde(default = "default_frontend_url")]
    pub frontend_url: String,
}

/// Tiered access-control tuning
#[derive(Debug, Clone, Deserialize)]
pub struct AccessConfig {
    /// Free sessions unlocked for guests; logged-in users get this + 3
    #[serde(default = "default_free_limit")]
    pub free_session_limit: usize,
}

/// Razorpay gateway credentials
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RazorpayConfig {
    #[serde(default)]
    pub key_id: String,
    #[serde(default)]
    pub key_secret: String,
    #[serde(default)]
    pub webhook_secret: String,
}

/// PayPal gateway credentials
#[derive(Debug, Clone, Deserialize)]
pub struct PaypalConfig {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    /// "live" or "sandbox" (default)
    #[serde(default = "default_paypal_mode")]
    pub mode: String,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5810
}

fn default_db_path() -> PathBuf {
    PathBuf::from("casehub.db")
}

fn default_frontend_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_free_limit() -> usize {
    DEFAULT_FREE_SESSION_LIMIT
}

fn default_paypal_mode() -> String {
    "sandbox".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            database_path: default_db_path(),
            frontend_url: default_frontend_url(),
        }
    }
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            free_session_limit: default_free_limit(),
        }
    }
}

impl Default for PaypalConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            mode: default_paypal_mode(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            access: AccessConfig::default(),
            razorpay: RazorpayConfig::default(),
            paypal: PaypalConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration with priority-order path resolution
    ///
    /// A missing config file is not an error; defaults apply and environment
    /// overrides are still honored.
    pub fn load(cli_path: Option<&Path>) -> Result<Config> {
        let path = resolve_config_path(cli_path);

        let mut config = match path {
            Some(ref p) if p.exists() => {
                let contents = std::fs::read_to_string(p)?;
                toml::from_str::<Config>(&contents)
                    .map_err(|e| Error::Config(format!("{}: {}", p.display(), e)))?
            }
            _ => Config::default(),
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Override gateway secrets from the environment when set
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("RAZORPAY_KEY_ID") {
            self.razorpay.key_id = v;
        }
        if let Ok(v) = std::env::var("RAZORPAY_KEY_SECRET") {
            self.razorpay.key_secret = v;
        }
        if let Ok(v) = std::env::var("RAZORPAY_WEBHOOK_SECRET") {
            self.razorpay.webhook_secret = v;
        }
        if let Ok(v) = std::env::var("PAYPAL_CLIENT_ID") {
            self.paypal.client_id = v;
        }
        if let Ok(v) = std::env::var("PAYPAL_CLIENT_SECRET") {
            self.paypal.client_secret = v;
        }
        if let Ok(v) = std::env::var("PAYPAL_MODE") {
            self.paypal.mode = v;
        }
    }
}

/// Resolve config file path: CLI arg, then env var, then compiled default
fn resolve_config_path(cli_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(p) = cli_path {
        return Some(p.to_path_buf());
    }
    if let Ok(p) = std::env::var("CASEHUB_CONFIG") {
        return Some(PathBuf::from(p));
    }
    Some(PathBuf::from("casehub.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_file_missing() {
        let config = Config::load(Some(Path::new("/nonexistent/casehub.toml"))).unwrap();
        assert_eq!(config.server.port, 5810);
        assert_eq!(config.access.free_session_limit, 2);
        assert_eq!(config.paypal.mode, "sandbox");
    }

    #[test]
    fn test_load_from_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("casehub.toml");
        std::fs::write(
            &path,
            r#"
[server]
host = "0.0.0.0"
port = 8080

[access]
free_session_limit = 4

[razorpay]
key_id = "rzp_test_key"
"#,
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.access.free_session_limit, 4);
        assert_eq!(config.razorpay.key_id, "rzp_test_key");
        // Unset sections fall back to defaults
        assert_eq!(config.server.frontend_url, "http://localhost:3000");
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("casehub.toml");
        std::fs::write(&path, "[server\nport = oops").unwrap();

        let err = Config::load(Some(&path)).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}

// ⚙️ Configuration - TOML file with defaults for every section
//
// A missing file is not an error: every field has a default, so an empty
// config behaves like a local development setup.

use crate::error::{AdminError, Result};
use crate::token::AdminTokenSigner;
use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable that overrides `auth.token_secret`
pub const TOKEN_SECRET_ENV: &str = "DIVISION_ADMIN_TOKEN_SECRET";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite database file
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address for the HTTP server
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Public origin used to build program registration URLs
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HMAC secret for admin tokens (at least 32 bytes)
    #[serde(default)]
    pub token_secret: String,

    /// Lifetime of issued admin tokens
    #[serde(default = "default_token_ttl")]
    pub token_ttl_secs: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// Offset applied to timestamps in exports (IST by default)
    #[serde(default = "default_utc_offset")]
    pub utc_offset_minutes: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// tracing EnvFilter directive, RUST_LOG wins when set
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

// Defaults
fn default_db_path() -> PathBuf { PathBuf::from("division-admin.db") }
fn default_bind() -> String { "0.0.0.0:3000".to_string() }
fn default_public_base_url() -> String { "http://localhost:3000".to_string() }
fn default_token_ttl() -> i64 { 8 * 60 * 60 }
fn default_utc_offset() -> i32 { 330 }
fn default_log_filter() -> String { "info".to_string() }

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: default_db_path() }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            public_base_url: default_public_base_url(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_secret: String::new(),
            token_ttl_secs: default_token_ttl(),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self { utc_offset_minutes: default_utc_offset() }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { filter: default_log_filter() }
    }
}

impl DisplayConfig {
    pub fn offset(&self) -> Result<FixedOffset> {
        self.utc_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .ok_or_else(|| {
                AdminError::Config(format!("utc_offset_minutes out of range: {}", self.utc_offset_minutes))
            })
    }
}

impl LoggingConfig {
    /// Install the global fmt subscriber. RUST_LOG overrides the configured filter.
    pub fn init_tracing(&self) {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&self.filter));

        // A second init (tests, embedding) keeps the first subscriber
        let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
    }
}

impl AuthConfig {
    pub fn signer(&self) -> Result<AdminTokenSigner> {
        let ttl = u64::try_from(self.token_ttl_secs).map_err(|_| {
            AdminError::Config(format!("token_ttl_secs must not be negative: {}", self.token_ttl_secs))
        })?;
        AdminTokenSigner::new(self.token_secret.as_bytes(), ttl)
    }
}

impl Config {
    /// Parse a TOML document
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| AdminError::Config(e.to_string()))
    }

    /// Load from file, falling back to defaults when the file does not exist.
    /// The token secret environment variable always wins over the file.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(path)
                .map_err(|e| AdminError::Config(format!("{}: {}", path.display(), e)))?;
            Self::from_toml(&text)?
        } else {
            tracing::info!("Config file {} not found, using defaults", path.display());
            Self::default()
        };

        if let Ok(secret) = std::env::var(TOKEN_SECRET_ENV) {
            config.auth.token_secret = secret;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.server.bind, "0.0.0.0:3000");
        assert_eq!(config.display.utc_offset_minutes, 330);
        assert_eq!(config.auth.token_ttl_secs, 8 * 60 * 60);
        assert_eq!(config.database.path, PathBuf::from("division-admin.db"));
    }

    #[test]
    fn test_partial_section() {
        let config = Config::from_toml(
            "[server]\nbind = \"127.0.0.1:8080\"\n\n[display]\nutc_offset_minutes = 0\n",
        )
        .unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:8080");
        assert_eq!(config.server.public_base_url, "http://localhost:3000");
        assert_eq!(config.display.offset().unwrap().local_minus_utc(), 0);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = Config::from_toml("[server\nbind = 1").unwrap_err();
        assert!(matches!(err, AdminError::Config(_)));
    }

    #[test]
    fn test_out_of_range_offset() {
        let display = DisplayConfig { utc_offset_minutes: 100_000 };
        assert!(display.offset().is_err());

        let config = Config::from_toml("[display]\nutc_offset_minutes = 40000000").unwrap();
        assert!(matches!(config.display.offset(), Err(AdminError::Config(_))));

        let display = DisplayConfig { utc_offset_minutes: i32::MIN };
        assert!(display.offset().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[database]\npath = \"/tmp/admin.db\"").unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.database.path, PathBuf::from("/tmp/admin.db"));
    }

    #[test]
    fn test_signer_requires_secret() {
        let mut auth = AuthConfig::default();
        assert!(auth.signer().is_err());

        auth.token_secret = "x".repeat(32);
        assert!(auth.signer().is_ok());

        auth.token_ttl_secs = -1;
        assert!(auth.signer().is_err());
    }

    #[test]
    fn test_load_missing_file_defaults() {
        let config = Config::load(Path::new("/nonexistent/division-admin.toml")).unwrap();
        assert_eq!(config.logging.filter, "info");
    }
}

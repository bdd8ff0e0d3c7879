//! Application configuration.
//!
//! [`AppConfig::load`] reads `config/config.toml` (optional) and then `ADUMUO__*`
//! environment variables, e.g. `ADUMUO__DATABASE__URL` or
//! `ADUMUO__ALLOCATION__MAX_ATTEMPTS`. A bare `DATABASE_URL` is honored when no
//! database URL is configured otherwise.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

pub use crate::pool::config::{normalize_database_url, DatabaseConfig};

const CONFIG_FILE: &str = "config/config.toml";
const ENV_PREFIX: &str = "ADUMUO";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub allocation: AllocationConfig,
    #[serde(default)]
    pub access: AccessConfig,
    #[serde(default)]
    pub listing: ListingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AllocationConfig {
    /// Attempts per creation before a reference-code collision is surfaced.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for AllocationConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
        }
    }
}

fn default_max_attempts() -> u32 {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccessConfig {
    #[serde(default = "default_admin_username")]
    pub admin_username: String,
    /// Password login is disabled while this is unset.
    #[serde(default)]
    pub admin_password: Option<String>,
    #[serde(default = "default_session_ttl_minutes")]
    pub session_ttl_minutes: i64,
    /// Long-lived staff tokens, stored as SHA-256 hex digests.
    #[serde(default)]
    pub admin_tokens: Vec<AdminTokenConfig>,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            admin_username: default_admin_username(),
            admin_password: None,
            session_ttl_minutes: default_session_ttl_minutes(),
            admin_tokens: Vec::new(),
        }
    }
}

fn default_admin_username() -> String {
    "admin".to_string()
}

fn default_session_ttl_minutes() -> i64 {
    60
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdminTokenConfig {
    pub principal: String,
    pub sha256: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListingConfig {
    #[serde(default = "default_limit")]
    pub default_limit: u64,
    #[serde(default = "default_max_limit")]
    pub max_limit: u64,
}

impl Default for ListingConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            max_limit: default_max_limit(),
        }
    }
}

fn default_limit() -> u64 {
    100
}

fn default_max_limit() -> u64 {
    1000
}

impl AppConfig {
    /// Load the configuration from `config/config.toml`, falling back to env vars.
    pub fn load() -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(File::with_name(CONFIG_FILE).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

        let settings = match builder.build() {
            Ok(cfg) => cfg,
            Err(err) => {
                // The file existed but could not be read or parsed
                log::warn!("failed to load {CONFIG_FILE}, falling back to env: {err}");
                Config::builder()
                    .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
                    .build()
                    .map_err(|env_err| {
                        ConfigError::Message(format!(
                            "Failed to load configuration from file and env: {err}, then env-only error: {env_err}"
                        ))
                    })?
            }
        };

        let url_configured = settings.get_string("database.url").is_ok();
        let mut app_config: AppConfig = settings.try_deserialize().map_err(|e| {
            ConfigError::Message(format!("Configuration could not be deserialized: {e}"))
        })?;

        if !url_configured {
            if let Ok(url) = std::env::var("DATABASE_URL") {
                app_config.database.url = url;
            }
        }
        app_config.database.url = normalize_database_url(&app_config.database.url);

        Ok(app_config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.database.max_connections, 10);
        assert_eq!(cfg.database.pool_timeout_seconds, 30);
        assert_eq!(cfg.allocation.max_attempts, 5);
        assert_eq!(cfg.access.admin_username, "admin");
        assert!(cfg.access.admin_password.is_none());
        assert_eq!(cfg.listing.default_limit, 100);
        assert_eq!(cfg.listing.max_limit, 1000);
    }

    #[test]
    fn test_deserialize_partial_toml() {
        let settings = Config::builder()
            .add_source(config::File::from_str(
                r#"
                [allocation]
                max_attempts = 3

                [access]
                admin_password = "s3cret"

                [[access.admin_tokens]]
                principal = "ops"
                sha256 = "abc123"
                "#,
                config::FileFormat::Toml,
            ))
            .build()
            .expect("valid toml");

        let cfg: AppConfig = settings.try_deserialize().expect("deserializes");
        assert_eq!(cfg.allocation.max_attempts, 3);
        assert_eq!(cfg.access.admin_password.as_deref(), Some("s3cret"));
        assert_eq!(cfg.access.admin_tokens.len(), 1);
        assert_eq!(cfg.access.admin_tokens[0].principal, "ops");
        assert_eq!(cfg.database.max_connections, 10);
        assert_eq!(cfg.listing.max_limit, 1000);
    }
}

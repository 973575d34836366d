//! Configuration module for billflow-server.
//!
//! Handles loading configuration from TOML files, CLI arguments,
//! and environment variables.

pub mod file;
pub mod runtime;

use crate::config::file::FileConfig;
use crate::config::runtime::{
    NotificationsConfig, PaymentsConfig, RateLimitConfig, ServerConfig, SharedConfig,
};
use billflow_core::events::ChannelSettings;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("DATABASE_URL environment variable not set")]
    MissingDatabaseUrl,
}

/// Loaded configuration result containing all parts.
#[derive(Debug)]
pub struct LoadedConfig {
    pub server: ServerConfig,
    pub payments: PaymentsConfig,
    pub channels: ChannelSettings,
    pub rate_limit: RateLimitConfig,
    pub expiry_interval_hours: u64,
    pub notifications: NotificationsConfig,
}

impl LoadedConfig {
    /// Split off the reloadable sections into a [`SharedConfig`].
    pub fn shared(&self) -> SharedConfig {
        SharedConfig {
            payments: Arc::new(RwLock::new(self.payments.clone())),
            rate_limit: Arc::new(RwLock::new(self.rate_limit)),
        }
    }
}

/// Configuration loader that handles the complete loading process.
pub struct ConfigLoader {
    config_path: std::path::PathBuf,
    listen_override: Option<SocketAddr>,
    secret_override: Option<String>,
}

impl ConfigLoader {
    /// Create a new config loader.
    ///
    /// `secret_override` comes from the `BILLFLOW_WEBHOOK_SECRET` environment
    /// variable and wins over the file on every load.
    pub fn new(
        config_path: impl AsRef<Path>,
        listen_override: Option<SocketAddr>,
        secret_override: Option<String>,
    ) -> Self {
        Self {
            config_path: config_path.as_ref().to_path_buf(),
            listen_override,
            secret_override,
        }
    }

    /// Load and process the configuration.
    ///
    /// This will:
    /// 1. Read the TOML file
    /// 2. Apply CLI and environment overrides
    /// 3. Validate the configuration
    /// 4. Build the loaded configuration
    pub fn load(&self) -> Result<LoadedConfig, ConfigError> {
        let config_content = std::fs::read_to_string(&self.config_path)?;
        self.load_from_str(&config_content)
    }

    /// Reload the configuration (used during SIGHUP).
    pub fn reload(&self) -> Result<LoadedConfig, ConfigError> {
        self.load()
    }

    fn load_from_str(&self, config_content: &str) -> Result<LoadedConfig, ConfigError> {
        let mut file_config: FileConfig = toml::from_str(config_content)?;

        if let Some(listen) = self.listen_override {
            file_config.server.listen = listen;
        }
        if let Some(secret) = &self.secret_override {
            file_config.payments.webhook_secret = Some(secret.clone());
        }

        validate(&file_config)?;
        Ok(build_loaded_config(file_config))
    }
}

fn validate(config: &FileConfig) -> Result<(), ConfigError> {
    if config.rate_limit.permit_limit == 0 {
        return Err(ConfigError::ValidationError(
            "rate_limit.permit_limit must be greater than zero".to_string(),
        ));
    }
    if config.rate_limit.window_secs == 0 {
        return Err(ConfigError::ValidationError(
            "rate_limit.window_secs must be greater than zero".to_string(),
        ));
    }
    if let Some(url) = &config.notifications.relay_url
        && !matches!(url.scheme(), "http" | "https")
    {
        return Err(ConfigError::ValidationError(format!(
            "notifications.relay_url must be http or https, got {}",
            url.scheme()
        )));
    }
    Ok(())
}

fn build_loaded_config(file_config: FileConfig) -> LoadedConfig {
    let webhook_secret = file_config
        .payments
        .webhook_secret
        .filter(|s| !s.trim().is_empty())
        .map(|s| s.into_bytes().into_boxed_slice());

    LoadedConfig {
        server: ServerConfig {
            listen: file_config.server.listen,
        },
        payments: PaymentsConfig { webhook_secret },
        channels: file_config.channels,
        rate_limit: RateLimitConfig {
            permit_limit: file_config.rate_limit.permit_limit,
            window: Duration::from_secs(file_config.rate_limit.window_secs),
        },
        expiry_interval_hours: file_config.expiry.interval_hours,
        notifications: NotificationsConfig {
            relay_url: file_config.notifications.relay_url,
        },
    }
}

/// Get the database URL from the environment.
pub fn get_database_url() -> Result<String, ConfigError> {
    std::env::var("DATABASE_URL").map_err(|_| ConfigError::MissingDatabaseUrl)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loader() -> ConfigLoader {
        ConfigLoader::new("billflow.toml", None, None)
    }

    #[test]
    fn test_blank_secret_counts_as_missing() {
        let loaded = loader()
            .load_from_str("[payments]\nwebhook_secret = \"   \"\n")
            .unwrap();
        assert!(loaded.payments.webhook_secret.is_none());
    }

    #[test]
    fn test_overrides_win_over_file() {
        let listen: SocketAddr = "127.0.0.1:9999".parse().unwrap();
        let loader = ConfigLoader::new("billflow.toml", Some(listen), Some("from-env".into()));
        let loaded = loader
            .load_from_str("[server]\nlisten = \"0.0.0.0:1\"\n[payments]\nwebhook_secret = \"from-file\"\n")
            .unwrap();
        assert_eq!(loaded.server.listen, listen);
        assert_eq!(loaded.payments.webhook_secret.as_deref(), Some(&b"from-env"[..]));
    }

    #[test]
    fn test_rejects_zero_rate_limit() {
        let result = loader().load_from_str("[rate_limit]\npermit_limit = 0\n");
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
        let result = loader().load_from_str("[rate_limit]\nwindow_secs = 0\n");
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_rejects_non_http_relay() {
        let result =
            loader().load_from_str("[notifications]\nrelay_url = \"ftp://relay.example.com\"\n");
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let loader = ConfigLoader::new("/nonexistent/billflow.toml", None, None);
        assert!(matches!(loader.load(), Err(ConfigError::IoError(_))));
    }
}

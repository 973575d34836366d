//! TOML file configuration structures.
//!
//! These structs directly map to the `billflow.toml` file format. Every
//! section is optional and falls back to its defaults.

use billflow_core::events::ChannelSettings;
use billflow_core::processors::expiry_checker::DEFAULT_INTERVAL_HOURS;
use serde::Deserialize;
use std::net::{Ipv4Addr, SocketAddr};

/// Root configuration structure as read from the TOML file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub server: ServerConfig,
    pub payments: PaymentsConfig,
    pub channels: ChannelSettings,
    pub rate_limit: RateLimitConfig,
    pub expiry: ExpiryConfig,
    pub notifications: NotificationsConfig,
}

/// Server configuration section.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// The address and port to listen on (e.g., "0.0.0.0:8080").
    #[serde(default = "default_listen_addr")]
    pub listen: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen_addr(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::UNSPECIFIED, 8080))
}

/// Payment provider section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaymentsConfig {
    /// Shared HMAC secret for inbound payment webhooks.
    pub webhook_secret: Option<String>,
}

/// Fixed-window rate limit applied to the webhook endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub permit_limit: u32,
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            permit_limit: 30,
            window_secs: 10,
        }
    }
}

/// Subscription expiry section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExpiryConfig {
    pub interval_hours: u64,
}

impl Default for ExpiryConfig {
    fn default() -> Self {
        Self {
            interval_hours: DEFAULT_INTERVAL_HOURS,
        }
    }
}

/// Notification delivery section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotificationsConfig {
    /// Relay endpoint. Without it notifications are only logged.
    pub relay_url: Option<url::Url>,
}

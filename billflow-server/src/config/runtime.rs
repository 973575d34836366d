//! Validated runtime configuration.
//!
//! Only the sections that can change on SIGHUP live behind locks in
//! [`SharedConfig`]; the rest is consumed once at startup.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub listen: SocketAddr,
}

/// Webhook authentication settings.
#[derive(Clone, Default)]
pub struct PaymentsConfig {
    /// `None` makes the webhook endpoint fail closed.
    pub webhook_secret: Option<Box<[u8]>>,
}

impl fmt::Debug for PaymentsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PaymentsConfig")
            .field(
                "webhook_secret",
                &self.webhook_secret.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub permit_limit: u32,
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            permit_limit: 30,
            window: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationsConfig {
    pub relay_url: Option<url::Url>,
}

/// Shared configuration state with separate locks for each reloadable section.
#[derive(Clone, Default)]
pub struct SharedConfig {
    /// Webhook secret.
    pub payments: Arc<RwLock<PaymentsConfig>>,
    /// Webhook rate limit.
    pub rate_limit: Arc<RwLock<RateLimitConfig>>,
}

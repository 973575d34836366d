//! Application state shared across all request handlers.

use crate::api::rate_limit::RateLimiter;
use crate::config::runtime::SharedConfig;
use billflow_core::events::EventProducers;
use billflow_core::processors::PaymentWebhookStore;
use std::sync::Arc;

/// Application state that is shared across all request handlers.
///
/// This is cloneable and cheap to pass around (everything is behind Arc).
#[derive(Clone)]
pub struct AppState {
    /// Runtime configuration (can be reloaded via SIGHUP).
    pub config: SharedConfig,
    /// Write ends of the logging and notification channels.
    pub producers: EventProducers,
    /// Durable side of payment webhook ingestion.
    pub webhooks: Arc<dyn PaymentWebhookStore>,
    /// Webhook rate limit counters.
    pub rate_limiter: Arc<RateLimiter>,
}

impl AppState {
    pub fn new(
        config: SharedConfig,
        producers: EventProducers,
        webhooks: Arc<dyn PaymentWebhookStore>,
    ) -> Self {
        Self {
            config,
            producers,
            webhooks,
            rate_limiter: Arc::new(RateLimiter::new()),
        }
    }
}

//! Fixed-window rate limiting keyed by client IP.
//!
//! Every client gets `permit_limit` requests per window. Excess requests are
//! rejected with `429 Too Many Requests`; nothing is queued. Requests whose
//! peer address is unknown share a single `anon` bucket.
//!
//! The counter is a plain fixed window rather than a GCRA bucket: a client
//! that used up its permits waits for the window to end, and the full
//! `permit_limit` becomes available again at once.

use crate::state::AppState;
use axum::{
    extract::{ConnectInfo, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tracing::warn;

// ============================================================================
// Limiter
// ============================================================================

/// Past this many keys, expired windows are swept on the next acquire.
const MAX_TRACKED_KEYS: usize = 4096;

#[derive(Debug, Clone, Copy)]
struct Window {
    started_at: Instant,
    count: u32,
}

/// Per-key fixed-window counters.
#[derive(Debug, Default)]
pub struct RateLimiter {
    windows: Mutex<HashMap<String, Window>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take one permit for `key`. Returns `false` when the window is used up.
    pub fn try_acquire(&self, key: &str, permit_limit: u32, window: Duration) -> bool {
        let now = Instant::now();
        let mut windows = match self.windows.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if windows.len() > MAX_TRACKED_KEYS {
            windows.retain(|_, w| now.duration_since(w.started_at) < window);
        }

        let entry = windows.entry(key.to_string()).or_insert(Window {
            started_at: now,
            count: 0,
        });
        if now.duration_since(entry.started_at) >= window {
            *entry = Window {
                started_at: now,
                count: 0,
            };
        }
        if entry.count >= permit_limit {
            return false;
        }
        entry.count += 1;
        true
    }
}

// ============================================================================
// Key Extractor
// ============================================================================

/// Extracts the client IP from the connection info.
/// Falls back to a shared `anon` key when the peer address is unknown.
#[derive(Debug, Clone, Copy)]
pub struct IpKeyExtractor;

impl IpKeyExtractor {
    pub const ANONYMOUS_KEY: &'static str = "anon";

    pub fn extract<T>(&self, req: &axum::http::Request<T>) -> String {
        req.extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string())
            .unwrap_or_else(|| Self::ANONYMOUS_KEY.to_string())
    }
}

// ============================================================================
// Error Handler
// ============================================================================

/// Logs the rate limit violation and returns 429.
pub fn rate_limit_error_handler(key: &str, req: &Request) -> Response {
    warn!(
        "Rate limit exceeded: {} {} client={}",
        req.method().as_str(),
        req.uri().path(),
        key
    );
    (StatusCode::TOO_MANY_REQUESTS, "too many requests").into_response()
}

// ============================================================================
// Middleware
// ============================================================================

/// Middleware enforcing the `[rate_limit]` section on the wrapped routes.
pub async fn limit_by_ip(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let key = IpKeyExtractor.extract(&request);

    let config = *state.config.rate_limit.read().await;
    if !state
        .rate_limiter
        .try_acquire(&key, config.permit_limit, config.window)
    {
        return rate_limit_error_handler(&key, &request);
    }

    next.run(request).await
}

//! HTTP API.
//!
//! - `/api/webhooks/*` – inbound provider webhooks, rate limited per client IP

pub mod rate_limit;
pub mod webhooks;

use crate::state::AppState;
use axum::Router;

/// Build the `/api` router.
pub fn router(state: AppState) -> Router<AppState> {
    Router::new().nest("/webhooks", webhooks::router(state))
}

//! Payment provider webhooks.
//!
//! # Endpoints
//!
//! - `POST /api/webhooks/payments` – signed payment status event
//!
//! Checks run in a fixed order and stop at the first failure:
//! secret configured (500), `X-Event-Id` present (400), body within the size
//! limit (400), signature over the raw bytes valid (401), body is UTF-8 (400),
//! envelope parseable (400). Only then is anything written. A replayed event id is acknowledged exactly like a new one.

use axum::{
    Json, Router,
    body::Body,
    extract::State,
    http::{HeaderMap, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::post,
};
use billflow_core::events::LogMessage;
use billflow_core::processors::{IngestError, InsertOutcome, VerifiedPaymentEvent};
use billflow_sdk::objects::WebhookAck;
use billflow_sdk::signature::{EVENT_ID_HEADER, SIGNATURE_HEADER};

use crate::api::rate_limit::limit_by_ip;
use crate::state::AppState;

/// Largest accepted webhook body.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Build the webhook router. Rate limiting applies to every route in it.
pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/payments", post(payment_webhook))
        .route_layer(middleware::from_fn_with_state(state, limit_by_ip))
}

/// `POST /api/webhooks/payments`: ingest one signed payment event.
async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Body,
) -> Result<Json<WebhookAck>, WebhookApiError> {
    let secret = state
        .config
        .payments
        .read()
        .await
        .webhook_secret
        .clone()
        .ok_or(IngestError::SecretMissing)?;

    let event_id = header_str(&headers, EVENT_ID_HEADER)
        .filter(|id| !id.trim().is_empty())
        .ok_or(IngestError::MissingEventId)?;

    let body = axum::body::to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|e| IngestError::InvalidBody(e.to_string()))?;

    let event = VerifiedPaymentEvent::verify(
        event_id,
        header_str(&headers, SIGNATURE_HEADER),
        body.to_vec(),
        &secret,
    )?;

    match state.webhooks.ingest(&event).await {
        Ok(InsertOutcome::Inserted) => {
            tracing::info!(
                event_id = %event.event_id,
                event_type = %event.envelope.event_type,
                "Payment webhook accepted"
            );
        }
        Ok(InsertOutcome::AlreadyExists) => {
            tracing::info!(event_id = %event.event_id, "Payment webhook replay acknowledged");
        }
        Err(e) => {
            state.producers.logs.try_enqueue(LogMessage::new(
                event.envelope.user_id,
                "Exception",
                format!("Payment webhook {} failed: {e}", event.event_id),
            ));
            return Err(IngestError::Database(e).into());
        }
    }

    Ok(Json(WebhookAck::RECEIVED))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Error response for the webhook endpoint.
#[derive(Debug)]
pub(crate) struct WebhookApiError(IngestError);

impl From<IngestError> for WebhookApiError {
    fn from(err: IngestError) -> Self {
        Self(err)
    }
}

impl IntoResponse for WebhookApiError {
    fn into_response(self) -> Response {
        match self.0 {
            IngestError::SecretMissing => {
                tracing::error!("Payment webhook rejected: webhook secret not configured");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "webhook secret not configured",
                )
                    .into_response()
            }
            IngestError::MissingEventId => {
                (StatusCode::BAD_REQUEST, "missing X-Event-Id header").into_response()
            }
            IngestError::InvalidBody(reason) => {
                tracing::debug!(%reason, "Payment webhook body rejected");
                (StatusCode::BAD_REQUEST, "invalid request body").into_response()
            }
            IngestError::Signature(e) => {
                tracing::warn!(error = %e, "Payment webhook signature rejected");
                StatusCode::UNAUTHORIZED.into_response()
            }
            IngestError::MalformedPayload(e) => {
                tracing::debug!(error = %e, "Payment webhook payload rejected");
                (StatusCode::BAD_REQUEST, "malformed payload").into_response()
            }
            IngestError::Database(e) => {
                tracing::error!(error = %e, "Payment webhook database error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error").into_response()
            }
        }
    }
}

//! Signed payment webhook sender.
//!
//! Used by payment gateway adapters and replay tooling to push events into
//! `POST /api/webhooks/payments` with the headers the server expects.

use crate::objects::{PaymentWebhookEnvelope, WebhookAck};
use crate::signature::{self, EVENT_ID_HEADER, SIGNATURE_HEADER};

use super::ClientError;

/// Path of the payment webhook endpoint, relative to the server base URL.
pub const PAYMENTS_WEBHOOK_PATH: &str = "api/webhooks/payments";

/// Client that signs and posts payment events.
#[derive(Debug, Clone)]
pub struct PaymentWebhookClient {
    http: reqwest::Client,
    endpoint: url::Url,
    secret: Box<[u8]>,
}

impl PaymentWebhookClient {
    /// Create a client for the server at `base_url` sharing `secret`.
    pub fn new(base_url: &url::Url, secret: impl Into<Box<[u8]>>) -> Result<Self, ClientError> {
        Ok(Self {
            http: reqwest::Client::new(),
            endpoint: base_url.join(PAYMENTS_WEBHOOK_PATH)?,
            secret: secret.into(),
        })
    }

    /// Send an event under a fresh random event id.
    ///
    /// Returns the event id used, so the caller can replay the same event.
    pub async fn send(&self, envelope: &PaymentWebhookEnvelope) -> Result<String, ClientError> {
        let event_id = uuid::Uuid::now_v7().to_string();
        self.send_with_id(&event_id, envelope).await?;
        Ok(event_id)
    }

    /// Send an event under an explicit event id.
    ///
    /// Re-sending the same id is safe: the server acknowledges duplicates
    /// without processing them again.
    pub async fn send_with_id(
        &self,
        event_id: &str,
        envelope: &PaymentWebhookEnvelope,
    ) -> Result<WebhookAck, ClientError> {
        let body = serde_json::to_string(envelope)?;
        self.send_raw(event_id, body).await
    }

    /// Send a pre-serialized body. The exact bytes given are signed.
    pub async fn send_raw(&self, event_id: &str, body: String) -> Result<WebhookAck, ClientError> {
        let signature = signature::sign_body(body.as_bytes(), &self.secret);

        let response = self
            .http
            .post(self.endpoint.clone())
            .header("Content-Type", "application/json")
            .header(SIGNATURE_HEADER, signature)
            .header(EVENT_ID_HEADER, event_id)
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(response.json::<WebhookAck>().await?)
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(ClientError::Api { status, body })
        }
    }
}

//! Payment webhook envelope and acknowledgement types.

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use std::str::FromStr;

/// Provider event type for a successful charge.
pub const PAYMENT_SUCCEEDED: &str = "payment.succeeded";

/// Provider event type for a refund.
pub const PAYMENT_REFUNDED: &str = "payment.refunded";

/// Payment status assumed when the provider omits `status`.
pub const DEFAULT_PAYMENT_STATUS: &str = "Completed";

/// Minimal JSON envelope of an inbound payment event.
///
/// Only `type` is required. Everything else is optional and copied into the
/// downstream outbox payload as-is. An optional field of the wrong JSON type,
/// or a number out of range, reads as absent instead of failing the event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentWebhookEnvelope {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(
        default,
        deserialize_with = "lenient::string",
        skip_serializing_if = "Option::is_none"
    )]
    pub status: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient::string",
        skip_serializing_if = "Option::is_none"
    )]
    pub transaction_id: Option<String>,
    #[serde(
        default,
        serialize_with = "rust_decimal::serde::float_option::serialize",
        deserialize_with = "lenient::decimal",
        skip_serializing_if = "Option::is_none"
    )]
    pub amount: Option<Decimal>,
    #[serde(
        default,
        deserialize_with = "lenient::int32",
        skip_serializing_if = "Option::is_none"
    )]
    pub user_id: Option<i32>,
    #[serde(
        default,
        deserialize_with = "lenient::int32",
        skip_serializing_if = "Option::is_none"
    )]
    pub subscription_id: Option<i32>,
    #[serde(
        default,
        deserialize_with = "lenient::int32",
        skip_serializing_if = "Option::is_none"
    )]
    pub payment_id: Option<i32>,
}

/// Field readers that turn unusable values into `None`.
mod lenient {
    use super::*;
    use serde_json::Value;

    fn value<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Value>, D::Error> {
        Option::<Value>::deserialize(deserializer)
    }

    pub(super) fn string<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<String>, D::Error> {
        Ok(value(deserializer)?.and_then(|v| match v {
            Value::String(s) => Some(s),
            _ => None,
        }))
    }

    pub(super) fn int32<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<i32>, D::Error> {
        Ok(value(deserializer)?
            .and_then(|v| v.as_i64())
            .and_then(|n| i32::try_from(n).ok()))
    }

    pub(super) fn decimal<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Decimal>, D::Error> {
        Ok(value(deserializer)?.and_then(|v| match v {
            Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
            _ => None,
        }))
    }
}

impl PaymentWebhookEnvelope {
    /// Whether this event reports a refund.
    pub fn is_refund(&self) -> bool {
        self.event_type == PAYMENT_REFUNDED
    }

    /// The payment status to store, falling back to [`DEFAULT_PAYMENT_STATUS`].
    pub fn status_or_default(&self) -> &str {
        match self.status.as_deref() {
            Some(status) if !status.trim().is_empty() => status,
            _ => DEFAULT_PAYMENT_STATUS,
        }
    }

    /// The provider transaction id, if present and non-blank.
    pub fn transaction_id(&self) -> Option<&str> {
        self.transaction_id
            .as_deref()
            .filter(|id| !id.trim().is_empty())
    }
}

/// Response body returned for every accepted webhook, including replays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookAck {
    pub received: bool,
}

impl WebhookAck {
    pub const RECEIVED: WebhookAck = WebhookAck { received: true };
}

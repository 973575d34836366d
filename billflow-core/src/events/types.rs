//! Event type definitions for the in-memory channels.
//!
//! Both message types are ephemeral: they are created by any producer,
//! consumed at most once, and dropped when their channel is full. Nothing
//! identifies a message beyond its position in the channel.

use serde::Serialize;
use time::OffsetDateTime;

/// Notification kind used for everything this core sends today.
pub const NOTIFICATION_KIND_EMAIL: &str = "Email";

/// An audit-log entry headed for the Log Consumer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogMessage {
    pub user_id: Option<i32>,
    pub action: String,
    pub message: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp_utc: OffsetDateTime,
}

impl LogMessage {
    /// Create a log entry stamped with the current UTC time.
    pub fn new(user_id: Option<i32>, action: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            user_id,
            action: action.into(),
            message: Some(message.into()),
            timestamp_utc: OffsetDateTime::now_utc(),
        }
    }
}

/// An outbound notification headed for the Notification Consumer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationMessage {
    pub user_id: Option<i32>,
    /// Delivery kind, e.g. `Email`, `SMS` or `Info`.
    #[serde(rename = "type")]
    pub kind: String,
    pub subject: String,
    pub body: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp_utc: OffsetDateTime,
}

impl NotificationMessage {
    /// Create an email notification stamped with the current UTC time.
    pub fn email(user_id: Option<i32>, subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            user_id,
            kind: NOTIFICATION_KIND_EMAIL.to_string(),
            subject: subject.into(),
            body: body.into(),
            timestamp_utc: OffsetDateTime::now_utc(),
        }
    }
}

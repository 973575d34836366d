//! NotificationConsumer: delivers notifications from the notification channel.
//!
//! Two delivery handlers are provided:
//! - [`LoggingNotifier`] traces the notification and records a
//!   `NotificationSent` audit row
//! - [`HttpRelayNotifier`] posts the notification as JSON to a relay service

use super::consumer::{ChannelConsumer, MessageSink};
use super::log_consumer::AuditLogWriter;
use crate::events::{LogMessage, NotificationMessage, NotificationReceiver};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tracing::info;

/// Audit action recorded for every notification handed to the logging notifier.
pub const NOTIFICATION_SENT_ACTION: &str = "NotificationSent";

/// Errors that can occur during notification delivery.
#[derive(Debug, Error)]
pub enum NotificationError {
    /// Recording the audit row failed
    #[error("audit log error: {0}")]
    AuditLog(#[from] sqlx::Error),

    /// HTTP request error
    #[error("HTTP request error: {0}")]
    Request(#[from] reqwest::Error),

    /// The relay answered with a non-success status
    #[error("relay rejected notification with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Delivery of a single notification.
#[async_trait]
pub trait NotificationHandler: Send + Sync {
    async fn handle(&self, notification: &NotificationMessage) -> Result<(), NotificationError>;
}

/// Handler that only records the notification.
pub struct LoggingNotifier {
    audit: Arc<dyn AuditLogWriter>,
}

impl LoggingNotifier {
    pub fn new(audit: Arc<dyn AuditLogWriter>) -> Self {
        Self { audit }
    }
}

#[async_trait]
impl NotificationHandler for LoggingNotifier {
    async fn handle(&self, notification: &NotificationMessage) -> Result<(), NotificationError> {
        info!(
            user_id = ?notification.user_id,
            kind = %notification.kind,
            subject = %notification.subject,
            "Sending notification"
        );

        let entry = LogMessage {
            user_id: notification.user_id,
            action: NOTIFICATION_SENT_ACTION.to_string(),
            message: Some(format!("{}: {}", notification.kind, notification.subject)),
            timestamp_utc: notification.timestamp_utc,
        };
        self.audit.write_log(&entry).await?;
        Ok(())
    }
}

/// Handler that forwards notifications to an HTTP relay.
pub struct HttpRelayNotifier {
    http_client: reqwest::Client,
    relay_url: url::Url,
}

impl HttpRelayNotifier {
    pub fn new(relay_url: url::Url) -> Self {
        Self {
            http_client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            relay_url,
        }
    }
}

#[async_trait]
impl NotificationHandler for HttpRelayNotifier {
    async fn handle(&self, notification: &NotificationMessage) -> Result<(), NotificationError> {
        let response = self
            .http_client
            .post(self.relay_url.clone())
            .json(notification)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(NotificationError::Rejected {
                status: status.as_u16(),
                body,
            })
        }
    }
}

#[async_trait]
impl MessageSink<NotificationMessage> for Arc<dyn NotificationHandler> {
    type Error = NotificationError;

    async fn deliver(&self, message: &NotificationMessage) -> Result<(), NotificationError> {
        self.handle(message).await
    }
}

pub type NotificationConsumer = ChannelConsumer<NotificationMessage, Arc<dyn NotificationHandler>>;

impl NotificationConsumer {
    pub fn new(
        rx: NotificationReceiver,
        handler: Arc<dyn NotificationHandler>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        ChannelConsumer::with_sink("notifications", rx, handler, shutdown_rx)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::events::{ChannelSettings, EventChannels};
    use crate::processors::log_consumer::tests::MemoryAuditLog;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use std::sync::Mutex;

    /// Handler that remembers every notification it was given.
    #[derive(Default)]
    pub(crate) struct MemoryNotifier {
        pub(crate) sent: Mutex<Vec<NotificationMessage>>,
    }

    #[async_trait]
    impl NotificationHandler for MemoryNotifier {
        async fn handle(
            &self,
            notification: &NotificationMessage,
        ) -> Result<(), NotificationError> {
            self.sent.lock().unwrap().push(notification.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_logging_notifier_records_audit_row() {
        let audit = Arc::new(MemoryAuditLog::default());
        let notifier = LoggingNotifier::new(audit.clone());

        notifier
            .handle(&NotificationMessage::email(Some(7), "Payment received", "body"))
            .await
            .unwrap();

        let entries = audit.entries.lock().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].user_id, Some(7));
        assert_eq!(entries[0].action, NOTIFICATION_SENT_ACTION);
        assert_eq!(entries[0].message.as_deref(), Some("Email: Payment received"));
    }

    #[tokio::test]
    async fn test_logging_notifier_surfaces_audit_failure() {
        let audit = Arc::new(MemoryAuditLog {
            fail_actions: vec![NOTIFICATION_SENT_ACTION],
            ..Default::default()
        });
        let notifier = LoggingNotifier::new(audit);

        let result = notifier
            .handle(&NotificationMessage::email(None, "s", "b"))
            .await;
        assert!(matches!(result, Err(NotificationError::AuditLog(_))));
    }

    async fn spawn_relay(status: StatusCode) -> (url::Url, Arc<Mutex<Vec<serde_json::Value>>>) {
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = received.clone();
        let app = Router::new().route(
            "/notify",
            post(move |Json(body): Json<serde_json::Value>| {
                let sink = sink.clone();
                async move {
                    sink.lock().unwrap().push(body);
                    status
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        let url = url::Url::parse(&format!("http://{addr}/notify")).unwrap();
        (url, received)
    }

    #[tokio::test]
    async fn test_http_relay_posts_json() {
        let (url, received) = spawn_relay(StatusCode::ACCEPTED).await;
        let notifier = HttpRelayNotifier::new(url);

        notifier
            .handle(&NotificationMessage::email(Some(3), "Subscription Expired", "gone"))
            .await
            .unwrap();

        let received = received.lock().unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0]["userId"], 3);
        assert_eq!(received[0]["type"], "Email");
        assert_eq!(received[0]["subject"], "Subscription Expired");
        assert_eq!(received[0]["body"], "gone");
        assert!(received[0]["timestampUtc"].is_string());
    }

    #[tokio::test]
    async fn test_http_relay_non_success_is_failure() {
        let (url, _received) = spawn_relay(StatusCode::SERVICE_UNAVAILABLE).await;
        let notifier = HttpRelayNotifier::new(url);

        let result = notifier
            .handle(&NotificationMessage::email(None, "s", "b"))
            .await;
        assert!(matches!(
            result,
            Err(NotificationError::Rejected { status: 503, .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_consumer_hands_every_notification_to_handler() {
        let (producers, receivers) = EventChannels::new(&ChannelSettings::default());
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let notifier = Arc::new(MemoryNotifier::default());

        for n in 0..3 {
            assert!(producers.notifications.try_enqueue(NotificationMessage::email(
                Some(n),
                format!("subject {n}"),
                "body"
            )));
        }
        drop(producers);

        NotificationConsumer::new(receivers.notifications, notifier.clone(), shutdown_rx)
            .run()
            .await;

        let sent = notifier.sent.lock().unwrap();
        assert_eq!(
            sent.iter().map(|n| n.subject.as_str()).collect::<Vec<_>>(),
            vec!["subject 0", "subject 1", "subject 2"]
        );
    }
}

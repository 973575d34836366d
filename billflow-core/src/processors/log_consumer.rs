//! LogConsumer: persists audit-log entries from the logging channel.

use super::consumer::{ChannelConsumer, MessageSink};
use crate::entities::audit_logs::InsertAuditLog;
use crate::events::{LogMessage, LogMessageReceiver};
use crate::framework::DatabaseProcessor;
use async_trait::async_trait;
use kanau::processor::Processor;
use std::sync::Arc;
use tokio::sync::watch;

/// Audit-log persistence.
#[async_trait]
pub trait AuditLogWriter: Send + Sync {
    async fn write_log(&self, entry: &LogMessage) -> Result<(), sqlx::Error>;
}

/// Writes entries into the `AuditLogs` table.
pub struct PgAuditLogWriter {
    db: DatabaseProcessor,
}

impl PgAuditLogWriter {
    pub fn new(db: DatabaseProcessor) -> Self {
        Self { db }
    }
}

#[async_trait]
impl AuditLogWriter for PgAuditLogWriter {
    async fn write_log(&self, entry: &LogMessage) -> Result<(), sqlx::Error> {
        self.db.process(InsertAuditLog::from(entry)).await?;
        Ok(())
    }
}

#[async_trait]
impl MessageSink<LogMessage> for Arc<dyn AuditLogWriter> {
    type Error = sqlx::Error;

    async fn deliver(&self, message: &LogMessage) -> Result<(), sqlx::Error> {
        self.write_log(message).await
    }
}

pub type LogConsumer = ChannelConsumer<LogMessage, Arc<dyn AuditLogWriter>>;

impl LogConsumer {
    pub fn new(
        rx: LogMessageReceiver,
        writer: Arc<dyn AuditLogWriter>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        ChannelConsumer::with_sink("logging", rx, writer, shutdown_rx)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::events::{ChannelSettings, EventChannels};
    use std::sync::Mutex;

    /// In-memory `AuditLogs` table.
    #[derive(Default)]
    pub(crate) struct MemoryAuditLog {
        pub(crate) entries: Mutex<Vec<LogMessage>>,
        pub(crate) fail_actions: Vec<&'static str>,
    }

    #[async_trait]
    impl AuditLogWriter for MemoryAuditLog {
        async fn write_log(&self, entry: &LogMessage) -> Result<(), sqlx::Error> {
            if self.fail_actions.contains(&entry.action.as_str()) {
                return Err(sqlx::Error::PoolTimedOut);
            }
            self.entries.lock().unwrap().push(entry.clone());
            Ok(())
        }
    }

    impl MemoryAuditLog {
        pub(crate) fn actions(&self) -> Vec<String> {
            self.entries
                .lock()
                .unwrap()
                .iter()
                .map(|e| e.action.clone())
                .collect()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_persists_entries_and_skips_failed_one() {
        let (producers, receivers) = EventChannels::new(&ChannelSettings::default());
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let store = Arc::new(MemoryAuditLog {
            fail_actions: vec!["Broken"],
            ..Default::default()
        });

        assert!(producers.logs.try_enqueue(LogMessage::new(Some(1), "Login", "ok")));
        assert!(producers.logs.try_enqueue(LogMessage::new(Some(1), "Broken", "boom")));
        assert!(producers.logs.try_enqueue(LogMessage::new(None, "Logout", "bye")));
        drop(producers);

        LogConsumer::new(receivers.logs, store.clone(), shutdown_rx)
            .run()
            .await;

        assert_eq!(store.actions(), vec!["Login", "Logout"]);
        let entries = store.entries.lock().unwrap();
        assert_eq!(entries[0].user_id, Some(1));
        assert_eq!(entries[1].user_id, None);
    }
}

//! ExpiryChecker processor.
//!
//! Runs once at startup and then on a fixed interval. Each run moves every
//! due subscription to `Expired` and emits one audit-log entry and one
//! notification per subscription that changed.

use crate::entities::subscriptions::{ExpireDueSubscriptions, ExpiredSubscription};
use crate::events::{EventProducers, LogMessage, NotificationMessage, wait_for_shutdown};
use crate::framework::DatabaseProcessor;
use async_trait::async_trait;
use kanau::processor::Processor;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

/// Default interval between runs.
pub const DEFAULT_INTERVAL_HOURS: u64 = 24;

/// Subscription state transitions needed by the checker.
#[async_trait]
pub trait SubscriptionService: Send + Sync {
    /// Expire every active subscription whose end date has passed, returning
    /// the ones that changed.
    async fn expire_due_subscriptions(&self) -> Result<Vec<ExpiredSubscription>, sqlx::Error>;
}

pub struct PgSubscriptionService {
    db: DatabaseProcessor,
}

impl PgSubscriptionService {
    pub fn new(db: DatabaseProcessor) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SubscriptionService for PgSubscriptionService {
    async fn expire_due_subscriptions(&self) -> Result<Vec<ExpiredSubscription>, sqlx::Error> {
        self.db.process(ExpireDueSubscriptions).await
    }
}

pub struct ExpiryChecker {
    subscriptions: Arc<dyn SubscriptionService>,
    producers: EventProducers,
    interval: Duration,
    shutdown_rx: watch::Receiver<bool>,
}

impl ExpiryChecker {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionService>,
        producers: EventProducers,
        interval_hours: u64,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        let hours = if interval_hours == 0 {
            DEFAULT_INTERVAL_HOURS
        } else {
            interval_hours
        };
        Self {
            subscriptions,
            producers,
            interval: Duration::from_secs(hours * 3600),
            shutdown_rx,
        }
    }

    /// Run the ExpiryChecker until shutdown.
    ///
    /// Runs start on a fixed cadence measured from startup; a slow run
    /// delays the next one instead of shifting every later run.
    pub async fn run(self) {
        info!(interval_secs = self.interval.as_secs(), "ExpiryChecker started");
        let mut shutdown_rx = self.shutdown_rx.clone();
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = wait_for_shutdown(&mut shutdown_rx) => {
                    info!("ExpiryChecker received shutdown signal");
                    break;
                }

                _ = ticker.tick() => {}
            }

            tokio::select! {
                biased;

                _ = wait_for_shutdown(&mut shutdown_rx) => {
                    info!("ExpiryChecker received shutdown signal");
                    break;
                }

                _ = self.run_once() => {}
            }
        }

        info!("ExpiryChecker shutdown complete");
    }

    /// Perform one expiry pass and return how many subscriptions expired.
    ///
    /// Failures are traced and reported on the logging channel as
    /// `ExpiryCheckFailed`; they never stop the checker.
    pub async fn run_once(&self) -> usize {
        match self.subscriptions.expire_due_subscriptions().await {
            Ok(expired) => {
                for subscription in &expired {
                    self.announce(subscription);
                }
                if !expired.is_empty() {
                    info!(count = expired.len(), "Expired subscriptions");
                }
                expired.len()
            }
            Err(e) => {
                error!(error = %e, "Expiry check failed");
                self.producers
                    .logs
                    .try_enqueue(LogMessage::new(None, "ExpiryCheckFailed", e.to_string()));
                0
            }
        }
    }

    fn announce(&self, subscription: &ExpiredSubscription) {
        let id = subscription.subscription_id;
        self.producers.logs.try_enqueue(LogMessage::new(
            Some(subscription.user_id),
            "SubscriptionExpired",
            format!("Subscription {id} expired."),
        ));
        self.producers
            .notifications
            .try_enqueue(NotificationMessage::email(
                Some(subscription.user_id),
                "Subscription Expired",
                format!("Your subscription (ID {id}) has expired."),
            ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{ChannelSettings, EventChannels, EventReceivers};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// In-memory `Subscriptions` table: (id, user, active, due).
    #[derive(Default)]
    struct MemorySubscriptions {
        rows: Mutex<Vec<(i32, i32, bool, bool)>>,
        fail: bool,
        calls: AtomicUsize,
        /// How long each call takes.
        latency: Duration,
    }

    #[async_trait]
    impl SubscriptionService for MemorySubscriptions {
        async fn expire_due_subscriptions(
            &self,
        ) -> Result<Vec<ExpiredSubscription>, sqlx::Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.latency).await;
            if self.fail {
                return Err(sqlx::Error::PoolTimedOut);
            }
            let mut rows = self.rows.lock().unwrap();
            let mut expired = Vec::new();
            for (id, user, active, due) in rows.iter_mut() {
                if *active && *due {
                    *active = false;
                    expired.push(ExpiredSubscription {
                        subscription_id: *id,
                        user_id: *user,
                    });
                }
            }
            Ok(expired)
        }
    }

    fn new_checker(
        subscriptions: Arc<MemorySubscriptions>,
    ) -> (ExpiryChecker, EventReceivers, watch::Sender<bool>) {
        let (producers, receivers) = EventChannels::new(&ChannelSettings::default());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        (
            ExpiryChecker::new(subscriptions, producers, 24, shutdown_rx),
            receivers,
            shutdown_tx,
        )
    }

    #[tokio::test]
    async fn test_emits_one_log_and_notification_per_expired_subscription() {
        let subscriptions = Arc::new(MemorySubscriptions {
            rows: Mutex::new(vec![(10, 1, true, true), (11, 2, true, false), (12, 3, true, true)]),
            ..Default::default()
        });
        let (checker, mut receivers, _shutdown_tx) = new_checker(subscriptions);

        assert_eq!(checker.run_once().await, 2);

        let log = receivers.logs.try_recv().unwrap();
        assert_eq!(log.user_id, Some(1));
        assert_eq!(log.action, "SubscriptionExpired");
        assert_eq!(log.message.as_deref(), Some("Subscription 10 expired."));
        let notification = receivers.notifications.try_recv().unwrap();
        assert_eq!(notification.user_id, Some(1));
        assert_eq!(notification.subject, "Subscription Expired");
        assert_eq!(notification.body, "Your subscription (ID 10) has expired.");

        assert_eq!(
            receivers.logs.try_recv().unwrap().message.as_deref(),
            Some("Subscription 12 expired.")
        );
        assert_eq!(receivers.notifications.try_recv().unwrap().user_id, Some(3));
        assert!(receivers.logs.try_recv().is_err());
        assert!(receivers.notifications.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_second_run_emits_nothing() {
        let subscriptions = Arc::new(MemorySubscriptions {
            rows: Mutex::new(vec![(10, 1, true, true)]),
            ..Default::default()
        });
        let (checker, mut receivers, _shutdown_tx) = new_checker(subscriptions);

        assert_eq!(checker.run_once().await, 1);
        while receivers.logs.try_recv().is_ok() {}
        while receivers.notifications.try_recv().is_ok() {}

        assert_eq!(checker.run_once().await, 0);
        assert!(receivers.logs.try_recv().is_err());
        assert!(receivers.notifications.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_failure_reported_on_logging_channel() {
        let subscriptions = Arc::new(MemorySubscriptions {
            fail: true,
            ..Default::default()
        });
        let (checker, mut receivers, _shutdown_tx) = new_checker(subscriptions);

        assert_eq!(checker.run_once().await, 0);
        let log = receivers.logs.try_recv().unwrap();
        assert_eq!(log.action, "ExpiryCheckFailed");
        assert!(log.message.is_some());
        assert!(receivers.notifications.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_runs_at_start_then_every_interval() {
        let subscriptions = Arc::new(MemorySubscriptions::default());
        let (checker, _receivers, shutdown_tx) = new_checker(subscriptions.clone());

        let handle = tokio::spawn(checker.run());
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(subscriptions.calls.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(24 * 3600)).await;
        assert_eq!(subscriptions.calls.load(Ordering::SeqCst), 2);

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
        assert_eq!(subscriptions.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_run_does_not_shift_schedule() {
        let subscriptions = Arc::new(MemorySubscriptions {
            latency: Duration::from_secs(3600),
            ..Default::default()
        });
        let (checker, _receivers, shutdown_tx) = new_checker(subscriptions.clone());

        let handle = tokio::spawn(checker.run());
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(subscriptions.calls.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(24 * 3600)).await;
        assert_eq!(subscriptions.calls.load(Ordering::SeqCst), 2);

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }
}

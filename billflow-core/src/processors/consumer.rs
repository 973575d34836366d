//! Single-reader loop shared by the log and notification consumers.
//!
//! The loop alternates between two states:
//! - Idle: wait until a message is readable or shutdown is signaled
//! - Draining: hand every immediately available message to the sink
//!
//! A sink failure is traced and followed by a fixed delay before the next
//! message. The failed message is not retried. The loop ends when shutdown
//! is signaled or every producer has been dropped.

use crate::events::wait_for_shutdown;
use async_trait::async_trait;
use std::fmt::{Debug, Display};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info};

/// Delay after a failed delivery.
pub const ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Destination of messages pulled off a channel.
#[async_trait]
pub trait MessageSink<T>: Send + Sync {
    type Error: Display + Send;

    async fn deliver(&self, message: &T) -> Result<(), Self::Error>;
}

pub struct ChannelConsumer<T, S> {
    name: &'static str,
    rx: mpsc::Receiver<T>,
    sink: S,
    shutdown_rx: watch::Receiver<bool>,
    error_backoff: Duration,
}

impl<T, S> ChannelConsumer<T, S>
where
    T: Debug + Send + Sync,
    S: MessageSink<T>,
{
    pub fn with_sink(
        name: &'static str,
        rx: mpsc::Receiver<T>,
        sink: S,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            name,
            rx,
            sink,
            shutdown_rx,
            error_backoff: ERROR_BACKOFF,
        }
    }

    /// Run until shutdown or until the channel is closed and empty.
    pub async fn run(mut self) {
        info!(consumer = self.name, "Consumer started");

        'idle: loop {
            let first = tokio::select! {
                biased;

                _ = wait_for_shutdown(&mut self.shutdown_rx) => {
                    info!(consumer = self.name, "Consumer received shutdown signal");
                    break 'idle;
                }

                message = self.rx.recv() => match message {
                    Some(message) => message,
                    None => {
                        info!(consumer = self.name, "Channel closed");
                        break 'idle;
                    }
                },
            };

            let mut next = Some(first);
            while let Some(message) = next.take() {
                if !self.consume(message).await {
                    info!(consumer = self.name, "Consumer received shutdown signal");
                    break 'idle;
                }
                if *self.shutdown_rx.borrow() {
                    info!(consumer = self.name, "Consumer received shutdown signal");
                    break 'idle;
                }
                next = self.rx.try_recv().ok();
            }
        }

        info!(consumer = self.name, "Consumer shutdown complete");
    }

    /// Deliver one message. Returns `false` if shutdown interrupted the
    /// post-failure delay.
    async fn consume(&mut self, message: T) -> bool {
        debug!(consumer = self.name, message = ?message, "Consuming message");

        let Err(e) = self.sink.deliver(&message).await else {
            return true;
        };
        error!(consumer = self.name, error = %e, "Failed to consume message");

        tokio::select! {
            biased;

            _ = wait_for_shutdown(&mut self.shutdown_rx) => false,
            _ = tokio::time::sleep(self.error_backoff) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::time::Instant;

    #[derive(Clone, Default)]
    struct RecordingSink {
        delivered: Arc<Mutex<Vec<(u32, Instant)>>>,
        fail_on: Vec<u32>,
    }

    #[async_trait]
    impl MessageSink<u32> for RecordingSink {
        type Error = String;

        async fn deliver(&self, message: &u32) -> Result<(), String> {
            self.delivered
                .lock()
                .unwrap()
                .push((*message, Instant::now()));
            if self.fail_on.contains(message) {
                Err(format!("sink rejected {message}"))
            } else {
                Ok(())
            }
        }
    }

    impl RecordingSink {
        fn seen(&self) -> Vec<u32> {
            self.delivered.lock().unwrap().iter().map(|(m, _)| *m).collect()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_drains_in_order_and_stops_when_producers_gone() {
        let (tx, rx) = mpsc::channel(16);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let sink = RecordingSink::default();

        for n in 1..=5 {
            tx.try_send(n).unwrap();
        }
        drop(tx);

        ChannelConsumer::with_sink("test", rx, sink.clone(), shutdown_rx)
            .run()
            .await;

        assert_eq!(sink.seen(), vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_backs_off_one_second_and_moves_on() {
        let (tx, rx) = mpsc::channel(16);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let sink = RecordingSink {
            fail_on: vec![1],
            ..Default::default()
        };

        tx.try_send(1).unwrap();
        tx.try_send(2).unwrap();
        drop(tx);

        ChannelConsumer::with_sink("test", rx, sink.clone(), shutdown_rx)
            .run()
            .await;

        let delivered = sink.delivered.lock().unwrap().clone();
        assert_eq!(delivered.len(), 2);
        assert_eq!(delivered[0].0, 1);
        assert_eq!(delivered[1].0, 2);
        assert!(delivered[1].1 - delivered[0].1 >= ERROR_BACKOFF);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_while_idle() {
        let (_tx, rx) = mpsc::channel::<u32>(16);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let sink = RecordingSink::default();

        let handle = tokio::spawn(ChannelConsumer::with_sink("test", rx, sink, shutdown_rx).run());
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!handle.is_finished());

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_interrupts_backoff() {
        let (tx, rx) = mpsc::channel(16);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let sink = RecordingSink {
            fail_on: vec![1],
            ..Default::default()
        };
        tx.try_send(1).unwrap();
        tx.try_send(2).unwrap();

        let handle = tokio::spawn(
            ChannelConsumer::with_sink("test", rx, sink.clone(), shutdown_rx).run(),
        );
        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();

        assert_eq!(sink.seen(), vec![1]);
    }
}

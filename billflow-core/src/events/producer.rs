//! Channel producer: the only way request handlers and background jobs
//! write into the bounded channels.

use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::warn;

/// Errors returned by [`ChannelProducer::enqueue`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnqueueError {
    /// Shutdown was signaled while waiting for capacity.
    #[error("enqueue cancelled by shutdown")]
    Cancelled,
    /// The consumer is gone.
    #[error("channel closed")]
    Closed,
}

/// Write handle for one bounded channel.
///
/// Cloning is cheap; every clone feeds the same single consumer.
#[derive(Debug)]
pub struct ChannelProducer<T> {
    name: &'static str,
    tx: mpsc::Sender<T>,
}

impl<T> Clone for ChannelProducer<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            tx: self.tx.clone(),
        }
    }
}

impl<T> ChannelProducer<T> {
    pub(crate) fn new(name: &'static str, tx: mpsc::Sender<T>) -> Self {
        Self { name, tx }
    }

    /// Best-effort write that never blocks.
    ///
    /// Returns `false` when the channel is full (the message is dropped) or
    /// closed. Callers treat this as fire-and-forget.
    pub fn try_enqueue(&self, message: T) -> bool {
        match self.tx.try_send(message) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(channel = self.name, "Channel full, dropping message");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!(channel = self.name, "Channel closed, dropping message");
                false
            }
        }
    }

    /// Write that waits for capacity, giving up when shutdown is signaled.
    pub async fn enqueue(
        &self,
        message: T,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> Result<(), EnqueueError> {
        if *shutdown_rx.borrow() {
            return Err(EnqueueError::Cancelled);
        }

        tokio::select! {
            biased;

            _ = wait_for_shutdown(shutdown_rx) => Err(EnqueueError::Cancelled),

            permit = self.tx.reserve() => {
                let permit = permit.map_err(|_| EnqueueError::Closed)?;
                permit.send(message);
                Ok(())
            }
        }
    }

    /// Remaining free slots.
    pub fn capacity(&self) -> usize {
        self.tx.capacity()
    }
}

/// Resolve once the shutdown flag turns `true`.
///
/// A dropped sender counts as shutdown.
pub async fn wait_for_shutdown(shutdown_rx: &mut watch::Receiver<bool>) {
    let _ = shutdown_rx.wait_for(|stop| *stop).await;
}

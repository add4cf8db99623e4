//! Debouncing change queue between the watchers and the reconciler
//!
//! Watchers push fungible [`ChangeSignal`]s through a bounded queue. Pushing
//! never blocks: when the queue is full the signal is dropped, which loses
//! nothing because every reconcile re-reads the full desired state. The
//! reconciler wakes once per burst and discards everything queued.

use crate::ReconcileMetrics;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// "Something changed"
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChangeSignal;

/// Outcome of [`ChangeAggregator::wait_and_drain`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Wake {
    /// At least one signal arrived; `coalesced` signals were consumed
    Changed { coalesced: usize },
    /// The cancellation token fired
    Cancelled,
    /// Every notifier has been dropped
    Closed,
}

/// Create a change queue holding at most `capacity` pending signals
pub fn channel(
    capacity: usize,
    metrics: Arc<ReconcileMetrics>,
) -> (ChangeNotifier, ChangeAggregator) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (ChangeNotifier { tx, metrics }, ChangeAggregator { rx })
}

/// Producer side, cloned into every watcher
#[derive(Clone)]
pub struct ChangeNotifier {
    tx: mpsc::Sender<ChangeSignal>,
    metrics: Arc<ReconcileMetrics>,
}

impl ChangeNotifier {
    /// Queue a signal without blocking. Returns whether it was queued.
    pub fn notify(&self) -> bool {
        match self.tx.try_send(ChangeSignal) {
            Ok(()) => {
                trace!("Queued change signal");
                true
            }
            Err(TrySendError::Full(_)) => {
                debug!("Change queue full, dropping signal");
                self.metrics.dropped_signals_total.inc();
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Change queue closed, dropping signal");
                false
            }
        }
    }
}

/// Consumer side, owned by the reconciler
pub struct ChangeAggregator {
    rx: mpsc::Receiver<ChangeSignal>,
}

impl ChangeAggregator {
    /// Block until a signal is queued, then drain every queued signal.
    pub async fn wait_and_drain(&mut self, cancel: &CancellationToken) -> Wake {
        let first = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Wake::Cancelled,
            signal = self.rx.recv() => signal,
        };
        if first.is_none() {
            return Wake::Closed;
        }

        let mut coalesced = 1;
        while self.rx.try_recv().is_ok() {
            coalesced += 1;
        }
        Wake::Changed { coalesced }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    fn queue(capacity: usize) -> (ChangeNotifier, ChangeAggregator, Arc<ReconcileMetrics>) {
        let metrics = Arc::new(ReconcileMetrics::new().unwrap());
        let (tx, rx) = channel(capacity, metrics.clone());
        (tx, rx, metrics)
    }

    #[tokio::test]
    async fn test_burst_collapses_into_one_wake() {
        let (tx, mut rx, _) = queue(10);
        let cancel = CancellationToken::new();
        for _ in 0..5 {
            assert!(tx.notify());
        }

        assert_eq!(rx.wait_and_drain(&cancel).await, Wake::Changed { coalesced: 5 });

        // Queue is empty again: the next wait does not return on its own
        assert!(timeout(Duration::from_millis(20), rx.wait_and_drain(&cancel))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_push_beyond_capacity_never_blocks() {
        let (tx, mut rx, metrics) = queue(3);
        let cancel = CancellationToken::new();

        let queued = (0..50).filter(|_| tx.notify()).count();

        assert_eq!(queued, 3);
        assert_eq!(metrics.dropped_signals_total.get(), 47);
        assert_eq!(rx.wait_and_drain(&cancel).await, Wake::Changed { coalesced: 3 });
    }

    #[tokio::test]
    async fn test_concurrent_producers() {
        let (tx, mut rx, _) = queue(10);
        let cancel = CancellationToken::new();

        let producers: Vec<_> = (0..4)
            .map(|_| {
                let tx = tx.clone();
                tokio::spawn(async move {
                    for _ in 0..100 {
                        tx.notify();
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.await.unwrap();
        }

        match rx.wait_and_drain(&cancel).await {
            Wake::Changed { coalesced } => assert!((1..=10).contains(&coalesced)),
            other => panic!("unexpected wake: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_wakes_when_signal_arrives_later() {
        let (tx, mut rx, _) = queue(10);
        let cancel = CancellationToken::new();

        let waiter = tokio::spawn(async move { rx.wait_and_drain(&cancel).await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        tx.notify();

        assert_eq!(waiter.await.unwrap(), Wake::Changed { coalesced: 1 });
    }

    #[tokio::test]
    async fn test_cancellation_wins_over_pending_signals() {
        let (tx, mut rx, _) = queue(10);
        let cancel = CancellationToken::new();
        tx.notify();
        cancel.cancel();
        assert_eq!(rx.wait_and_drain(&cancel).await, Wake::Cancelled);
    }

    #[tokio::test]
    async fn test_closed_when_notifiers_dropped() {
        let (tx, mut rx, _) = queue(10);
        drop(tx);
        assert_eq!(rx.wait_and_drain(&CancellationToken::new()).await, Wake::Closed);
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let (tx, _rx, _) = queue(0);
        assert!(tx.notify());
        assert!(!tx.notify());
    }
}

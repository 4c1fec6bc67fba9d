//! Update hand-off and fan-out.
//!
//! Providers call back on their own threads or tasks. Those callbacks only
//! push a [`TaggedUpdate`] into a bounded queue through an [`UpdateSink`] and
//! return immediately. A single [`Dispatcher`] task drains that queue. For
//! each update it:
//!
//! 1. snapshots the variable's subscribers from the registry,
//! 2. normalizes the raw update and serializes it once,
//! 3. offers the shared frame to every subscriber's outbound queue.
//!
//! ```text
//! provider callback ──push──▶ [update queue] ──▶ Dispatcher
//!                                                   │ subscribers(pv)
//!                                                   ▼
//!                                 outbox(A)   outbox(B)   outbox(C)
//!                                     │           │           │
//!                                  writer A    writer B    writer C
//! ```
//!
//! Offering never waits: a full or closed outbox drops that one frame for
//! that one subscriber and the loop moves on.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use pvbridge_core::{RawUpdate, SubscriberId, VariableName};
use pvbridge_protocol::{normalize, ServerMessage};

use crate::registry::RegistryHandle;

/// One serialized frame shared by every recipient.
pub type Frame = Arc<str>;

/// Sending half of a subscriber's outbound queue.
pub type OutboxSender = mpsc::Sender<Frame>;

// ============================================================================
// Update Sink
// ============================================================================

/// A raw update tagged with the variable it belongs to.
#[derive(Debug, Clone)]
pub struct TaggedUpdate {
    pub variable: VariableName,
    pub update: RawUpdate,
}

/// Thread-safe callback target handed to providers.
///
/// `push` never blocks and never awaits, so it is safe to call from any
/// provider thread, async or not.
#[derive(Debug, Clone)]
pub struct UpdateSink {
    sender: mpsc::Sender<TaggedUpdate>,
}

impl UpdateSink {
    /// Creates a sink and the receiving end of its queue.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<TaggedUpdate>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }

    /// Hands an update off to the dispatcher.
    ///
    /// Returns `false` if the update was dropped because the queue is full
    /// or the dispatcher has stopped.
    pub fn push(&self, variable: VariableName, update: RawUpdate) -> bool {
        match self.sender.try_send(TaggedUpdate { variable, update }) {
            Ok(()) => true,
            Err(TrySendError::Full(dropped)) => {
                warn!(
                    pv = %dropped.variable,
                    "Update queue full, dropping update"
                );
                false
            }
            Err(TrySendError::Closed(dropped)) => {
                debug!(
                    pv = %dropped.variable,
                    "Dispatcher stopped, dropping update"
                );
                false
            }
        }
    }

    /// Whether the dispatcher side is gone.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

// ============================================================================
// Outboxes
// ============================================================================

/// Outbound queues of every connected subscriber.
#[derive(Debug, Clone, Default)]
pub struct Outboxes {
    inner: Arc<RwLock<HashMap<SubscriberId, OutboxSender>>>,
}

impl Outboxes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a subscriber's queue, replacing any previous one.
    pub async fn insert(&self, subscriber: SubscriberId, sender: OutboxSender) {
        self.inner.write().await.insert(subscriber, sender);
        debug!(client_id = %subscriber, "Added outbox");
    }

    /// Removes a subscriber's queue. Returns whether one was registered.
    pub async fn remove(&self, subscriber: SubscriberId) -> bool {
        let removed = self.inner.write().await.remove(&subscriber).is_some();
        if removed {
            debug!(client_id = %subscriber, "Removed outbox");
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Offers `frame` to each listed subscriber without waiting.
    async fn offer(&self, recipients: &[SubscriberId], frame: &Frame) -> DeliveryReport {
        let outboxes = self.inner.read().await;
        let mut report = DeliveryReport::default();

        for subscriber in recipients {
            let Some(outbox) = outboxes.get(subscriber) else {
                // Registered but not (or no longer) connected
                report.missing += 1;
                continue;
            };

            match outbox.try_send(Arc::clone(frame)) {
                Ok(()) => report.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    debug!(client_id = %subscriber, "Outbox full, dropping frame");
                    report.dropped += 1;
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(client_id = %subscriber, "Outbox closed, dropping frame");
                    report.dropped += 1;
                }
            }
        }

        report
    }
}

/// Outcome of fanning out one update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Frames queued for a subscriber
    pub delivered: usize,
    /// Frames lost to a full or closed outbox
    pub dropped: usize,
    /// Subscribers with no outbox registered
    pub missing: usize,
}

// ============================================================================
// Dispatcher
// ============================================================================

/// Fans normalized updates out to subscribers.
#[derive(Clone)]
pub struct Dispatcher {
    registry: RegistryHandle,
    outboxes: Outboxes,
}

impl Dispatcher {
    pub fn new(registry: RegistryHandle, outboxes: Outboxes) -> Self {
        Self { registry, outboxes }
    }

    /// Drains the update queue until cancelled or every sink is dropped.
    pub async fn run(self, mut updates: mpsc::Receiver<TaggedUpdate>, cancel: CancellationToken) {
        info!("Dispatcher starting");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Dispatcher shutting down");
                    break;
                }

                next = updates.recv() => {
                    let Some(TaggedUpdate { variable, update }) = next else {
                        debug!("Update queue closed");
                        break;
                    };
                    self.dispatch(variable, update).await;
                }
            }
        }

        info!("Dispatcher stopped");
    }

    /// Delivers one update to every current subscriber of `variable`.
    pub async fn dispatch(&self, variable: VariableName, update: RawUpdate) -> DeliveryReport {
        let recipients = self.registry.subscribers(variable.clone()).await;
        if recipients.is_empty() {
            trace!(pv = %variable, "No subscribers, discarding update");
            return DeliveryReport::default();
        }

        let message = ServerMessage::update(variable.clone(), normalize(update));
        let frame: Frame = match message.to_json() {
            Ok(json) => json.into(),
            Err(e) => {
                error!(pv = %variable, error = %e, "Failed to serialize update");
                return DeliveryReport::default();
            }
        };

        let report = self.outboxes.offer(&recipients, &frame).await;
        trace!(
            pv = %variable,
            delivered = report.delivered,
            dropped = report.dropped,
            "Update dispatched"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::spawn_registry;
    use pvbridge_core::PvValue;
    use serde_json::Value;

    fn pv(name: &str) -> VariableName {
        VariableName::new(name)
    }

    #[tokio::test]
    async fn test_sink_push_and_receive() {
        let (sink, mut rx) = UpdateSink::channel(4);
        assert!(sink.push(pv("X"), RawUpdate::with_value(1.0)));

        let tagged = rx.recv().await.unwrap();
        assert_eq!(tagged.variable, pv("X"));
        assert_eq!(tagged.update.value, Some(PvValue::Double(1.0)));
    }

    #[tokio::test]
    async fn test_sink_drops_when_full() {
        let (sink, _rx) = UpdateSink::channel(1);
        assert!(sink.push(pv("X"), RawUpdate::with_value(1.0)));
        assert!(!sink.push(pv("X"), RawUpdate::with_value(2.0)));
    }

    #[tokio::test]
    async fn test_sink_reports_closed_dispatcher() {
        let (sink, rx) = UpdateSink::channel(1);
        drop(rx);
        assert!(sink.is_closed());
        assert!(!sink.push(pv("X"), RawUpdate::with_value(1.0)));
    }

    #[tokio::test]
    async fn test_sink_usable_from_plain_thread() {
        let (sink, mut rx) = UpdateSink::channel(8);
        let pushed = std::thread::spawn(move || sink.push(pv("X"), RawUpdate::with_value(3_i64)))
            .join()
            .unwrap();
        assert!(pushed);
        assert_eq!(rx.recv().await.unwrap().update.value, Some(PvValue::Int(3)));
    }

    #[tokio::test]
    async fn test_dispatch_reaches_only_subscribers() {
        let registry = spawn_registry();
        let outboxes = Outboxes::new();
        let dispatcher = Dispatcher::new(registry.clone(), outboxes.clone());

        let (a_tx, mut a_rx) = mpsc::channel(4);
        let (b_tx, mut b_rx) = mpsc::channel(4);
        outboxes.insert(SubscriberId::new(1), a_tx).await;
        outboxes.insert(SubscriberId::new(2), b_tx).await;

        registry.subscribe(SubscriberId::new(1), pv("X")).await.unwrap();

        let report = dispatcher
            .dispatch(pv("X"), RawUpdate::with_value(2.5))
            .await;
        assert_eq!(report.delivered, 1);

        let frame = a_rx.try_recv().unwrap();
        let json: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(json["type"], "update");
        assert_eq!(json["pv"], "X");
        assert_eq!(json["value"], 2.5);

        assert!(b_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_dispatch_without_subscribers_is_noop() {
        let registry = spawn_registry();
        let dispatcher = Dispatcher::new(registry, Outboxes::new());

        let report = dispatcher
            .dispatch(pv("nobody"), RawUpdate::with_value(1.0))
            .await;
        assert_eq!(report, DeliveryReport::default());
    }

    #[tokio::test]
    async fn test_full_outbox_does_not_block_others() {
        let registry = spawn_registry();
        let outboxes = Outboxes::new();
        let dispatcher = Dispatcher::new(registry.clone(), outboxes.clone());

        let (slow_tx, _slow_rx) = mpsc::channel(1);
        let (fast_tx, mut fast_rx) = mpsc::channel(16);
        outboxes.insert(SubscriberId::new(1), slow_tx).await;
        outboxes.insert(SubscriberId::new(2), fast_tx).await;
        registry.subscribe(SubscriberId::new(1), pv("X")).await.unwrap();
        registry.subscribe(SubscriberId::new(2), pv("X")).await.unwrap();

        let mut dropped = 0;
        for i in 0..5 {
            let report = dispatcher
                .dispatch(pv("X"), RawUpdate::with_value(i as f64))
                .await;
            dropped += report.dropped;
        }

        // Slow subscriber keeps only the first frame
        assert_eq!(dropped, 4);

        let mut received = Vec::new();
        while let Ok(frame) = fast_rx.try_recv() {
            let json: Value = serde_json::from_str(&frame).unwrap();
            received.push(json["value"].as_f64().unwrap());
        }
        assert_eq!(received, vec![0.0, 1.0, 2.0, 3.0, 4.0]);
    }

    #[tokio::test]
    async fn test_closed_outbox_isolated_and_kept_registered() {
        let registry = spawn_registry();
        let outboxes = Outboxes::new();
        let dispatcher = Dispatcher::new(registry.clone(), outboxes.clone());

        let (gone_tx, gone_rx) = mpsc::channel(16);
        let (live_tx, mut live_rx) = mpsc::channel(16);
        outboxes.insert(SubscriberId::new(1), gone_tx).await;
        outboxes.insert(SubscriberId::new(2), live_tx).await;
        registry.subscribe(SubscriberId::new(1), pv("X")).await.unwrap();
        registry.subscribe(SubscriberId::new(2), pv("X")).await.unwrap();
        drop(gone_rx);

        let report = dispatcher
            .dispatch(pv("X"), RawUpdate::with_value(2.5))
            .await;

        assert_eq!(report.delivered, 1);
        assert_eq!(report.dropped, 1);
        assert_eq!(report.missing, 0);

        let frame = live_rx.try_recv().unwrap();
        let json: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(json["value"], 2.5);

        // Only the session's own disconnect removes it from the registry
        let mut subscribers = registry.subscribers(pv("X")).await;
        subscribers.sort();
        assert_eq!(subscribers, vec![SubscriberId::new(1), SubscriberId::new(2)]);
    }

    #[tokio::test]
    async fn test_missing_outbox_counted() {
        let registry = spawn_registry();
        let dispatcher = Dispatcher::new(registry.clone(), Outboxes::new());
        registry.subscribe(SubscriberId::new(7), pv("X")).await.unwrap();

        let report = dispatcher
            .dispatch(pv("X"), RawUpdate::with_value(1.0))
            .await;
        assert_eq!(report.missing, 1);
        assert_eq!(report.delivered, 0);
    }

    #[tokio::test]
    async fn test_run_stops_on_cancel() {
        let registry = spawn_registry();
        let (_sink, rx) = UpdateSink::channel(4);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(Dispatcher::new(registry, Outboxes::new()).run(rx, cancel.clone()));

        cancel.cancel();
        assert!(task.await.is_ok());
    }
}

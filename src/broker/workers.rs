//! Background workers
//!
//! - Distribution workers drain the global ingress queue and copy each event
//!   into every listener queue registered for its chat.
//! - Two garbage collectors periodically reclaim empty topics and stalled
//!   listeners.
//!
//! All loops stop when the shared cancellation token fires. A worker that is
//! in the middle of a fan-out finishes it before checking the token again.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use crate::broker::listener_map::ListenerMap;
use crate::broker::message::MessageEvent;

/// Delivery counters. Events dropped on a full queue are only visible here
/// and in debug logs.
#[derive(Debug, Default)]
pub struct DeliveryStats {
    delivered: AtomicU64,
    dropped: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeliverySnapshot {
    pub delivered: u64,
    pub dropped: u64,
}

impl DeliveryStats {
    pub fn snapshot(&self) -> DeliverySnapshot {
        DeliverySnapshot {
            delivered: self.delivered.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

/// Push `event` to every current listener of its chat without blocking.
/// Returns how many queues accepted it.
pub fn fan_out(listeners: &ListenerMap, stats: &DeliveryStats, event: &MessageEvent) -> usize {
    let snapshot = listeners.listeners_of(&event.chat_id);
    let mut delivered = 0;

    for (connection_id, tx) in snapshot {
        match tx.try_send(event.clone()) {
            Ok(()) => delivered += 1,
            Err(flume::TrySendError::Full(_)) => {
                stats.dropped.fetch_add(1, Ordering::Relaxed);
                debug!(
                    chat_id = %event.chat_id,
                    %connection_id,
                    "listener queue full, dropping event"
                );
            }
            Err(flume::TrySendError::Disconnected(_)) => {
                trace!(%connection_id, "listener gone before delivery");
            }
        }
    }

    stats
        .delivered
        .fetch_add(delivered as u64, Ordering::Relaxed);
    delivered
}

pub async fn run_distribution_worker(
    id: usize,
    ingress: flume::Receiver<MessageEvent>,
    listeners: Arc<ListenerMap>,
    stats: Arc<DeliveryStats>,
    cancel: CancellationToken,
) {
    debug!(worker = id, "distribution worker started");
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = ingress.recv_async() => match event {
                Ok(event) => event,
                Err(_) => break,
            },
        };
        fan_out(&listeners, &stats, &event);
    }
    debug!(worker = id, "distribution worker stopped");
}

pub async fn run_empty_topic_gc(
    listeners: Arc<ListenerMap>,
    every: Duration,
    cancel: CancellationToken,
) {
    run_periodic(every, cancel, || {
        let removed = listeners.reclaim_empty_topics();
        info!(removed, "reclaimed empty topics");
    })
    .await;
}

pub async fn run_stalled_listener_gc(
    listeners: Arc<ListenerMap>,
    every: Duration,
    cancel: CancellationToken,
) {
    run_periodic(every, cancel, || {
        let removed = listeners.reclaim_stalled_listeners();
        info!(removed, "reclaimed stalled listeners");
    })
    .await;
}

async fn run_periodic(every: Duration, cancel: CancellationToken, mut tick: impl FnMut()) {
    let mut interval = tokio::time::interval(every);
    // first tick completes immediately
    interval.tick().await;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => tick(),
        }
    }
}

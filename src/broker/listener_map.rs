//! Topic registry
//!
//! `ListenerMap` maps a chat id to the listener queues currently subscribed
//! to it. It knows nothing about transports or persistence.
//!
//! Concurrency and usage notes:
//! - All state sits behind one `RwLock`. Lookups take the read side and
//!   return owned snapshots, so callers never iterate live internal state
//!   and never hold the lock while pushing into a queue.
//! - Structural changes (subscribe, unsubscribe, reclamation, shutdown) take
//!   the write side. Reclamation removes the binding and closes the queue
//!   inside the same critical section.
//! - A listener counts as stalled when its queue is full. This is an O(1)
//!   check with no per-listener timer; a slow but alive consumer that is
//!   momentarily full will be reclaimed too.

use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::debug;

use crate::broker::message::{ChatId, ConnectionId};
use crate::broker::topic::{ListenerRx, ListenerTx, Topic};

#[derive(Debug)]
pub struct ListenerMap {
    topics: RwLock<HashMap<ChatId, Topic>>,
    queue_capacity: usize,
}

impl ListenerMap {
    /// Per-chat listener queue size used by `Default`.
    pub const DEFAULT_QUEUE_CAPACITY: usize = 16;

    /// Create an empty registry whose listener queues hold `queue_capacity`
    /// events (at least one).
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            topics: RwLock::new(HashMap::new()),
            queue_capacity: queue_capacity.max(1),
        }
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    /// Register a queue for (connection, chat), or return the existing one.
    pub fn subscribe(&self, connection_id: &str, chat_id: &str) -> ListenerRx {
        let mut topics = self.topics.write();
        topics
            .entry(chat_id.to_string())
            .or_insert_with(|| Topic::new(chat_id))
            .subscribe(connection_id, self.queue_capacity)
    }

    /// Remove the binding for (connection, chat). The topic entry itself is
    /// left for `reclaim_empty_topics`.
    pub fn unsubscribe(&self, connection_id: &str, chat_id: &str) -> bool {
        let mut topics = self.topics.write();
        match topics.get_mut(chat_id) {
            Some(topic) => topic.unsubscribe(connection_id),
            None => false,
        }
    }

    /// Point-in-time copy of a chat's listeners. Unknown chats yield an empty
    /// map.
    pub fn listeners_of(&self, chat_id: &str) -> HashMap<ConnectionId, ListenerTx> {
        let topics = self.topics.read();
        topics
            .get(chat_id)
            .map(Topic::senders)
            .unwrap_or_default()
    }

    /// Close every queue and forget all topics. Used at shutdown.
    pub fn close_all(&self) {
        let mut topics = self.topics.write();
        let closed: usize = topics.values().map(Topic::len).sum();
        topics.clear();
        debug!(closed, "closed all listener queues");
    }

    /// Remove every topic with no listeners; returns how many were removed.
    pub fn reclaim_empty_topics(&self) -> usize {
        let mut topics = self.topics.write();
        let before = topics.len();
        topics.retain(|_, topic| !topic.is_empty());
        before - topics.len()
    }

    /// Close and remove every listener whose queue is full, dropping topics
    /// that end up empty. Returns the number of listeners reclaimed.
    pub fn reclaim_stalled_listeners(&self) -> usize {
        let mut topics = self.topics.write();
        let mut reclaimed = 0;
        topics.retain(|chat_id, topic| {
            let stalled = topic.reclaim_stalled();
            if stalled.is_empty() {
                return true;
            }
            for connection_id in &stalled {
                debug!(%chat_id, %connection_id, "reclaimed stalled listener");
            }
            reclaimed += stalled.len();
            !topic.is_empty()
        });
        reclaimed
    }

    pub fn is_subscribed(&self, connection_id: &str, chat_id: &str) -> bool {
        self.topics
            .read()
            .get(chat_id)
            .is_some_and(|t| t.contains(connection_id))
    }

    pub fn topic_count(&self) -> usize {
        self.topics.read().len()
    }

    pub fn listener_count(&self) -> usize {
        self.topics.read().values().map(Topic::len).sum()
    }
}

impl Default for ListenerMap {
    fn default() -> Self {
        Self::new(Self::DEFAULT_QUEUE_CAPACITY)
    }
}

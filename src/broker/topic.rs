//! Topic management
//!
//! A `Topic` holds the listener queues of one chat, keyed by connection id.
//! Each listener is a bounded `flume` channel; the topic keeps both ends so
//! that repeated subscriptions for the same connection hand out the same
//! queue. Dropping a `Listener` drops the topic's producer handle, which is
//! how a queue gets closed: once the last in-flight snapshot sender is gone
//! the reader observes disconnection.
//!
//! Concurrency note: callers must synchronize access to `Topic` (the
//! `ListenerMap` lock does this).

use std::collections::HashMap;

use crate::broker::message::{ChatId, ConnectionId, MessageEvent};

pub type ListenerTx = flume::Sender<MessageEvent>;
pub type ListenerRx = flume::Receiver<MessageEvent>;

#[derive(Debug)]
pub struct Listener {
    tx: ListenerTx,
    rx: ListenerRx,
}

impl Listener {
    fn new(capacity: usize) -> Self {
        let (tx, rx) = flume::bounded(capacity);
        Self { tx, rx }
    }

    /// A full queue is taken as a consumer that stopped draining.
    pub fn is_stalled(&self) -> bool {
        self.tx.is_full()
    }
}

#[derive(Debug)]
pub struct Topic {
    pub chat_id: ChatId,
    listeners: HashMap<ConnectionId, Listener>,
}

impl Topic {
    /// Create an empty topic for `chat_id`.
    pub fn new(chat_id: &str) -> Self {
        Self {
            chat_id: chat_id.to_string(),
            listeners: HashMap::new(),
        }
    }

    /// Return the reader of this connection's queue, creating the queue with
    /// `capacity` slots on first use.
    pub fn subscribe(&mut self, connection_id: &str, capacity: usize) -> ListenerRx {
        self.listeners
            .entry(connection_id.to_string())
            .or_insert_with(|| Listener::new(capacity))
            .rx
            .clone()
    }

    /// Remove (and thereby close) a connection's queue.
    pub fn unsubscribe(&mut self, connection_id: &str) -> bool {
        self.listeners.remove(connection_id).is_some()
    }

    pub fn senders(&self) -> HashMap<ConnectionId, ListenerTx> {
        self.listeners
            .iter()
            .map(|(id, l)| (id.clone(), l.tx.clone()))
            .collect()
    }

    /// Close and remove every listener whose queue is full. Returns the
    /// connection ids that were reclaimed.
    pub fn reclaim_stalled(&mut self) -> Vec<ConnectionId> {
        let stalled: Vec<ConnectionId> = self
            .listeners
            .iter()
            .filter(|(_, l)| l.is_stalled())
            .map(|(id, _)| id.clone())
            .collect();
        for id in &stalled {
            self.listeners.remove(id);
        }
        stalled
    }

    pub fn contains(&self, connection_id: &str) -> bool {
        self.listeners.contains_key(connection_id)
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

//! Per-connection fan-in
//!
//! Every live connection owns one bounded outbound queue. One forwarding task
//! per subscribed chat copies events from that chat's listener queue into the
//! outbound queue until the connection's cancellation token fires or the
//! listener queue is closed by the registry.
//!
//! The outbound queue is closed exactly once. Each connection counts its
//! participants: one scope watcher plus one forwarder per chat. Whoever
//! releases the last participant removes the connection entry, which drops
//! the stored producer handle; the queue then reports disconnection to the
//! reader as soon as the exiting task's own handle is gone.
//!
//! Lock order is always connections first, then the listener registry.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::broker::ListenerMap;
use crate::broker::message::{ChatId, ConnectionId, OutboundEvent, UserId};
use crate::broker::topic::ListenerRx;

pub type OutboundRx = flume::Receiver<OutboundEvent>;
type OutboundTx = flume::Sender<OutboundEvent>;

#[derive(Debug)]
struct Connection {
    user_id: UserId,
    tx: OutboundTx,
    rx: OutboundRx,
    cancel: CancellationToken,
    chats: HashSet<ChatId>,
    participants: usize,
}

#[derive(Debug)]
pub struct Connections {
    inner: RwLock<HashMap<ConnectionId, Connection>>,
    listeners: Arc<ListenerMap>,
    queue_capacity: usize,
}

impl Connections {
    pub fn new(listeners: Arc<ListenerMap>, queue_capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            inner: RwLock::new(HashMap::new()),
            listeners,
            queue_capacity: queue_capacity.max(1),
        })
    }

    /// Subscribe `connection_id` to `chats` and return its outbound queue.
    ///
    /// Calling this again for a live connection only binds chats it is not
    /// already bound to; the first cancellation token stays in charge.
    pub fn attach(
        self: &Arc<Self>,
        cancel: CancellationToken,
        connection_id: &str,
        user_id: &str,
        chats: &[ChatId],
    ) -> OutboundRx {
        let mut inner = self.inner.write();
        let conn = inner
            .entry(connection_id.to_string())
            .or_insert_with(|| {
                let (tx, rx) = flume::bounded(self.queue_capacity);
                self.spawn_watcher(connection_id, cancel.clone());
                Connection {
                    user_id: user_id.to_string(),
                    tx,
                    rx,
                    cancel,
                    chats: HashSet::new(),
                    participants: 1,
                }
            });

        for chat_id in chats {
            self.bind_chat(connection_id, conn, chat_id);
        }
        debug!(%connection_id, chats = conn.chats.len(), "connection attached");
        conn.rx.clone()
    }

    /// Deliver `event` to every live connection of `members` and bind those
    /// connections to `chat_id`. Returns how many connections were reached.
    pub fn join_chat(
        self: &Arc<Self>,
        chat_id: &str,
        members: &[UserId],
        event: OutboundEvent,
    ) -> usize {
        let members: HashSet<&str> = members.iter().map(String::as_str).collect();
        let mut inner = self.inner.write();
        let mut reached = 0;

        for (connection_id, conn) in inner.iter_mut() {
            if conn.cancel.is_cancelled() || !members.contains(conn.user_id.as_str()) {
                continue;
            }
            if let Err(flume::TrySendError::Full(_)) = conn.tx.try_send(event.clone()) {
                warn!(%connection_id, %chat_id, "outbound queue full, join preview dropped");
            }
            self.bind_chat(connection_id, conn, chat_id);
            reached += 1;
        }
        reached
    }

    pub fn is_live(&self, connection_id: &str) -> bool {
        self.inner.read().contains_key(connection_id)
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    fn bind_chat(self: &Arc<Self>, connection_id: &str, conn: &mut Connection, chat_id: &str) {
        if conn.cancel.is_cancelled() || !conn.chats.insert(chat_id.to_string()) {
            return;
        }
        conn.participants += 1;
        let source = self.listeners.subscribe(connection_id, chat_id);
        tokio::spawn(self.clone().forward(
            connection_id.to_string(),
            chat_id.to_string(),
            source,
            conn.tx.clone(),
            conn.cancel.clone(),
        ));
    }

    fn spawn_watcher(self: &Arc<Self>, connection_id: &str, cancel: CancellationToken) {
        let me = self.clone();
        let connection_id = connection_id.to_string();
        tokio::spawn(async move {
            cancel.cancelled().await;
            debug!(%connection_id, "connection scope cancelled");
            me.release(&connection_id, None);
        });
    }

    async fn forward(
        self: Arc<Self>,
        connection_id: ConnectionId,
        chat_id: ChatId,
        source: ListenerRx,
        out: OutboundTx,
        cancel: CancellationToken,
    ) {
        loop {
            // cancellation wins over queued events
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                event = source.recv_async() => match event {
                    Ok(event) => event,
                    // listener reclaimed by the registry
                    Err(_) => break,
                },
            };
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                sent = out.send_async(OutboundEvent::Message(event)) => {
                    if sent.is_err() {
                        break;
                    }
                }
            }
        }
        drop(out);
        self.release(&connection_id, Some(&chat_id));
    }

    /// Give up one participant of a connection. Forwarders also drop their
    /// registry binding. The last participant removes the connection.
    fn release(&self, connection_id: &str, chat_id: Option<&str>) {
        let mut inner = self.inner.write();
        let Some(conn) = inner.get_mut(connection_id) else {
            return;
        };
        if let Some(chat_id) = chat_id {
            conn.chats.remove(chat_id);
            self.listeners.unsubscribe(connection_id, chat_id);
        }
        conn.participants -= 1;
        if conn.participants == 0 {
            inner.remove(connection_id);
            debug!(%connection_id, "outbound queue closed");
        }
    }
}

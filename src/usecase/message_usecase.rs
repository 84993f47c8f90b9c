//! Message orchestrator
//!
//! `MessageUsecase` is the façade transport adapters talk to. It admits new
//! messages (authorization, sender metadata, bounded wait on the ingress
//! queue, persistence), manages connection subscriptions, and owns the
//! background workers.
//!
//! Ordering note: a message is pushed to the ingress queue before it is
//! persisted. Listeners may therefore see a message whose insert later
//! fails; the error still reaches the sender. A message rejected for
//! overload is never persisted.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::broker::message::{
    Attachment, ChatId, MessageEvent, MessageId, NewMessage, OutboundEvent, UserId,
};
use crate::broker::workers::{
    run_distribution_worker, run_empty_topic_gc, run_stalled_listener_gc,
};
use crate::broker::{DeliverySnapshot, DeliveryStats, ListenerMap};
use crate::config::DistributionSettings;
use crate::store::{Role, Store};
use crate::usecase::connections::{Connections, OutboundRx};
use crate::utils::ChatError;

/// Minimum role required to post into a chat.
pub const WRITE_ROLE: Role = Role::Member;

#[derive(Debug)]
pub struct MessageUsecase {
    store: Store,
    settings: DistributionSettings,
    listeners: Arc<ListenerMap>,
    connections: Arc<Connections>,
    stats: Arc<DeliveryStats>,
    ingress_tx: flume::Sender<MessageEvent>,
    ingress_rx: flume::Receiver<MessageEvent>,
    shutdown: CancellationToken,
    tasks: TaskTracker,
    started: AtomicBool,
}

impl MessageUsecase {
    pub fn new(store: Store, settings: DistributionSettings) -> Self {
        let listeners = Arc::new(ListenerMap::new(settings.chat_queue_capacity));
        let connections = Connections::new(listeners.clone(), settings.connection_queue_capacity);
        let (ingress_tx, ingress_rx) = flume::bounded(settings.ingress_capacity.max(1));
        Self {
            store,
            settings,
            listeners,
            connections,
            stats: Arc::new(DeliveryStats::default()),
            ingress_tx,
            ingress_rx,
            shutdown: CancellationToken::new(),
            tasks: TaskTracker::new(),
            started: AtomicBool::new(false),
        }
    }

    /// Spawn the distribution workers and both garbage collectors. Only the
    /// first call has an effect.
    pub fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        let workers = self.settings.workers.max(1);
        for id in 0..workers {
            self.tasks.spawn(run_distribution_worker(
                id,
                self.ingress_rx.clone(),
                self.listeners.clone(),
                self.stats.clone(),
                self.shutdown.clone(),
            ));
        }
        self.tasks.spawn(run_empty_topic_gc(
            self.listeners.clone(),
            self.settings.empty_topic_gc_interval(),
            self.shutdown.clone(),
        ));
        self.tasks.spawn(run_stalled_listener_gc(
            self.listeners.clone(),
            self.settings.stalled_listener_gc_interval(),
            self.shutdown.clone(),
        ));
        info!(workers, "message distribution started");
    }

    /// Admit a new message from `sender_id`.
    ///
    /// Fails with `AuthorizationDenied` before anything is queued, with
    /// `ServiceOverloaded` if the ingress queue stays full for the configured
    /// timeout, and with `Dependency` if the user lookup or the insert fails.
    pub async fn add_message(
        &self,
        message: NewMessage,
        sender_id: &str,
    ) -> Result<MessageId, ChatError> {
        if self.shutdown.is_cancelled() {
            return Err(ChatError::Stopped);
        }

        let allowed = self
            .store
            .roles
            .has_role(sender_id, &message.chat_id, WRITE_ROLE)
            .await?;
        if !allowed {
            return Err(ChatError::AuthorizationDenied {
                user_id: sender_id.to_string(),
                chat_id: message.chat_id,
            });
        }

        let sender = self.store.users.get_user_by_id(sender_id).await?;
        let avatar_url = match sender.avatar_id.as_deref() {
            Some(avatar_id) => Some(self.resolve_url_or_empty(avatar_id).await),
            None => None,
        };
        let attachment = match message.attachment_id {
            Some(file_id) => Some(Attachment {
                url: self.resolve_url_or_empty(&file_id).await,
                file_id,
            }),
            None => None,
        };

        let now = Utc::now();
        let event = MessageEvent {
            message_id: uuid::Uuid::new_v4().to_string(),
            chat_id: message.chat_id,
            sender_id: Some(sender.id),
            sender_name: Some(sender.name),
            sender_avatar_url: avatar_url,
            text: message.text,
            kind: message.kind,
            attachment,
            created_at: now,
            updated_at: now,
        };

        self.enqueue(event.clone()).await?;

        let id = self.store.messages.insert(&event).await?;
        debug!(message_id = %id, chat_id = %event.chat_id, "message stored");
        Ok(id)
    }

    /// Bind a connection to `chats` and return its merged outbound queue.
    /// The queue closes once `cancel` fires and every forwarder has exited.
    pub fn subscribe_connection_to_chats(
        &self,
        cancel: CancellationToken,
        connection_id: &str,
        user_id: &str,
        chats: &[ChatId],
    ) -> OutboundRx {
        self.connections
            .attach(cancel, connection_id, user_id, chats)
    }

    /// Announce `chat_id` to the live connections of `members` and start
    /// forwarding its messages to them. Returns how many connections were
    /// reached.
    pub async fn subscribe_users_on_chat(
        &self,
        chat_id: &str,
        members: &[UserId],
    ) -> Result<usize, ChatError> {
        let preview = self
            .store
            .chats
            .chat_preview(chat_id, self.settings.history_preview_len)
            .await
            .map_err(|source| ChatError::SubscriptionSetup {
                chat_id: chat_id.to_string(),
                source,
            })?;

        let reached = self
            .connections
            .join_chat(chat_id, members, OutboundEvent::ChatJoined(preview));
        debug!(%chat_id, reached, "chat announced to live connections");
        Ok(reached)
    }

    /// Stop all distribution and garbage-collection workers. Idempotent.
    pub fn stop(&self) {
        if self.shutdown.is_cancelled() {
            return;
        }
        self.shutdown.cancel();
        self.tasks.close();
        info!("message distribution stopping");
    }

    /// Wait for the background workers to exit after `stop`.
    pub async fn wait(&self) {
        self.tasks.wait().await;
    }

    /// Close every listener queue. Only meaningful after `stop`.
    pub fn close_all(&self) {
        self.listeners.close_all();
    }

    pub fn listeners(&self) -> &Arc<ListenerMap> {
        &self.listeners
    }

    pub fn connections(&self) -> &Arc<Connections> {
        &self.connections
    }

    pub fn stats(&self) -> DeliverySnapshot {
        self.stats.snapshot()
    }

    async fn enqueue(&self, event: MessageEvent) -> Result<(), ChatError> {
        let waited = self.settings.ingress_timeout();
        tokio::select! {
            _ = self.shutdown.cancelled() => Err(ChatError::Stopped),
            sent = tokio::time::timeout(waited, self.ingress_tx.send_async(event)) => match sent {
                Ok(Ok(())) => Ok(()),
                Ok(Err(_)) => Err(ChatError::Stopped),
                Err(_) => {
                    warn!(?waited, "ingress queue full, rejecting message");
                    Err(ChatError::ServiceOverloaded { waited })
                }
            },
        }
    }

    async fn resolve_url_or_empty(&self, object_id: &str) -> String {
        match self.store.files.resolve_url(object_id).await {
            Ok(url) => url,
            Err(e) => {
                warn!(%object_id, error = %e, "could not resolve file url, using empty url");
                String::new()
            }
        }
    }
}

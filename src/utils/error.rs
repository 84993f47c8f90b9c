//! Error types for the distribution core and its storage collaborators.
//!
//! - [`ChatError`] is what transport adapters see from `MessageUsecase`.
//! - [`StoreError`] is raised by the collaborator traits in `store`.
//!
//! Events dropped on a full listener queue are not errors and never surface
//! here; they are counted in `DeliveryStats` instead.

use std::time::Duration;
use thiserror::Error;

use crate::broker::message::{ChatId, UserId};

/// Errors returned by the message orchestrator.
#[derive(Error, Debug)]
pub enum ChatError {
    /// The sender lacks the role required to post into the chat.
    #[error("user {user_id} is not allowed to post in chat {chat_id}")]
    AuthorizationDenied { user_id: UserId, chat_id: ChatId },

    /// The ingress queue stayed full for the whole admission window.
    /// The message was not persisted.
    #[error("service overloaded: ingress queue full after {waited:?}")]
    ServiceOverloaded { waited: Duration },

    /// A user lookup or persistence call failed.
    #[error("dependency failure: {0}")]
    Dependency(#[from] StoreError),

    /// The join preview for a chat could not be built.
    #[error("subscription setup failed for chat {chat_id}: {source}")]
    SubscriptionSetup {
        chat_id: ChatId,
        #[source]
        source: StoreError,
    },

    /// `stop()` was called; no more messages are admitted.
    #[error("message usecase stopped")]
    Stopped,
}

impl ChatError {
    /// Only overload is worth retrying after a backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ChatError::ServiceOverloaded { .. })
    }

    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            ChatError::AuthorizationDenied { .. } => "authorization_denied",
            ChatError::ServiceOverloaded { .. } => "service_overloaded",
            ChatError::Dependency(_) => "dependency_failure",
            ChatError::SubscriptionSetup { .. } => "subscription_setup_failure",
            ChatError::Stopped => "stopped",
        }
    }
}

/// Errors raised by storage collaborators.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    #[error("sled: {0}")]
    Sled(#[from] sled::Error),

    #[error("codec: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        StoreError::NotFound {
            kind,
            id: id.into(),
        }
    }
}

//! The `store` module defines the collaborators the distribution core relies
//! on but does not own: authorization, user lookup, object storage, message
//! persistence and chat history.
//!
//! Each concern is an object-safe async trait so the orchestrator can be
//! wired against `sled` in the binary and against in-memory fakes in tests.
//! `SledStore` implements all of the repository traits over one embedded
//! database; `StaticFileStorage` turns object ids into URLs.

pub mod files;
pub mod sled_store;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::broker::message::{ChatId, ChatPreview, MessageEvent, MessageId, UserId};
use crate::utils::StoreError;

pub use files::StaticFileStorage;
pub use sled_store::SledStore;

/// Chat roles, ordered from least to most privileged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Viewer,
    Member,
    Admin,
    Owner,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub avatar_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chat {
    pub id: ChatId,
    pub name: String,
}

#[async_trait]
pub trait RoleChecker: Send + Sync {
    /// True when `user_id` holds at least `minimum` in `chat_id`.
    async fn has_role(&self, user_id: &str, chat_id: &str, minimum: Role)
    -> Result<bool, StoreError>;
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn get_user_by_id(&self, user_id: &str) -> Result<User, StoreError>;
}

#[async_trait]
pub trait FileStorage: Send + Sync {
    async fn resolve_url(&self, object_id: &str) -> Result<String, StoreError>;
}

#[async_trait]
pub trait MessageRepository: Send + Sync {
    async fn insert(&self, message: &MessageEvent) -> Result<MessageId, StoreError>;
}

#[async_trait]
pub trait ChatRepository: Send + Sync {
    /// Chat metadata plus up to `limit` most recent messages, oldest first.
    async fn chat_preview(&self, chat_id: &str, limit: usize) -> Result<ChatPreview, StoreError>;
}

/// The set of collaborators handed to `MessageUsecase`.
#[derive(Clone)]
pub struct Store {
    pub roles: Arc<dyn RoleChecker>,
    pub users: Arc<dyn UserRepository>,
    pub files: Arc<dyn FileStorage>,
    pub messages: Arc<dyn MessageRepository>,
    pub chats: Arc<dyn ChatRepository>,
}

impl Store {
    /// Wire every repository concern to one `SledStore`.
    pub fn from_sled(db: Arc<SledStore>, files: Arc<dyn FileStorage>) -> Self {
        Self {
            roles: db.clone(),
            users: db.clone(),
            files,
            messages: db.clone(),
            chats: db,
        }
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests;

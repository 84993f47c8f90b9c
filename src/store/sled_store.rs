//! Storage backed by `sled`
//!
//! Layout:
//! - `chats`: chat id -> `Chat`
//! - `users`: user id -> `User`
//! - `members`: `{chat}\0{user}` -> `Role`
//! - `memberships`: `{user}\0{chat}` -> `Role` (reverse index)
//! - `messages/{chat}`: one tree per chat. Keys are prefixed with a zero-padded
//!   millisecond timestamp so iteration yields messages in chronological
//!   order; a uuid suffix keeps keys unique within a millisecond.

use std::path::Path;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use sled::{Db, Tree};

use crate::broker::message::{ChatId, ChatPreview, MessageEvent, MessageId, UserId};
use crate::store::{
    Chat, ChatRepository, MessageRepository, Role, RoleChecker, User, UserRepository,
};
use crate::utils::StoreError;

const SEP: char = '\0';

#[derive(Clone)]
pub struct SledStore {
    db: Db,
    chats: Tree,
    users: Tree,
    members: Tree,
    memberships: Tree,
}

impl SledStore {
    /// Open or create a sled database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db = sled::open(path)?;
        Ok(Self {
            chats: db.open_tree("chats")?,
            users: db.open_tree("users")?,
            members: db.open_tree("members")?,
            memberships: db.open_tree("memberships")?,
            db,
        })
    }

    pub fn put_user(&self, user: &User) -> Result<(), StoreError> {
        put_json(&self.users, user.id.as_bytes(), user)
    }

    /// Create a chat and make `owner_id` its owner.
    pub fn create_chat(&self, chat: &Chat, owner_id: &str) -> Result<(), StoreError> {
        put_json(&self.chats, chat.id.as_bytes(), chat)?;
        self.add_member(&chat.id, owner_id, Role::Owner)
    }

    pub fn get_chat(&self, chat_id: &str) -> Result<Chat, StoreError> {
        get_json(&self.chats, chat_id.as_bytes())?
            .ok_or_else(|| StoreError::not_found("chat", chat_id))
    }

    /// Add or update a membership.
    pub fn add_member(&self, chat_id: &str, user_id: &str, role: Role) -> Result<(), StoreError> {
        put_json(&self.members, pair_key(chat_id, user_id).as_bytes(), &role)?;
        put_json(
            &self.memberships,
            pair_key(user_id, chat_id).as_bytes(),
            &role,
        )
    }

    pub fn role_of(&self, chat_id: &str, user_id: &str) -> Result<Option<Role>, StoreError> {
        get_json(&self.members, pair_key(chat_id, user_id).as_bytes())
    }

    pub fn chats_of_user(&self, user_id: &str) -> Result<Vec<ChatId>, StoreError> {
        scan_suffixes(&self.memberships, user_id)
    }

    pub fn members_of(&self, chat_id: &str) -> Result<Vec<UserId>, StoreError> {
        scan_suffixes(&self.members, chat_id)
    }

    /// Up to `limit` most recent messages of a chat, oldest first.
    pub fn load_messages(
        &self,
        chat_id: &str,
        limit: usize,
    ) -> Result<Vec<MessageEvent>, StoreError> {
        let tree = self.messages_tree(chat_id)?;
        let mut newest_first = Vec::with_capacity(limit);
        for entry in tree.iter().rev().take(limit) {
            let (_, value) = entry?;
            newest_first.push(serde_json::from_slice(&value)?);
        }
        newest_first.reverse();
        Ok(newest_first)
    }

    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }

    fn messages_tree(&self, chat_id: &str) -> Result<Tree, StoreError> {
        Ok(self.db.open_tree(format!("messages/{chat_id}"))?)
    }
}

#[async_trait]
impl RoleChecker for SledStore {
    async fn has_role(
        &self,
        user_id: &str,
        chat_id: &str,
        minimum: Role,
    ) -> Result<bool, StoreError> {
        Ok(self
            .role_of(chat_id, user_id)?
            .is_some_and(|role| role >= minimum))
    }
}

#[async_trait]
impl UserRepository for SledStore {
    async fn get_user_by_id(&self, user_id: &str) -> Result<User, StoreError> {
        get_json(&self.users, user_id.as_bytes())?
            .ok_or_else(|| StoreError::not_found("user", user_id))
    }
}

#[async_trait]
impl MessageRepository for SledStore {
    async fn insert(&self, message: &MessageEvent) -> Result<MessageId, StoreError> {
        let tree = self.messages_tree(&message.chat_id)?;
        let key = format!(
            "{:020}_{}",
            message.created_at.timestamp_millis(),
            message.message_id
        );
        put_json(&tree, key.as_bytes(), message)?;
        Ok(message.message_id.clone())
    }
}

#[async_trait]
impl ChatRepository for SledStore {
    async fn chat_preview(&self, chat_id: &str, limit: usize) -> Result<ChatPreview, StoreError> {
        let chat = self.get_chat(chat_id)?;
        Ok(ChatPreview {
            chat_id: chat.id,
            name: chat.name,
            last_messages: self.load_messages(chat_id, limit)?,
        })
    }
}

impl std::fmt::Debug for SledStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SledStore")
            .field("db", &"sled::Db")
            .finish()
    }
}

fn pair_key(a: &str, b: &str) -> String {
    format!("{a}{SEP}{b}")
}

fn scan_suffixes(tree: &Tree, prefix: &str) -> Result<Vec<String>, StoreError> {
    let prefix = format!("{prefix}{SEP}");
    let mut out = Vec::new();
    for entry in tree.scan_prefix(prefix.as_bytes()) {
        let (key, _) = entry?;
        if let Some(rest) = std::str::from_utf8(&key)
            .ok()
            .and_then(|k| k.strip_prefix(prefix.as_str()))
        {
            out.push(rest.to_string());
        }
    }
    Ok(out)
}

fn put_json<T: Serialize>(tree: &Tree, key: &[u8], value: &T) -> Result<(), StoreError> {
    tree.insert(key, serde_json::to_vec(value)?)?;
    Ok(())
}

fn get_json<T: DeserializeOwned>(tree: &Tree, key: &[u8]) -> Result<Option<T>, StoreError> {
    match tree.get(key)? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}

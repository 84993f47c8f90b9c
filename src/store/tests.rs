use chrono::{Duration, Utc};
use tempfile::TempDir;

use super::{
    Chat, ChatRepository, FileStorage, MessageRepository, Role, RoleChecker, SledStore,
    StaticFileStorage, User, UserRepository,
};
use crate::broker::message::{MessageEvent, MessageKind};
use crate::utils::StoreError;

fn create_test_store() -> (SledStore, TempDir) {
    let dir = TempDir::new().unwrap();
    let store = SledStore::open(dir.path()).unwrap();
    (store, dir)
}

fn message(chat_id: &str, text: &str, offset_ms: i64) -> MessageEvent {
    let at = Utc::now() + Duration::milliseconds(offset_ms);
    MessageEvent {
        message_id: uuid::Uuid::new_v4().to_string(),
        chat_id: chat_id.to_string(),
        sender_id: Some("alice".to_string()),
        sender_name: Some("Alice".to_string()),
        sender_avatar_url: None,
        text: text.to_string(),
        kind: MessageKind::User,
        attachment: None,
        created_at: at,
        updated_at: at,
    }
}

#[tokio::test]
async fn test_roles_are_ordered() {
    let (store, _dir) = create_test_store();
    store
        .create_chat(
            &Chat {
                id: "general".to_string(),
                name: "General".to_string(),
            },
            "alice",
        )
        .unwrap();
    store.add_member("general", "bob", Role::Viewer).unwrap();

    assert!(store.has_role("alice", "general", Role::Member).await.unwrap());
    assert!(!store.has_role("bob", "general", Role::Member).await.unwrap());
    assert!(store.has_role("bob", "general", Role::Viewer).await.unwrap());
    assert!(!store.has_role("carol", "general", Role::Viewer).await.unwrap());
}

#[test]
fn test_membership_indexes() {
    let (store, _dir) = create_test_store();
    for id in ["a", "b"] {
        store
            .create_chat(
                &Chat {
                    id: id.to_string(),
                    name: id.to_uppercase(),
                },
                "alice",
            )
            .unwrap();
    }
    store.add_member("a", "bob", Role::Member).unwrap();

    let mut chats = store.chats_of_user("alice").unwrap();
    chats.sort();
    assert_eq!(chats, vec!["a".to_string(), "b".to_string()]);

    let mut members = store.members_of("a").unwrap();
    members.sort();
    assert_eq!(members, vec!["alice".to_string(), "bob".to_string()]);
    assert!(store.chats_of_user("nobody").unwrap().is_empty());
}

#[tokio::test]
async fn test_get_user_by_id() {
    let (store, _dir) = create_test_store();
    let user = User {
        id: "alice".to_string(),
        name: "Alice".to_string(),
        avatar_id: Some("avatar-1".to_string()),
    };
    store.put_user(&user).unwrap();

    assert_eq!(store.get_user_by_id("alice").await.unwrap(), user);
    assert!(matches!(
        store.get_user_by_id("ghost").await,
        Err(StoreError::NotFound { kind: "user", .. })
    ));
}

#[tokio::test]
async fn test_insert_and_preview_keeps_latest_in_order() {
    let (store, _dir) = create_test_store();
    store
        .create_chat(
            &Chat {
                id: "general".to_string(),
                name: "General".to_string(),
            },
            "alice",
        )
        .unwrap();

    for (i, text) in ["one", "two", "three"].iter().enumerate() {
        let msg = message("general", text, i as i64);
        let id = store.insert(&msg).await.unwrap();
        assert_eq!(id, msg.message_id);
    }

    let preview = store.chat_preview("general", 2).await.unwrap();
    assert_eq!(preview.name, "General");
    let texts: Vec<_> = preview.last_messages.iter().map(|m| m.text.as_str()).collect();
    assert_eq!(texts, vec!["two", "three"]);
}

#[tokio::test]
async fn test_preview_of_unknown_chat_fails() {
    let (store, _dir) = create_test_store();
    assert!(store.chat_preview("missing", 5).await.is_err());
}

#[tokio::test]
async fn test_static_file_storage() {
    let files = StaticFileStorage::new("http://cdn.local/files/");
    assert_eq!(
        files.resolve_url("abc").await.unwrap(),
        "http://cdn.local/files/abc"
    );
    assert!(files.resolve_url("").await.is_err());
}

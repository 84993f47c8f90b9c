use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use super::message::{ClientMessage, ServerMessage};
use super::serve;
use super::websocket::{REPLY_QUEUE_CAPACITY, queue_reply};
use crate::config::DistributionSettings;
use crate::store::{Chat, Role, SledStore, StaticFileStorage, Store, User};
use crate::usecase::MessageUsecase;

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn setup_server() -> (String, Arc<MessageUsecase>, Arc<SledStore>, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db = Arc::new(SledStore::open(temp_dir.path()).unwrap());
    for (id, name) in [("alice", "Alice"), ("bob", "Bob"), ("carol", "Carol")] {
        db.put_user(&User {
            id: id.to_string(),
            name: name.to_string(),
            avatar_id: None,
        })
        .unwrap();
    }
    db.create_chat(
        &Chat {
            id: "general".to_string(),
            name: "General".to_string(),
        },
        "alice",
    )
    .unwrap();
    db.add_member("general", "bob", Role::Member).unwrap();

    let store = Store::from_sled(db.clone(), Arc::new(StaticFileStorage::new("http://files")));
    let usecase = Arc::new(MessageUsecase::new(store, DistributionSettings::default()));
    usecase.start();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(serve(listener, usecase.clone(), db.clone()));

    (format!("ws://{addr}"), usecase, db, temp_dir)
}

async fn send(ws: &mut Client, value: Value) {
    ws.send(WsMessage::Text(value.to_string().into()))
        .await
        .expect("Failed to send frame");
}

async fn recv(ws: &mut Client) -> Value {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("Did not receive a frame in time")
            .expect("stream ended")
            .expect("websocket error");
        if frame.is_text() {
            return serde_json::from_str(frame.to_text().unwrap()).unwrap();
        }
    }
}

async fn connect_as(url: &str, user_id: &str) -> Client {
    let (mut ws, _) = connect_async(url).await.expect("WebSocket handshake failed");
    send(&mut ws, json!({ "type": "hello", "user_id": user_id })).await;
    let ready = recv(&mut ws).await;
    assert_eq!(ready["type"], "ready");
    ws
}

#[test]
fn test_client_message_parsing() {
    let msg: ClientMessage =
        serde_json::from_str(r#"{"type":"send","chat_id":"general","text":"hi"}"#).unwrap();
    match msg {
        ClientMessage::Send {
            chat_id,
            text,
            attachment_id,
        } => {
            assert_eq!(chat_id, "general");
            assert_eq!(text, "hi");
            assert!(attachment_id.is_none());
        }
        other => panic!("unexpected {other:?}"),
    }

    let err = serde_json::to_value(ServerMessage::error("nope")).unwrap();
    assert_eq!(err, json!({ "type": "error", "message": "nope", "retryable": false }));
}

#[tokio::test]
async fn test_reply_queue_drops_when_client_stops_reading() {
    let (tx, mut rx) = tokio::sync::mpsc::channel(REPLY_QUEUE_CAPACITY);

    for _ in 0..REPLY_QUEUE_CAPACITY {
        assert!(queue_reply(&tx, "conn-1", ServerMessage::error("invalid message")));
    }
    assert!(!queue_reply(&tx, "conn-1", ServerMessage::error("invalid message")));

    // room frees up once the send loop catches up
    assert!(rx.recv().await.is_some());
    assert!(queue_reply(&tx, "conn-1", ServerMessage::error("invalid message")));

    drop(rx);
    assert!(!queue_reply(&tx, "conn-1", ServerMessage::error("invalid message")));
}

#[tokio::test]
async fn test_message_is_fanned_out_to_members() {
    let (url, usecase, _db, _temp_dir) = setup_server().await;
    let mut alice = connect_as(&url, "alice").await;
    let mut bob = connect_as(&url, "bob").await;

    send(
        &mut alice,
        json!({ "type": "send", "chat_id": "general", "text": "hello world" }),
    )
    .await;

    for ws in [&mut alice, &mut bob] {
        let event = recv(ws).await;
        assert_eq!(event["type"], "message");
        assert_eq!(event["chat_id"], "general");
        assert_eq!(event["text"], "hello world");
        assert_eq!(event["sender_name"], "Alice");
    }
    usecase.stop();
}

#[tokio::test]
async fn test_frame_before_hello_is_rejected() {
    let (url, usecase, _db, _temp_dir) = setup_server().await;
    let (mut ws, _) = connect_async(url.as_str()).await.unwrap();

    send(
        &mut ws,
        json!({ "type": "send", "chat_id": "general", "text": "sneaky" }),
    )
    .await;
    let reply = recv(&mut ws).await;
    assert_eq!(reply["type"], "error");
    assert_eq!(reply["message"], "must say hello first");
    usecase.stop();
}

#[tokio::test]
async fn test_non_member_send_is_denied() {
    let (url, usecase, db, _temp_dir) = setup_server().await;
    let mut carol = connect_as(&url, "carol").await;

    send(
        &mut carol,
        json!({ "type": "send", "chat_id": "general", "text": "let me in" }),
    )
    .await;
    let reply = recv(&mut carol).await;
    assert_eq!(reply["type"], "error");
    assert_eq!(reply["retryable"], false);
    assert!(db.load_messages("general", 10).unwrap().is_empty());
    usecase.stop();
}

#[tokio::test]
async fn test_invite_announces_chat_to_live_connection() {
    let (url, usecase, db, _temp_dir) = setup_server().await;
    let mut alice = connect_as(&url, "alice").await;
    let mut carol = connect_as(&url, "carol").await;

    send(
        &mut alice,
        json!({ "type": "invite", "chat_id": "general", "user_id": "carol" }),
    )
    .await;
    let reply = recv(&mut alice).await;
    assert_eq!(reply["type"], "invited");

    let joined = recv(&mut carol).await;
    assert_eq!(joined["type"], "chat_joined");
    assert_eq!(joined["chat_id"], "general");
    assert_eq!(joined["name"], "General");
    assert_eq!(db.role_of("general", "carol").unwrap(), Some(Role::Member));

    send(
        &mut alice,
        json!({ "type": "send", "chat_id": "general", "text": "welcome carol" }),
    )
    .await;
    let event = recv(&mut carol).await;
    assert_eq!(event["text"], "welcome carol");
    usecase.stop();
}

#[tokio::test]
async fn test_disconnect_releases_subscriptions() {
    let (url, usecase, _db, _temp_dir) = setup_server().await;
    let mut bob = connect_as(&url, "bob").await;
    assert_eq!(usecase.listeners().listeners_of("general").len(), 1);

    bob.close(None).await.unwrap();

    tokio::time::timeout(Duration::from_secs(2), async {
        while !usecase.listeners().listeners_of("general").is_empty()
            || !usecase.connections().is_empty()
        {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("bindings were not released");
    usecase.stop();
}

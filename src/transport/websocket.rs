//! WebSocket transport
//!
//! Responsibilities:
//! - Accept TCP/WebSocket connections
//! - Require a `hello` frame naming the user, then subscribe the connection
//!   to all of that user's chats
//! - Forward the connection's merged outbound queue to the socket
//! - Translate `send` and `invite` frames into core operations
//!
//! The connection's cancellation token fires when either direction of the
//! socket ends, which tears down its fan-in tasks and registry bindings.
//!
//! Security note: `hello` trusts the user id it is given. Session
//! authentication belongs in front of this adapter.

use std::sync::Arc;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::{WebSocketStream, accept_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tungstenite::protocol::Message as WsMessage;
use uuid::Uuid;

use crate::broker::message::{MessageKind, NewMessage, UserId};
use crate::store::{Role, SledStore};
use crate::transport::message::{ClientMessage, ServerMessage};
use crate::usecase::{MessageUsecase, OutboundRx};

type WsSink = SplitSink<WebSocketStream<TcpStream>, WsMessage>;
type WsSource = SplitStream<WebSocketStream<TcpStream>>;

/// Replies waiting for the socket. A client that never reads loses replies
/// past this point instead of growing the queue.
pub const REPLY_QUEUE_CAPACITY: usize = 32;

/// Bind `addr` and serve until the listener fails.
pub async fn start_websocket_server(
    addr: String,
    usecase: Arc<MessageUsecase>,
    db: Arc<SledStore>,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(&addr).await?;
    info!("WebSocket server listening on ws://{addr}");
    serve(listener, usecase, db).await;
    Ok(())
}

pub async fn serve(listener: TcpListener, usecase: Arc<MessageUsecase>, db: Arc<SledStore>) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                debug!(%peer, "accepted tcp connection");
                tokio::spawn(handle_connection(stream, usecase.clone(), db.clone()));
            }
            Err(e) => {
                warn!("accept failed: {e}");
                break;
            }
        }
    }
}

async fn handle_connection(stream: TcpStream, usecase: Arc<MessageUsecase>, db: Arc<SledStore>) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!("WebSocket handshake error: {e}");
            return;
        }
    };
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let Some(user_id) = await_hello(&mut ws_sender, &mut ws_receiver).await else {
        let _ = ws_sender.close().await;
        return;
    };
    let chats = match db.chats_of_user(&user_id) {
        Ok(chats) => chats,
        Err(e) => {
            warn!(%user_id, "could not list chats: {e}");
            let _ = send_json(&mut ws_sender, &ServerMessage::error("could not list chats")).await;
            return;
        }
    };

    let connection_id = format!("conn-{}", Uuid::new_v4());
    let cancel = CancellationToken::new();
    let outbound =
        usecase.subscribe_connection_to_chats(cancel.clone(), &connection_id, &user_id, &chats);

    let (reply_tx, reply_rx) = mpsc::channel::<ServerMessage>(REPLY_QUEUE_CAPACITY);
    queue_reply(
        &reply_tx,
        &connection_id,
        ServerMessage::Ready {
            connection_id: connection_id.clone(),
            chats,
        },
    );
    tokio::spawn(send_loop(
        connection_id.clone(),
        ws_sender,
        reply_rx,
        outbound,
        cancel.clone(),
    ));

    info!(%connection_id, %user_id, "connection ready");

    loop {
        let msg = tokio::select! {
            _ = cancel.cancelled() => break,
            msg = ws_receiver.next() => match msg {
                Some(Ok(msg)) => msg,
                _ => break,
            },
        };
        if !msg.is_text() {
            continue;
        }
        let Ok(text) = msg.to_text() else {
            continue;
        };
        match serde_json::from_str::<ClientMessage>(text) {
            Ok(ClientMessage::Hello { .. }) => {
                queue_reply(&reply_tx, &connection_id, ServerMessage::error("already greeted"));
            }
            Ok(ClientMessage::Send {
                chat_id,
                text,
                attachment_id,
            }) => {
                let message = NewMessage {
                    chat_id,
                    text,
                    kind: MessageKind::User,
                    attachment_id,
                };
                if let Err(e) = usecase.add_message(message, &user_id).await {
                    debug!(%connection_id, label = e.as_label(), "send rejected: {e}");
                    let reply = ServerMessage::Error {
                        message: e.to_string(),
                        retryable: e.is_retryable(),
                    };
                    queue_reply(&reply_tx, &connection_id, reply);
                }
            }
            Ok(ClientMessage::Invite {
                chat_id,
                user_id: invitee,
            }) => {
                let reply = invite(&usecase, &db, &user_id, &chat_id, &invitee).await;
                queue_reply(&reply_tx, &connection_id, reply);
            }
            Err(err) => {
                warn!(
                    "Invalid client message from {connection_id}: {err} | {}",
                    &text.chars().take(100).collect::<String>()
                );
                queue_reply(&reply_tx, &connection_id, ServerMessage::error("invalid message"));
            }
        }
    }

    cancel.cancel();
    info!(%connection_id, "disconnected");
}

/// Read frames until a `hello`. Anything else is answered with an error and
/// ends the connection.
async fn await_hello(sender: &mut WsSink, receiver: &mut WsSource) -> Option<UserId> {
    while let Some(Ok(msg)) = receiver.next().await {
        if !msg.is_text() {
            if msg.is_close() {
                return None;
            }
            continue;
        }
        let text = msg.to_text().ok()?;
        match serde_json::from_str::<ClientMessage>(text) {
            Ok(ClientMessage::Hello { user_id }) => return Some(user_id),
            _ => {
                let _ = send_json(sender, &ServerMessage::error("must say hello first")).await;
                return None;
            }
        }
    }
    None
}

/// Queue `reply` for the send loop. Returns false when it was dropped
/// because the queue is full or the send loop is gone.
pub(crate) fn queue_reply(
    replies: &mpsc::Sender<ServerMessage>,
    connection_id: &str,
    reply: ServerMessage,
) -> bool {
    match replies.try_send(reply) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Full(_)) => {
            warn!(%connection_id, "reply queue full, dropping reply");
            false
        }
        Err(mpsc::error::TrySendError::Closed(_)) => false,
    }
}

async fn invite(
    usecase: &MessageUsecase,
    db: &SledStore,
    inviter: &str,
    chat_id: &str,
    invitee: &str,
) -> ServerMessage {
    match db.role_of(chat_id, inviter) {
        Ok(Some(role)) if role >= Role::Admin => {}
        Ok(_) => return ServerMessage::error("only admins can invite"),
        Err(e) => return ServerMessage::error(e.to_string()),
    }
    if let Err(e) = db.add_member(chat_id, invitee, Role::Member) {
        return ServerMessage::error(e.to_string());
    }
    match usecase
        .subscribe_users_on_chat(chat_id, &[invitee.to_string()])
        .await
    {
        Ok(_) => ServerMessage::Invited {
            chat_id: chat_id.to_string(),
            user_id: invitee.to_string(),
        },
        Err(e) => ServerMessage::error(e.to_string()),
    }
}

async fn send_loop(
    connection_id: String,
    mut ws_sender: WsSink,
    mut replies: mpsc::Receiver<ServerMessage>,
    outbound: OutboundRx,
    cancel: CancellationToken,
) {
    loop {
        let sent = tokio::select! {
            biased;
            reply = replies.recv() => match reply {
                Some(reply) => send_json(&mut ws_sender, &reply).await,
                None => break,
            },
            event = outbound.recv_async() => match event {
                Ok(event) => send_json(&mut ws_sender, &event).await,
                // closed after cancellation or shutdown
                Err(_) => break,
            },
        };
        if let Err(e) = sent {
            warn!("Failed to send message to {connection_id}: {e}");
            break;
        }
    }

    cancel.cancel();
    let _ = ws_sender.close().await;
    debug!("Send loop closed for {connection_id}");
}

async fn send_json<T: serde::Serialize>(
    sender: &mut WsSink,
    value: &T,
) -> Result<(), tungstenite::Error> {
    match serde_json::to_string(value) {
        Ok(json) => sender.send(WsMessage::text(json)).await,
        Err(e) => {
            warn!("Failed to serialize outgoing frame: {e}");
            Ok(())
        }
    }
}

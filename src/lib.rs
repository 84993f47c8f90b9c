//! # chatcast
//!
//! `chatcast` is the real-time distribution core of a chat backend: it
//! delivers newly created messages to every connected client subscribed to
//! the message's chat, with bounded queues, lossy delivery to consumers that
//! stop draining, and periodic reclamation of abandoned subscribers.
//!
//! ## Core Modules
//!
//! - `broker`: the topic registry, event types, distribution workers and
//!   garbage collectors.
//! - `usecase`: `MessageUsecase`, the façade transports call, and the
//!   per-connection fan-in.
//! - `store`: collaborator traits (roles, users, files, messages, chats) and
//!   a `sled`-backed implementation.
//! - `transport`: a WebSocket adapter driving the core.
//! - `config`: layered settings.
//! - `utils`: error types and logging.

pub mod broker;
pub mod config;
pub mod store;
pub mod transport;
pub mod usecase;
pub mod utils;

pub use broker::ListenerMap;
pub use usecase::MessageUsecase;
pub use utils::{ChatError, StoreError};

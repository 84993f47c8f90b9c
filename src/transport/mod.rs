//! The `transport` module is a thin WebSocket adapter over `MessageUsecase`.
//!
//! It owns the network connections: each accepted socket becomes one
//! connection id with its own cancellation token, subscribed to every chat
//! its user belongs to. Framing and session handling live here; none of it
//! leaks into the distribution core.

pub mod message;
pub mod websocket;

pub use websocket::{serve, start_websocket_server};

#[cfg(test)]
mod tests;

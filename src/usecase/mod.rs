//! The `usecase` module is the surface transport adapters call into: the
//! message orchestrator and the per-connection fan-in it manages.

pub mod connections;
pub mod message_usecase;

pub use connections::{Connections, OutboundRx};
pub use message_usecase::MessageUsecase;

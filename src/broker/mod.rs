//! The `broker` module holds the in-memory distribution machinery: the topic
//! registry, the event types it carries, and the background workers that
//! fan events out and reclaim abandoned listeners.

pub mod listener_map;
pub mod message;
pub mod topic;
pub mod workers;

pub use listener_map::ListenerMap;
pub use workers::{DeliverySnapshot, DeliveryStats};

//! The `utils` module provides shared definitions used across `chatcast`:
//! the error types returned by the core and the logging bootstrap.

pub mod error;
pub mod logging;

pub use error::{ChatError, StoreError};

//! Shared types for the serversets workspace: the error enum, the
//! configuration schema, and structured trace events.

pub mod config;
pub mod error;
pub mod trace;

pub use config::{RetryConfig, ServerSetConfig};
pub use error::{CoordinationError, Error, Result};
pub use trace::TraceEvent;

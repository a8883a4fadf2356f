//! Durable email-dispatch worker: consumes form-submission events from a
//! stream, renders them into SMTP messages, delivers them via a configurable
//! gateway, and manages exactly-one-attempt-per-mode semantics with a staged
//! retry pipeline and a terminal dead-letter sink. See `SPEC_FULL.md`.

pub mod attachments;
pub mod config;
pub mod consumer;
pub mod deadletter;
pub mod error;
pub mod executor;
pub mod formstore;
pub mod lifecycle;
pub mod logging;
pub mod message;
pub mod mode;
pub mod render;
pub mod retry;
pub mod sidestate;
pub mod smtp;

pub use tracing;

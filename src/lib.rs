#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::redundant_closure_for_method_calls)]

//! ohero-chat: real-time chat session controller for the OHERO gateway.
//!
//! The library is the session core, with no UI:
//! - `transport`: duplex text-frame connection (WebSocket) behind a trait
//! - `lifecycle`: connection state machine, backoff reconnect, keep-alive
//! - `protocol`: outbound frames and tagged inbound frame decoding
//! - `classifier`: inbound frame to notice / directory / message
//! - `directory`: known channels and external-id mapping
//! - `conversation`: messages, threads, unread counters
//! - `session`: the façade an application owns
//! - `scheduler` / `event`: cancellable timers and the single event queue
//! - `config`: JSON / env configuration

pub mod classifier;
pub mod config;
pub mod conversation;
pub mod directory;
pub mod error;
pub mod event;
pub mod lifecycle;
pub mod protocol;
pub mod scheduler;
pub mod session;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{SessionError, TransportError};
pub use lifecycle::ConnectionState;
pub use session::{Session, SessionUpdate, WsSession};

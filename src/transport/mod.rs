//! Transport Connection: one logical duplex connection to the backend gateway.
//!
//! The [`Transport`] trait is the seam between the lifecycle controller and the
//! network. Implementations never call back into the session directly; they
//! post [`TransportEvent`]s tagged with the [`ConnectionId`] they were opened
//! with onto the session's event queue.

pub mod ws;

use url::Url;

use crate::error::TransportError;
use crate::event::ConnectionId;

pub use ws::WsTransport;

/// Close code for an intentional, normal closure.
pub const NORMAL_CLOSURE: u16 = 1000;
/// Close code reported when the peer vanished without a close frame.
pub const ABNORMAL_CLOSURE: u16 = 1006;

/// Events a transport emits for the connection it was opened with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Opened,
    /// A text frame, passed through unparsed.
    Message(String),
    Closed { code: u16, reason: String },
    /// A transport failure. A `Closed` event always follows; it drives the state change.
    Error(String),
}

/// A duplex text-frame connection.
pub trait Transport {
    /// Start opening a connection. Completion is reported as `Opened` or `Error` + `Closed`.
    ///
    /// Any connection previously opened by this transport is abandoned.
    fn open(&mut self, conn: ConnectionId, target: &ConnectTarget) -> Result<(), TransportError>;

    /// Queue a text frame on the open connection.
    fn send(&mut self, text: String) -> Result<(), TransportError>;

    /// Close the connection with the given code. No-op when nothing is open.
    fn close(&mut self, code: u16, reason: &str);
}

/// Gateway URL with the credential and user id embedded as query parameters.
#[derive(Clone)]
pub struct ConnectTarget {
    url: Url,
    masked: String,
}

impl ConnectTarget {
    /// Build `{endpoint}?apiKey={credential}&userId={user_id}`.
    pub fn build(endpoint: &str, credential: &str, user_id: &str) -> Result<Self, TransportError> {
        let base = Url::parse(endpoint.trim())
            .map_err(|e| TransportError::InvalidTarget(format!("{endpoint}: {e}")))?;
        if !matches!(base.scheme(), "ws" | "wss") {
            return Err(TransportError::InvalidTarget(format!(
                "unsupported scheme '{}' (expected ws or wss)",
                base.scheme()
            )));
        }

        let with_params = |key: &str| {
            let mut url = base.clone();
            url.query_pairs_mut()
                .append_pair("apiKey", key)
                .append_pair("userId", user_id);
            url
        };

        Ok(Self {
            url: with_params(credential),
            masked: with_params("***").to_string(),
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// The target with the credential replaced by `***`; safe to log.
    pub fn masked(&self) -> &str {
        &self.masked
    }
}

impl std::fmt::Debug for ConnectTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ConnectTarget").field(&self.masked).finish()
    }
}

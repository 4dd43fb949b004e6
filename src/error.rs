//! Error types for the transport and the session façade.

/// Errors raised by a [`Transport`](crate::transport::Transport).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// No connection is open (never opened, or already closed).
    NotConnected,
    /// The connection target could not be built or parsed.
    InvalidTarget(String),
    /// The frame could not be handed to the connection.
    Send(String),
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::NotConnected => write!(f, "Not connected"),
            TransportError::InvalidTarget(e) => write!(f, "Invalid connection target: {e}"),
            TransportError::Send(e) => write!(f, "Send failed: {e}"),
        }
    }
}

impl std::error::Error for TransportError {}

/// Errors returned by [`Session`](crate::session::Session) operations.
///
/// None of these is terminal to the session: after any of them the session
/// is still in a well-defined state and accepts a fresh `connect()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Endpoint or credential missing; names the missing setting.
    NotConfigured(&'static str),
    /// The operation needs an open connection.
    NotConnected,
    /// Outbound text was empty after trimming.
    EmptyMessage,
    /// The channel id is not in the directory.
    UnknownChannel(String),
    /// The transport rejected the operation.
    Transport(TransportError),
    /// An outbound frame could not be serialized.
    Encode(String),
}

impl SessionError {
    /// Returns `true` for configuration errors, which are never retried.
    pub fn is_configuration(&self) -> bool {
        matches!(self, SessionError::NotConfigured(_))
    }
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::NotConfigured(what) => {
                write!(f, "{what} not configured. Please check configuration.")
            }
            SessionError::NotConnected => write!(f, "Not connected. Please connect first."),
            SessionError::EmptyMessage => write!(f, "Message is empty"),
            SessionError::UnknownChannel(id) => write!(f, "Unknown channel: {id}"),
            SessionError::Transport(e) => write!(f, "Transport error: {e}"),
            SessionError::Encode(e) => write!(f, "Failed to encode frame: {e}"),
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SessionError::Transport(e) => Some(e),
            _ => None,
        }
    }
}

impl From<TransportError> for SessionError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::NotConnected => SessionError::NotConnected,
            other => SessionError::Transport(other),
        }
    }
}

impl From<serde_json::Error> for SessionError {
    fn from(e: serde_json::Error) -> Self {
        SessionError::Encode(e.to_string())
    }
}

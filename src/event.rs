//! The single event queue every transport callback and timer firing goes through.
//!
//! All session state is mutated by one task draining this queue, so a heartbeat
//! tick can never interleave with the classification of an inbound frame.

use tokio::sync::mpsc;

use crate::scheduler::TimerKind;
use crate::transport::TransportEvent;

/// Identifies one `open` of the transport. Events carrying an older id are stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub u64);

/// Identifies one scheduled timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(pub u64);

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Something that happened outside the session and must be handled in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A transport callback (open / message / close / error).
    Transport {
        conn: ConnectionId,
        event: TransportEvent,
    },
    /// A timer fired.
    Timer { id: TimerId, kind: TimerKind },
}

/// Producer half, cloned into the transport and the scheduler.
pub type EventSink = mpsc::UnboundedSender<SessionEvent>;
/// Consumer half, owned by the session.
pub type EventSource = mpsc::UnboundedReceiver<SessionEvent>;

/// Create the session's event queue.
pub fn event_channel() -> (EventSink, EventSource) {
    mpsc::unbounded_channel()
}

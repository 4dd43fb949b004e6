//! Timers with explicit cancellation handles.
//!
//! The lifecycle controller never sleeps itself. It asks a [`Scheduler`] for a
//! one-shot or repeating timer and keeps the returned [`TimerHandle`]. Firing
//! is delivered as [`SessionEvent::Timer`] on the session's event queue.
//! Cancelling (or dropping) the handle stops future firings; a firing that
//! was already queued is recognised as stale by its [`TimerId`].

use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};

use crate::event::{EventSink, SessionEvent, TimerId};

/// What a timer is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Keep-alive ping while connected.
    Heartbeat,
    /// Deferred reconnection attempt.
    Reconnect,
    /// Directory request shortly after the connection opens.
    DirectoryRefresh,
}

/// Owned handle to a scheduled timer. Dropping it cancels the timer.
pub struct TimerHandle {
    id: TimerId,
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl TimerHandle {
    pub fn new(id: TimerId, cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            id,
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn id(&self) -> TimerId {
        self.id
    }

    /// Cancel the timer. Equivalent to dropping the handle.
    pub fn cancel(self) {}
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerHandle").field("id", &self.id).finish()
    }
}

/// Source of timers for the lifecycle controller.
pub trait Scheduler {
    /// Fire `kind` once after `delay`.
    fn schedule(&mut self, delay: Duration, kind: TimerKind) -> TimerHandle;

    /// Fire `kind` every `interval`, first after one full interval.
    fn schedule_repeating(&mut self, interval: Duration, kind: TimerKind) -> TimerHandle;
}

/// [`Scheduler`] backed by tokio tasks. Must be used inside a tokio runtime.
pub struct TokioScheduler {
    events: EventSink,
    next_id: u64,
}

impl TokioScheduler {
    pub fn new(events: EventSink) -> Self {
        Self { events, next_id: 1 }
    }

    fn allocate(&mut self) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        id
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&mut self, delay: Duration, kind: TimerKind) -> TimerHandle {
        let id = self.allocate();
        let events = self.events.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = events.send(SessionEvent::Timer { id, kind });
        });
        let abort = task.abort_handle();
        TimerHandle::new(id, move || abort.abort())
    }

    fn schedule_repeating(&mut self, interval: Duration, kind: TimerKind) -> TimerHandle {
        let id = self.allocate();
        let events = self.events.clone();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if events.send(SessionEvent::Timer { id, kind }).is_err() {
                    break;
                }
            }
        });
        let abort = task.abort_handle();
        TimerHandle::new(id, move || abort.abort())
    }
}

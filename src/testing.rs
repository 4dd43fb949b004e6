//! Deterministic doubles for the transport and scheduler seams.
//!
//! Both are cheap handles over shared state: the test keeps one clone to
//! inspect and drive, the code under test owns the other.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::TransportError;
use crate::event::{ConnectionId, SessionEvent, TimerId};
use crate::scheduler::{Scheduler, TimerHandle, TimerKind};
use crate::transport::{ConnectTarget, Transport};

#[derive(Default)]
struct Wire {
    opens: Vec<(ConnectionId, String)>,
    sent: Vec<String>,
    closes: Vec<(u16, String)>,
    open: bool,
    fail_next_open: bool,
}

/// Records every call; events are injected by the test.
#[derive(Clone, Default)]
pub struct FakeTransport {
    wire: Arc<Mutex<Wire>>,
}

impl FakeTransport {
    pub fn opened_urls(&self) -> Vec<String> {
        self.wire.lock().unwrap().opens.iter().map(|(_, u)| u.clone()).collect()
    }

    pub fn last_conn(&self) -> Option<ConnectionId> {
        self.wire.lock().unwrap().opens.last().map(|(c, _)| *c)
    }

    pub fn sent(&self) -> Vec<String> {
        self.wire.lock().unwrap().sent.clone()
    }

    pub fn closes(&self) -> Vec<(u16, String)> {
        self.wire.lock().unwrap().closes.clone()
    }

    pub fn fail_next_open(&self) {
        self.wire.lock().unwrap().fail_next_open = true;
    }
}

impl Transport for FakeTransport {
    fn open(&mut self, conn: ConnectionId, target: &ConnectTarget) -> Result<(), TransportError> {
        let mut wire = self.wire.lock().unwrap();
        if std::mem::take(&mut wire.fail_next_open) {
            return Err(TransportError::InvalidTarget("refused by test".into()));
        }
        wire.opens.push((conn, target.url().to_string()));
        wire.open = true;
        Ok(())
    }

    fn send(&mut self, text: String) -> Result<(), TransportError> {
        let mut wire = self.wire.lock().unwrap();
        if !wire.open {
            return Err(TransportError::NotConnected);
        }
        wire.sent.push(text);
        Ok(())
    }

    fn close(&mut self, code: u16, reason: &str) {
        let mut wire = self.wire.lock().unwrap();
        if std::mem::take(&mut wire.open) {
            wire.closes.push((code, reason.to_string()));
        }
    }
}

struct Timer {
    id: TimerId,
    kind: TimerKind,
    delay: Duration,
    repeating: bool,
    fired: bool,
    cancelled: Arc<AtomicBool>,
}

impl Timer {
    fn active(&self) -> bool {
        !self.fired && !self.cancelled.load(Ordering::SeqCst)
    }
}

/// Timers that only fire when the test says so.
#[derive(Clone, Default)]
pub struct ManualScheduler {
    timers: Arc<Mutex<Vec<Timer>>>,
}

impl ManualScheduler {
    fn add(&self, delay: Duration, kind: TimerKind, repeating: bool) -> TimerHandle {
        let mut timers = self.timers.lock().unwrap();
        let id = TimerId(timers.len() as u64 + 1);
        let cancelled = Arc::new(AtomicBool::new(false));
        timers.push(Timer {
            id,
            kind,
            delay,
            repeating,
            fired: false,
            cancelled: cancelled.clone(),
        });
        TimerHandle::new(id, move || cancelled.store(true, Ordering::SeqCst))
    }

    /// Delay of the most recent active timer of `kind`.
    pub fn active_delay(&self, kind: TimerKind) -> Option<Duration> {
        let timers = self.timers.lock().unwrap();
        timers
            .iter()
            .rev()
            .find(|t| t.kind == kind && t.active())
            .map(|t| t.delay)
    }

    /// Fire the most recent active timer of `kind`, returning the event to
    /// feed back. One-shot timers become inactive.
    pub fn fire(&self, kind: TimerKind) -> Option<SessionEvent> {
        let mut timers = self.timers.lock().unwrap();
        let timer = timers.iter_mut().rev().find(|t| t.kind == kind && t.active())?;
        if !timer.repeating {
            timer.fired = true;
        }
        Some(SessionEvent::Timer { id: timer.id, kind })
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&mut self, delay: Duration, kind: TimerKind) -> TimerHandle {
        self.add(delay, kind, false)
    }

    fn schedule_repeating(&mut self, interval: Duration, kind: TimerKind) -> TimerHandle {
        self.add(interval, kind, true)
    }
}

//! Connection Lifecycle Controller.
//!
//! Wraps a [`Transport`] in the `Disconnected -> Connecting -> Connected` state
//! machine, with bounded exponential-backoff reconnection and a periodic
//! keep-alive ping. The controller is synchronous: transport callbacks and
//! timer firings arrive as [`SessionEvent`]s through [`handle_event`], and
//! everything the session must react to is queued as a [`ControllerSignal`].
//!
//! [`handle_event`]: LifecycleController::handle_event

use std::collections::VecDeque;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::ChatConfig;
use crate::error::SessionError;
use crate::event::{ConnectionId, SessionEvent, TimerId};
use crate::protocol::OutboundFrame;
use crate::scheduler::{Scheduler, TimerHandle, TimerKind};
use crate::transport::{ConnectTarget, Transport, TransportEvent, NORMAL_CLOSURE};

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    pub fn is_connected(self) -> bool {
        self == ConnectionState::Connected
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "Disconnected"),
            ConnectionState::Connecting => write!(f, "Connecting"),
            ConnectionState::Connected => write!(f, "Connected"),
        }
    }
}

/// Bounded exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(1000),
        }
    }
}

impl ReconnectPolicy {
    /// Delay before attempt `attempt` (1-based): `base * 2^(attempt - 1)`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31);
        self.base_delay.saturating_mul(1u32 << exp)
    }

    /// Whether another attempt is allowed after `attempts` have been made.
    pub fn allows(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }
}

/// Connection settings the controller needs from [`ChatConfig`].
#[derive(Debug, Clone)]
pub struct LifecycleSettings {
    pub endpoint: String,
    pub credential: String,
    pub user_id: String,
    pub policy: ReconnectPolicy,
    pub heartbeat_interval: Duration,
    pub directory_refresh_delay: Duration,
}

impl From<&ChatConfig> for LifecycleSettings {
    fn from(config: &ChatConfig) -> Self {
        Self {
            endpoint: config.websocket_url.clone(),
            credential: config.api_key.clone(),
            user_id: config.user_id.clone(),
            policy: ReconnectPolicy {
                max_attempts: config.reconnect.max_attempts,
                base_delay: Duration::from_millis(config.reconnect.base_delay_ms),
            },
            heartbeat_interval: config.heartbeat_interval(),
            directory_refresh_delay: config.directory_refresh_delay(),
        }
    }
}

/// Something the session has to act on after the controller handled an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerSignal {
    StateChanged(ConnectionState),
    Notice(String),
    /// A raw inbound text frame for the classifier.
    Inbound(String),
    /// Time to request the channel directory.
    RefreshDirectory,
    ReconnectScheduled { attempt: u32, delay: Duration },
    ReconnectExhausted,
}

pub struct LifecycleController<T, S> {
    transport: T,
    scheduler: S,
    settings: LifecycleSettings,
    state: ConnectionState,
    reconnect_attempts: u32,
    intentional_close: bool,
    live: Option<ConnectionId>,
    next_conn: u64,
    heartbeat: Option<TimerHandle>,
    reconnect_timer: Option<TimerHandle>,
    refresh_timer: Option<TimerHandle>,
    signals: VecDeque<ControllerSignal>,
}

impl<T: Transport, S: Scheduler> LifecycleController<T, S> {
    pub fn new(transport: T, scheduler: S, settings: LifecycleSettings) -> Self {
        Self {
            transport,
            scheduler,
            settings,
            state: ConnectionState::Disconnected,
            reconnect_attempts: 0,
            intentional_close: false,
            live: None,
            next_conn: 1,
            heartbeat: None,
            reconnect_timer: None,
            refresh_timer: None,
            signals: VecDeque::new(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts
    }

    pub fn policy(&self) -> ReconnectPolicy {
        self.settings.policy
    }

    /// Take the next pending signal.
    pub fn next_signal(&mut self) -> Option<ControllerSignal> {
        self.signals.pop_front()
    }

    /// Manual connect. Resets the reconnect budget and cancels a pending retry.
    pub fn connect(&mut self) -> Result<(), SessionError> {
        if self.state != ConnectionState::Disconnected {
            debug!(state = %self.state, "connect ignored");
            return Ok(());
        }
        self.reconnect_timer = None;
        self.reconnect_attempts = 0;
        self.start_connect()
    }

    fn start_connect(&mut self) -> Result<(), SessionError> {
        if self.state != ConnectionState::Disconnected {
            return Ok(());
        }
        if self.settings.endpoint.trim().is_empty() {
            return Err(self.not_configured("WebSocket URL"));
        }
        if self.settings.credential.is_empty() {
            return Err(self.not_configured("API key"));
        }

        let target = match ConnectTarget::build(
            &self.settings.endpoint,
            &self.settings.credential,
            &self.settings.user_id,
        ) {
            Ok(t) => t,
            Err(e) => {
                warn!(error = %e, "cannot build connection target");
                self.notice(format!("Failed to connect: {e}"));
                return Err(e.into());
            }
        };

        self.intentional_close = false;
        let conn = ConnectionId(self.next_conn);
        self.next_conn += 1;
        info!(%conn, target = %target.masked(), attempt = self.reconnect_attempts, "connecting");

        self.live = Some(conn);
        self.set_state(ConnectionState::Connecting);
        if let Err(e) = self.transport.open(conn, &target) {
            warn!(%conn, error = %e, "transport open failed");
            self.live = None;
            self.set_state(ConnectionState::Disconnected);
            self.notice(format!("Failed to connect: {e}"));
            return Err(e.into());
        }
        Ok(())
    }

    fn not_configured(&mut self, what: &'static str) -> SessionError {
        let err = SessionError::NotConfigured(what);
        warn!(setting = what, "connect refused: missing configuration");
        self.notice(err.to_string());
        err
    }

    /// Close intentionally. Cancels every timer and never triggers a reconnect.
    pub fn disconnect(&mut self) {
        self.intentional_close = true;
        self.stop_timers();
        self.reconnect_timer = None;
        if self.live.take().is_some() {
            self.transport.close(NORMAL_CLOSURE, "User disconnected");
        }
        if self.state != ConnectionState::Disconnected {
            info!("disconnected by user");
            self.set_state(ConnectionState::Disconnected);
            self.notice("Disconnected from OHERO".to_string());
        }
    }

    /// Send a text frame on the open connection.
    pub fn send(&mut self, text: String) -> Result<(), SessionError> {
        if !self.state.is_connected() {
            return Err(SessionError::NotConnected);
        }
        self.transport.send(text)?;
        Ok(())
    }

    pub fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Transport { conn, event } => {
                if self.live != Some(conn) {
                    debug!(%conn, ?event, "ignoring event from stale connection");
                    return;
                }
                self.on_transport(conn, event);
            }
            SessionEvent::Timer { id, kind } => self.on_timer(id, kind),
        }
    }

    fn on_transport(&mut self, conn: ConnectionId, event: TransportEvent) {
        match event {
            TransportEvent::Opened => {
                info!(%conn, "connected");
                self.reconnect_attempts = 0;
                self.set_state(ConnectionState::Connected);
                self.heartbeat = Some(self.scheduler.schedule_repeating(
                    self.settings.heartbeat_interval,
                    TimerKind::Heartbeat,
                ));
                self.refresh_timer = Some(self.scheduler.schedule(
                    self.settings.directory_refresh_delay,
                    TimerKind::DirectoryRefresh,
                ));
                self.notice("Connected to OHERO successfully!".to_string());
            }
            TransportEvent::Message(raw) => {
                self.signals.push_back(ControllerSignal::Inbound(raw));
            }
            TransportEvent::Closed { code, reason } => {
                self.live = None;
                self.stop_timers();
                self.set_state(ConnectionState::Disconnected);
                if code != NORMAL_CLOSURE && !self.intentional_close {
                    warn!(%conn, code, %reason, "connection closed unexpectedly");
                    self.notice(format!("Connection closed unexpectedly (Code: {code})"));
                    self.schedule_reconnect();
                } else {
                    info!(%conn, code, "connection closed");
                    self.notice("Disconnected from OHERO".to_string());
                }
            }
            TransportEvent::Error(error) => {
                warn!(%conn, %error, "connection error");
                self.notice("Connection error occurred".to_string());
            }
        }
    }

    fn on_timer(&mut self, id: TimerId, kind: TimerKind) {
        let held = match kind {
            TimerKind::Heartbeat => &self.heartbeat,
            TimerKind::Reconnect => &self.reconnect_timer,
            TimerKind::DirectoryRefresh => &self.refresh_timer,
        };
        if held.as_ref().map(TimerHandle::id) != Some(id) {
            debug!(?id, ?kind, "ignoring cancelled timer");
            return;
        }

        match kind {
            TimerKind::Heartbeat => self.send_ping(),
            TimerKind::Reconnect => {
                self.reconnect_timer = None;
                if self.state.is_connected() || self.intentional_close {
                    debug!("reconnect no longer needed");
                    return;
                }
                info!(attempt = self.reconnect_attempts, "reconnecting");
                if let Err(e) = self.start_connect() {
                    if !e.is_configuration() {
                        self.schedule_reconnect();
                    }
                }
            }
            TimerKind::DirectoryRefresh => {
                self.refresh_timer = None;
                if self.state.is_connected() {
                    self.signals.push_back(ControllerSignal::RefreshDirectory);
                }
            }
        }
    }

    fn send_ping(&mut self) {
        if !self.state.is_connected() {
            return;
        }
        match OutboundFrame::ping().encode() {
            Ok(frame) => {
                debug!("sending keep-alive ping");
                if let Err(e) = self.transport.send(frame) {
                    warn!(error = %e, "keep-alive ping failed");
                }
            }
            Err(e) => warn!(error = %e, "failed to encode ping"),
        }
    }

    fn schedule_reconnect(&mut self) {
        let policy = self.settings.policy;
        if !policy.allows(self.reconnect_attempts) {
            warn!(attempts = self.reconnect_attempts, "giving up on reconnection");
            self.notice(
                "Maximum reconnection attempts reached. Please connect manually.".to_string(),
            );
            self.signals.push_back(ControllerSignal::ReconnectExhausted);
            return;
        }

        self.reconnect_attempts += 1;
        let attempt = self.reconnect_attempts;
        let delay = policy.delay_for(attempt);
        info!(attempt, delay_ms = delay.as_millis(), "scheduling reconnect");
        self.reconnect_timer = Some(self.scheduler.schedule(delay, TimerKind::Reconnect));
        self.notice(format!(
            "Attempting to reconnect in {} seconds... ({attempt}/{})",
            delay.as_secs_f64(),
            policy.max_attempts
        ));
        self.signals
            .push_back(ControllerSignal::ReconnectScheduled { attempt, delay });
    }

    /// Drop the timers owned by a live connection.
    fn stop_timers(&mut self) {
        self.heartbeat = None;
        self.refresh_timer = None;
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            debug!(from = %self.state, to = %state, "connection state");
            self.state = state;
            self.signals.push_back(ControllerSignal::StateChanged(state));
        }
    }

    fn notice(&mut self, text: String) {
        self.signals.push_back(ControllerSignal::Notice(text));
    }
}

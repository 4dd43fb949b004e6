//! Session Façade: the object an application owns and drives.
//!
//! The session composes the lifecycle controller, classifier, channel
//! directory and conversation store. It is single-owner and not `Sync`: all
//! mutation happens either in a direct call (`send_message`,
//! `switch_active_channel`, ...) or in [`Session::handle_event`] for events
//! drained from its own queue. Consumers learn about changes through the
//! [`SessionUpdate`] channel and re-query the read accessors.

use std::collections::VecDeque;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::classifier::{Classification, Classifier};
use crate::config::ChatConfig;
use crate::conversation::{
    generate_message_id, AddOutcome, ConversationStore, Message, Thread,
};
use crate::directory::{Channel, ChannelDirectory};
use crate::error::SessionError;
use crate::event::{event_channel, EventSource, SessionEvent};
use crate::lifecycle::{
    ConnectionState, ControllerSignal, LifecycleController, LifecycleSettings,
};
use crate::protocol::{iso_now, DirectoryEntry, EventAction, OutboundFrame};
use crate::scheduler::{Scheduler, TokioScheduler};
use crate::transport::{Transport, WsTransport};

/// Change notifications for the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionUpdate {
    ConnectionStateChanged(ConnectionState),
    Notice(String),
    MessageAdded { channel_id: String, thread_id: String },
    ChannelsUpdated,
    ActiveChannelChanged(String),
    ReconnectScheduled { attempt: u32, delay: std::time::Duration },
    ReconnectExhausted,
}

/// A system notice with the time it was recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub text: String,
    pub timestamp: String,
}

/// A session over a real WebSocket with tokio timers.
pub type WsSession = Session<WsTransport, TokioScheduler>;

pub struct Session<T, S> {
    lifecycle: LifecycleController<T, S>,
    classifier: Classifier,
    directory: ChannelDirectory,
    store: ConversationStore,
    sender_id: String,
    notices: VecDeque<Notice>,
    notice_limit: usize,
    events: EventSource,
    updates: mpsc::UnboundedSender<SessionUpdate>,
}

impl WsSession {
    /// Build a session wired to a WebSocket transport and tokio timers.
    pub fn websocket(config: &ChatConfig) -> (Self, mpsc::UnboundedReceiver<SessionUpdate>) {
        let (sink, source) = event_channel();
        let transport = WsTransport::new(sink.clone(), config.connect_timeout());
        let scheduler = TokioScheduler::new(sink);
        Session::new(config, transport, scheduler, source)
    }
}

impl<T: Transport, S: Scheduler> Session<T, S> {
    /// `events` must be the queue that `transport` and `scheduler` post to.
    pub fn new(
        config: &ChatConfig,
        transport: T,
        scheduler: S,
        events: EventSource,
    ) -> (Self, mpsc::UnboundedReceiver<SessionUpdate>) {
        let (updates, updates_rx) = mpsc::unbounded_channel();
        let session = Self {
            lifecycle: LifecycleController::new(
                transport,
                scheduler,
                LifecycleSettings::from(config),
            ),
            classifier: Classifier::new(&config.assistant_author),
            directory: ChannelDirectory::new(
                &config.default_channel_id,
                &config.default_channel_name,
            ),
            store: ConversationStore::new(&config.default_channel_id, &config.local_author),
            sender_id: config.sender_id.clone(),
            notices: VecDeque::new(),
            notice_limit: config.notice_log_size.max(1),
            events,
            updates,
        };
        (session, updates_rx)
    }

    // ── Connection ──────────────────────────────────────────────────

    pub fn connect(&mut self) -> Result<(), SessionError> {
        let result = self.lifecycle.connect();
        self.pump();
        result
    }

    pub fn disconnect(&mut self) {
        self.lifecycle.disconnect();
        self.pump();
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.lifecycle.state()
    }

    // ── Event queue ─────────────────────────────────────────────────

    /// Wait for the next transport or timer event. `None` once every
    /// producer is gone.
    pub async fn recv_event(&mut self) -> Option<SessionEvent> {
        self.events.recv().await
    }

    /// Apply one transport or timer event.
    pub fn handle_event(&mut self, event: SessionEvent) {
        self.lifecycle.handle_event(event);
        self.pump();
    }

    /// Handle every event already queued, without waiting.
    pub fn process_pending(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.events.try_recv() {
            self.handle_event(event);
            handled += 1;
        }
        handled
    }

    fn pump(&mut self) {
        while let Some(signal) = self.lifecycle.next_signal() {
            match signal {
                ControllerSignal::StateChanged(state) => {
                    self.emit(SessionUpdate::ConnectionStateChanged(state));
                }
                ControllerSignal::Notice(text) => self.push_notice(text),
                ControllerSignal::Inbound(raw) => self.route_inbound(&raw),
                ControllerSignal::RefreshDirectory => {
                    if let Err(e) = self.send_directory_request() {
                        debug!(error = %e, "scheduled directory refresh skipped");
                    }
                }
                ControllerSignal::ReconnectScheduled { attempt, delay } => {
                    self.emit(SessionUpdate::ReconnectScheduled { attempt, delay });
                }
                ControllerSignal::ReconnectExhausted => self.emit(SessionUpdate::ReconnectExhausted),
            }
        }
    }

    fn route_inbound(&mut self, raw: &str) {
        match self.classifier.classify(raw, &self.directory, &self.store) {
            Classification::Notice(text) => self.push_notice(text),
            Classification::Directory(entries) => self.apply_directory_snapshot(&entries),
            Classification::Message(msg) => {
                self.add_message(msg);
            }
            Classification::Ignored => {}
        }
    }

    // ── Outbound ────────────────────────────────────────────────────

    /// Send `text` to the active channel, optionally as a reply in
    /// `reply_to`, and append it locally without waiting for an echo.
    pub fn send_message(
        &mut self,
        text: &str,
        reply_to: Option<&str>,
    ) -> Result<Message, SessionError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SessionError::EmptyMessage);
        }
        if !self.lifecycle.state().is_connected() {
            let err = SessionError::NotConnected;
            self.push_notice(err.to_string());
            return Err(err);
        }

        let thread_id = reply_to
            .filter(|t| !t.is_empty())
            .map_or_else(|| self.store.fresh_thread_id(Utc::now()), str::to_string);
        let channel_id = self.store.active_channel().to_string();
        let frame = OutboundFrame::chat(text, &self.sender_id, &thread_id, &channel_id).encode()?;
        if let Err(e) = self.lifecycle.send(frame) {
            warn!(error = %e, "chat send failed");
            self.push_notice(format!("Failed to send message: {e}"));
            return Err(e);
        }

        let is_reply = self.store.has_thread(&thread_id);
        let msg = Message {
            id: generate_message_id(),
            text: text.to_string(),
            author: self.store.local_author().to_string(),
            timestamp: iso_now(),
            channel_id,
            parent_thread_id: is_reply.then(|| thread_id.clone()),
            thread_id,
            is_reply,
            structured_payload: None,
        };
        debug!(channel = %msg.channel_id, thread_id = %msg.thread_id, "message sent");
        self.add_message(msg.clone());
        Ok(msg)
    }

    /// Ask the gateway for the channel directory. Requires a connection.
    pub fn request_channel_directory(&mut self) -> Result<(), SessionError> {
        if !self.lifecycle.state().is_connected() {
            self.push_notice(
                "Not connected. Please connect first to request team channels.".to_string(),
            );
            return Err(SessionError::NotConnected);
        }
        if let Err(e) = self.send_directory_request() {
            warn!(error = %e, "directory request failed");
            self.push_notice(format!("Failed to request team channels: {e}"));
            return Err(e);
        }
        Ok(())
    }

    fn send_directory_request(&mut self) -> Result<(), SessionError> {
        let frame = OutboundFrame::directory_request().encode()?;
        self.push_notice("Requesting team channels from server...".to_string());
        self.lifecycle.send(frame)
    }

    /// Record the feedback notice for an event action and return the URL to
    /// open, if the action has one.
    pub fn trigger_action(&mut self, action: &EventAction) -> Option<String> {
        info!(action = %action.action_id, label = %action.label, "event action triggered");
        match action.target_url() {
            Some(url) => {
                self.push_notice(format!(
                    "Action \"{}\" triggered. Check the new tab for results.",
                    action.label
                ));
                Some(url.to_string())
            }
            None => {
                self.push_notice(format!("Action \"{}\" - No URL provided", action.label));
                None
            }
        }
    }

    // ── Directory & store ───────────────────────────────────────────

    /// Rebuild the channel set, carrying history forward for retained ids.
    pub fn apply_directory_snapshot(&mut self, entries: &[DirectoryEntry]) {
        let change = self.directory.apply_snapshot(entries);
        let active_reset = self.store.carry_forward(&change.channels);
        if !change.dropped.is_empty() {
            info!(dropped = ?change.dropped, "channels removed by directory refresh");
        }
        info!(channels = change.channels.len(), "channel directory refreshed");

        let loaded = entries.iter().filter(|e| !e.id.is_empty()).count();
        self.push_notice(format!("Loaded {loaded} team channels from server"));
        self.emit(SessionUpdate::ChannelsUpdated);
        if active_reset {
            let active = self.store.active_channel().to_string();
            self.emit(SessionUpdate::ActiveChannelChanged(active));
        }
    }

    /// Store a message, registering its channel first if needed.
    pub fn add_message(&mut self, msg: Message) -> AddOutcome {
        if self.directory.ensure_channel(&msg.channel_id) {
            self.emit(SessionUpdate::ChannelsUpdated);
        }
        self.store.ensure_channel(&msg.channel_id);

        let channel_id = msg.channel_id.clone();
        let thread_id = msg.parent_thread_id.clone().unwrap_or_else(|| msg.thread_id.clone());
        let outcome = self.store.add_message(msg);
        debug!(channel = %channel_id, %thread_id, ?outcome, "message added");
        if outcome.stored() {
            self.emit(SessionUpdate::MessageAdded { channel_id, thread_id });
        }
        outcome
    }

    /// Make `id` the active channel and clear its unread counter.
    ///
    /// Returns `Ok(false)` if it already was active.
    pub fn switch_active_channel(&mut self, id: &str) -> Result<bool, SessionError> {
        if !self.directory.contains(id) {
            return Err(SessionError::UnknownChannel(id.to_string()));
        }
        self.store.ensure_channel(id);
        let switched = self.store.switch_active_channel(id);
        if switched {
            debug!(channel = id, "active channel changed");
            self.emit(SessionUpdate::ActiveChannelChanged(id.to_string()));
        }
        Ok(switched)
    }

    // ── Read accessors ──────────────────────────────────────────────

    pub fn active_channel_id(&self) -> &str {
        self.store.active_channel()
    }

    pub fn default_channel_id(&self) -> &str {
        self.directory.default_id()
    }

    /// Channels in directory order with their unread counters.
    pub fn channels(&self) -> Vec<Channel> {
        self.directory
            .iter()
            .map(|info| Channel {
                id: info.id.clone(),
                display_name: info.display_name.clone(),
                external_id: info.external_id.clone(),
                unread_count: self.store.unread_count(&info.id),
            })
            .collect()
    }

    pub fn resolve_channel<'a>(&'a self, reference: Option<&'a str>) -> &'a str {
        self.directory.resolve(reference)
    }

    pub fn unread_count(&self, channel_id: &str) -> u32 {
        self.store.unread_count(channel_id)
    }

    pub fn messages(&self, channel_id: &str) -> &[Message] {
        self.store.messages(channel_id)
    }

    pub fn root_messages_of<'a>(
        &'a self,
        channel_id: &str,
    ) -> impl Iterator<Item = (&'a Message, Option<&'a Thread>)> + 'a {
        self.store.root_messages_of(channel_id)
    }

    pub fn thread(&self, thread_id: &str) -> Option<&Thread> {
        self.store.thread(thread_id)
    }

    /// Recorded notices, oldest first.
    pub fn notices(&self) -> impl Iterator<Item = &Notice> {
        self.notices.iter()
    }

    fn push_notice(&mut self, text: String) {
        info!(notice = %text);
        if self.notices.len() >= self.notice_limit {
            self.notices.pop_front();
        }
        self.notices.push_back(Notice {
            text: text.clone(),
            timestamp: iso_now(),
        });
        self.emit(SessionUpdate::Notice(text));
    }

    fn emit(&self, update: SessionUpdate) {
        // No receiver just means nobody is listening.
        let _ = self.updates.send(update);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::TimerKind;
    use crate::testing::{FakeTransport, ManualScheduler};
    use crate::transport::{TransportEvent, ABNORMAL_CLOSURE};

    type TestSession = Session<FakeTransport, ManualScheduler>;

    struct Harness {
        session: TestSession,
        updates: mpsc::UnboundedReceiver<SessionUpdate>,
        transport: FakeTransport,
        scheduler: ManualScheduler,
    }

    impl Harness {
        fn new() -> Self {
            let config = ChatConfig {
                websocket_url: "wss://gw.example.com/prod".into(),
                api_key: "s3cret".into(),
                ..ChatConfig::default()
            };
            Self::with_config(&config)
        }

        fn with_config(config: &ChatConfig) -> Self {
            let transport = FakeTransport::default();
            let scheduler = ManualScheduler::default();
            let (_sink, source) = event_channel();
            let (session, updates) =
                Session::new(config, transport.clone(), scheduler.clone(), source);
            Self { session, updates, transport, scheduler }
        }

        fn connected() -> Self {
            let mut h = Self::new();
            h.session.connect().unwrap();
            h.transport_event(TransportEvent::Opened);
            h.drain_updates();
            h
        }

        fn transport_event(&mut self, event: TransportEvent) {
            let conn = self.transport.last_conn().unwrap();
            self.session.handle_event(SessionEvent::Transport { conn, event });
        }

        fn inbound(&mut self, raw: &str) {
            self.transport_event(TransportEvent::Message(raw.to_string()));
        }

        fn drain_updates(&mut self) -> Vec<SessionUpdate> {
            std::iter::from_fn(|| self.updates.try_recv().ok()).collect()
        }

        fn last_notice(&self) -> Option<String> {
            self.session.notices().last().map(|n| n.text.clone())
        }
    }

    const DEFAULT: &str = "default-channel-001";

    #[test]
    fn connect_without_config_reports_and_does_not_open() {
        let mut h = Harness::with_config(&ChatConfig::default());
        let err = h.session.connect().unwrap_err();
        assert!(err.is_configuration());
        assert!(h.transport.opened_urls().is_empty());
        assert_eq!(
            h.last_notice().as_deref(),
            Some("WebSocket URL not configured. Please check configuration.")
        );
    }

    #[test]
    fn directory_refresh_follows_open() {
        let mut h = Harness::connected();
        let refresh = h.scheduler.fire(TimerKind::DirectoryRefresh).unwrap();
        h.session.handle_event(refresh);
        let sent = h.transport.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains(r#""action":"getTeamChannels""#));
        assert_eq!(h.last_notice().as_deref(), Some("Requesting team channels from server..."));
    }

    #[test]
    fn directory_snapshot_enables_external_resolution() {
        let mut h = Harness::connected();
        h.inbound(r#"{"type":"teamChannels","data":[{"id":"c1","displayName":"Ops","externalId":"E1"}]}"#);
        assert_eq!(h.session.resolve_channel(Some("E1")), "c1");
        assert_eq!(h.last_notice().as_deref(), Some("Loaded 1 team channels from server"));
        let ids: Vec<String> = h.session.channels().into_iter().map(|c| c.id).collect();
        assert_eq!(ids, [DEFAULT, "c1"]);
        assert!(h.drain_updates().contains(&SessionUpdate::ChannelsUpdated));
    }

    #[test]
    fn unread_increments_off_active_and_resets_on_switch() {
        let mut h = Harness::connected();
        h.inbound(r#"{"type":"teamChannels","data":[{"id":"c1","displayName":"Ops","externalId":"E1"}]}"#);
        h.inbound(r#"{"text":"disk full","channel":"c1","author":"bot","threadId":"t1"}"#);

        assert_eq!(h.session.active_channel_id(), DEFAULT);
        assert_eq!(h.session.unread_count("c1"), 1);
        assert_eq!(h.session.switch_active_channel("c1"), Ok(true));
        assert_eq!(h.session.unread_count("c1"), 0);
        assert_eq!(h.session.switch_active_channel("c1"), Ok(false));
        assert_eq!(
            h.session.switch_active_channel("nope"),
            Err(SessionError::UnknownChannel("nope".into()))
        );
    }

    #[test]
    fn snapshot_preserves_history_of_relisted_channel() {
        let mut h = Harness::connected();
        let snapshot =
            r#"{"type":"teamChannels","data":[{"id":"c1","displayName":"Ops","externalId":"E1"}]}"#;
        h.inbound(snapshot);
        h.inbound(r#"{"text":"a","channel":"E1","threadId":"t1"}"#);
        h.inbound(r#"{"text":"b","channel":"E1","threadId":"t2"}"#);
        assert_eq!(h.session.messages("c1").len(), 2);
        assert_eq!(h.session.unread_count("c1"), 2);

        h.inbound(snapshot);
        assert_eq!(h.session.messages("c1").len(), 2);
        assert_eq!(h.session.unread_count("c1"), 2);
    }

    #[test]
    fn snapshot_dropping_active_channel_falls_back_to_default() {
        let mut h = Harness::connected();
        h.inbound(r#"{"type":"teamChannels","data":[{"id":"c1","displayName":"Ops"}]}"#);
        h.session.switch_active_channel("c1").unwrap();
        h.drain_updates();

        h.inbound(r#"{"type":"teamChannels","data":[]}"#);
        assert_eq!(h.session.active_channel_id(), DEFAULT);
        assert!(h
            .drain_updates()
            .contains(&SessionUpdate::ActiveChannelChanged(DEFAULT.into())));
    }

    #[test]
    fn reply_attaches_to_existing_thread() {
        let mut h = Harness::connected();
        h.inbound(r#"{"text":"question","threadId":"t1"}"#);
        h.inbound(r#"{"text":"answer","threadId":"t1"}"#);

        let thread = h.session.thread("t1").unwrap();
        assert_eq!(thread.root.text, "question");
        assert_eq!(thread.reply_count(), 1);
        assert_eq!(h.session.root_messages_of(DEFAULT).count(), 1);
    }

    #[test]
    fn add_message_drops_orphan_reply() {
        let mut h = Harness::connected();
        let orphan = Message {
            id: "m1".into(),
            text: "late".into(),
            author: "bot".into(),
            timestamp: iso_now(),
            channel_id: DEFAULT.into(),
            thread_id: "t404".into(),
            is_reply: true,
            parent_thread_id: Some("t404".into()),
            structured_payload: None,
        };
        assert_eq!(h.session.add_message(orphan), AddOutcome::DroppedOrphanReply);
        assert!(h.session.messages(DEFAULT).is_empty());
        assert!(!h
            .drain_updates()
            .iter()
            .any(|u| matches!(u, SessionUpdate::MessageAdded { .. })));
    }

    #[test]
    fn unparseable_frame_is_recorded_as_notice() {
        let mut h = Harness::connected();
        h.inbound("not json");
        assert_eq!(h.last_notice().as_deref(), Some("Failed to parse message: not json"));
        assert!(h.session.messages(DEFAULT).is_empty());
        assert!(h.session.connection_state().is_connected());
    }

    #[test]
    fn error_frame_is_prefixed() {
        let mut h = Harness::connected();
        h.inbound(r#"{"type":"error","text":"agent unavailable"}"#);
        assert_eq!(h.last_notice().as_deref(), Some("Error: agent unavailable"));
    }

    #[test]
    fn message_for_unknown_channel_before_directory_uses_default() {
        let mut h = Harness::connected();
        h.inbound(r#"{"text":"early","channel":"E1"}"#);
        assert_eq!(h.session.messages(DEFAULT).len(), 1);
        assert_eq!(h.session.channels().len(), 1);
    }

    #[test]
    fn send_message_appends_optimistically() {
        let mut h = Harness::connected();
        let msg = h.session.send_message("  restart the api  ", None).unwrap();

        assert_eq!(msg.text, "restart the api");
        assert_eq!(msg.author, "You");
        assert_eq!(msg.channel_id, DEFAULT);
        assert!(!msg.is_reply);
        assert_eq!(h.session.messages(DEFAULT), [msg.clone()]);
        assert_eq!(h.session.unread_count(DEFAULT), 0);

        let frame: serde_json::Value = serde_json::from_str(&h.transport.sent()[0]).unwrap();
        assert_eq!(frame["action"], "message");
        assert_eq!(frame["text"], "restart the api");
        assert_eq!(frame["userId"], "webchat");
        assert_eq!(frame["threadId"], msg.thread_id.as_str());
        assert_eq!(frame["channel"], DEFAULT);
        assert_eq!(frame["messageType"], "message");
    }

    #[test]
    fn send_reply_joins_thread() {
        let mut h = Harness::connected();
        h.inbound(r#"{"text":"CPU alarm","threadId":"t1"}"#);
        let msg = h.session.send_message("looking", Some("t1")).unwrap();
        assert!(msg.is_reply);
        assert_eq!(msg.parent_thread_id.as_deref(), Some("t1"));
        assert_eq!(h.session.thread("t1").unwrap().reply_count(), 1);
    }

    #[test]
    fn send_while_disconnected_is_rejected_with_notice() {
        let mut h = Harness::new();
        assert_eq!(h.session.send_message("hi", None), Err(SessionError::NotConnected));
        assert_eq!(h.last_notice().as_deref(), Some("Not connected. Please connect first."));
        assert!(h.session.messages(DEFAULT).is_empty());
        assert!(h.transport.sent().is_empty());
    }

    #[test]
    fn empty_message_is_rejected() {
        let mut h = Harness::connected();
        assert_eq!(h.session.send_message("   ", None), Err(SessionError::EmptyMessage));
        assert!(h.transport.sent().is_empty());
    }

    #[test]
    fn directory_request_requires_connection() {
        let mut h = Harness::new();
        assert_eq!(h.session.request_channel_directory(), Err(SessionError::NotConnected));
        assert_eq!(
            h.last_notice().as_deref(),
            Some("Not connected. Please connect first to request team channels.")
        );
        assert!(h.transport.sent().is_empty());
    }

    #[test]
    fn scheduled_refresh_after_close_is_silent() {
        let mut h = Harness::connected();
        let refresh = h.scheduler.fire(TimerKind::DirectoryRefresh).unwrap();
        h.transport_event(TransportEvent::Closed { code: 1000, reason: String::new() });
        let before = h.session.notices().count();
        h.session.handle_event(refresh);
        assert_eq!(h.session.notices().count(), before);
        assert!(h.transport.sent().is_empty());
    }

    #[test]
    fn structured_event_keeps_payload_and_actions() {
        let mut h = Harness::connected();
        h.inbound(
            r#"{"type":"sechub_event","title":"Public bucket","severity":"HIGH",
                "actions":[{"type":"button","label":"Open ticket","actionId":"ticket","url":"https://cb/t"},
                           {"type":"button","label":"Snooze","actionId":"snooze"}]}"#,
        );
        let msg = h.session.messages(DEFAULT)[0].clone();
        assert_eq!(msg.text, "Public bucket");
        let event = msg.structured_payload.unwrap();
        let actions: Vec<EventAction> = event.actions().to_vec();

        assert_eq!(h.session.trigger_action(&actions[0]).as_deref(), Some("https://cb/t"));
        assert_eq!(
            h.last_notice().as_deref(),
            Some("Action \"Open ticket\" triggered. Check the new tab for results.")
        );
        assert_eq!(h.session.trigger_action(&actions[1]), None);
        assert_eq!(h.last_notice().as_deref(), Some("Action \"Snooze\" - No URL provided"));
    }

    #[test]
    fn abnormal_close_surfaces_reconnect_updates() {
        let mut h = Harness::connected();
        h.transport_event(TransportEvent::Closed { code: ABNORMAL_CLOSURE, reason: String::new() });
        let updates = h.drain_updates();
        assert!(updates.contains(&SessionUpdate::ConnectionStateChanged(
            ConnectionState::Disconnected
        )));
        assert!(updates.contains(&SessionUpdate::ReconnectScheduled {
            attempt: 1,
            delay: std::time::Duration::from_millis(1000),
        }));
    }

    #[test]
    fn disconnect_then_time_passing_never_reconnects() {
        let mut h = Harness::connected();
        h.session.disconnect();
        assert!(h.scheduler.fire(TimerKind::Reconnect).is_none());
        assert!(h.scheduler.fire(TimerKind::Heartbeat).is_none());
        assert_eq!(h.transport.opened_urls().len(), 1);
        assert_eq!(h.session.connection_state(), ConnectionState::Disconnected);
        assert_eq!(h.last_notice().as_deref(), Some("Disconnected from OHERO"));
    }

    #[test]
    fn notice_log_is_bounded() {
        let config = ChatConfig {
            websocket_url: "wss://gw.example.com/prod".into(),
            api_key: "k".into(),
            notice_log_size: 3,
            ..ChatConfig::default()
        };
        let mut h = Harness::with_config(&config);
        h.session.connect().unwrap();
        h.transport_event(TransportEvent::Opened);
        for i in 0..5 {
            h.inbound(&format!(r#"{{"type":"system","text":"n{i}"}}"#));
        }
        let texts: Vec<&str> = h.session.notices().map(|n| n.text.as_str()).collect();
        assert_eq!(texts, ["n2", "n3", "n4"]);
    }

    #[test]
    fn burst_without_thread_ids_starts_separate_threads() {
        let mut h = Harness::connected();
        for i in 0..200 {
            h.inbound(&format!(r#"{{"text":"alert {i}"}}"#));
        }
        assert_eq!(h.session.root_messages_of(DEFAULT).count(), 200);
        assert!(h.session.messages(DEFAULT).iter().all(|m| !m.is_reply));
    }

    #[test]
    fn quick_sends_start_separate_threads() {
        let mut h = Harness::connected();
        let a = h.session.send_message("one", None).unwrap();
        let b = h.session.send_message("two", None).unwrap();
        assert_ne!(a.thread_id, b.thread_id);
        assert!(!b.is_reply);
        assert_eq!(h.session.root_messages_of(DEFAULT).count(), 2);
    }

    #[test]
    fn process_pending_drains_queue() {
        let transport = FakeTransport::default();
        let config = ChatConfig {
            websocket_url: "wss://gw.example.com/prod".into(),
            api_key: "k".into(),
            ..ChatConfig::default()
        };
        let (sink, source) = event_channel();
        let (mut session, _updates) =
            Session::new(&config, transport.clone(), ManualScheduler::default(), source);
        session.connect().unwrap();
        let conn = transport.last_conn().unwrap();
        sink.send(SessionEvent::Transport { conn, event: TransportEvent::Opened }).unwrap();
        sink.send(SessionEvent::Transport {
            conn,
            event: TransportEvent::Message(r#"{"text":"hello"}"#.into()),
        })
        .unwrap();

        assert_eq!(session.process_pending(), 2);
        assert!(session.connection_state().is_connected());
        assert_eq!(session.messages(DEFAULT).len(), 1);
    }
}

//! Message Classifier: turns one raw inbound frame into something the session
//! can act on.
//!
//! Classification reads the directory (channel resolution) and the store
//! (reply detection) but never mutates either; the session applies the result.

use chrono::Utc;
use tracing::debug;

use crate::conversation::{generate_message_id, ConversationStore, Message};
use crate::directory::ChannelDirectory;
use crate::protocol::{iso_now, DirectoryEntry, Envelope, InboundFrame, StructuredEvent};

/// Placeholder text for structured events with neither title nor text.
pub const EVENT_PLACEHOLDER: &str = "Event notification";

/// What an inbound frame turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// Text for the notice log (system, error, unparseable).
    Notice(String),
    /// A directory snapshot to apply.
    Directory(Vec<DirectoryEntry>),
    /// A fully formed message for the Conversation Store.
    Message(Message),
    /// Nothing to do.
    Ignored,
}

#[derive(Debug, Clone)]
pub struct Classifier {
    assistant_author: String,
}

impl Classifier {
    /// `assistant_author` is used for inbound messages that carry no author.
    pub fn new(assistant_author: &str) -> Self {
        Self {
            assistant_author: assistant_author.to_string(),
        }
    }

    pub fn classify(
        &self,
        raw: &str,
        directory: &ChannelDirectory,
        store: &ConversationStore,
    ) -> Classification {
        match InboundFrame::decode(raw) {
            InboundFrame::System { text } => Classification::Notice(text),
            InboundFrame::Error { text } => Classification::Notice(format!("Error: {text}")),
            InboundFrame::Directory(entries) => Classification::Directory(entries),
            InboundFrame::Event { envelope, event } => {
                let text = event
                    .title()
                    .or(envelope.text.as_deref().filter(|t| !t.is_empty()))
                    .unwrap_or(EVENT_PLACEHOLDER)
                    .to_string();
                debug!(kind = event.kind(), "classified structured event");
                Classification::Message(self.build(envelope, text, Some(event), directory, store))
            }
            InboundFrame::Chat { envelope, text } => {
                Classification::Message(self.build(envelope, text, None, directory, store))
            }
            InboundFrame::Unparseable(raw) => {
                debug!(len = raw.len(), "inbound frame is not a JSON object");
                Classification::Notice(format!("Failed to parse message: {raw}"))
            }
            InboundFrame::Unrecognized { kind } => {
                debug!(kind = kind.as_deref().unwrap_or("<none>"), "ignoring frame with nothing to display");
                Classification::Ignored
            }
        }
    }

    fn build(
        &self,
        envelope: Envelope,
        text: String,
        structured_payload: Option<StructuredEvent>,
        directory: &ChannelDirectory,
        store: &ConversationStore,
    ) -> Message {
        let thread_id = envelope
            .thread_id
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| store.fresh_thread_id(Utc::now()));
        let channel_id = directory.resolve(envelope.channel.as_deref()).to_string();
        let is_reply = store.has_thread(&thread_id);

        Message {
            id: envelope
                .message_id
                .filter(|id| !id.is_empty())
                .unwrap_or_else(generate_message_id),
            text,
            author: envelope
                .author
                .filter(|a| !a.is_empty())
                .unwrap_or_else(|| self.assistant_author.clone()),
            timestamp: envelope
                .timestamp
                .filter(|t| !t.is_empty())
                .unwrap_or_else(iso_now),
            channel_id,
            parent_thread_id: is_reply.then(|| thread_id.clone()),
            thread_id,
            is_reply,
            structured_payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::AddOutcome;

    const DEFAULT: &str = "default-channel-001";

    fn fixtures() -> (Classifier, ChannelDirectory, ConversationStore) {
        let mut dir = ChannelDirectory::new(DEFAULT, "Default Team");
        dir.apply_snapshot(&[DirectoryEntry::new("c1", "Ops", Some("E1"))]);
        (
            Classifier::new("OHERO Assistant"),
            dir,
            ConversationStore::new(DEFAULT, "You"),
        )
    }

    fn message(c: Classification) -> Message {
        match c {
            Classification::Message(m) => m,
            other => panic!("expected message, got {other:?}"),
        }
    }

    #[test]
    fn system_and_error_become_notices() {
        let (c, d, s) = fixtures();
        assert_eq!(
            c.classify(r#"{"type":"system","text":"hello"}"#, &d, &s),
            Classification::Notice("hello".into())
        );
        assert_eq!(
            c.classify(r#"{"type":"error","message":"boom"}"#, &d, &s),
            Classification::Notice("Error: boom".into())
        );
        assert_eq!(
            c.classify(r#"{"type":"error"}"#, &d, &s),
            Classification::Notice("Error: Unknown error".into())
        );
    }

    #[test]
    fn unparseable_frame_becomes_notice() {
        let (c, d, s) = fixtures();
        assert_eq!(
            c.classify("not json", &d, &s),
            Classification::Notice("Failed to parse message: not json".into())
        );
    }

    #[test]
    fn directory_frame_is_forwarded() {
        let (c, d, s) = fixtures();
        let out = c.classify(
            r#"{"type":"teamChannels","data":[{"id":"c2","displayName":"SecOps"}]}"#,
            &d,
            &s,
        );
        assert_eq!(
            out,
            Classification::Directory(vec![DirectoryEntry::new("c2", "SecOps", None)])
        );
    }

    #[test]
    fn chat_resolves_channel_and_defaults_author() {
        let (c, d, s) = fixtures();
        let m = message(c.classify(r#"{"text":"hi","channel":"E1","threadId":"t1"}"#, &d, &s));
        assert_eq!(m.channel_id, "c1");
        assert_eq!(m.thread_id, "t1");
        assert_eq!(m.author, "OHERO Assistant");
        assert!(!m.is_reply);
        assert!(m.parent_thread_id.is_none());
        assert!(m.structured_payload.is_none());
    }

    #[test]
    fn unknown_channel_falls_back_to_default() {
        let (c, d, s) = fixtures();
        let m = message(c.classify(r#"{"message":"hi","channel":"C0NOPE"}"#, &d, &s));
        assert_eq!(m.channel_id, DEFAULT);
        assert!(!m.thread_id.is_empty());
    }

    #[test]
    fn existing_thread_makes_reply() {
        let (c, d, mut s) = fixtures();
        let root = message(c.classify(r#"{"text":"q","threadId":"t1"}"#, &d, &s));
        assert_eq!(s.add_message(root), AddOutcome::Root);

        let r = message(c.classify(r#"{"text":"a","threadId":"t1","author":"bot"}"#, &d, &s));
        assert!(r.is_reply);
        assert_eq!(r.parent_thread_id.as_deref(), Some("t1"));
        assert_eq!(r.author, "bot");
    }

    #[test]
    fn structured_event_text_prefers_title() {
        let (c, d, s) = fixtures();
        let m = message(c.classify(
            r#"{"type":"health_event","title":"EC2 degraded","text":"ignored","messageId":"ev-1"}"#,
            &d,
            &s,
        ));
        assert_eq!(m.text, "EC2 degraded");
        assert_eq!(m.id, "ev-1");
        assert_eq!(m.structured_payload.as_ref().map(StructuredEvent::kind), Some("health_event"));
    }

    #[test]
    fn structured_event_falls_back_to_text_then_placeholder() {
        let (c, d, s) = fixtures();
        let m = message(c.classify(r#"{"type":"event_status","text":"triaged by bot"}"#, &d, &s));
        assert_eq!(m.text, "triaged by bot");
        let m = message(c.classify(r#"{"type":"sechub_event"}"#, &d, &s));
        assert_eq!(m.text, EVENT_PLACEHOLDER);
    }

    #[test]
    fn frame_without_text_is_ignored() {
        let (c, d, s) = fixtures();
        assert_eq!(c.classify(r#"{"type":"pong"}"#, &d, &s), Classification::Ignored);
    }
}

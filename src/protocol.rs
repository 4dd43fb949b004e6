//! Wire frames exchanged with the gateway.
//!
//! Outbound frames are a closed enum tagged by `action`. Inbound frames are
//! decoded into [`InboundFrame`] by matching the `type` discriminant; every
//! shape the gateway does not define ends up in an explicit fallback variant
//! instead of being guessed at.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Current time as an ISO-8601 string with millisecond precision (`…T12:00:00.000Z`).
pub fn iso_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

// ─── Outbound ────────────────────────────────────────────────────────────────

/// Frames the client sends. Serialized as `{"action": "...", ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action")]
pub enum OutboundFrame {
    #[serde(rename = "message")]
    Message {
        text: String,
        #[serde(rename = "userId")]
        user_id: String,
        timestamp: String,
        #[serde(rename = "threadId")]
        thread_id: String,
        #[serde(rename = "messageType")]
        message_type: String,
        channel: String,
    },
    #[serde(rename = "ping")]
    Ping { timestamp: String },
    #[serde(rename = "getTeamChannels")]
    GetTeamChannels { timestamp: String },
}

impl OutboundFrame {
    pub fn chat(text: &str, user_id: &str, thread_id: &str, channel: &str) -> Self {
        OutboundFrame::Message {
            text: text.to_string(),
            user_id: user_id.to_string(),
            timestamp: iso_now(),
            thread_id: thread_id.to_string(),
            message_type: "message".to_string(),
            channel: channel.to_string(),
        }
    }

    pub fn ping() -> Self {
        OutboundFrame::Ping {
            timestamp: iso_now(),
        }
    }

    pub fn directory_request() -> Self {
        OutboundFrame::GetTeamChannels {
            timestamp: iso_now(),
        }
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// ─── Inbound ─────────────────────────────────────────────────────────────────

/// Fields shared by chat frames and structured events.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub text: Option<String>,
    pub message: Option<String>,
    pub content: Option<String>,
    pub author: Option<String>,
    pub thread_id: Option<String>,
    pub timestamp: Option<String>,
    pub channel: Option<String>,
    pub message_id: Option<String>,
}

impl Envelope {
    /// First non-empty of `text`, `message`, `content`.
    pub fn display_text(&self) -> Option<&str> {
        [&self.text, &self.message, &self.content]
            .into_iter()
            .filter_map(Option::as_deref)
            .find(|s| !s.is_empty())
    }
}

/// One channel in a `teamChannels` snapshot.
///
/// Accepts both the gateway names (`id`, `displayName`, `externalId`) and the
/// team-table names (`PK`, `ChannelName`, `SlackChannelId`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DirectoryEntry {
    #[serde(default, alias = "PK")]
    pub id: String,
    #[serde(default, rename = "displayName", alias = "ChannelName")]
    pub display_name: String,
    #[serde(default, rename = "externalId", alias = "SlackChannelId")]
    pub external_id: Option<String>,
}

impl DirectoryEntry {
    pub fn new(id: &str, display_name: &str, external_id: Option<&str>) -> Self {
        Self {
            id: id.to_string(),
            display_name: display_name.to_string(),
            external_id: external_id.map(str::to_string),
        }
    }
}

#[derive(Deserialize)]
struct DirectoryBody {
    #[serde(default)]
    data: Vec<DirectoryEntry>,
}

/// A named action attached to a structured event (e.g. "Acknowledge").
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventAction {
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default, alias = "text")]
    pub label: String,
    #[serde(default, rename = "actionId", alias = "action")]
    pub action_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
}

impl EventAction {
    /// The callback URL, if one is set and non-empty.
    pub fn target_url(&self) -> Option<&str> {
        self.url.as_deref().filter(|u| !u.is_empty())
    }
}

/// AWS Health event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthEvent {
    pub title: Option<String>,
    pub event_type: Option<String>,
    pub status: Option<String>,
    pub start_time: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub actions: Vec<EventAction>,
}

/// Security Hub finding.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityFinding {
    pub title: Option<String>,
    pub finding_title: Option<String>,
    pub severity: Option<String>,
    pub account_id: Option<String>,
    pub affected_resource: Option<String>,
    pub last_observed_at: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub actions: Vec<EventAction>,
}

/// Update to a previously announced health event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthEventUpdate {
    pub title: Option<String>,
    pub status: Option<String>,
    pub start_time: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub actions: Vec<EventAction>,
}

/// Triage outcome for an event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventStatus {
    pub title: Option<String>,
    pub status: Option<String>,
    pub text: Option<String>,
    #[serde(default)]
    pub actions: Vec<EventAction>,
}

impl EventStatus {
    pub fn is_triaged(&self) -> bool {
        self.status.as_deref() == Some("triaged")
    }
}

/// Machine-readable operational event carried by an inbound frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StructuredEvent {
    #[serde(rename = "health_event")]
    Health(HealthEvent),
    #[serde(rename = "sechub_event")]
    SecurityFinding(SecurityFinding),
    #[serde(rename = "health_event_update")]
    HealthUpdate(HealthEventUpdate),
    #[serde(rename = "event_status")]
    Status(EventStatus),
}

/// Discriminants decoded as [`StructuredEvent`].
pub const STRUCTURED_EVENT_KINDS: [&str; 4] = [
    "health_event",
    "sechub_event",
    "health_event_update",
    "event_status",
];

impl StructuredEvent {
    /// The wire discriminant.
    pub fn kind(&self) -> &'static str {
        match self {
            StructuredEvent::Health(_) => "health_event",
            StructuredEvent::SecurityFinding(_) => "sechub_event",
            StructuredEvent::HealthUpdate(_) => "health_event_update",
            StructuredEvent::Status(_) => "event_status",
        }
    }

    pub fn title(&self) -> Option<&str> {
        let title = match self {
            StructuredEvent::Health(e) => &e.title,
            StructuredEvent::SecurityFinding(e) => &e.title,
            StructuredEvent::HealthUpdate(e) => &e.title,
            StructuredEvent::Status(e) => &e.title,
        };
        title.as_deref().filter(|t| !t.is_empty())
    }

    pub fn actions(&self) -> &[EventAction] {
        match self {
            StructuredEvent::Health(e) => &e.actions,
            StructuredEvent::SecurityFinding(e) => &e.actions,
            StructuredEvent::HealthUpdate(e) => &e.actions,
            StructuredEvent::Status(e) => &e.actions,
        }
    }

    /// Labelled fields for rendering, in display order. Absent fields are skipped.
    pub fn detail_rows(&self) -> Vec<(&'static str, String)> {
        let rows: Vec<(&'static str, Option<String>)> = match self {
            StructuredEvent::Health(e) => vec![
                ("Event Type", e.event_type.clone()),
                ("Status", e.status.clone()),
                ("Start Time", e.start_time.as_deref().map(display_time)),
                ("Description", e.description.clone()),
            ],
            StructuredEvent::SecurityFinding(e) => vec![
                ("Finding", e.finding_title.clone()),
                ("Severity", e.severity.clone()),
                ("Account ID", e.account_id.clone()),
                ("Affected Resource", e.affected_resource.clone()),
                ("Last Observed", e.last_observed_at.as_deref().map(display_time)),
                ("Description", e.description.clone()),
            ],
            StructuredEvent::HealthUpdate(e) => vec![
                ("Status", e.status.clone()),
                ("Start Time", e.start_time.as_deref().map(display_time)),
                ("Description", e.description.clone()),
            ],
            StructuredEvent::Status(e) => vec![
                ("Status", e.status.clone()),
                ("Message", e.text.clone()),
            ],
        };
        rows.into_iter()
            .filter_map(|(label, value)| value.filter(|v| !v.is_empty()).map(|v| (label, v)))
            .collect()
    }
}

/// Render an RFC 3339 timestamp as `YYYY-MM-DD HH:MM:SS UTC`; other input passes through.
fn display_time(raw: &str) -> String {
    DateTime::parse_from_rfc3339(raw).map_or_else(
        |_| raw.to_string(),
        |t| t.with_timezone(&Utc).format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    /// `type: "system"`.
    System { text: String },
    /// `type: "error"`.
    Error { text: String },
    /// `type: "teamChannels"`.
    Directory(Vec<DirectoryEntry>),
    /// One of the structured event kinds.
    Event {
        envelope: Envelope,
        event: StructuredEvent,
    },
    /// Untyped (or unknown type) frame carrying display text.
    Chat { envelope: Envelope, text: String },
    /// Not JSON, not an object, or a known type with an invalid body.
    Unparseable(String),
    /// Valid object with no known type and nothing to display.
    Unrecognized { kind: Option<String> },
}

impl InboundFrame {
    /// Decode one raw text frame. Never fails; bad input maps to a fallback variant.
    pub fn decode(raw: &str) -> InboundFrame {
        let value: Value = match serde_json::from_str(raw) {
            Ok(v @ Value::Object(_)) => v,
            _ => return InboundFrame::Unparseable(raw.to_string()),
        };

        let kind = value.get("type").and_then(Value::as_str).map(str::to_string);
        match kind.as_deref() {
            Some("system") => InboundFrame::System {
                text: notice_text(&value).unwrap_or_else(|| "System message".to_string()),
            },
            Some("error") => InboundFrame::Error {
                text: notice_text(&value).unwrap_or_else(|| "Unknown error".to_string()),
            },
            Some("teamChannels") => match serde_json::from_value::<DirectoryBody>(value) {
                Ok(body) => InboundFrame::Directory(body.data),
                Err(_) => InboundFrame::Unparseable(raw.to_string()),
            },
            Some(k) if STRUCTURED_EVENT_KINDS.contains(&k) => {
                let envelope = serde_json::from_value::<Envelope>(value.clone());
                let event = serde_json::from_value::<StructuredEvent>(value);
                match (envelope, event) {
                    (Ok(envelope), Ok(event)) => InboundFrame::Event { envelope, event },
                    _ => InboundFrame::Unparseable(raw.to_string()),
                }
            }
            _ => match serde_json::from_value::<Envelope>(value) {
                Ok(envelope) => match envelope.display_text() {
                    Some(text) => {
                        let text = text.to_string();
                        InboundFrame::Chat { envelope, text }
                    }
                    None => InboundFrame::Unrecognized { kind },
                },
                Err(_) => InboundFrame::Unparseable(raw.to_string()),
            },
        }
    }
}

/// `text`, else `message`, for system and error notices.
fn notice_text(value: &Value) -> Option<String> {
    ["text", "message"]
        .into_iter()
        .filter_map(|key| value.get(key).and_then(Value::as_str))
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

//! Conversation Store: per-channel message lists, the thread registry and
//! unread counters.
//!
//! Invariant: there is exactly one [`Thread`] per distinct thread id, and a
//! thread's root never changes once created.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::protocol::StructuredEvent;

/// One message in a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: String,
    pub text: String,
    pub author: String,
    /// ISO-8601.
    pub timestamp: String,
    pub channel_id: String,
    pub thread_id: String,
    pub is_reply: bool,
    pub parent_thread_id: Option<String>,
    /// Present only for structured event frames.
    pub structured_payload: Option<StructuredEvent>,
}

/// A root message and its replies in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thread {
    pub root: Message,
    pub replies: Vec<Message>,
}

impl Thread {
    pub fn reply_count(&self) -> usize {
        self.replies.len()
    }

    /// `"1 reply"`, `"3 replies"`. `None` when there are no replies.
    pub fn reply_label(&self) -> Option<String> {
        match self.replies.len() {
            0 => None,
            1 => Some("1 reply".to_string()),
            n => Some(format!("{n} replies")),
        }
    }
}

/// What [`ConversationStore::add_message`] did with a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// Started a new thread.
    Root,
    /// Appended to the thread named by `parent_thread_id`.
    Reply,
    /// A root for a thread id that already exists; stored as a reply to it.
    AttachedToExisting,
    /// Already stored under the same message id; nothing changed.
    Duplicate,
    /// A reply whose parent thread does not exist; nothing stored.
    DroppedOrphanReply,
}

impl AddOutcome {
    /// Whether the message was stored.
    pub fn stored(self) -> bool {
        matches!(
            self,
            AddOutcome::Root | AddOutcome::Reply | AddOutcome::AttachedToExisting
        )
    }
}

#[derive(Debug, Clone, Default)]
struct ChannelLog {
    messages: Vec<Message>,
    unread_count: u32,
}

/// Messages, threads and unread counters for every known channel.
#[derive(Debug, Clone)]
pub struct ConversationStore {
    default_channel: String,
    active_channel: String,
    local_author: String,
    logs: HashMap<String, ChannelLog>,
    threads: HashMap<String, Thread>,
}

impl ConversationStore {
    /// An empty store whose active channel is `default_channel`.
    ///
    /// Messages authored by `local_author` never count as unread.
    pub fn new(default_channel: &str, local_author: &str) -> Self {
        let mut logs = HashMap::new();
        logs.insert(default_channel.to_string(), ChannelLog::default());
        Self {
            default_channel: default_channel.to_string(),
            active_channel: default_channel.to_string(),
            local_author: local_author.to_string(),
            logs,
            threads: HashMap::new(),
        }
    }

    pub fn active_channel(&self) -> &str {
        &self.active_channel
    }

    pub fn local_author(&self) -> &str {
        &self.local_author
    }

    /// Initialize an empty log for `id` if it has none.
    pub fn ensure_channel(&mut self, id: &str) {
        self.logs.entry(id.to_string()).or_default();
    }

    pub fn has_thread(&self, thread_id: &str) -> bool {
        self.threads.contains_key(thread_id)
    }

    pub fn thread(&self, thread_id: &str) -> Option<&Thread> {
        self.threads.get(thread_id)
    }

    /// A derived thread id for `now` that no existing thread uses.
    ///
    /// Ids collide when several messages arrive within the same
    /// millisecond; later ones get a `-n` suffix.
    pub fn fresh_thread_id(&self, now: DateTime<Utc>) -> String {
        let base = derive_thread_id(now);
        if !self.has_thread(&base) {
            return base;
        }
        (1u32..)
            .map(|n| format!("{base}-{n}"))
            .find(|id| !self.has_thread(id))
            .unwrap_or(base)
    }

    pub fn thread_count(&self) -> usize {
        self.threads.len()
    }

    /// All messages of a channel in arrival order, replies included.
    pub fn messages(&self, channel_id: &str) -> &[Message] {
        self.logs
            .get(channel_id)
            .map(|log| log.messages.as_slice())
            .unwrap_or(&[])
    }

    pub fn unread_count(&self, channel_id: &str) -> u32 {
        self.logs.get(channel_id).map_or(0, |log| log.unread_count)
    }

    /// Store a message in its channel and thread.
    ///
    /// A root whose thread already exists is stored as a reply to that
    /// thread. A reply without an existing parent thread is dropped.
    pub fn add_message(&mut self, mut msg: Message) -> AddOutcome {
        let outcome = if msg.is_reply {
            let parent = msg
                .parent_thread_id
                .clone()
                .unwrap_or_else(|| msg.thread_id.clone());
            let Some(thread) = self.threads.get_mut(&parent) else {
                debug!(thread_id = %parent, message_id = %msg.id, "dropping reply to unknown thread");
                return AddOutcome::DroppedOrphanReply;
            };
            if contains_id(thread, &msg.id) {
                return AddOutcome::Duplicate;
            }
            msg.parent_thread_id = Some(parent);
            thread.replies.push(msg.clone());
            AddOutcome::Reply
        } else if let Some(thread) = self.threads.get_mut(&msg.thread_id) {
            if contains_id(thread, &msg.id) {
                return AddOutcome::Duplicate;
            }
            msg.is_reply = true;
            msg.parent_thread_id = Some(msg.thread_id.clone());
            thread.replies.push(msg.clone());
            AddOutcome::AttachedToExisting
        } else {
            self.threads.insert(
                msg.thread_id.clone(),
                Thread {
                    root: msg.clone(),
                    replies: Vec::new(),
                },
            );
            AddOutcome::Root
        };

        let counts_as_unread =
            msg.channel_id != self.active_channel && msg.author != self.local_author;
        let log = self.logs.entry(msg.channel_id.clone()).or_default();
        if counts_as_unread {
            log.unread_count += 1;
        }
        log.messages.push(msg);
        outcome
    }

    /// Make `id` the active channel and clear its unread counter.
    ///
    /// Returns `false` without changing anything when `id` is already active
    /// or has no log.
    pub fn switch_active_channel(&mut self, id: &str) -> bool {
        if id == self.active_channel {
            return false;
        }
        let Some(log) = self.logs.get_mut(id) else {
            return false;
        };
        log.unread_count = 0;
        self.active_channel = id.to_string();
        true
    }

    /// Root messages of a channel in arrival order, each with its thread.
    pub fn root_messages_of<'a>(
        &'a self,
        channel_id: &str,
    ) -> impl Iterator<Item = (&'a Message, Option<&'a Thread>)> + 'a {
        self.messages(channel_id)
            .iter()
            .filter(|m| !m.is_reply)
            .map(move |m| (m, self.threads.get(&m.thread_id)))
    }

    /// Keep the logs of `channels`, creating empty ones for new ids, and
    /// drop every other log along with the threads rooted in it. Replies to
    /// those threads are removed from the kept logs too.
    ///
    /// Returns `true` if the active channel was dropped and reset to the
    /// default channel.
    pub fn carry_forward(&mut self, channels: &[String]) -> bool {
        let keep: HashSet<&str> = channels
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(self.default_channel.as_str()))
            .collect();

        let mut logs = HashMap::with_capacity(keep.len());
        for id in &keep {
            let log = self.logs.remove(*id).unwrap_or_default();
            logs.insert((*id).to_string(), log);
        }
        for (id, log) in &self.logs {
            debug!(channel = %id, messages = log.messages.len(), "pruning channel dropped from directory");
        }
        self.logs = logs;

        let mut pruned = HashSet::new();
        self.threads.retain(|id, thread| {
            let kept = keep.contains(thread.root.channel_id.as_str());
            if !kept {
                pruned.insert(id.clone());
            }
            kept
        });
        // a reply can sit in a kept channel after its root channel is dropped
        if !pruned.is_empty() {
            for log in self.logs.values_mut() {
                log.messages.retain(|m| {
                    !(m.is_reply
                        && m.parent_thread_id.as_ref().is_some_and(|p| pruned.contains(p)))
                });
            }
        }

        if keep.contains(self.active_channel.as_str()) {
            false
        } else {
            self.active_channel = self.default_channel.clone();
            if let Some(log) = self.logs.get_mut(&self.default_channel) {
                log.unread_count = 0;
            }
            true
        }
    }
}

fn contains_id(thread: &Thread, id: &str) -> bool {
    thread.root.id == id || thread.replies.iter().any(|r| r.id == id)
}

/// Coarse thread id for a new conversation: epoch seconds with milliseconds,
/// e.g. `"1718000000.123"`.
pub fn derive_thread_id(now: DateTime<Utc>) -> String {
    format!("{}.{:03}", now.timestamp(), now.timestamp_subsec_millis())
}

/// Fresh message id.
pub fn generate_message_id() -> String {
    format!("msg-{}", uuid::Uuid::new_v4())
}

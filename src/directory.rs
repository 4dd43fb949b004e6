//! Channel Directory: the set of known channels and the external-id mapping.
//!
//! The directory only holds channel metadata. Message lists and unread
//! counters live in the [`ConversationStore`](crate::conversation::ConversationStore),
//! keyed by the same channel id, and are carried across snapshots by the session.

use std::collections::HashMap;

use indexmap::IndexMap;
use tracing::debug;

use crate::protocol::DirectoryEntry;

/// Metadata for one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelInfo {
    pub id: String,
    pub display_name: String,
    pub external_id: Option<String>,
}

/// A channel as presented to the consumer, including its unread counter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    pub id: String,
    pub display_name: String,
    pub external_id: Option<String>,
    pub unread_count: u32,
}

impl Channel {
    /// Badge text for the unread counter: nothing at zero, `99+` above 99.
    pub fn unread_badge(&self) -> Option<String> {
        match self.unread_count {
            0 => None,
            n if n > 99 => Some("99+".to_string()),
            n => Some(n.to_string()),
        }
    }
}

/// Result of applying a directory snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotChange {
    /// Ids in the new channel set, default channel first.
    pub channels: Vec<String>,
    /// Ids that were known before and are absent from the new set.
    pub dropped: Vec<String>,
}

/// Known channels, in directory order, with the default channel always first.
#[derive(Debug, Clone)]
pub struct ChannelDirectory {
    default_id: String,
    default_name: String,
    channels: IndexMap<String, ChannelInfo>,
    /// external id -> internal id
    external: HashMap<String, String>,
}

impl ChannelDirectory {
    pub fn new(default_id: &str, default_name: &str) -> Self {
        let mut dir = Self {
            default_id: default_id.to_string(),
            default_name: default_name.to_string(),
            channels: IndexMap::new(),
            external: HashMap::new(),
        };
        dir.channels.insert(default_id.to_string(), dir.default_info());
        dir
    }

    fn default_info(&self) -> ChannelInfo {
        ChannelInfo {
            id: self.default_id.clone(),
            display_name: self.default_name.clone(),
            external_id: None,
        }
    }

    pub fn default_id(&self) -> &str {
        &self.default_id
    }

    pub fn contains(&self, id: &str) -> bool {
        self.channels.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&ChannelInfo> {
        self.channels.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChannelInfo> {
        self.channels.values()
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Map a channel reference from an inbound frame to an internal channel id.
    ///
    /// Absent, empty and unknown references resolve to the default channel;
    /// inbound traffic never creates channels.
    pub fn resolve<'a>(&'a self, reference: Option<&'a str>) -> &'a str {
        let Some(reference) = reference.filter(|r| !r.is_empty()) else {
            return &self.default_id;
        };
        if reference == self.default_id {
            return &self.default_id;
        }
        if let Some(internal) = self.external.get(reference) {
            return internal;
        }
        if self.channels.contains_key(reference) {
            return reference;
        }
        debug!(channel = reference, "unknown channel reference, using default channel");
        &self.default_id
    }

    /// Replace the channel set with the default channel plus every snapshot entry.
    ///
    /// Entries without an id are skipped. A later entry with a repeated id
    /// overrides the earlier one.
    pub fn apply_snapshot(&mut self, entries: &[DirectoryEntry]) -> SnapshotChange {
        let mut channels = IndexMap::new();
        let mut external = HashMap::new();
        channels.insert(self.default_id.clone(), self.default_info());

        for entry in entries {
            if entry.id.is_empty() {
                debug!("skipping directory entry without id");
                continue;
            }
            let external_id = entry.external_id.clone().filter(|e| !e.is_empty());
            if let Some(ext) = &external_id {
                external.insert(ext.clone(), entry.id.clone());
            }
            let display_name = if entry.display_name.is_empty() {
                entry.id.clone()
            } else {
                entry.display_name.clone()
            };
            channels.insert(
                entry.id.clone(),
                ChannelInfo {
                    id: entry.id.clone(),
                    display_name,
                    external_id,
                },
            );
        }

        let dropped = self
            .channels
            .keys()
            .filter(|id| !channels.contains_key(*id))
            .cloned()
            .collect();

        self.channels = channels;
        self.external = external;

        SnapshotChange {
            channels: self.channels.keys().cloned().collect(),
            dropped,
        }
    }

    /// Register `id` with placeholder metadata if it is not known yet.
    ///
    /// Returns `true` when a new entry was created.
    pub fn ensure_channel(&mut self, id: &str) -> bool {
        if self.channels.contains_key(id) {
            return false;
        }
        debug!(channel = id, "registering channel before directory refresh");
        self.channels.insert(
            id.to_string(),
            ChannelInfo {
                id: id.to_string(),
                display_name: id.to_string(),
                external_id: None,
            },
        );
        true
    }
}

//! Session store — the canonical home of per-session metadata.
//!
//! Identity, creation time, the bound push channel, the last progress
//! snapshot and the enabled dynamic capabilities all live here. The store
//! knows nothing about protocol handlers.

use std::collections::BTreeSet;

use caphub_protocol::events::timestamp;
use caphub_protocol::{Identity, ProgressSnapshot};
use caphub_transport::PushChannel;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::{json, Value};
use tracing::debug;

/// Metadata for one session.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub identity: Option<Identity>,
    /// Attached only while the session has an open listen connection.
    pub channel: Option<PushChannel>,
    /// Never shrinks while the record exists.
    pub enabled_dynamic: BTreeSet<String>,
    pub last_progress: Option<ProgressSnapshot>,
    /// Set once the activation policy has run for this session.
    pub activation_analyzed: bool,
}

impl SessionRecord {
    fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            created_at: Utc::now(),
            identity: None,
            channel: None,
            enabled_dynamic: BTreeSet::new(),
            last_progress: None,
            activation_analyzed: false,
        }
    }

    /// Wire view used by `session/info`.
    pub fn info(&self) -> Value {
        json!({
            "sessionId": self.id,
            "createdAt": timestamp(self.created_at),
            "identity": self.identity,
            "listening": self.channel.is_some(),
            "enabledDynamic": self.enabled_dynamic,
        })
    }
}

/// Concurrent session table keyed by session id.
#[derive(Default)]
pub struct SessionStore {
    sessions: DashMap<String, SessionRecord>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the record if absent, otherwise merge in the supplied fields.
    ///
    /// The merge is field-wise: a new channel replaces the old one (which is
    /// closed), identity fields that are supplied win, and nothing else is
    /// touched.
    pub fn get_or_create(
        &self,
        id: &str,
        channel: Option<PushChannel>,
        identity: Option<Identity>,
    ) -> SessionRecord {
        let mut replaced = None;
        let snapshot = {
            let mut entry = self.sessions.entry(id.to_string()).or_insert_with(|| {
                debug!("Session record created: {id}");
                SessionRecord::new(id)
            });
            let record = entry.value_mut();
            if let Some(channel) = channel {
                replaced = record.channel.replace(channel);
            }
            if let Some(identity) = identity {
                match record.identity.as_mut() {
                    Some(existing) => existing.merge(identity),
                    None => record.identity = Some(identity),
                }
            }
            record.clone()
        };
        if let Some(old) = replaced {
            debug!("Session {id}: replacing listen channel {}", old.id());
            old.close();
        }
        snapshot
    }

    pub fn get(&self, id: &str) -> Option<SessionRecord> {
        self.sessions.get(id).map(|r| r.value().clone())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sessions.contains_key(id)
    }

    /// Remove the record and end its listen connection, if any.
    pub fn delete(&self, id: &str) -> Option<SessionRecord> {
        let (_, record) = self.sessions.remove(id)?;
        if let Some(channel) = &record.channel {
            channel.close();
        }
        debug!("Session record deleted: {id}");
        Some(record)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn ids(&self) -> Vec<String> {
        self.sessions.iter().map(|r| r.key().clone()).collect()
    }

    /// Add names to the enabled-dynamic set. Returns false if the record is gone.
    pub fn record_enabled<'a>(&self, id: &str, names: impl IntoIterator<Item = &'a str>) -> bool {
        match self.sessions.get_mut(id) {
            Some(mut record) => {
                record.enabled_dynamic.extend(names.into_iter().map(str::to_string));
                true
            }
            None => false,
        }
    }

    /// Store the latest progress and hand back the channel to deliver it on.
    pub fn set_progress(&self, id: &str, snapshot: ProgressSnapshot) -> Option<PushChannel> {
        let mut record = self.sessions.get_mut(id)?;
        record.last_progress = Some(snapshot);
        record.channel.clone()
    }

    pub fn last_progress(&self, id: &str) -> Option<ProgressSnapshot> {
        self.sessions.get(id).and_then(|r| r.last_progress.clone())
    }

    pub fn channel(&self, id: &str) -> Option<PushChannel> {
        self.sessions.get(id).and_then(|r| r.channel.clone())
    }

    /// `None` when the record is gone, otherwise the id of the bound channel.
    pub fn bound_channel(&self, id: &str) -> Option<Option<u64>> {
        self.sessions
            .get(id)
            .map(|r| r.channel.as_ref().map(PushChannel::id))
    }

    pub fn is_analyzed(&self, id: &str) -> Option<bool> {
        self.sessions.get(id).map(|r| r.activation_analyzed)
    }

    /// Atomically flip the analyzed marker. True only for the caller that flipped it.
    pub fn mark_analyzed(&self, id: &str) -> bool {
        match self.sessions.get_mut(id) {
            Some(mut record) if !record.activation_analyzed => {
                record.activation_analyzed = true;
                true
            }
            _ => false,
        }
    }
}

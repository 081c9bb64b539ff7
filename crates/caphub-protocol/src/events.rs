//! Push events delivered on a session's listen connection.
//!
//! Each event is serialized as one JSON object per line (NDJSON). Progress
//! events carry no `type` tag; notification and completion events do.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// The latest progress state of a session, readable without a channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub stage: String,
    pub percent: f64,
    pub message: String,
    pub timestamp: String,
}

impl ProgressSnapshot {
    pub fn new(stage: impl Into<String>, percent: f64, message: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            percent: percent.clamp(0.0, 100.0),
            message: message.into(),
            timestamp: timestamp(Utc::now()),
        }
    }
}

/// A server-to-client push event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PushEvent {
    Tagged(TaggedEvent),
    Progress(ProgressSnapshot),
}

/// Events carrying an explicit `type` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TaggedEvent {
    Notification {
        message: String,
        timestamp: String,
    },
    Complete {
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        timestamp: String,
    },
}

impl PushEvent {
    pub fn progress(snapshot: ProgressSnapshot) -> Self {
        Self::Progress(snapshot)
    }

    pub fn notification(message: impl Into<String>) -> Self {
        Self::Tagged(TaggedEvent::Notification {
            message: message.into(),
            timestamp: timestamp(Utc::now()),
        })
    }

    pub fn complete(success: bool, error: Option<String>) -> Self {
        Self::Tagged(TaggedEvent::Complete {
            success,
            error,
            timestamp: timestamp(Utc::now()),
        })
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Tagged(TaggedEvent::Complete { .. }))
    }

    /// Serialize as a single NDJSON line (trailing newline included).
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

/// ISO 8601 timestamp with millisecond precision.
pub fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

//! Request context — per-request state threaded from the transport to handlers.
//!
//! The transport resolves (or generates) the session id from the
//! `mcp-session-id` header and reads the identity headers forwarded by the
//! upstream credential check. Both travel with every request.

use serde::{Deserialize, Serialize};

/// Caller identity established before the request reached this server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

impl Identity {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            username: None,
            role: None,
        }
    }

    /// Field-wise merge: fields present in `other` win, absent ones keep ours.
    pub fn merge(&mut self, other: Identity) {
        self.user_id = other.user_id;
        if other.username.is_some() {
            self.username = other.username;
        }
        if other.role.is_some() {
            self.role = other.role;
        }
    }
}

/// Context for a single request.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Session the request belongs to.
    pub session_id: String,
    /// True when the transport generated `session_id` for this request.
    pub new_session: bool,
    pub identity: Option<Identity>,
}

impl RequestContext {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            new_session: false,
            identity: None,
        }
    }

    pub fn with_identity(mut self, identity: Option<Identity>) -> Self {
        self.identity = identity;
        self
    }
}

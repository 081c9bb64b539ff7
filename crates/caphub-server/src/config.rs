//! Server-level settings that are not transport concerns.

use std::time::Duration;

/// Maximum session lifetime before the eviction sweep closes it.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Reported in `initialize` as `serverInfo.name`
    pub server_name: String,
    pub server_version: String,
    pub protocol_version: String,
    pub session_ttl: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server_name: "caphub".into(),
            server_version: env!("CARGO_PKG_VERSION").into(),
            protocol_version: "2025-03-26".into(),
            session_ttl: DEFAULT_SESSION_TTL,
        }
    }
}

//! caphub Server — per-session capability hosting.
//!
//! The server owns the capability registry, the session store and one
//! `ServerInstance` per live session, and provides the `RequestHandler`
//! implementation for the transport layer.

pub mod activation;
pub mod config;
pub mod instance;
pub mod manager;
pub mod notifier;
pub mod router;
pub mod store;

pub use activation::{ActivationOutcome, ActivationPolicy, ActivationRule, KeywordTrigger, Trigger};
pub use config::ServerConfig;
pub use instance::{InstanceError, ServerInstance, TransportBinding};
pub use manager::SessionServerManager;
pub use notifier::NotificationChannel;
pub use router::CapServer;
pub use store::{SessionRecord, SessionStore};

//! caphub Transport Layer
//!
//! Exposes a single logical endpoint over HTTP:
//! - `POST /mcp`   — send a JSON-RPC envelope (opens a session if no id is given)
//! - `GET /mcp`    — listen: long-lived NDJSON push stream for one session
//! - `DELETE /mcp` — terminate the session
//!
//! The session id travels in the `mcp-session-id` header. The transport is
//! decoupled from session logic via the `RequestHandler` trait.

pub mod channel;
pub mod server;

pub use channel::{push_channel, ChannelError, PushChannel, PushReceiver};
pub use server::{RequestHandler, TransportConfig, TransportServer, SESSION_HEADER};

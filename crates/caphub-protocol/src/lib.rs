//! caphub - Protocol Types
//!
//! JSON-RPC 2.0 compatible types for the capability protocol.
//! This crate is the single source of truth for envelope shapes,
//! method names, push event shapes, and error codes.

pub mod content;
pub mod context;
pub mod error;
pub mod events;
pub mod jsonrpc;
pub mod methods;

pub use content::{extract_content_text, extract_message_text};
pub use context::{Identity, RequestContext};
pub use error::{CapError, CapErrorCode};
pub use events::{ProgressSnapshot, PushEvent};
pub use jsonrpc::{
    HandlerResult, RequestId, RpcErrorResponse, RpcRequest, RpcResponse, RpcSuccessResponse,
};
pub use methods::Methods;

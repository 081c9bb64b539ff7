//! JSON-RPC 2.0 base types.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::CapError;

/// JSON-RPC 2.0 request ID — either a string or integer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    String(String),
    Number(i64),
}

/// JSON-RPC 2.0 request.
///
/// `id` keeps "absent" and "null" apart: an absent id makes a notification,
/// an explicit `null` still gets a response carrying `"id": null`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    #[serde(
        default,
        deserialize_with = "present_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub id: Option<Option<RequestId>>,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// JSON-RPC 2.0 success response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcSuccessResponse {
    pub jsonrpc: String,
    pub id: Option<RequestId>,
    pub result: Value,
}

/// JSON-RPC 2.0 error response. `id` serializes as `null` when unknown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcErrorResponse {
    pub jsonrpc: String,
    pub error: CapError,
    pub id: Option<RequestId>,
}

/// JSON-RPC 2.0 response (success or error).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RpcResponse {
    Success(RpcSuccessResponse),
    Error(RpcErrorResponse),
}

/// Result from a capability or method handler.
pub type HandlerResult = Result<Value, CapError>;

/// Runs only when the `id` key is present, so `null` lands as `Some(None)`.
fn present_id<'de, D>(deserializer: D) -> Result<Option<Option<RequestId>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<RequestId>::deserialize(deserializer).map(Some)
}

// ─────────────────────────────────────────────────────────────────────────────
// Helper constructors
// ─────────────────────────────────────────────────────────────────────────────

impl RpcRequest {
    /// Validate that this is a well-formed JSON-RPC 2.0 request.
    pub fn is_valid(&self) -> bool {
        self.jsonrpc == "2.0" && !self.method.is_empty()
    }

    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }

    /// The id to echo in the response; `None` serializes as `null`.
    pub fn response_id(&self) -> Option<RequestId> {
        self.id.clone().flatten()
    }
}

impl RpcSuccessResponse {
    pub fn new(id: Option<RequestId>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            id,
            result,
        }
    }
}

impl RpcErrorResponse {
    pub fn new(id: Option<RequestId>, error: CapError) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            error,
            id,
        }
    }
}

impl RpcResponse {
    pub fn success(id: Option<RequestId>, result: Value) -> Self {
        Self::Success(RpcSuccessResponse::new(id, result))
    }

    pub fn error(id: Option<RequestId>, error: CapError) -> Self {
        Self::Error(RpcErrorResponse::new(id, error))
    }

    /// Build the response for a handler outcome.
    pub fn from_result(id: Option<RequestId>, result: HandlerResult) -> Self {
        match result {
            Ok(value) => Self::success(id, value),
            Err(e) => Self::error(id, e),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

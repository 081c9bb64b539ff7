//! Error codes and the JSON-RPC error object.
//!
//! The code table is declared once; `code`, `from_code` and the fixed
//! default messages are all generated from it.

use serde::{Deserialize, Serialize};

macro_rules! error_codes {
    ($($variant:ident = $code:literal => $default:literal,)*) => {
        /// Protocol error codes. Anything outside the table is `Custom`.
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum CapErrorCode {
            $($variant,)*
            Custom(i32),
        }

        impl CapErrorCode {
            pub fn code(&self) -> i32 {
                match self {
                    $(Self::$variant => $code,)*
                    Self::Custom(c) => *c,
                }
            }

            pub fn from_code(code: i32) -> Self {
                match code {
                    $($code => Self::$variant,)*
                    c => Self::Custom(c),
                }
            }

            /// Message used when the raiser supplies none.
            pub fn default_message(&self) -> &'static str {
                match self {
                    $(Self::$variant => $default,)*
                    Self::Custom(_) => "Handler error",
                }
            }
        }
    };
}

error_codes! {
    ParseError = -32700 => "Parse error",
    InvalidRequest = -32600 => "Invalid request",
    MethodNotFound = -32601 => "Method not found",
    InvalidParams = -32602 => "Invalid params",
    InternalError = -32603 => "Internal error",
    ServerError = -32000 => "Server error",
    AuthenticationRequired = -32001 => "Authentication required",
    ResourceNotFound = -32002 => "Resource not found",
    ToolNotFound = -32003 => "Tool not found",
    PromptNotFound = -32004 => "Prompt not found",
}

impl CapErrorCode {
    /// Raised deliberately by the protocol layer, as opposed to a failure
    /// surfacing from inside a handler.
    pub fn is_protocol(&self) -> bool {
        !matches!(self, Self::Custom(_))
    }
}

/// JSON-RPC 2.0 error object.
///
/// Only `message` and optional `data` ever reach the client; handlers must not
/// put internal state in either.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl From<CapErrorCode> for CapError {
    fn from(code: CapErrorCode) -> Self {
        Self::new(code, code.default_message())
    }
}

impl CapError {
    pub fn new(code: CapErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code.code(),
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    /// `"<default message>: <subject>"`, for the lookup failures.
    fn about(code: CapErrorCode, subject: &str) -> Self {
        Self::new(code, format!("{}: {subject}", code.default_message()))
    }

    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::new(CapErrorCode::ParseError, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(CapErrorCode::InvalidRequest, message)
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(CapErrorCode::InvalidParams, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(CapErrorCode::InternalError, message)
    }

    pub fn server_error(message: impl Into<String>) -> Self {
        Self::new(CapErrorCode::ServerError, message)
    }

    pub fn authentication_required() -> Self {
        CapErrorCode::AuthenticationRequired.into()
    }

    pub fn missing_session() -> Self {
        Self::invalid_request("Missing mcp-session-id header")
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::about(CapErrorCode::MethodNotFound, method)
    }

    pub fn resource_not_found(uri: &str) -> Self {
        Self::about(CapErrorCode::ResourceNotFound, uri)
    }

    pub fn tool_not_found(name: &str) -> Self {
        Self::about(CapErrorCode::ToolNotFound, name)
    }

    pub fn prompt_not_found(name: &str) -> Self {
        Self::about(CapErrorCode::PromptNotFound, name)
    }

    pub fn error_code(&self) -> CapErrorCode {
        CapErrorCode::from_code(self.code)
    }

    pub fn is_protocol_error(&self) -> bool {
        self.error_code().is_protocol()
    }
}

impl std::fmt::Display for CapError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}

impl std::error::Error for CapError {}

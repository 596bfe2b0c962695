//! Error taxonomy of the client facade.

use alloy_transport::{RpcError, TransportErrorKind};

/// Well-known JSON-RPC error codes of the Engine API.
pub mod codes {
    /// Invalid method parameters.
    pub const INVALID_PARAMS: i64 = -32602;
    /// Invalid request object.
    pub const INVALID_REQUEST: i64 = -32600;
    /// Method not found.
    pub const METHOD_NOT_FOUND: i64 = -32601;
    /// Internal error.
    pub const INTERNAL_ERROR: i64 = -32603;
    /// Malformed JSON.
    pub const PARSE_ERROR: i64 = -32700;
    /// Unknown payload id.
    pub const UNKNOWN_PAYLOAD: i64 = -38001;
    /// Invalid forkchoice state.
    pub const INVALID_FORKCHOICE_STATE: i64 = -38002;
    /// Invalid payload attributes.
    pub const INVALID_PAYLOAD_ATTRIBUTES: i64 = -38003;
    /// Too large request.
    pub const TOO_LARGE_REQUEST: i64 = -38004;
    /// Method version not supported for the payload's fork.
    pub const UNSUPPORTED_FORK: i64 = -38005;
}

/// Failure of one Engine or Eth API call.
#[derive(Debug, thiserror::Error)]
pub enum EngineApiError {
    /// The client answered with a JSON-RPC error object.
    #[error("rpc error {code}: {message}")]
    Rpc {
        /// The `error.code` field.
        code: i64,
        /// The `error.message` field.
        message: String,
    },
    /// The request never produced a JSON-RPC response: connection refused,
    /// rejected authentication (401), malformed body, and the like.
    #[error("transport error: {0}")]
    Transport(String),
    /// The call did not complete within the per-call deadline.
    #[error("rpc call timed out")]
    Timeout,
    /// A response that must not be null was null.
    #[error("unexpected null response to {0}")]
    NullResponse(&'static str),
}

impl EngineApiError {
    /// The JSON-RPC error code, when the failure carries one.
    pub const fn code(&self) -> Option<i64> {
        match self {
            Self::Rpc { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Whether the failure happened below the JSON-RPC layer, which is how a
    /// JWT rejection (HTTP 401) surfaces.
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    pub(crate) fn from_transport(err: RpcError<TransportErrorKind>) -> Self {
        match err.as_error_resp() {
            Some(payload) => Self::Rpc { code: payload.code, message: payload.message.to_string() },
            None => Self::Transport(err.to_string()),
        }
    }
}

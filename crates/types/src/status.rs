//! Engine API response shapes.
//!
//! The payload status is defined locally rather than borrowed from an RPC
//! types crate because conformance runs still meet clients emitting the
//! legacy `INVALID_BLOCK_HASH` status, which must parse and classify rather
//! than fail the whole call.

use alloy_primitives::B256;
use alloy_rpc_types_engine::PayloadId;
use serde::{Deserialize, Serialize};

/// Status discriminant of an `engine_newPayload` / `engine_forkchoiceUpdated`
/// response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PayloadStatusKind {
    /// The payload is valid and canonical-extendable.
    Valid,
    /// The payload is invalid.
    Invalid,
    /// The client is syncing and cannot judge the payload.
    Syncing,
    /// The payload was stored but not yet validated.
    Accepted,
    /// Legacy status for a payload whose hash does not match its contents.
    InvalidBlockHash,
}

impl PayloadStatusKind {
    /// Whether this status is `VALID`.
    pub const fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }

    /// Whether this status is `INVALID` or the legacy hash-mismatch variant.
    pub const fn is_invalid(&self) -> bool {
        matches!(self, Self::Invalid | Self::InvalidBlockHash)
    }
}

impl std::fmt::Display for PayloadStatusKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Valid => "VALID",
            Self::Invalid => "INVALID",
            Self::Syncing => "SYNCING",
            Self::Accepted => "ACCEPTED",
            Self::InvalidBlockHash => "INVALID_BLOCK_HASH",
        };
        f.write_str(label)
    }
}

/// Full payload status object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadStatus {
    /// The status discriminant.
    pub status: PayloadStatusKind,
    /// Hash of the most recent valid ancestor, when the client reports one.
    #[serde(default)]
    pub latest_valid_hash: Option<B256>,
    /// Human-readable validation error, when invalid.
    #[serde(default)]
    pub validation_error: Option<String>,
}

impl PayloadStatus {
    /// A bare status with no ancestor hash or error message.
    pub const fn from_kind(status: PayloadStatusKind) -> Self {
        Self { status, latest_valid_hash: None, validation_error: None }
    }
}

/// The `engine_forkchoiceUpdated` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForkchoiceResponse {
    /// Status of the head block of the forkchoice state.
    pub payload_status: PayloadStatus,
    /// Identifier of the build started by the attached attributes.
    #[serde(default)]
    pub payload_id: Option<PayloadId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_legacy_invalid_block_hash() {
        let raw = r#"{"status":"INVALID_BLOCK_HASH","latestValidHash":null,"validationError":null}"#;
        let status: PayloadStatus = serde_json::from_str(raw).expect("parses");
        assert_eq!(status.status, PayloadStatusKind::InvalidBlockHash);
        assert!(status.status.is_invalid());
    }

    #[test]
    fn forkchoice_response_tolerates_missing_payload_id() {
        let raw = r#"{"payloadStatus":{"status":"SYNCING","latestValidHash":null}}"#;
        let response: ForkchoiceResponse = serde_json::from_str(raw).expect("parses");
        assert_eq!(response.payload_status.status, PayloadStatusKind::Syncing);
        assert!(response.payload_id.is_none());
    }
}

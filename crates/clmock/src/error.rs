//! Block-production failure taxonomy.

use baton_engine::EngineApiError;
use baton_types::PayloadStatusKind;

/// Failure of the mocked consensus layer to advance the chain.
#[derive(Debug, thiserror::Error)]
pub enum MockerError {
    /// An Engine or Eth API call failed outright.
    #[error("client {client}: {source}")]
    Engine {
        /// The client the call targeted.
        client: String,
        /// The underlying call failure.
        #[source]
        source: EngineApiError,
    },
    /// No peer reported reaching the terminal total difficulty in time.
    #[error("timed out waiting for terminal total difficulty")]
    TtdTimeout,
    /// No peer passed the transition forkchoice with `VALID`.
    #[error("no client accepted the transition forkchoice as VALID")]
    TransitionRejected,
    /// The mocker has not gone through the TTD transition yet.
    #[error("proof-of-stake chain not started")]
    NotRunning,
    /// No live peer agrees with the canonical head.
    #[error("no client available to produce the next payload")]
    NoProducerAvailable,
    /// A call that had to return `VALID` returned something else.
    #[error("client {client}: {method} returned {status}, expected VALID")]
    UnexpectedStatus {
        /// The offending client.
        client: String,
        /// The method that was called.
        method: &'static str,
        /// The status returned.
        status: PayloadStatusKind,
    },
    /// `forkchoiceUpdated` with attributes returned no payload id.
    #[error("client {client}: forkchoiceUpdated with attributes returned no payload id")]
    MissingPayloadId {
        /// The offending client.
        client: String,
    },
    /// A client returned a payload id it had already handed out.
    #[error("client {client}: payload id {payload_id} was returned for two different builds")]
    PayloadIdReuse {
        /// The offending client.
        client: String,
        /// The reused id.
        payload_id: String,
    },
    /// A built payload disagrees with the attributes that requested it.
    #[error("built payload field {field} does not match the requested attributes")]
    PayloadMismatch {
        /// The disagreeing field.
        field: &'static str,
    },
    /// No peer returned `VALID` for a broadcast payload.
    #[error("no client returned VALID for payload {block_hash}")]
    NoValidNewPayload {
        /// Hash of the rejected payload.
        block_hash: String,
    },
    /// A peer deviated on the post-broadcast forkchoice response.
    #[error("client {client}: forkchoice broadcast deviation: {reason}")]
    ForkchoiceDeviation {
        /// The offending client.
        client: String,
        /// What deviated.
        reason: String,
    },
    /// No peer canonicalized the produced block.
    #[error("no client canonicalized block {number} ({block_hash})")]
    NotCanonicalized {
        /// Number of the produced block.
        number: u64,
        /// Hash of the produced block.
        block_hash: String,
    },
    /// A produced header violates a structural PoS invariant.
    #[error("header of block {number} violates PoS shape: {reason}")]
    BadPosHeader {
        /// Number of the offending block.
        number: u64,
        /// The violated invariant.
        reason: &'static str,
    },
    /// A cycle hook failed; carries the step layer's error.
    #[error("production hook failed: {0}")]
    Hook(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl MockerError {
    /// Wraps a call failure with the client it targeted.
    pub fn engine(client: &str, source: EngineApiError) -> Self {
        Self::Engine { client: client.to_string(), source }
    }

    /// Wraps an arbitrary hook failure.
    pub fn hook<E: std::error::Error + Send + Sync + 'static>(err: E) -> Self {
        Self::Hook(Box::new(err))
    }
}

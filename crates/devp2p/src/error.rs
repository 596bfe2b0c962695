//! Wire-session failure taxonomy.

/// Failure of a devp2p session.
#[derive(Debug, thiserror::Error)]
pub enum DevP2pError {
    /// The enode URL could not be parsed.
    #[error("invalid enode: {0}")]
    InvalidEnode(String),
    /// TCP or stream failure.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    /// Elliptic-curve or signature failure.
    #[error("crypto: {0}")]
    Crypto(#[from] secp256k1::Error),
    /// An ECIES or frame MAC check failed.
    #[error("mac check failed during {0}")]
    MacMismatch(&'static str),
    /// RLP decode failure.
    #[error("rlp: {0}")]
    Rlp(#[from] alloy_rlp::Error),
    /// Snappy decompression failure.
    #[error("snappy: {0}")]
    Snappy(#[from] snap::Error),
    /// The remote rejected or mangled the handshake.
    #[error("handshake: {0}")]
    Handshake(String),
    /// The remote disconnected, with the protocol reason code.
    #[error("remote disconnected, reason {0}")]
    Disconnected(u64),
    /// A message arrived that the current exchange cannot accept.
    #[error("unexpected message code {code} while {during}")]
    UnexpectedMessage {
        /// Code of the offending message.
        code: u64,
        /// The exchange in progress.
        during: &'static str,
    },
    /// The remote's `Status` disagrees with the canonical chain view.
    #[error("status mismatch on {field}: ours {ours}, theirs {theirs}")]
    StatusMismatch {
        /// The disagreeing field.
        field: &'static str,
        /// Our value.
        ours: String,
        /// The remote's value.
        theirs: String,
    },
    /// A transaction announcement disagrees with the expected set.
    #[error("announcement mismatch: {0}")]
    AnnouncementMismatch(String),
    /// A pooled-transaction response is not byte-exact.
    #[error("pooled transaction mismatch: {0}")]
    PooledTransactionMismatch(String),
    /// The exchange timed out.
    #[error("timed out while {0}")]
    Timeout(&'static str),
    /// A frame exceeds the sane size bound.
    #[error("oversized frame: {0} bytes")]
    OversizedFrame(usize),
}

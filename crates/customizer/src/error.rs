//! Customization failure taxonomy.

/// Failure to apply a customization.
#[derive(Debug, thiserror::Error)]
pub enum CustomizerError {
    /// The payload carries no transactions to doctor.
    #[error("payload has no transactions to modify")]
    NoTransactions,
    /// A transaction in the payload could not be decoded.
    #[error("transaction decode failed: {0}")]
    Decode(#[from] alloy_eips::eip2718::Eip2718Error),
    /// Re-signing a doctored transaction failed.
    #[error("transaction signing failed: {0}")]
    Signer(#[from] alloy_signer::Error),
    /// The requested mutation does not exist for this transaction type.
    #[error("mutation {mutation} not applicable to transaction type {tx_type}")]
    UnsupportedMutation {
        /// The requested mutation.
        mutation: &'static str,
        /// EIP-2718 type byte of the transaction.
        tx_type: u8,
    },
    /// Versioned-hash customization was requested on a pre-Cancun payload.
    #[error("payload carries no versioned hashes to customize")]
    NoVersionedHashes,
    /// A withdrawal mutation was requested on a payload without withdrawals.
    #[error("payload carries no withdrawals to modify")]
    NoWithdrawals,
    /// A beacon-root mutation was requested on a pre-Cancun payload.
    #[error("payload carries no parent beacon block root to modify")]
    NoBeaconRoot,
}

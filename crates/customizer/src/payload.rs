//! Field-level payload patching with hash re-closure.

use crate::FieldOverride;
use alloy_eips::eip4895::Withdrawal;
use alloy_primitives::{Address, B256, Bloom, Bytes, U256};
use baton_types::ExecutableData;

/// A patch over [`ExecutableData`].
///
/// After the patch the block hash is recomputed from the mutated header, so
/// a client cannot reject the result on hash inconsistency alone. Fork-gated
/// fields use [`FieldOverride`] so a patch can also delete them.
#[derive(Debug, Clone, Default)]
pub struct PayloadFields {
    /// Replacement parent hash.
    pub parent_hash: Option<B256>,
    /// Replacement fee recipient.
    pub fee_recipient: Option<Address>,
    /// Replacement state root.
    pub state_root: Option<B256>,
    /// Replacement receipts root.
    pub receipts_root: Option<B256>,
    /// Replacement logs bloom.
    pub logs_bloom: Option<Bloom>,
    /// Replacement prev-randao.
    pub prev_randao: Option<B256>,
    /// Replacement block number.
    pub block_number: Option<u64>,
    /// Replacement gas limit.
    pub gas_limit: Option<u64>,
    /// Replacement gas used.
    pub gas_used: Option<u64>,
    /// Replacement timestamp.
    pub timestamp: Option<u64>,
    /// Replacement extra data.
    pub extra_data: Option<Bytes>,
    /// Replacement base fee.
    pub base_fee_per_gas: Option<U256>,
    /// Replacement transaction list.
    pub transactions: Option<Vec<Bytes>>,
    /// Withdrawals override.
    pub withdrawals: FieldOverride<Vec<Withdrawal>>,
    /// Blob gas used override.
    pub blob_gas_used: FieldOverride<u64>,
    /// Excess blob gas override.
    pub excess_blob_gas: FieldOverride<u64>,
    /// Parent beacon block root override. Travels out-of-band with the call,
    /// but still enters the header and thus the hash.
    pub parent_beacon_block_root: FieldOverride<B256>,
}

impl PayloadFields {
    /// Applies the patch and re-closes the block hash, returning it.
    pub fn apply(&self, payload: &mut ExecutableData) -> B256 {
        if let Some(parent_hash) = self.parent_hash {
            payload.parent_hash = parent_hash;
        }
        if let Some(fee_recipient) = self.fee_recipient {
            payload.fee_recipient = fee_recipient;
        }
        if let Some(state_root) = self.state_root {
            payload.state_root = state_root;
        }
        if let Some(receipts_root) = self.receipts_root {
            payload.receipts_root = receipts_root;
        }
        if let Some(logs_bloom) = self.logs_bloom {
            payload.logs_bloom = logs_bloom;
        }
        if let Some(prev_randao) = self.prev_randao {
            payload.prev_randao = prev_randao;
        }
        if let Some(block_number) = self.block_number {
            payload.block_number = block_number;
        }
        if let Some(gas_limit) = self.gas_limit {
            payload.gas_limit = gas_limit;
        }
        if let Some(gas_used) = self.gas_used {
            payload.gas_used = gas_used;
        }
        if let Some(timestamp) = self.timestamp {
            payload.timestamp = timestamp;
        }
        if let Some(extra_data) = &self.extra_data {
            payload.extra_data = extra_data.clone();
        }
        if let Some(base_fee_per_gas) = self.base_fee_per_gas {
            payload.base_fee_per_gas = base_fee_per_gas;
        }
        if let Some(transactions) = &self.transactions {
            payload.transactions = transactions.clone();
        }
        self.withdrawals.apply(&mut payload.withdrawals);
        self.blob_gas_used.apply(&mut payload.blob_gas_used);
        self.excess_blob_gas.apply(&mut payload.excess_blob_gas);
        self.parent_beacon_block_root.apply(&mut payload.parent_beacon_block_root);
        payload.recompute_block_hash()
    }

    /// Whether the patch changes anything hash-relevant.
    pub fn is_empty(&self) -> bool {
        self.parent_hash.is_none()
            && self.fee_recipient.is_none()
            && self.state_root.is_none()
            && self.receipts_root.is_none()
            && self.logs_bloom.is_none()
            && self.prev_randao.is_none()
            && self.block_number.is_none()
            && self.gas_limit.is_none()
            && self.gas_used.is_none()
            && self.timestamp.is_none()
            && self.extra_data.is_none()
            && self.base_fee_per_gas.is_none()
            && self.transactions.is_none()
            && self.withdrawals.is_keep()
            && self.blob_gas_used.is_keep()
            && self.excess_blob_gas.is_keep()
            && self.parent_beacon_block_root.is_keep()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ExecutableData {
        let mut payload = ExecutableData {
            parent_hash: B256::repeat_byte(1),
            block_number: 10,
            gas_limit: 30_000_000,
            timestamp: 1000,
            base_fee_per_gas: U256::from(7u64),
            ..Default::default()
        };
        payload.recompute_block_hash();
        payload
    }

    #[test]
    fn patch_recloses_hash() {
        let mut payload = sample();
        let original_hash = payload.block_hash;
        let patched = PayloadFields { gas_limit: Some(60_000_000), ..Default::default() }
            .apply(&mut payload);
        assert_ne!(patched, original_hash);
        assert!(payload.hash_consistent());
        assert_eq!(payload.gas_limit, 60_000_000);
    }

    #[test]
    fn empty_patch_is_identity_on_fields() {
        let mut payload = sample();
        let before = payload.clone();
        let patch = PayloadFields::default();
        assert!(patch.is_empty());
        patch.apply(&mut payload);
        assert_eq!(payload, before);
    }

    #[test]
    fn fork_field_removal_changes_hash() {
        let mut payload = sample();
        payload.withdrawals = Some(vec![]);
        payload.recompute_block_hash();
        let with_withdrawals = payload.block_hash;

        PayloadFields { withdrawals: FieldOverride::Remove, ..Default::default() }
            .apply(&mut payload);
        assert_eq!(payload.withdrawals, None);
        assert_ne!(payload.block_hash, with_withdrawals);
    }
}

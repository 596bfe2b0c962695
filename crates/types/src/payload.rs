//! The Engine API execution payload and payload attributes.

use crate::BlobsBundle;
use alloy_consensus::{EMPTY_OMMER_ROOT_HASH, Header, proofs};
use alloy_eips::eip4895::Withdrawal;
use alloy_primitives::{Address, B64, B256, Bloom, Bytes, U256};
use serde::{Deserialize, Serialize};

/// One block's worth of execution data as carried by `engine_newPayload` and
/// returned by `engine_getPayload`.
///
/// The JSON shape matches `ExecutionPayloadV1..V3`: fork-gated fields are
/// omitted entirely when unset. The versioned hashes and parent beacon block
/// root travel with the payload in memory because `engine_newPayloadV3` takes
/// them as extra parameters, but they are never part of the payload object
/// itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutableData {
    /// Hash of the parent block.
    pub parent_hash: B256,
    /// Beneficiary of the block rewards.
    pub fee_recipient: Address,
    /// State root after executing this payload.
    pub state_root: B256,
    /// Receipts root of this payload.
    pub receipts_root: B256,
    /// Logs bloom of this payload.
    pub logs_bloom: Bloom,
    /// The prev-randao beacon value, becoming the header mix digest.
    pub prev_randao: B256,
    /// Block number.
    #[serde(with = "alloy_serde::quantity")]
    pub block_number: u64,
    /// Block gas limit.
    #[serde(with = "alloy_serde::quantity")]
    pub gas_limit: u64,
    /// Gas used by all transactions in the payload.
    #[serde(with = "alloy_serde::quantity")]
    pub gas_used: u64,
    /// Block timestamp.
    #[serde(with = "alloy_serde::quantity")]
    pub timestamp: u64,
    /// Extra data, at most 32 bytes for a PoS block.
    pub extra_data: Bytes,
    /// EIP-1559 base fee.
    pub base_fee_per_gas: U256,
    /// Hash of the block this payload encodes.
    pub block_hash: B256,
    /// Opaque EIP-2718 transaction encodings.
    pub transactions: Vec<Bytes>,
    /// Withdrawals, present from Shanghai on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub withdrawals: Option<Vec<Withdrawal>>,
    /// Blob gas used, present from Cancun on.
    #[serde(
        default,
        with = "alloy_serde::quantity::opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub blob_gas_used: Option<u64>,
    /// Excess blob gas, present from Cancun on.
    #[serde(
        default,
        with = "alloy_serde::quantity::opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub excess_blob_gas: Option<u64>,
    /// Blob versioned hashes accompanying a V3 `newPayload` call.
    #[serde(skip)]
    pub versioned_hashes: Option<Vec<B256>>,
    /// Parent beacon block root accompanying a V3 `newPayload` call.
    #[serde(skip)]
    pub parent_beacon_block_root: Option<B256>,
}

impl ExecutableData {
    /// Reconstructs the consensus header this payload encodes.
    ///
    /// The transactions root is the ordered trie over the raw transaction
    /// bytes; the ommers hash, difficulty and nonce carry the fixed PoS
    /// values; withdrawals root, blob gas fields and the parent beacon root
    /// enter the header exactly when set on the payload.
    pub fn header(&self) -> Header {
        Header {
            parent_hash: self.parent_hash,
            ommers_hash: EMPTY_OMMER_ROOT_HASH,
            beneficiary: self.fee_recipient,
            state_root: self.state_root,
            transactions_root: proofs::ordered_trie_root_with_encoder(
                &self.transactions,
                |tx, buf| buf.extend_from_slice(tx.as_ref()),
            ),
            receipts_root: self.receipts_root,
            logs_bloom: self.logs_bloom,
            difficulty: U256::ZERO,
            number: self.block_number,
            gas_limit: self.gas_limit,
            gas_used: self.gas_used,
            timestamp: self.timestamp,
            extra_data: self.extra_data.clone(),
            mix_hash: self.prev_randao,
            nonce: B64::ZERO,
            base_fee_per_gas: Some(self.base_fee_per_gas.saturating_to::<u64>()),
            withdrawals_root: self.withdrawals.as_deref().map(proofs::calculate_withdrawals_root),
            blob_gas_used: self.blob_gas_used,
            excess_blob_gas: self.excess_blob_gas,
            parent_beacon_block_root: self.parent_beacon_block_root,
            requests_hash: None,
        }
    }

    /// The keccak hash of the reconstructed header.
    pub fn compute_block_hash(&self) -> B256 {
        self.header().hash_slow()
    }

    /// Rewrites `block_hash` from the header reconstruction, returning the
    /// new hash. Called after any field mutation so a client cannot reject a
    /// customized payload on the hash alone.
    pub fn recompute_block_hash(&mut self) -> B256 {
        self.block_hash = self.compute_block_hash();
        self.block_hash
    }

    /// Whether the stored `block_hash` matches the header reconstruction.
    pub fn hash_consistent(&self) -> bool {
        self.block_hash == self.compute_block_hash()
    }
}

/// Payload attributes sent with `engine_forkchoiceUpdated` to start a build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadAttributes {
    /// Timestamp of the payload to build.
    #[serde(with = "alloy_serde::quantity")]
    pub timestamp: u64,
    /// Randao reveal to become the mix digest.
    pub prev_randao: B256,
    /// Fee recipient of the payload to build.
    pub suggested_fee_recipient: Address,
    /// Withdrawals to include, Shanghai on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub withdrawals: Option<Vec<Withdrawal>>,
    /// Parent beacon block root, Cancun on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_beacon_block_root: Option<B256>,
}

/// The `engine_getPayloadV2`/`V3` response envelope.
///
/// `engine_getPayloadV1` returns the bare payload; the client shims it into
/// this shape with a zero block value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetPayloadResponse {
    /// The built payload.
    pub execution_payload: ExecutableData,
    /// Fees of the block, in wei.
    #[serde(default)]
    pub block_value: U256,
    /// Blob bundle of the payload, Cancun on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blobs_bundle: Option<BlobsBundle>,
    /// Builder-override hint, Cancun on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub should_override_builder: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{address, b256, bytes};

    fn sample() -> ExecutableData {
        let mut payload = ExecutableData {
            parent_hash: b256!("1111111111111111111111111111111111111111111111111111111111111111"),
            fee_recipient: address!("2222222222222222222222222222222222222222"),
            state_root: b256!("3333333333333333333333333333333333333333333333333333333333333333"),
            receipts_root: b256!(
                "4444444444444444444444444444444444444444444444444444444444444444"
            ),
            prev_randao: b256!("5555555555555555555555555555555555555555555555555555555555555555"),
            block_number: 7,
            gas_limit: 30_000_000,
            gas_used: 21_000,
            timestamp: 0x1234,
            extra_data: bytes!("deadbeef"),
            base_fee_per_gas: U256::from(7u64),
            transactions: vec![bytes!("02f870")],
            ..Default::default()
        };
        payload.recompute_block_hash();
        payload
    }

    #[test]
    fn header_carries_pos_markers() {
        let header = sample().header();
        assert_eq!(header.ommers_hash, EMPTY_OMMER_ROOT_HASH);
        assert_eq!(header.difficulty, U256::ZERO);
        assert_eq!(header.nonce, B64::ZERO);
        assert_eq!(header.mix_hash, sample().prev_randao);
    }

    #[test]
    fn hash_closure_after_mutation() {
        let mut payload = sample();
        assert!(payload.hash_consistent());
        payload.gas_limit *= 2;
        assert!(!payload.hash_consistent());
        payload.recompute_block_hash();
        assert!(payload.hash_consistent());
    }

    #[test]
    fn fork_gated_fields_toggle_header_presence() {
        let mut payload = sample();
        assert!(payload.header().withdrawals_root.is_none());
        assert!(payload.header().parent_beacon_block_root.is_none());

        payload.withdrawals = Some(vec![]);
        payload.blob_gas_used = Some(0);
        payload.excess_blob_gas = Some(0);
        payload.parent_beacon_block_root = Some(B256::ZERO);
        let header = payload.header();
        assert!(header.withdrawals_root.is_some());
        assert_eq!(header.blob_gas_used, Some(0));
        assert_eq!(header.parent_beacon_block_root, Some(B256::ZERO));
    }

    #[test]
    fn serde_omits_unset_fork_fields() {
        let json = serde_json::to_value(sample()).expect("serializes");
        let object = json.as_object().expect("object");
        assert!(object.contains_key("blockNumber"));
        assert!(object.contains_key("baseFeePerGas"));
        assert!(!object.contains_key("withdrawals"));
        assert!(!object.contains_key("blobGasUsed"));
        assert!(!object.contains_key("parentBeaconBlockRoot"));

        let back: ExecutableData = serde_json::from_value(json).expect("deserializes");
        assert_eq!(back, sample());
    }
}

//! Blob transaction construction.
//!
//! Tests submit EIP-4844 transactions whose blobs are deterministic
//! [`BlobId`] payloads, then recognize them again in payload bundles and
//! devp2p pooled-transaction responses. Both the payload encoding (what a
//! block carries) and the pooled encoding (what the mempool gossips, with
//! the sidecar attached) are precomputed here.

use crate::{
    BlobError, BlobId,
    globals::{CHAIN_ID, GAS_PRICE, GAS_TIP_PRICE},
};
use alloy_consensus::{BlobTransactionSidecar, SignableTransaction, TxEip4844, TxEip4844WithSidecar};
use alloy_eips::eip2718::Encodable2718;
use alloy_primitives::{Address, B256, Bytes, U256};
use alloy_signer::SignerSync;
use alloy_signer_local::PrivateKeySigner;

/// Errors raised while building a blob transaction.
#[derive(Debug, thiserror::Error)]
pub enum TransactionError {
    /// Blob or KZG derivation failed.
    #[error(transparent)]
    Blob(#[from] BlobError),
    /// The signer rejected the transaction hash.
    #[error("signing failed: {0}")]
    Signer(#[from] alloy_signer::Error),
}

/// Parameters of one blob transaction to build.
#[derive(Debug, Clone)]
pub struct BlobTransactionSpec {
    /// Chain id to sign for.
    pub chain_id: u64,
    /// Sender nonce.
    pub nonce: u64,
    /// Recipient.
    pub to: Address,
    /// Gas limit.
    pub gas_limit: u64,
    /// Max fee per gas.
    pub gas_fee_cap: u128,
    /// Max priority fee per gas.
    pub gas_tip_cap: u128,
    /// Max fee per blob gas.
    pub max_fee_per_blob_gas: u128,
    /// First blob id; the transaction carries `first_blob_id..+blob_count`.
    pub first_blob_id: BlobId,
    /// Number of blobs to attach.
    pub blob_count: u64,
    /// Value transferred.
    pub value: U256,
    /// Calldata.
    pub input: Bytes,
}

impl Default for BlobTransactionSpec {
    fn default() -> Self {
        Self {
            chain_id: CHAIN_ID,
            nonce: 0,
            to: Address::ZERO,
            gas_limit: 100_000,
            gas_fee_cap: GAS_PRICE,
            gas_tip_cap: GAS_TIP_PRICE,
            max_fee_per_blob_gas: 1,
            first_blob_id: BlobId(0),
            blob_count: 1,
            value: U256::ZERO,
            input: Bytes::new(),
        }
    }
}

/// A signed blob transaction with both wire encodings and the blob metadata
/// the verification steps need.
#[derive(Debug, Clone)]
pub struct BlobTransaction {
    /// Transaction hash.
    pub hash: B256,
    /// Sender address.
    pub sender: Address,
    /// Sender nonce.
    pub nonce: u64,
    /// Ids of the attached blobs, in sidecar order.
    pub blob_ids: Vec<BlobId>,
    /// Versioned hashes committed to by the transaction.
    pub versioned_hashes: Vec<B256>,
    /// `0x03 || rlp(tx)`, the block/payload form.
    pub payload_encoding: Bytes,
    /// The network form with `[blobs, commitments, proofs]` attached, as
    /// served in `PooledTransactions`.
    pub pooled_encoding: Bytes,
    /// The sidecar, for bundle comparison.
    pub sidecar: BlobTransactionSidecar,
    /// The unsigned transaction body.
    pub tx: TxEip4844,
}

impl BlobTransactionSpec {
    /// Generates the blobs, signs the transaction, and produces both
    /// encodings.
    pub fn sign(&self, signer: &PrivateKeySigner) -> Result<BlobTransaction, TransactionError> {
        let blob_ids = BlobId::range(self.first_blob_id, self.blob_count);
        let mut blobs = Vec::with_capacity(blob_ids.len());
        let mut commitments = Vec::with_capacity(blob_ids.len());
        let mut proofs = Vec::with_capacity(blob_ids.len());
        for id in &blob_ids {
            let (blob, commitment, proof) = id.generate()?;
            blobs.push(blob);
            commitments.push(commitment);
            proofs.push(proof);
        }
        let sidecar = BlobTransactionSidecar::new(blobs, commitments, proofs);
        let versioned_hashes: Vec<B256> = sidecar.versioned_hashes().collect();

        let tx = TxEip4844 {
            chain_id: self.chain_id,
            nonce: self.nonce,
            gas_limit: self.gas_limit,
            max_fee_per_gas: self.gas_fee_cap,
            max_priority_fee_per_gas: self.gas_tip_cap,
            to: self.to,
            value: self.value,
            access_list: Default::default(),
            blob_versioned_hashes: versioned_hashes.clone(),
            max_fee_per_blob_gas: self.max_fee_per_blob_gas,
            input: self.input.clone(),
        };

        let signature = signer.sign_hash_sync(&tx.signature_hash())?;
        let signed = tx.clone().into_signed(signature);
        let hash = *signed.hash();

        let mut payload_encoding = Vec::new();
        signed.encode_2718(&mut payload_encoding);

        let wrapped = TxEip4844WithSidecar::from_tx_and_sidecar(tx.clone(), sidecar.clone())
            .into_signed(signature);
        let mut pooled_encoding = Vec::new();
        wrapped.encode_2718(&mut pooled_encoding);

        Ok(BlobTransaction {
            hash,
            sender: signer.address(),
            nonce: self.nonce,
            blob_ids,
            versioned_hashes,
            payload_encoding: payload_encoding.into(),
            pooled_encoding: pooled_encoding.into(),
            sidecar,
            tx,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::globals::test_accounts;
    use alloy_consensus::TxEnvelope;
    use alloy_eips::eip2718::Decodable2718;
    use alloy_primitives::address;

    #[test]
    fn builds_both_encodings() {
        let spec = BlobTransactionSpec {
            nonce: 3,
            to: address!("0000000000000000000000000000000000000100"),
            first_blob_id: BlobId(1),
            blob_count: 2,
            ..Default::default()
        };
        let tx = spec.sign(test_accounts()[0].signer()).expect("signs");

        assert_eq!(tx.payload_encoding[0], 0x03);
        assert_eq!(tx.pooled_encoding[0], 0x03);
        assert!(tx.pooled_encoding.len() > tx.payload_encoding.len());
        assert_eq!(tx.blob_ids, vec![BlobId(1), BlobId(2)]);
        assert_eq!(tx.versioned_hashes.len(), 2);
        assert!(tx.versioned_hashes.iter().all(|hash| hash[0] == 0x01));

        let decoded = TxEnvelope::decode_2718(&mut tx.payload_encoding.as_ref())
            .expect("payload form decodes");
        assert_eq!(*decoded.tx_hash(), tx.hash);
    }

    #[test]
    fn same_spec_same_bytes() {
        let spec = BlobTransactionSpec { first_blob_id: BlobId(7), ..Default::default() };
        let signer = test_accounts()[1].signer();
        let a = spec.sign(signer).expect("signs");
        let b = spec.sign(signer).expect("signs");
        assert_eq!(a.hash, b.hash);
        assert_eq!(a.pooled_encoding, b.pooled_encoding);
    }
}

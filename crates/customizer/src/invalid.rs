//! Single-field payload invalidation.

use crate::{CustomizerError, PayloadFields};
use alloy_consensus::{
    SignableTransaction, Signed, TxEip4844Variant, TxEnvelope, transaction::TxEip4844,
};
use alloy_eips::eip2718::{Decodable2718, Encodable2718};
use alloy_primitives::{B256, Bytes, Signature, U256};
use alloy_signer::SignerSync;
use alloy_signer_local::PrivateKeySigner;
use baton_types::{ExecutableData, globals::GAS_TIP_PRICE};
use rand::RngCore;

/// The one field an invalidation breaks.
///
/// Header fields are mutated directly; transaction fields are applied to the
/// first transaction of the payload, which then becomes the only one. Either
/// way the block hash is re-closed afterwards, so the named field is the sole
/// defect a correct client can find.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidPayloadField {
    /// Last byte of the parent hash flipped.
    ParentHash,
    /// Last byte of the state root flipped.
    StateRoot,
    /// Last byte of the receipts root flipped.
    ReceiptsRoot,
    /// Block number decremented.
    Number,
    /// Gas limit doubled.
    GasLimit,
    /// Gas used decremented.
    GasUsed,
    /// Timestamp decremented.
    Timestamp,
    /// Prev-randao replaced with a random value. Only detectable when a
    /// transaction in the payload reads the PREVRANDAO opcode.
    PrevRandao,
    /// Amount of the last withdrawal incremented.
    Withdrawals,
    /// Blob gas used incremented, breaking the per-blob multiple.
    BlobGasUsed,
    /// Excess blob gas incremented, breaking the parent recursion.
    ExcessBlobGas,
    /// Last byte of the parent beacon block root flipped.
    ParentBeaconBlockRoot,
    /// All transactions dropped, roots left untouched.
    RemoveTransaction,
    /// Signature `r` decremented without re-signing.
    TransactionSignature,
    /// Transaction nonce decremented.
    TransactionNonce,
    /// Transaction gas limit zeroed.
    TransactionGas,
    /// Transaction fee cap zeroed.
    TransactionGasPrice,
    /// Transaction tip doubled past the fee cap.
    TransactionGasTipPrice,
    /// Transaction value bumped past the sender's balance.
    TransactionValue,
    /// Transaction chain id incremented.
    TransactionChainId,
}

impl InvalidPayloadField {
    /// Short name used in test descriptions and logs.
    pub const fn name(self) -> &'static str {
        match self {
            Self::ParentHash => "ParentHash",
            Self::StateRoot => "StateRoot",
            Self::ReceiptsRoot => "ReceiptsRoot",
            Self::Number => "Number",
            Self::GasLimit => "GasLimit",
            Self::GasUsed => "GasUsed",
            Self::Timestamp => "Timestamp",
            Self::PrevRandao => "PrevRandao",
            Self::Withdrawals => "Withdrawals",
            Self::BlobGasUsed => "BlobGasUsed",
            Self::ExcessBlobGas => "ExcessBlobGas",
            Self::ParentBeaconBlockRoot => "ParentBeaconBlockRoot",
            Self::RemoveTransaction => "Incomplete Transactions",
            Self::TransactionSignature => "Transaction Signature",
            Self::TransactionNonce => "Transaction Nonce",
            Self::TransactionGas => "Transaction Gas",
            Self::TransactionGasPrice => "Transaction GasPrice",
            Self::TransactionGasTipPrice => "Transaction GasTipPrice",
            Self::TransactionValue => "Transaction Value",
            Self::TransactionChainId => "Transaction ChainID",
        }
    }

    /// Whether the defect is only observable while executing the payload, as
    /// opposed to a structural header check.
    pub const fn is_execution_level(self) -> bool {
        !matches!(self, Self::ParentHash | Self::Number | Self::GasLimit | Self::Timestamp)
    }

    /// Applies the invalidation to `payload` and re-closes the block hash.
    ///
    /// `signer` re-signs doctored transactions so the sender stays a funded
    /// account; `rng` feeds the prev-randao replacement.
    pub fn apply(
        self,
        payload: &mut ExecutableData,
        signer: &PrivateKeySigner,
        rng: &mut dyn RngCore,
    ) -> Result<B256, CustomizerError> {
        let patch = match self {
            Self::ParentHash => PayloadFields {
                parent_hash: Some(flip_last_byte(payload.parent_hash)),
                ..Default::default()
            },
            Self::StateRoot => PayloadFields {
                state_root: Some(flip_last_byte(payload.state_root)),
                ..Default::default()
            },
            Self::ReceiptsRoot => PayloadFields {
                receipts_root: Some(flip_last_byte(payload.receipts_root)),
                ..Default::default()
            },
            Self::Number => PayloadFields {
                block_number: Some(payload.block_number.wrapping_sub(1)),
                ..Default::default()
            },
            Self::GasLimit => {
                PayloadFields { gas_limit: Some(payload.gas_limit * 2), ..Default::default() }
            }
            Self::GasUsed => PayloadFields {
                gas_used: Some(payload.gas_used.wrapping_sub(1)),
                ..Default::default()
            },
            Self::Timestamp => PayloadFields {
                timestamp: Some(payload.timestamp.wrapping_sub(1)),
                ..Default::default()
            },
            Self::PrevRandao => {
                let mut randao = [0u8; 32];
                rng.fill_bytes(&mut randao);
                PayloadFields { prev_randao: Some(B256::from(randao)), ..Default::default() }
            }
            Self::Withdrawals => {
                let mut withdrawals =
                    payload.withdrawals.clone().ok_or(CustomizerError::NoWithdrawals)?;
                let last = withdrawals.last_mut().ok_or(CustomizerError::NoWithdrawals)?;
                last.amount += 1;
                PayloadFields {
                    withdrawals: crate::FieldOverride::Set(withdrawals),
                    ..Default::default()
                }
            }
            Self::BlobGasUsed => PayloadFields {
                blob_gas_used: crate::FieldOverride::Set(
                    payload.blob_gas_used.unwrap_or_default() + 1,
                ),
                ..Default::default()
            },
            Self::ExcessBlobGas => PayloadFields {
                excess_blob_gas: crate::FieldOverride::Set(
                    payload.excess_blob_gas.unwrap_or_default() + 1,
                ),
                ..Default::default()
            },
            Self::ParentBeaconBlockRoot => {
                let root =
                    payload.parent_beacon_block_root.ok_or(CustomizerError::NoBeaconRoot)?;
                PayloadFields {
                    parent_beacon_block_root: crate::FieldOverride::Set(flip_last_byte(root)),
                    ..Default::default()
                }
            }
            Self::RemoveTransaction => {
                PayloadFields { transactions: Some(Vec::new()), ..Default::default() }
            }
            Self::TransactionSignature
            | Self::TransactionNonce
            | Self::TransactionGas
            | Self::TransactionGasPrice
            | Self::TransactionGasTipPrice
            | Self::TransactionValue
            | Self::TransactionChainId => {
                let base = payload.transactions.first().ok_or(CustomizerError::NoTransactions)?;
                let doctored = self.doctor_transaction(base, signer)?;
                PayloadFields { transactions: Some(vec![doctored]), ..Default::default() }
            }
        };
        Ok(patch.apply(payload))
    }

    fn doctor_transaction(
        self,
        raw: &Bytes,
        signer: &PrivateKeySigner,
    ) -> Result<Bytes, CustomizerError> {
        let envelope = TxEnvelope::decode_2718(&mut raw.as_ref())?;
        match envelope {
            TxEnvelope::Legacy(signed) => {
                let (mut tx, signature, _) = signed.into_parts();
                match self {
                    Self::TransactionSignature => {
                        return Ok(reseal(tx, corrupt_signature(signature)));
                    }
                    Self::TransactionNonce => tx.nonce = tx.nonce.wrapping_sub(1),
                    Self::TransactionGas => tx.gas_limit = 0,
                    Self::TransactionGasPrice => tx.gas_price = 0,
                    Self::TransactionValue => tx.value = overflowing_value(),
                    Self::TransactionChainId => {
                        tx.chain_id = Some(tx.chain_id.unwrap_or_default() + 1);
                    }
                    Self::TransactionGasTipPrice => {
                        return Err(CustomizerError::UnsupportedMutation {
                            mutation: self.name(),
                            tx_type: 0,
                        });
                    }
                    _ => {}
                }
                Ok(resign(tx, signer)?)
            }
            TxEnvelope::Eip1559(signed) => {
                let (mut tx, signature, _) = signed.into_parts();
                match self {
                    Self::TransactionSignature => {
                        return Ok(reseal(tx, corrupt_signature(signature)));
                    }
                    Self::TransactionNonce => tx.nonce = tx.nonce.wrapping_sub(1),
                    Self::TransactionGas => tx.gas_limit = 0,
                    Self::TransactionGasPrice => tx.max_fee_per_gas = 0,
                    Self::TransactionGasTipPrice => {
                        tx.max_priority_fee_per_gas = GAS_TIP_PRICE * 2;
                    }
                    Self::TransactionValue => tx.value = overflowing_value(),
                    Self::TransactionChainId => tx.chain_id += 1,
                    _ => {}
                }
                Ok(resign(tx, signer)?)
            }
            TxEnvelope::Eip4844(signed) => {
                let (variant, signature, _) = signed.into_parts();
                let mut tx: TxEip4844 = match variant {
                    TxEip4844Variant::TxEip4844(tx) => tx,
                    TxEip4844Variant::TxEip4844WithSidecar(with_sidecar) => with_sidecar.tx,
                };
                match self {
                    Self::TransactionSignature => {
                        return Ok(reseal(tx, corrupt_signature(signature)));
                    }
                    Self::TransactionNonce => tx.nonce = tx.nonce.wrapping_sub(1),
                    Self::TransactionGas => tx.gas_limit = 0,
                    Self::TransactionGasPrice => tx.max_fee_per_gas = 0,
                    Self::TransactionGasTipPrice => {
                        tx.max_priority_fee_per_gas = GAS_TIP_PRICE * 2;
                    }
                    Self::TransactionValue => tx.value = overflowing_value(),
                    Self::TransactionChainId => tx.chain_id += 1,
                    _ => {}
                }
                Ok(resign(tx, signer)?)
            }
            other => Err(CustomizerError::UnsupportedMutation {
                mutation: self.name(),
                tx_type: other.tx_type() as u8,
            }),
        }
    }
}

impl std::fmt::Display for InvalidPayloadField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

fn flip_last_byte(mut hash: B256) -> B256 {
    hash[31] = 255 - hash[31];
    hash
}

/// Larger than the funding of any pre-allocated test account.
fn overflowing_value() -> U256 {
    U256::from_str_radix("123450000000000000001", 16).unwrap_or(U256::MAX)
}

fn corrupt_signature(signature: Signature) -> Signature {
    Signature::new(signature.r().wrapping_sub(U256::from(1u64)), signature.s(), signature.v())
}

fn reseal<T>(tx: T, signature: Signature) -> Bytes
where
    T: SignableTransaction<Signature>,
    Signed<T>: Encodable2718,
{
    Bytes::from(tx.into_signed(signature).encoded_2718())
}

fn resign<T>(tx: T, signer: &PrivateKeySigner) -> Result<Bytes, CustomizerError>
where
    T: SignableTransaction<Signature>,
    Signed<T>: Encodable2718,
{
    let signature = signer.sign_hash_sync(&tx.signature_hash())?;
    Ok(reseal(tx, signature))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_consensus::{Transaction, TxEip1559, transaction::SignerRecoverable};
    use alloy_primitives::{Address, TxKind};
    use baton_types::globals::{CHAIN_ID, GAS_PRICE, test_accounts};
    use rand::{RngCore, SeedableRng, rngs::StdRng};

    fn signer() -> PrivateKeySigner {
        test_accounts()[0].signer().clone()
    }

    fn payload_with_transfer() -> ExecutableData {
        let tx = TxEip1559 {
            chain_id: CHAIN_ID,
            nonce: 3,
            gas_limit: 21_000,
            max_fee_per_gas: GAS_PRICE,
            max_priority_fee_per_gas: 1_000_000_000,
            to: TxKind::Call(Address::repeat_byte(0xbb)),
            value: U256::from(100u64),
            ..Default::default()
        };
        let signature =
            signer().sign_hash_sync(&tx.signature_hash()).unwrap();
        let raw = Bytes::from(tx.into_signed(signature).encoded_2718());
        let mut payload = ExecutableData {
            parent_hash: B256::repeat_byte(1),
            block_number: 10,
            gas_limit: 30_000_000,
            gas_used: 21_000,
            timestamp: 1000,
            base_fee_per_gas: U256::from(7u64),
            transactions: vec![raw],
            ..Default::default()
        };
        payload.recompute_block_hash();
        payload
    }

    fn decode_first(payload: &ExecutableData) -> TxEnvelope {
        TxEnvelope::decode_2718(&mut payload.transactions[0].as_ref()).unwrap()
    }

    #[test]
    fn header_invalidations_keep_hash_closed() {
        let mut rng = StdRng::seed_from_u64(1);
        for field in [
            InvalidPayloadField::ParentHash,
            InvalidPayloadField::StateRoot,
            InvalidPayloadField::Number,
            InvalidPayloadField::GasLimit,
            InvalidPayloadField::GasUsed,
            InvalidPayloadField::Timestamp,
            InvalidPayloadField::PrevRandao,
        ] {
            let mut payload = payload_with_transfer();
            let original = payload.block_hash;
            let new_hash = field.apply(&mut payload, &signer(), &mut rng).unwrap();
            assert_ne!(new_hash, original, "{field} must change the hash");
            assert!(payload.hash_consistent(), "{field} must re-close the hash");
        }
    }

    #[test]
    fn number_decrements_and_gas_limit_doubles() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut payload = payload_with_transfer();
        InvalidPayloadField::Number.apply(&mut payload, &signer(), &mut rng).unwrap();
        assert_eq!(payload.block_number, 9);

        let mut payload = payload_with_transfer();
        InvalidPayloadField::GasLimit.apply(&mut payload, &signer(), &mut rng).unwrap();
        assert_eq!(payload.gas_limit, 60_000_000);
    }

    #[test]
    fn remove_transaction_empties_list_only() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut payload = payload_with_transfer();
        let state_root = payload.state_root;
        InvalidPayloadField::RemoveTransaction
            .apply(&mut payload, &signer(), &mut rng)
            .unwrap();
        assert!(payload.transactions.is_empty());
        assert_eq!(payload.state_root, state_root);
        assert!(payload.hash_consistent());
    }

    #[test]
    fn doctored_nonce_is_resigned_by_same_sender() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut payload = payload_with_transfer();
        InvalidPayloadField::TransactionNonce
            .apply(&mut payload, &signer(), &mut rng)
            .unwrap();
        let envelope = decode_first(&payload);
        assert_eq!(envelope.nonce(), 2);
        let recovered = match &envelope {
            TxEnvelope::Eip1559(signed) => signed.recover_signer().unwrap(),
            _ => panic!("expected EIP-1559"),
        };
        assert_eq!(recovered, signer().address());
        assert!(payload.hash_consistent());
    }

    #[test]
    fn corrupted_signature_recovers_wrong_sender() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut payload = payload_with_transfer();
        InvalidPayloadField::TransactionSignature
            .apply(&mut payload, &signer(), &mut rng)
            .unwrap();
        let envelope = decode_first(&payload);
        // Same unsigned fields, but recovery must not yield the real sender.
        assert_eq!(envelope.nonce(), 3);
        if let TxEnvelope::Eip1559(signed) = &envelope {
            match signed.recover_signer() {
                Ok(address) => assert_ne!(address, signer().address()),
                Err(_) => {}
            }
        } else {
            panic!("expected EIP-1559");
        }
    }

    #[test]
    fn tip_mutation_exceeds_fee_cap() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut payload = payload_with_transfer();
        InvalidPayloadField::TransactionGasTipPrice
            .apply(&mut payload, &signer(), &mut rng)
            .unwrap();
        let envelope = decode_first(&payload);
        assert!(envelope.max_priority_fee_per_gas().unwrap() > envelope.max_fee_per_gas());
    }

    #[test]
    fn fork_gated_invalidations_need_the_field_present() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut payload = payload_with_transfer();
        assert!(matches!(
            InvalidPayloadField::Withdrawals.apply(&mut payload, &signer(), &mut rng),
            Err(CustomizerError::NoWithdrawals)
        ));
        assert!(matches!(
            InvalidPayloadField::ParentBeaconBlockRoot.apply(&mut payload, &signer(), &mut rng),
            Err(CustomizerError::NoBeaconRoot)
        ));

        payload.parent_beacon_block_root = Some(B256::repeat_byte(0x0f));
        payload.recompute_block_hash();
        InvalidPayloadField::ParentBeaconBlockRoot
            .apply(&mut payload, &signer(), &mut rng)
            .unwrap();
        assert_eq!(payload.parent_beacon_block_root.unwrap()[31], 255 - 0x0f);
        assert!(payload.hash_consistent());
    }

    #[test]
    fn execution_level_classification() {
        assert!(!InvalidPayloadField::ParentHash.is_execution_level());
        assert!(!InvalidPayloadField::GasLimit.is_execution_level());
        assert!(InvalidPayloadField::StateRoot.is_execution_level());
        assert!(InvalidPayloadField::TransactionNonce.is_execution_level());
    }
}

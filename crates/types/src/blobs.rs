//! Deterministic blob construction and KZG derivation.
//!
//! A [`BlobId`] is a seed from which a blob, its KZG commitment, proof and
//! versioned hash all follow deterministically, so a test can submit a blob
//! transaction and later recognize its blobs inside a returned bundle without
//! carrying the 128 KiB payloads around.

use crate::globals::{BLS_MODULUS, BYTES_PER_BLOB, FIELD_ELEMENTS_PER_BLOB};
use alloy_eips::eip4844::env_settings::EnvKzgSettings;
use alloy_primitives::{B256, U256};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub use alloy_eips::eip4844::{Blob, Bytes48};

/// Errors raised while deriving blob cryptography.
#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    /// The KZG library rejected an input.
    #[error("kzg operation failed: {0}")]
    Kzg(#[from] c_kzg::Error),
    /// A bundle's parallel sequences disagree in length.
    #[error("bundle length mismatch: {commitments} commitments, {proofs} proofs, {blobs} blobs")]
    LengthMismatch {
        /// Number of commitments in the bundle.
        commitments: usize,
        /// Number of proofs in the bundle.
        proofs: usize,
        /// Number of blobs in the bundle.
        blobs: usize,
    },
}

/// Deterministic blob seed.
///
/// Blob `0` is the all-zero blob. For any other id the blob is the chain of
/// field elements starting at `sha256(be64(id)) mod BLS_MODULUS`, each
/// subsequent element doubling the previous one modulo the BLS modulus, so
/// every 32-byte chunk stays a canonical field element.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct BlobId(pub u64);

impl BlobId {
    /// The ids `start..start + count`.
    pub fn range(start: Self, count: u64) -> Vec<Self> {
        (start.0..start.0 + count).map(Self).collect()
    }

    /// Writes this id's deterministic contents into `blob`.
    pub fn fill(&self, blob: &mut Blob) {
        if self.0 == 0 {
            return;
        }
        let seed: [u8; 32] = Sha256::digest(self.0.to_be_bytes()).into();
        let mut current = U256::from_be_bytes(seed).reduce_mod(*BLS_MODULUS);
        for chunk in 0..FIELD_ELEMENTS_PER_BLOB {
            blob[chunk * 32..(chunk + 1) * 32].copy_from_slice(&current.to_be_bytes::<32>());
            current = current.add_mod(current, *BLS_MODULUS);
        }
    }

    /// Whether `blob` holds exactly this id's deterministic contents.
    pub fn verify(&self, blob: &Blob) -> bool {
        if self.0 == 0 {
            return blob.iter().all(|byte| *byte == 0);
        }
        let seed: [u8; 32] = Sha256::digest(self.0.to_be_bytes()).into();
        let mut current = U256::from_be_bytes(seed).reduce_mod(*BLS_MODULUS);
        for chunk in 0..FIELD_ELEMENTS_PER_BLOB {
            let element = U256::from_be_slice(&blob[chunk * 32..(chunk + 1) * 32]);
            if element != current {
                return false;
            }
            current = current.add_mod(current, *BLS_MODULUS);
        }
        true
    }

    /// Derives the blob, KZG commitment and proof for this id.
    pub fn generate(&self) -> Result<(Blob, Bytes48, Bytes48), BlobError> {
        let mut blob = Blob::new([0u8; BYTES_PER_BLOB]);
        self.fill(&mut blob);

        let settings = EnvKzgSettings::Default.get();
        let kzg_blob = c_kzg::Blob::from_bytes(blob.as_slice())?;
        let commitment = settings.blob_to_kzg_commitment(&kzg_blob)?;
        let proof = settings.compute_blob_kzg_proof(&kzg_blob, &commitment.to_bytes())?;

        Ok((
            blob,
            Bytes48::from(commitment.to_bytes().into_inner()),
            Bytes48::from(proof.to_bytes().into_inner()),
        ))
    }

    /// Versioned hash of this id's commitment, with the canonical `0x01`
    /// version byte.
    pub fn versioned_hash(&self) -> Result<B256, BlobError> {
        let (_, commitment, _) = self.generate()?;
        Ok(commitment_versioned_hash(&commitment, 1))
    }
}

impl std::fmt::Display for BlobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "blob-{}", self.0)
    }
}

impl From<u64> for BlobId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// `version || sha256(commitment)[1..]`.
pub fn commitment_versioned_hash(commitment: &Bytes48, version: u8) -> B256 {
    let mut digest: [u8; 32] = Sha256::digest(commitment.as_slice()).into();
    digest[0] = version;
    B256::from(digest)
}

/// The blobs bundle returned by `engine_getPayloadV3`: three parallel
/// sequences of equal length.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlobsBundle {
    /// KZG commitments, one per blob.
    pub commitments: Vec<Bytes48>,
    /// KZG proofs, one per blob.
    pub proofs: Vec<Bytes48>,
    /// The blobs themselves.
    pub blobs: Vec<Blob>,
}

impl BlobsBundle {
    /// Number of blobs, after checking the parallel sequences agree.
    pub fn len(&self) -> Result<usize, BlobError> {
        if self.commitments.len() != self.proofs.len()
            || self.commitments.len() != self.blobs.len()
        {
            return Err(BlobError::LengthMismatch {
                commitments: self.commitments.len(),
                proofs: self.proofs.len(),
                blobs: self.blobs.len(),
            });
        }
        Ok(self.blobs.len())
    }

    /// Whether the bundle holds no blobs.
    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty() && self.commitments.is_empty() && self.proofs.is_empty()
    }

    /// Versioned hashes of every commitment, in bundle order.
    pub fn versioned_hashes(&self, version: u8) -> Vec<B256> {
        self.commitments
            .iter()
            .map(|commitment| commitment_versioned_hash(commitment, version))
            .collect()
    }

    /// Index of the blob carrying `id`'s deterministic contents, if present.
    pub fn position_of(&self, id: BlobId) -> Option<usize> {
        self.blobs.iter().position(|blob| id.verify(blob))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_zero_is_all_zero() {
        let mut blob = Blob::new([0u8; BYTES_PER_BLOB]);
        BlobId(0).fill(&mut blob);
        assert!(blob.iter().all(|byte| *byte == 0));
        assert!(BlobId(0).verify(&blob));
        assert!(!BlobId(1).verify(&blob));
    }

    #[test]
    fn fill_is_deterministic_and_field_bounded() {
        let mut first = Blob::new([0u8; BYTES_PER_BLOB]);
        let mut second = Blob::new([0u8; BYTES_PER_BLOB]);
        BlobId(0x1234).fill(&mut first);
        BlobId(0x1234).fill(&mut second);
        assert_eq!(first, second);
        assert!(BlobId(0x1234).verify(&first));

        for chunk in 0..FIELD_ELEMENTS_PER_BLOB {
            let element = U256::from_be_slice(&first[chunk * 32..(chunk + 1) * 32]);
            assert!(element < *BLS_MODULUS, "chunk {chunk} out of field");
        }
    }

    #[test]
    fn distinct_ids_produce_distinct_blobs() {
        let mut a = Blob::new([0u8; BYTES_PER_BLOB]);
        let mut b = Blob::new([0u8; BYTES_PER_BLOB]);
        BlobId(1).fill(&mut a);
        BlobId(2).fill(&mut b);
        assert_ne!(a, b);
        assert!(!BlobId(2).verify(&a));
    }

    #[test]
    fn versioned_hash_carries_version_byte() {
        let commitment = Bytes48::from([0xabu8; 48]);
        let hash = commitment_versioned_hash(&commitment, 1);
        assert_eq!(hash[0], 0x01);
        let raised = commitment_versioned_hash(&commitment, 2);
        assert_eq!(raised[0], 0x02);
        assert_eq!(hash[1..], raised[1..]);
    }

    #[test]
    fn generate_produces_verifiable_kzg() {
        let (blob, commitment, proof) = BlobId(1).generate().expect("kzg derivation");
        assert!(BlobId(1).verify(&blob));

        let settings = EnvKzgSettings::Default.get();
        let kzg_blob = c_kzg::Blob::from_bytes(blob.as_slice()).expect("blob bytes");
        let valid = settings
            .verify_blob_kzg_proof(
                &kzg_blob,
                &c_kzg::Bytes48::from_bytes(commitment.as_slice()).expect("commitment"),
                &c_kzg::Bytes48::from_bytes(proof.as_slice()).expect("proof"),
            )
            .expect("verification runs");
        assert!(valid);
    }

    #[test]
    fn bundle_length_mismatch_detected() {
        let bundle = BlobsBundle {
            commitments: vec![Bytes48::ZERO],
            proofs: vec![],
            blobs: vec![],
        };
        assert!(matches!(bundle.len(), Err(BlobError::LengthMismatch { .. })));
    }

    #[test]
    fn range_is_contiguous() {
        let ids = BlobId::range(BlobId(5), 3);
        assert_eq!(ids, vec![BlobId(5), BlobId(6), BlobId(7)]);
    }
}

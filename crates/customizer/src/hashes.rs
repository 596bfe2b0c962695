//! Blob versioned-hash corruption.

use crate::CustomizerError;
use alloy_primitives::B256;
use baton_types::{BlobId, commitment_versioned_hash};
use rand::RngCore;

/// One way to corrupt the versioned-hash list of a V3 `newPayload` call.
///
/// The hashes travel as a call parameter rather than a payload field, so the
/// block hash stays valid while the hash list disagrees with the blob
/// transactions inside the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionedHashesCustomizer {
    /// Bump the version byte of every hash.
    IncreaseVersion,
    /// Flip the last byte of the last hash.
    CorruptHash,
    /// Drop the last hash.
    RemoveHash,
    /// Append a hash for a blob that is not in the payload.
    ExtraHash,
    /// Replace the list with hashes computed from the given blob ids.
    Blobs {
        /// The ids whose deterministic hashes form the new list.
        ids: Vec<BlobId>,
        /// Version byte used for the computed hashes.
        version: u8,
    },
}

impl VersionedHashesCustomizer {
    /// Applies the corruption to `hashes` in place.
    ///
    /// `rng` feeds the extra-hash variant so distinct tests inject distinct
    /// ghosts.
    pub fn apply(
        &self,
        hashes: &mut Option<Vec<B256>>,
        rng: &mut dyn RngCore,
    ) -> Result<(), CustomizerError> {
        let list = hashes.as_mut().ok_or(CustomizerError::NoVersionedHashes)?;
        match self {
            Self::IncreaseVersion => {
                for hash in list.iter_mut() {
                    hash[0] = hash[0].wrapping_add(1);
                }
            }
            Self::CorruptHash => {
                let last = list.last_mut().ok_or(CustomizerError::NoVersionedHashes)?;
                last[31] = 255 - last[31];
            }
            Self::RemoveHash => {
                list.pop().ok_or(CustomizerError::NoVersionedHashes)?;
            }
            Self::ExtraHash => {
                let mut ghost = [0u8; 32];
                rng.fill_bytes(&mut ghost);
                ghost[0] = 1;
                list.push(B256::from(ghost));
            }
            Self::Blobs { ids, version } => {
                *list = ids
                    .iter()
                    .map(|id| {
                        let (_, commitment, _) =
                            id.generate().map_err(|_| CustomizerError::NoVersionedHashes)?;
                        Ok(commitment_versioned_hash(&commitment, *version))
                    })
                    .collect::<Result<Vec<_>, CustomizerError>>()?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{SeedableRng, rngs::StdRng};

    fn two_hashes() -> Option<Vec<B256>> {
        Some(vec![B256::repeat_byte(1), B256::repeat_byte(2)])
    }

    #[test]
    fn increase_version_touches_every_first_byte() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut hashes = two_hashes();
        VersionedHashesCustomizer::IncreaseVersion.apply(&mut hashes, &mut rng).unwrap();
        let list = hashes.unwrap();
        assert_eq!(list[0][0], 2);
        assert_eq!(list[1][0], 3);
        assert_eq!(list[0][1], 1);
    }

    #[test]
    fn corrupt_and_remove_target_the_last_hash() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut hashes = two_hashes();
        VersionedHashesCustomizer::CorruptHash.apply(&mut hashes, &mut rng).unwrap();
        assert_eq!(hashes.as_ref().unwrap()[1][31], 255 - 2);

        VersionedHashesCustomizer::RemoveHash.apply(&mut hashes, &mut rng).unwrap();
        assert_eq!(hashes.unwrap().len(), 1);
    }

    #[test]
    fn extra_hash_carries_version_one() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut hashes = two_hashes();
        VersionedHashesCustomizer::ExtraHash.apply(&mut hashes, &mut rng).unwrap();
        let list = hashes.unwrap();
        assert_eq!(list.len(), 3);
        assert_eq!(list[2][0], 1);
    }

    #[test]
    fn missing_list_is_an_error() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut hashes = None;
        let result = VersionedHashesCustomizer::CorruptHash.apply(&mut hashes, &mut rng);
        assert!(matches!(result, Err(CustomizerError::NoVersionedHashes)));
    }
}

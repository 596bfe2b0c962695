//! Call-level customizers: what to send, which version to use, and what to
//! expect back.

use crate::{
    AttributesCustomizer, CustomizerError, InvalidPayloadField, PayloadFields,
    VersionedHashesCustomizer,
};
use alloy_signer_local::PrivateKeySigner;
use baton_types::{EngineVersion, ExecutableData, PayloadStatusKind};
use rand::RngCore;

/// A shift of the Engine API method version relative to the fork-correct one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum VersionShift {
    /// Use the version the fork schedule dictates.
    #[default]
    Keep,
    /// Use one version higher, saturating at the newest.
    Upgrade,
    /// Use one version lower, saturating at the oldest.
    Downgrade,
}

impl VersionShift {
    /// Applies the shift to the fork-correct `version`.
    pub const fn apply(self, version: EngineVersion) -> EngineVersion {
        match self {
            Self::Keep => version,
            Self::Upgrade => version.upgraded(),
            Self::Downgrade => version.downgraded(),
        }
    }
}

/// What the test expects the client to answer with.
///
/// An unset expectation means the call must succeed the ordinary way; a set
/// `error_code` means the call must fail with exactly that JSON-RPC error; a
/// set `status` means the call must return that payload status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Expectation {
    /// Exact JSON-RPC error code the call must fail with.
    pub error_code: Option<i64>,
    /// Payload status the call must return instead of `VALID`.
    pub status: Option<PayloadStatusKind>,
}

impl Expectation {
    /// An expectation of a specific JSON-RPC error.
    pub const fn error(code: i64) -> Self {
        Self { error_code: Some(code), status: None }
    }

    /// An expectation of a specific payload status.
    pub const fn status(status: PayloadStatusKind) -> Self {
        Self { error_code: None, status: Some(status) }
    }

    /// An expectation that the status is `INVALID`.
    pub const fn invalid() -> Self {
        Self::status(PayloadStatusKind::Invalid)
    }
}

/// Full customization of one `engine_newPayload` call.
#[derive(Debug, Clone, Default)]
pub struct PayloadCustomizer {
    /// Payload field patch, applied first.
    pub fields: Option<PayloadFields>,
    /// Single-field invalidation, applied after the patch.
    pub invalid: Option<InvalidPayloadField>,
    /// Versioned-hash corruption, applied last.
    pub versioned_hashes: Option<VersionedHashesCustomizer>,
    /// Method version shift.
    pub version: VersionShift,
    /// Expected response.
    pub expectation: Expectation,
}

impl PayloadCustomizer {
    /// A customizer that only breaks the named field and expects `INVALID`.
    pub fn invalidating(field: InvalidPayloadField) -> Self {
        Self { invalid: Some(field), expectation: Expectation::invalid(), ..Default::default() }
    }

    /// Produces the payload actually sent, from the canonical `base`.
    pub fn customize(
        &self,
        base: &ExecutableData,
        signer: &PrivateKeySigner,
        rng: &mut dyn RngCore,
    ) -> Result<ExecutableData, CustomizerError> {
        let mut payload = base.clone();
        if let Some(fields) = &self.fields {
            fields.apply(&mut payload);
        }
        if let Some(invalid) = self.invalid {
            invalid.apply(&mut payload, signer, rng)?;
        }
        if let Some(hashes) = &self.versioned_hashes {
            hashes.apply(&mut payload.versioned_hashes, rng)?;
        }
        Ok(payload)
    }
}

/// Full customization of one `engine_forkchoiceUpdated` call.
#[derive(Debug, Clone, Default)]
pub struct FcuCustomizer {
    /// Attributes patch, applied to the generated attributes.
    pub attributes: Option<AttributesCustomizer>,
    /// Method version shift.
    pub version: VersionShift,
    /// Expected response.
    pub expectation: Expectation,
}

/// Full customization of one `engine_getPayload` call.
#[derive(Debug, Clone, Copy, Default)]
pub struct GetPayloadCustomizer {
    /// Method version shift.
    pub version: VersionShift,
    /// Expected response.
    pub expectation: Expectation,
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{B256, U256};
    use baton_types::test_accounts;
    use rand::{SeedableRng, rngs::StdRng};

    #[test]
    fn version_shift_saturates() {
        assert_eq!(VersionShift::Keep.apply(EngineVersion::V2), EngineVersion::V2);
        assert_eq!(VersionShift::Upgrade.apply(EngineVersion::V3), EngineVersion::V3);
        assert_eq!(VersionShift::Downgrade.apply(EngineVersion::V1), EngineVersion::V1);
        assert_eq!(VersionShift::Downgrade.apply(EngineVersion::V3), EngineVersion::V2);
    }

    #[test]
    fn customize_leaves_the_base_untouched() {
        let mut base = ExecutableData {
            parent_hash: B256::repeat_byte(1),
            block_number: 5,
            gas_limit: 30_000_000,
            base_fee_per_gas: U256::from(7u64),
            ..Default::default()
        };
        base.recompute_block_hash();

        let customizer = PayloadCustomizer {
            fields: Some(PayloadFields { gas_limit: Some(1), ..Default::default() }),
            ..Default::default()
        };
        let mut rng = StdRng::seed_from_u64(1);
        let sent = customizer
            .customize(&base, test_accounts()[0].signer(), &mut rng)
            .unwrap();
        assert_eq!(sent.gas_limit, 1);
        assert_eq!(base.gas_limit, 30_000_000);
        assert_ne!(sent.block_hash, base.block_hash);
    }

    #[test]
    fn invalidating_constructor_expects_invalid() {
        let customizer = PayloadCustomizer::invalidating(InvalidPayloadField::StateRoot);
        assert_eq!(customizer.expectation.status, Some(PayloadStatusKind::Invalid));
        assert_eq!(customizer.expectation.error_code, None);
    }
}

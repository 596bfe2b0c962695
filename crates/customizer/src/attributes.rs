//! Payload attributes patching.

use crate::FieldOverride;
use alloy_eips::eip4895::Withdrawal;
use alloy_primitives::{Address, B256};
use baton_types::PayloadAttributes;

/// A patch over [`PayloadAttributes`], applied before the build request goes
/// out. Unset fields keep the generated value.
#[derive(Debug, Clone, Default)]
pub struct AttributesCustomizer {
    /// Replacement timestamp.
    pub timestamp: Option<u64>,
    /// Replacement prev-randao.
    pub prev_randao: Option<B256>,
    /// Replacement fee recipient.
    pub suggested_fee_recipient: Option<Address>,
    /// Withdrawals override.
    pub withdrawals: FieldOverride<Vec<Withdrawal>>,
    /// Parent beacon block root override.
    pub parent_beacon_block_root: FieldOverride<B256>,
}

impl AttributesCustomizer {
    /// Applies the patch to `attributes` in place.
    pub fn apply(&self, attributes: &mut PayloadAttributes) {
        if let Some(timestamp) = self.timestamp {
            attributes.timestamp = timestamp;
        }
        if let Some(prev_randao) = self.prev_randao {
            attributes.prev_randao = prev_randao;
        }
        if let Some(recipient) = self.suggested_fee_recipient {
            attributes.suggested_fee_recipient = recipient;
        }
        self.withdrawals.apply(&mut attributes.withdrawals);
        self.parent_beacon_block_root.apply(&mut attributes.parent_beacon_block_root);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_touches_only_named_fields() {
        let mut attributes = PayloadAttributes {
            timestamp: 100,
            prev_randao: B256::repeat_byte(1),
            suggested_fee_recipient: Address::repeat_byte(2),
            withdrawals: Some(vec![]),
            parent_beacon_block_root: Some(B256::repeat_byte(3)),
        };
        AttributesCustomizer {
            timestamp: Some(200),
            parent_beacon_block_root: FieldOverride::Remove,
            ..Default::default()
        }
        .apply(&mut attributes);

        assert_eq!(attributes.timestamp, 200);
        assert_eq!(attributes.prev_randao, B256::repeat_byte(1));
        assert_eq!(attributes.withdrawals, Some(vec![]));
        assert_eq!(attributes.parent_beacon_block_root, None);
    }
}

//! Blob gas accounting math (EIP-4844) and the beacon-roots contract layout
//! (EIP-4788), used to check what clients report rather than to build blocks.

use crate::globals::{
    BLOB_GASPRICE_UPDATE_FRACTION, HISTORY_BUFFER_LENGTH, MIN_BLOB_GASPRICE,
    TARGET_BLOB_GAS_PER_BLOCK,
};
use alloy_primitives::U256;

/// Approximates `factor * e**(numerator / denominator)` by Taylor expansion
/// with integer division, exactly as consensus defines blob gas pricing.
pub const fn fake_exponential(factor: u128, numerator: u128, denominator: u128) -> u128 {
    let mut i: u128 = 1;
    let mut output: u128 = 0;
    let mut accum = factor * denominator;
    while accum > 0 {
        output += accum;
        accum = accum * numerator / (denominator * i);
        i += 1;
    }
    output / denominator
}

/// Excess blob gas of a block given its parent's counters.
pub const fn calc_excess_blob_gas(parent_excess_blob_gas: u64, parent_blob_gas_used: u64) -> u64 {
    let total = parent_excess_blob_gas + parent_blob_gas_used;
    if total < TARGET_BLOB_GAS_PER_BLOCK {
        0
    } else {
        total - TARGET_BLOB_GAS_PER_BLOCK
    }
}

/// Blob gas price at a given excess blob gas.
pub const fn blob_gas_price(excess_blob_gas: u64) -> u128 {
    fake_exponential(
        MIN_BLOB_GASPRICE,
        excess_blob_gas as u128,
        BLOB_GASPRICE_UPDATE_FRACTION,
    )
}

/// Storage slots of the beacon-roots ring buffer holding `(timestamp,
/// parent_beacon_block_root)` for a block at `timestamp`.
pub fn beacon_root_storage_indexes(timestamp: u64) -> (U256, U256) {
    let slot = timestamp % HISTORY_BUFFER_LENGTH;
    (U256::from(slot), U256::from(slot + HISTORY_BUFFER_LENGTH))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn fake_exponential_base_cases() {
        assert_eq!(fake_exponential(1, 0, 3338477), 1);
        assert_eq!(fake_exponential(2, 0, 1), 2);
        // One full e-fold: floor(1 * e) == 2.
        assert_eq!(fake_exponential(1, 3338477, 3338477), 2);
    }

    #[test]
    fn fake_exponential_is_monotone_in_numerator() {
        let mut last = 0;
        for excess in (0..=10 * TARGET_BLOB_GAS_PER_BLOCK as u128).step_by(131072) {
            let price = fake_exponential(1, excess, BLOB_GASPRICE_UPDATE_FRACTION);
            assert!(price >= last);
            last = price;
        }
    }

    #[rstest]
    #[case(0, 0, 0)]
    #[case(0, 393216, 0)]
    #[case(0, 786432, 393216)]
    #[case(393216, 0, 0)]
    #[case(393216, 393216, 393216)]
    #[case(100, 393216, 100)]
    fn excess_blob_gas_recursion(
        #[case] parent_excess: u64,
        #[case] parent_used: u64,
        #[case] expected: u64,
    ) {
        assert_eq!(calc_excess_blob_gas(parent_excess, parent_used), expected);
    }

    #[test]
    fn beacon_root_slots_wrap_the_ring_buffer() {
        let (ts_slot, root_slot) = beacon_root_storage_indexes(8191 + 17);
        assert_eq!(ts_slot, U256::from(17u64));
        assert_eq!(root_slot, U256::from(17u64 + 8191));
    }
}

//! A read-only snapshot of the mocked consensus layer's canonical chain,
//! handed to devp2p sessions so they can exchange `Status` and serve
//! `GetBlockHeaders` without holding the mocker lock.

use crate::{ForkConfig, ForkId};
use alloy_consensus::Header;
use alloy_primitives::{B256, U256};
use std::collections::BTreeMap;

/// Origin of a `GetBlockHeaders` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadersOrigin {
    /// Start at a block hash.
    Hash(B256),
    /// Start at a block number.
    Number(u64),
}

/// Canonical chain snapshot.
#[derive(Debug, Clone, Default)]
pub struct ChainView {
    /// Genesis block hash.
    pub genesis_hash: B256,
    /// Genesis timestamp.
    pub genesis_timestamp: u64,
    /// Canonical head hash.
    pub head_hash: B256,
    /// Canonical head number.
    pub head_number: u64,
    /// Total difficulty at the head.
    pub total_difficulty: U256,
    /// Fork schedule of the chain.
    pub fork_config: ForkConfig,
    /// Canonical headers by number.
    pub headers: BTreeMap<u64, Header>,
}

impl ChainView {
    /// The fork id a correct peer advertises for this chain.
    pub fn fork_id(&self) -> ForkId {
        let head_timestamp = self
            .headers
            .get(&self.head_number)
            .map_or(self.genesis_timestamp, |header| header.timestamp);
        self.fork_config.fork_id(self.genesis_hash, self.genesis_timestamp, head_timestamp)
    }

    /// Serves a `GetBlockHeaders` request from the snapshot, eth-wire
    /// semantics: up to `amount` headers starting at `origin`, `skip` blocks
    /// between each, walking backwards when `reverse` is set. Unknown blocks
    /// truncate the response.
    pub fn get_headers(
        &self,
        origin: HeadersOrigin,
        amount: u64,
        skip: u64,
        reverse: bool,
    ) -> Vec<Header> {
        let start = match origin {
            HeadersOrigin::Number(number) => Some(number),
            HeadersOrigin::Hash(hash) => self
                .headers
                .iter()
                .find(|(_, header)| header.hash_slow() == hash)
                .map(|(number, _)| *number),
        };
        let Some(start) = start else { return Vec::new() };

        let step = skip + 1;
        let mut headers = Vec::new();
        let mut number = start;
        for _ in 0..amount {
            let Some(header) = self.headers.get(&number) else { break };
            headers.push(header.clone());
            if reverse {
                let Some(previous) = number.checked_sub(step) else { break };
                number = previous;
            } else {
                number += step;
            }
        }
        headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view_with(numbers: std::ops::RangeInclusive<u64>) -> ChainView {
        let mut view = ChainView::default();
        for number in numbers {
            let header = Header { number, timestamp: 0x1234 + number, ..Default::default() };
            view.headers.insert(number, header);
        }
        view.head_number = *view.headers.keys().last().unwrap_or(&0);
        view
    }

    #[test]
    fn serves_forward_with_skip() {
        let view = view_with(0..=10);
        let headers = view.get_headers(HeadersOrigin::Number(2), 3, 1, false);
        let numbers: Vec<u64> = headers.iter().map(|header| header.number).collect();
        assert_eq!(numbers, vec![2, 4, 6]);
    }

    #[test]
    fn serves_reverse_and_truncates_at_genesis() {
        let view = view_with(0..=10);
        let headers = view.get_headers(HeadersOrigin::Number(3), 10, 0, true);
        let numbers: Vec<u64> = headers.iter().map(|header| header.number).collect();
        assert_eq!(numbers, vec![3, 2, 1, 0]);
    }

    #[test]
    fn resolves_hash_origins() {
        let view = view_with(0..=4);
        let target = view.headers[&2].hash_slow();
        let headers = view.get_headers(HeadersOrigin::Hash(target), 2, 0, false);
        assert_eq!(headers.len(), 2);
        assert_eq!(headers[0].number, 2);
        assert!(view.get_headers(HeadersOrigin::Hash(B256::ZERO), 2, 0, false).is_empty());
    }
}

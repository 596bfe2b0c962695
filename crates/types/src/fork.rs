//! Fork scheduling and Engine API version dispatch.
//!
//! Tests activate Shanghai and Cancun by timestamp. Every Engine API call is
//! versioned, and the correct version is a pure function of the timestamp of
//! the payload the call concerns, so the mapping lives here rather than in
//! the client.

use alloy_primitives::B256;
use serde::{Deserialize, Serialize};

/// The forks the harness distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Fork {
    /// The merge fork, no withdrawals or blobs.
    Paris,
    /// Withdrawals active.
    Shanghai,
    /// Blobs and beacon roots active.
    Cancun,
}

impl std::fmt::Display for Fork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Paris => f.write_str("Paris"),
            Self::Shanghai => f.write_str("Shanghai"),
            Self::Cancun => f.write_str("Cancun"),
        }
    }
}

/// A versioned Engine API method family member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EngineVersion {
    /// Paris-era methods.
    V1 = 1,
    /// Shanghai-era methods.
    V2 = 2,
    /// Cancun-era methods.
    V3 = 3,
}

impl EngineVersion {
    /// Numeric suffix of the method name.
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// The next higher version, saturating at V3.
    pub const fn upgraded(self) -> Self {
        match self {
            Self::V1 => Self::V2,
            Self::V2 | Self::V3 => Self::V3,
        }
    }

    /// The next lower version, saturating at V1.
    pub const fn downgraded(self) -> Self {
        match self {
            Self::V1 | Self::V2 => Self::V1,
            Self::V3 => Self::V2,
        }
    }
}

impl std::fmt::Display for EngineVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "V{}", self.as_u8())
    }
}

/// An EIP-2124/6122 fork identifier, exchanged in the devp2p `Status`
/// message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ForkId {
    /// CRC32 over the genesis hash and every past fork value.
    pub hash: [u8; 4],
    /// Timestamp of the next scheduled fork, zero when none.
    pub next: u64,
}

/// Per-test fork activation schedule.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForkConfig {
    /// Shanghai activation timestamp, `None` when never active.
    pub shanghai_timestamp: Option<u64>,
    /// Cancun activation timestamp, `None` when never active.
    pub cancun_timestamp: Option<u64>,
}

impl ForkConfig {
    /// A chain that never leaves Paris.
    pub const fn paris() -> Self {
        Self { shanghai_timestamp: None, cancun_timestamp: None }
    }

    /// Shanghai active from `timestamp`, Cancun never.
    pub const fn shanghai_at(timestamp: u64) -> Self {
        Self { shanghai_timestamp: Some(timestamp), cancun_timestamp: None }
    }

    /// Shanghai and Cancun both active from `timestamp`.
    pub const fn cancun_at(timestamp: u64) -> Self {
        Self { shanghai_timestamp: Some(timestamp), cancun_timestamp: Some(timestamp) }
    }

    /// Shanghai and Cancun active from genesis.
    pub const fn cancun_genesis() -> Self {
        Self::cancun_at(0)
    }

    /// Whether Shanghai is active at `timestamp`.
    pub fn is_shanghai(&self, timestamp: u64) -> bool {
        self.shanghai_timestamp.is_some_and(|at| timestamp >= at)
    }

    /// Whether Cancun is active at `timestamp`.
    pub fn is_cancun(&self, timestamp: u64) -> bool {
        self.cancun_timestamp.is_some_and(|at| timestamp >= at)
    }

    /// The fork in force at `timestamp`.
    pub fn fork_at(&self, timestamp: u64) -> Fork {
        if self.is_cancun(timestamp) {
            Fork::Cancun
        } else if self.is_shanghai(timestamp) {
            Fork::Shanghai
        } else {
            Fork::Paris
        }
    }

    /// Required `engine_newPayload` version for a payload at `timestamp`.
    pub fn new_payload_version(&self, timestamp: u64) -> EngineVersion {
        match self.fork_at(timestamp) {
            Fork::Cancun => EngineVersion::V3,
            Fork::Shanghai => EngineVersion::V2,
            Fork::Paris => EngineVersion::V1,
        }
    }

    /// Required `engine_getPayload` version for a payload at `timestamp`.
    pub fn get_payload_version(&self, timestamp: u64) -> EngineVersion {
        self.new_payload_version(timestamp)
    }

    /// Required `engine_forkchoiceUpdated` version.
    ///
    /// When attributes are attached their timestamp decides; otherwise the
    /// head timestamp does.
    pub fn forkchoice_updated_version(
        &self,
        head_timestamp: u64,
        attributes_timestamp: Option<u64>,
    ) -> EngineVersion {
        self.new_payload_version(attributes_timestamp.unwrap_or(head_timestamp))
    }

    /// The EIP-2124 fork id a correct peer advertises at `head_timestamp`.
    ///
    /// Forks already active at genesis do not enter the checksum (EIP-6122).
    pub fn fork_id(
        &self,
        genesis_hash: B256,
        genesis_timestamp: u64,
        head_timestamp: u64,
    ) -> ForkId {
        let mut forks: Vec<u64> = [self.shanghai_timestamp, self.cancun_timestamp]
            .into_iter()
            .flatten()
            .filter(|at| *at > genesis_timestamp)
            .collect();
        forks.sort_unstable();
        forks.dedup();

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(genesis_hash.as_slice());
        let mut next = 0;
        for at in forks {
            if at <= head_timestamp {
                hasher.update(&at.to_be_bytes());
            } else {
                next = at;
                break;
            }
        }
        ForkId { hash: hasher.finalize().to_be_bytes(), next }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(ForkConfig::paris(), 100, EngineVersion::V1)]
    #[case(ForkConfig::shanghai_at(50), 49, EngineVersion::V1)]
    #[case(ForkConfig::shanghai_at(50), 50, EngineVersion::V2)]
    #[case(ForkConfig::cancun_at(50), 50, EngineVersion::V3)]
    #[case(ForkConfig::cancun_genesis(), 0, EngineVersion::V3)]
    fn new_payload_version_dispatch(
        #[case] config: ForkConfig,
        #[case] timestamp: u64,
        #[case] expected: EngineVersion,
    ) {
        assert_eq!(config.new_payload_version(timestamp), expected);
    }

    #[test]
    fn attributes_timestamp_wins_for_forkchoice() {
        let config = ForkConfig::cancun_at(100);
        assert_eq!(config.forkchoice_updated_version(99, None), EngineVersion::V1);
        assert_eq!(config.forkchoice_updated_version(99, Some(100)), EngineVersion::V3);
    }

    #[test]
    fn upgrade_downgrade_saturate() {
        assert_eq!(EngineVersion::V3.upgraded(), EngineVersion::V3);
        assert_eq!(EngineVersion::V2.upgraded(), EngineVersion::V3);
        assert_eq!(EngineVersion::V1.downgraded(), EngineVersion::V1);
        assert_eq!(EngineVersion::V3.downgraded(), EngineVersion::V2);
    }

    #[test]
    fn fork_id_ignores_genesis_forks_and_tracks_next() {
        let genesis = B256::repeat_byte(0x42);
        let at_genesis = ForkConfig::cancun_genesis().fork_id(genesis, 0, 1000);
        let plain = ForkConfig::paris().fork_id(genesis, 0, 1000);
        // Forks active at genesis never enter the checksum.
        assert_eq!(at_genesis, plain);
        assert_eq!(at_genesis.next, 0);

        let scheduled = ForkConfig::cancun_at(2000).fork_id(genesis, 0, 1000);
        assert_eq!(scheduled.hash, plain.hash);
        assert_eq!(scheduled.next, 2000);

        let crossed = ForkConfig::cancun_at(2000).fork_id(genesis, 0, 2000);
        assert_ne!(crossed.hash, plain.hash);
        assert_eq!(crossed.next, 0);
    }
}

//! Chain parameters shared by every test, mirroring the values the genesis
//! files are built from, plus the deterministic account set used to fund and
//! sign test transactions.

use alloy_primitives::{Address, B256, U256, address};
use alloy_signer_local::PrivateKeySigner;
use sha2::{Digest, Sha256};
use std::{sync::LazyLock, time::Duration};

/// Chain and network id of every test chain.
pub const CHAIN_ID: u64 = 7;

/// Timestamp of the genesis block in every test genesis file.
pub const GENESIS_TIMESTAMP: u64 = 0x1234;

/// Gas price used by non-blob test transactions: 30 gwei.
pub const GAS_PRICE: u128 = 30_000_000_000;

/// Tip used by test transactions: 1 gwei.
pub const GAS_TIP_PRICE: u128 = 1_000_000_000;

/// Default Eth JSON-RPC port of a client under test.
pub const ETH_PORT_HTTP: u16 = 8545;

/// Default Engine JSON-RPC port of a client under test.
pub const ENGINE_PORT_HTTP: u16 = 8551;

/// The well-known 32-byte JWT secret every client under test is started with.
pub const DEFAULT_JWT_SECRET: [u8; 32] = *b"secretsecretsecretsecretsecretse";

/// Tolerated skew between a token's `iat` claim and the server clock.
pub const MAX_TIME_DRIFT: Duration = Duration::from_secs(60);

/// Timeout applied to every individual RPC call.
pub const RPC_TIMEOUT: Duration = Duration::from_secs(10);

/// Wall-clock bound for a whole test.
pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(600);

/// Attempts made by JWT-drift expectations before declaring a flake.
pub const AUTH_RETRY_ATTEMPTS: u32 = 5;

/// Back-off between JWT-drift attempts.
pub const AUTH_RETRY_BACKOFF: Duration = Duration::from_secs(1);

/// The EIP-4788 beacon roots contract address.
pub const BEACON_ROOTS_ADDRESS: Address = address!("000F3df6D732807Ef1319fB7B8bB8522d0Beac02");

/// Ring buffer length of the beacon roots contract.
pub const HISTORY_BUFFER_LENGTH: u64 = 8191;

/// Gas consumed per blob.
pub const GAS_PER_BLOB: u64 = 0x20000;

/// Target blob gas per block (3 blobs).
pub const TARGET_BLOB_GAS_PER_BLOCK: u64 = 393216;

/// Maximum blob gas per block (6 blobs).
pub const MAX_BLOB_GAS_PER_BLOCK: u64 = 786432;

/// Floor of the blob gas price.
pub const MIN_BLOB_GASPRICE: u128 = 1;

/// Denominator of the blob gas price fake-exponential.
pub const BLOB_GASPRICE_UPDATE_FRACTION: u128 = 3338477;

/// Size of one blob in bytes.
pub const BYTES_PER_BLOB: usize = 131072;

/// Field elements per blob.
pub const FIELD_ELEMENTS_PER_BLOB: usize = 4096;

/// The BLS12-381 scalar field modulus, bounding every blob field element.
pub static BLS_MODULUS: LazyLock<U256> = LazyLock::new(|| {
    U256::from_str_radix(
        "52435875175126190479447740508185965837690552500527637822603658699938581184513",
        10,
    )
    .unwrap_or_else(|_| unreachable!("modulus literal is valid decimal"))
});

/// Number of pre-derived test accounts.
pub const TEST_ACCOUNT_COUNT: u64 = 128;

/// A funded account with a deterministic private key.
///
/// Key `i` is `sha256(be64(i))`, re-hashed in the (practically impossible)
/// case the digest falls outside the secp256k1 scalar field, so every harness
/// run and every genesis file agrees on the same addresses.
#[derive(Debug, Clone)]
pub struct TestAccount {
    index: u64,
    signer: PrivateKeySigner,
}

impl TestAccount {
    fn derive(index: u64) -> Self {
        let mut digest: [u8; 32] = Sha256::digest(index.to_be_bytes()).into();
        let signer = loop {
            match PrivateKeySigner::from_slice(&digest) {
                Ok(signer) => break signer,
                Err(_) => digest = Sha256::digest(digest).into(),
            }
        };
        Self { index, signer }
    }

    /// Position of this account in the deterministic set.
    pub const fn index(&self) -> u64 {
        self.index
    }

    /// The account address.
    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// The signer for this account's key.
    pub const fn signer(&self) -> &PrivateKeySigner {
        &self.signer
    }
}

static TEST_ACCOUNTS: LazyLock<Vec<TestAccount>> =
    LazyLock::new(|| (0..TEST_ACCOUNT_COUNT).map(TestAccount::derive).collect());

/// The deterministic test account set.
pub fn test_accounts() -> &'static [TestAccount] {
    &TEST_ACCOUNTS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accounts_are_deterministic_and_distinct() {
        let first = test_accounts();
        assert_eq!(first.len(), TEST_ACCOUNT_COUNT as usize);
        let again = TestAccount::derive(0);
        assert_eq!(first[0].address(), again.address());
        assert_ne!(first[0].address(), first[1].address());
    }

    #[test]
    fn bls_modulus_fits_a_field_element() {
        // The modulus is below 2^255, so any value reduced by it round-trips
        // through a 32-byte big-endian chunk.
        assert!(BLS_MODULUS.bit_len() <= 255);
    }
}

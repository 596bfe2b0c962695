//! The shared state a test sequence executes against.

use crate::StepError;
use alloy_primitives::B256;
use async_trait::async_trait;
use baton_clmock::ClMocker;
use baton_engine::{EngineClient, EngineClientConfig};
use baton_types::{BlobId, BlobTransaction, ForkConfig};
use rand::{SeedableRng, rngs::StdRng};
use std::{
    collections::{BTreeMap, HashMap},
    path::PathBuf,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

/// Environment the runner resolved for this test.
#[derive(Debug, Clone)]
pub struct TestEnv {
    /// Seed of this test's PRNG.
    pub random_seed: u64,
    /// Root of the fixture tree, when fixtures are in play.
    pub test_path: Option<PathBuf>,
}

/// Supplies additional execution clients to [`LaunchClients`].
///
/// Container orchestration is out of scope, so a starter typically hands out
/// connections to pre-launched endpoints in order.
///
/// [`LaunchClients`]: crate::LaunchClients
#[async_trait]
pub trait ClientStarter: Send + Sync {
    /// Starts (or connects to) one more client, optionally peered with
    /// `bootnode`.
    async fn start_client(&self, bootnode: Option<String>)
    -> Result<Arc<EngineClient>, StepError>;
}

/// A [`ClientStarter`] over a fixed list of pre-launched endpoints.
#[derive(Debug, Default)]
pub struct StaticStarter {
    configs: Mutex<Vec<EngineClientConfig>>,
}

impl StaticStarter {
    /// A starter handing out `configs` in order.
    pub fn new(configs: Vec<EngineClientConfig>) -> Self {
        Self { configs: Mutex::new(configs) }
    }
}

#[async_trait]
impl ClientStarter for StaticStarter {
    async fn start_client(
        &self,
        _bootnode: Option<String>,
    ) -> Result<Arc<EngineClient>, StepError> {
        let config = {
            let mut configs =
                self.configs.lock().unwrap_or_else(PoisonError::into_inner);
            if configs.is_empty() {
                return Err(StepError::MissingPrerequisite("no pre-launched client left"));
            }
            configs.remove(0)
        };
        Ok(Arc::new(EngineClient::new(config)))
    }
}

/// The blob transactions a test has submitted, keyed for later verification.
#[derive(Debug, Default)]
pub struct TestBlobTxPool {
    transactions: HashMap<B256, BlobTransaction>,
    hashes_by_index: BTreeMap<u64, B256>,
    /// Next blob id to attach.
    pub current_blob_id: BlobId,
    /// Next transaction index.
    pub current_transaction_index: u64,
}

impl TestBlobTxPool {
    /// Records a submitted transaction under the next index.
    pub fn add_transaction(&mut self, tx: BlobTransaction) {
        self.hashes_by_index.insert(self.current_transaction_index, tx.hash);
        self.current_transaction_index += 1;
        self.transactions.insert(tx.hash, tx);
    }

    /// The transaction submitted `index`-th, if any.
    pub fn by_index(&self, index: u64) -> Option<&BlobTransaction> {
        self.hashes_by_index.get(&index).and_then(|hash| self.transactions.get(hash))
    }

    /// The transaction with `hash`, if the test submitted it.
    pub fn by_hash(&self, hash: &B256) -> Option<&BlobTransaction> {
        self.transactions.get(hash)
    }

    /// All recorded transactions, in submission order.
    pub fn in_order(&self) -> impl Iterator<Item = &BlobTransaction> {
        self.hashes_by_index.values().filter_map(|hash| self.transactions.get(hash))
    }

    /// Number of recorded transactions.
    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    /// Whether no transaction was recorded yet.
    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }
}

/// Shared state of one running test.
pub struct TestContext {
    /// Environment resolved by the runner.
    pub env: TestEnv,
    /// Every launched client, in launch order. The mocker holds the subset
    /// registered for block production.
    engines: Mutex<Vec<Arc<EngineClient>>>,
    /// The consensus-layer mock driving production.
    pub cl_mock: Arc<tokio::sync::Mutex<ClMocker>>,
    /// Blob transactions submitted so far.
    pub blob_pool: Arc<tokio::sync::Mutex<TestBlobTxPool>>,
    /// Per-test PRNG.
    rng: Mutex<StdRng>,
    /// Fork schedule of the chain under test.
    pub fork_config: ForkConfig,
    /// Supplier of additional clients.
    pub starter: Arc<dyn ClientStarter>,
}

impl TestContext {
    /// A context over already-launched `engines`.
    pub fn new(
        env: TestEnv,
        engines: Vec<Arc<EngineClient>>,
        cl_mock: ClMocker,
        fork_config: ForkConfig,
        starter: Arc<dyn ClientStarter>,
    ) -> Self {
        let rng = StdRng::seed_from_u64(env.random_seed);
        Self {
            env,
            engines: Mutex::new(engines),
            cl_mock: Arc::new(tokio::sync::Mutex::new(cl_mock)),
            blob_pool: Arc::new(tokio::sync::Mutex::new(TestBlobTxPool::default())),
            rng: Mutex::new(rng),
            fork_config,
            starter,
        }
    }

    /// The client at `index`, in launch order.
    pub fn engine(&self, index: usize) -> Result<Arc<EngineClient>, StepError> {
        let engines = self.engines.lock().unwrap_or_else(PoisonError::into_inner);
        engines
            .get(index)
            .cloned()
            .ok_or(StepError::MissingClient { index, available: engines.len() })
    }

    /// Number of launched clients.
    pub fn engine_count(&self) -> usize {
        self.engines.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Registers a newly launched client.
    pub fn push_engine(&self, engine: Arc<EngineClient>) {
        self.engines.lock().unwrap_or_else(PoisonError::into_inner).push(engine);
    }

    /// The test's PRNG.
    pub fn rng(&self) -> MutexGuard<'_, StdRng> {
        self.rng.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for TestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestContext")
            .field("env", &self.env)
            .field("engines", &self.engine_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use baton_types::BlobTransactionSpec;
    use baton_types::test_accounts;

    #[test]
    fn pool_preserves_submission_order() {
        let mut pool = TestBlobTxPool::default();
        for nonce in 0..3u64 {
            let tx = BlobTransactionSpec {
                nonce,
                first_blob_id: BlobId(nonce),
                ..Default::default()
            }
            .sign(test_accounts()[0].signer())
            .unwrap();
            pool.add_transaction(tx);
        }
        assert_eq!(pool.len(), 3);
        let nonces: Vec<u64> = pool.in_order().map(|tx| tx.nonce).collect();
        assert_eq!(nonces, vec![0, 1, 2]);
        assert_eq!(pool.by_index(1).map(|tx| tx.nonce), Some(1));
        assert!(pool.by_index(5).is_none());
    }

    #[test]
    fn replacement_overwrites_by_hash_but_keeps_indexes() {
        let mut pool = TestBlobTxPool::default();
        let first = BlobTransactionSpec { nonce: 0, ..Default::default() }
            .sign(test_accounts()[0].signer())
            .unwrap();
        let replacement = BlobTransactionSpec {
            nonce: 0,
            gas_fee_cap: baton_types::globals::GAS_PRICE * 2,
            ..Default::default()
        }
        .sign(test_accounts()[0].signer())
        .unwrap();
        assert_ne!(first.hash, replacement.hash);
        pool.add_transaction(first);
        pool.add_transaction(replacement.clone());
        assert_eq!(pool.by_index(1).map(|tx| tx.hash), Some(replacement.hash));
    }
}

//! The block-production state machine.

use crate::{CycleHooks, MockerError, ProductionPhase};
use alloy_consensus::EMPTY_OMMER_ROOT_HASH;
use alloy_eips::{BlockNumberOrTag, eip4895::Withdrawal};
use alloy_primitives::{Address, B64, B256, U256};
use alloy_rpc_types_engine::{ForkchoiceState, PayloadId};
use alloy_rpc_types_eth::Header as RpcHeader;
use baton_engine::{EngineApiError, EngineClient};
use baton_types::{
    BlobsBundle, ChainView, ExecutableData, ForkConfig, PayloadAttributes, PayloadStatus,
    PayloadStatusKind,
    globals::{GENESIS_TIMESTAMP, test_accounts},
};
use rand::{Rng, SeedableRng, rngs::StdRng};
use sha2::{Digest, Sha256};
use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::Arc,
    time::Duration,
};
use tracing::{debug, info, warn};

/// Deterministic fake beacon root attached to Cancun-era attributes, so the
/// beacon-roots contract contents can be predicted from the timestamp alone.
pub fn timestamp_to_beacon_root(timestamp: u64) -> B256 {
    B256::from(<[u8; 32]>::from(Sha256::digest(timestamp.to_be_bytes())))
}

/// Tunables of one mocker instance.
#[derive(Debug, Clone)]
pub struct ClMockerConfig {
    /// Fork schedule of the chain under test.
    pub fork_config: ForkConfig,
    /// How many head hashes the safe block lags the head.
    pub slots_to_safe: u64,
    /// How many head hashes the finalized block lags the head.
    pub slots_to_finalized: u64,
    /// Timestamp step between consecutive blocks.
    pub block_timestamp_increment: u64,
    /// How long the producer is given to build before `getPayload`.
    pub payload_production_client_delay: Duration,
    /// Terminal total difficulty to wait for before PoS starts.
    pub terminal_total_difficulty: U256,
    /// Timestamp override for the first PoS block, used by tests that need
    /// an aged transition payload.
    pub transition_payload_timestamp: Option<u64>,
    /// Fee recipient suggested in every payload attributes.
    pub fee_recipient: Address,
    /// Withdrawals generated per Shanghai-era block.
    pub withdrawals_per_block: u64,
    /// Poll interval while waiting for the terminal total difficulty.
    pub ttd_poll_interval: Duration,
    /// Poll attempts before the TTD wait gives up.
    pub ttd_max_polls: u32,
}

impl Default for ClMockerConfig {
    fn default() -> Self {
        Self {
            fork_config: ForkConfig::default(),
            slots_to_safe: 1,
            slots_to_finalized: 2,
            block_timestamp_increment: 1,
            payload_production_client_delay: Duration::from_secs(1),
            terminal_total_difficulty: U256::ZERO,
            transition_payload_timestamp: None,
            fee_recipient: Address::ZERO,
            withdrawals_per_block: 10,
            ttd_poll_interval: Duration::from_secs(1),
            ttd_max_polls: 600,
        }
    }
}

/// The mocked consensus layer.
///
/// Single-threaded and cooperative: one production cycle runs to completion
/// before the next starts, and the engine set cannot change mid-cycle because
/// every mutation goes through `&mut self`.
#[derive(Debug)]
pub struct ClMocker {
    config: ClMockerConfig,
    engines: Vec<Arc<EngineClient>>,
    rng: StdRng,

    ttd_reached: bool,
    first_pos_block_number: Option<u64>,
    genesis_hash: B256,
    genesis_timestamp: u64,
    chain_total_difficulty: U256,

    latest_header: Option<RpcHeader>,
    latest_producer_id: Option<String>,
    latest_forkchoice: ForkchoiceState,
    latest_payload_attributes: Option<PayloadAttributes>,
    latest_payload_id: Option<PayloadId>,
    latest_payload_built: Option<ExecutableData>,
    latest_blobs_bundle: Option<BlobsBundle>,
    latest_should_override_builder: Option<bool>,

    head_history: Vec<B256>,
    header_history: BTreeMap<u64, alloy_consensus::Header>,
    prev_randao_history: BTreeMap<u64, B256>,
    executed_payload_history: BTreeMap<u64, ExecutableData>,
    payload_id_history: HashMap<String, HashSet<PayloadId>>,
    next_withdrawal_index: u64,
}

impl ClMocker {
    /// A mocker over no engines yet, with its PRNG seeded from the test seed.
    pub fn new(config: ClMockerConfig, seed: u64) -> Self {
        Self {
            config,
            engines: Vec::new(),
            rng: StdRng::seed_from_u64(seed),
            ttd_reached: false,
            first_pos_block_number: None,
            genesis_hash: B256::ZERO,
            genesis_timestamp: GENESIS_TIMESTAMP,
            chain_total_difficulty: U256::ZERO,
            latest_header: None,
            latest_producer_id: None,
            latest_forkchoice: ForkchoiceState::default(),
            latest_payload_attributes: None,
            latest_payload_id: None,
            latest_payload_built: None,
            latest_blobs_bundle: None,
            latest_should_override_builder: None,
            head_history: Vec::new(),
            header_history: BTreeMap::new(),
            prev_randao_history: BTreeMap::new(),
            executed_payload_history: BTreeMap::new(),
            payload_id_history: HashMap::new(),
            next_withdrawal_index: 0,
        }
    }

    /// Registers a peer. New peers receive every subsequent broadcast.
    pub fn add_engine(&mut self, engine: Arc<EngineClient>) {
        info!(target: "clmock", client = engine.id(), "adding engine client");
        self.engines.push(engine);
    }

    /// Removes a peer by id.
    pub fn remove_engine(&mut self, id: &str) {
        self.engines.retain(|engine| engine.id() != id);
    }

    /// The current peer set.
    pub fn engines(&self) -> &[Arc<EngineClient>] {
        &self.engines
    }

    /// The mocker's configuration.
    pub const fn config(&self) -> &ClMockerConfig {
        &self.config
    }

    /// Mutable configuration, for steps that adjust cycle pacing.
    pub const fn config_mut(&mut self) -> &mut ClMockerConfig {
        &mut self.config
    }

    /// Fork schedule of the chain under test.
    pub const fn fork_config(&self) -> ForkConfig {
        self.config.fork_config
    }

    /// Whether the PoS transition happened.
    pub const fn is_running(&self) -> bool {
        self.ttd_reached
    }

    /// Number of the first PoS block, known after the transition.
    pub const fn first_pos_block_number(&self) -> Option<u64> {
        self.first_pos_block_number
    }

    /// The canonical forkchoice most recently broadcast.
    pub const fn latest_forkchoice(&self) -> ForkchoiceState {
        self.latest_forkchoice
    }

    /// The adopted canonical head header.
    pub const fn latest_header(&self) -> Option<&RpcHeader> {
        self.latest_header.as_ref()
    }

    /// The attributes pending for or used by the current cycle.
    pub const fn latest_payload_attributes(&self) -> Option<&PayloadAttributes> {
        self.latest_payload_attributes.as_ref()
    }

    /// Rewrites the pending attributes; only meaningful from an
    /// [`ProductionPhase::AttributesGenerated`] hook.
    pub fn set_latest_payload_attributes(&mut self, attributes: PayloadAttributes) {
        self.latest_payload_attributes = Some(attributes);
    }

    /// The payload id of the in-flight build.
    pub const fn latest_payload_id(&self) -> Option<PayloadId> {
        self.latest_payload_id
    }

    /// The engine that built the in-flight payload.
    pub fn latest_producer(&self) -> Option<&Arc<EngineClient>> {
        let id = self.latest_producer_id.as_deref()?;
        self.engines.iter().find(|engine| engine.id() == id)
    }

    /// The most recently built payload.
    pub const fn latest_payload_built(&self) -> Option<&ExecutableData> {
        self.latest_payload_built.as_ref()
    }

    /// The blob bundle returned with the most recent payload.
    pub const fn latest_blobs_bundle(&self) -> Option<&BlobsBundle> {
        self.latest_blobs_bundle.as_ref()
    }

    /// The builder-override hint returned with the most recent payload.
    pub const fn latest_should_override_builder(&self) -> Option<bool> {
        self.latest_should_override_builder
    }

    /// Canonical head hashes since the transition block, oldest first.
    pub fn head_history(&self) -> &[B256] {
        &self.head_history
    }

    /// The prev-randao requested for block `number`.
    pub fn prev_randao(&self, number: u64) -> Option<B256> {
        self.prev_randao_history.get(&number).copied()
    }

    /// The payload broadcast for block `number`.
    pub fn executed_payload(&self, number: u64) -> Option<&ExecutableData> {
        self.executed_payload_history.get(&number)
    }

    /// Snapshot of the canonical chain for devp2p sessions.
    pub fn chain_view(&self) -> ChainView {
        let (head_hash, head_number) = self
            .latest_header
            .as_ref()
            .map_or((self.genesis_hash, 0), |header| (header.hash, header.inner.number));
        ChainView {
            genesis_hash: self.genesis_hash,
            genesis_timestamp: self.genesis_timestamp,
            head_hash,
            head_number,
            total_difficulty: self.chain_total_difficulty,
            fork_config: self.config.fork_config,
            headers: self.header_history.clone(),
        }
    }

    // --- Transition -------------------------------------------------------

    /// Polls the peers until one reports reaching the terminal total
    /// difficulty, then broadcasts the transition forkchoice to everyone.
    pub async fn wait_for_ttd(&mut self) -> Result<(), MockerError> {
        let mut interval = tokio::time::interval(self.config.ttd_poll_interval);
        for _ in 0..self.config.ttd_max_polls {
            interval.tick().await;
            for engine in self.engines.clone() {
                let (header, total_difficulty) = engine
                    .head_and_total_difficulty()
                    .await
                    .map_err(|err| MockerError::engine(engine.id(), err))?;
                if total_difficulty >= self.config.terminal_total_difficulty {
                    info!(
                        target: "clmock",
                        client = engine.id(),
                        number = header.inner.number,
                        hash = %header.hash,
                        %total_difficulty,
                        "terminal total difficulty reached"
                    );
                    return self.start_pos(&engine, header, total_difficulty).await;
                }
            }
        }
        Err(MockerError::TtdTimeout)
    }

    async fn start_pos(
        &mut self,
        reporter: &Arc<EngineClient>,
        transition: RpcHeader,
        total_difficulty: U256,
    ) -> Result<(), MockerError> {
        let genesis = reporter
            .header_by_number(BlockNumberOrTag::Number(0))
            .await
            .map_err(|err| MockerError::engine(reporter.id(), err))?;
        self.genesis_hash = genesis.hash;
        self.genesis_timestamp = genesis.inner.timestamp;
        self.header_history.insert(0, genesis.inner);

        self.chain_total_difficulty = total_difficulty;
        self.first_pos_block_number = Some(transition.inner.number + 1);
        self.latest_forkchoice = ForkchoiceState {
            head_block_hash: transition.hash,
            safe_block_hash: transition.hash,
            finalized_block_hash: transition.hash,
        };
        self.head_history.push(transition.hash);
        self.header_history.insert(transition.inner.number, transition.inner.clone());
        self.ttd_reached = true;

        let version = self
            .config
            .fork_config
            .forkchoice_updated_version(transition.inner.timestamp, None);
        let state = self.latest_forkchoice;
        let results = self.broadcast_forkchoice_updated(version, &state, None).await;
        let mut any_valid = false;
        for (engine, result) in results {
            match result {
                Ok(response) if response.payload_status.status.is_valid() => any_valid = true,
                Ok(response) => warn!(
                    target: "clmock",
                    client = engine.id(),
                    status = %response.payload_status.status,
                    "transition forkchoice not VALID"
                ),
                Err(err) => warn!(
                    target: "clmock",
                    client = engine.id(),
                    %err,
                    "transition forkchoice failed"
                ),
            }
        }
        if !any_valid {
            return Err(MockerError::TransitionRejected);
        }
        self.latest_header = Some(transition);
        Ok(())
    }

    // --- Production cycle -------------------------------------------------

    /// Runs `count` production cycles.
    pub async fn produce_blocks(
        &mut self,
        count: u64,
        hooks: &mut dyn CycleHooks,
    ) -> Result<(), MockerError> {
        for _ in 0..count {
            self.produce_single_block(hooks).await?;
        }
        Ok(())
    }

    /// Runs one production cycle, firing `hooks` between phases.
    pub async fn produce_single_block(
        &mut self,
        hooks: &mut dyn CycleHooks,
    ) -> Result<(), MockerError> {
        if !self.ttd_reached {
            return Err(MockerError::NotRunning);
        }

        let producer = self.pick_next_payload_producer().await?;
        self.latest_producer_id = Some(producer.id().to_string());
        hooks.on_phase(ProductionPhase::ProducerSelected, self).await?;

        let attributes = self.generate_payload_attributes()?;
        self.latest_payload_attributes = Some(attributes);
        hooks.on_phase(ProductionPhase::AttributesGenerated, self).await?;

        self.request_next_payload(&producer).await?;
        hooks.on_phase(ProductionPhase::PayloadRequested, self).await?;

        self.retrieve_next_payload(&producer).await?;
        hooks.on_phase(ProductionPhase::PayloadRetrieved, self).await?;

        let payload = self.latest_payload_built.clone().ok_or(MockerError::NotRunning)?;
        self.broadcast_latest_payload(&payload).await?;
        hooks.on_phase(ProductionPhase::NewPayloadBroadcast, self).await?;

        self.broadcast_next_forkchoice(&payload).await?;
        hooks.on_phase(ProductionPhase::ForkchoiceBroadcast, self).await?;

        self.verify_canonicalized(&payload).await
    }

    /// Rotates through the peers starting at `head_number mod |peers|` and
    /// returns the first whose local head agrees with the canonical view.
    pub async fn pick_next_payload_producer(
        &self,
    ) -> Result<Arc<EngineClient>, MockerError> {
        let head = self.latest_header.as_ref().ok_or(MockerError::NotRunning)?;
        if self.engines.is_empty() {
            return Err(MockerError::NoProducerAvailable);
        }
        let start = head.inner.number as usize % self.engines.len();
        for offset in 0..self.engines.len() {
            let engine = &self.engines[(start + offset) % self.engines.len()];
            match engine.header_by_number(BlockNumberOrTag::Latest).await {
                Ok(local) if local.hash == head.hash && local.inner.number == head.inner.number => {
                    debug!(target: "clmock", client = engine.id(), "selected payload producer");
                    return Ok(engine.clone());
                }
                Ok(local) => debug!(
                    target: "clmock",
                    client = engine.id(),
                    local = %local.hash,
                    canonical = %head.hash,
                    "skipping out-of-sync producer candidate"
                ),
                Err(err) => warn!(
                    target: "clmock",
                    client = engine.id(),
                    %err,
                    "producer candidate unreachable"
                ),
            }
        }
        Err(MockerError::NoProducerAvailable)
    }

    fn generate_payload_attributes(&mut self) -> Result<PayloadAttributes, MockerError> {
        let head = self.latest_header.as_ref().ok_or(MockerError::NotRunning)?;
        let next_number = head.inner.number + 1;

        let mut timestamp = head.inner.timestamp + self.config.block_timestamp_increment;
        if let Some(transition_timestamp) = self.config.transition_payload_timestamp {
            if Some(next_number) == self.first_pos_block_number {
                timestamp = transition_timestamp;
            }
        }

        let prev_randao = B256::from(self.rng.random::<[u8; 32]>());
        self.prev_randao_history.insert(next_number, prev_randao);

        let withdrawals = self
            .config
            .fork_config
            .is_shanghai(timestamp)
            .then(|| self.next_withdrawals());
        let parent_beacon_block_root = self
            .config
            .fork_config
            .is_cancun(timestamp)
            .then(|| timestamp_to_beacon_root(timestamp));

        Ok(PayloadAttributes {
            timestamp,
            prev_randao,
            suggested_fee_recipient: self.config.fee_recipient,
            withdrawals,
            parent_beacon_block_root,
        })
    }

    fn next_withdrawals(&mut self) -> Vec<Withdrawal> {
        let accounts = test_accounts();
        (0..self.config.withdrawals_per_block)
            .map(|_| {
                let index = self.next_withdrawal_index;
                self.next_withdrawal_index += 1;
                Withdrawal {
                    index,
                    validator_index: index % 16,
                    address: accounts[index as usize % accounts.len()].address(),
                    amount: 1,
                }
            })
            .collect()
    }

    async fn request_next_payload(
        &mut self,
        producer: &Arc<EngineClient>,
    ) -> Result<(), MockerError> {
        let head = self.latest_header.as_ref().ok_or(MockerError::NotRunning)?;
        let attributes =
            self.latest_payload_attributes.clone().ok_or(MockerError::NotRunning)?;
        let version = self
            .config
            .fork_config
            .forkchoice_updated_version(head.inner.timestamp, Some(attributes.timestamp));

        let response = producer
            .forkchoice_updated(version, &self.latest_forkchoice, Some(&attributes))
            .await
            .map_err(|err| MockerError::engine(producer.id(), err))?;

        if !response.payload_status.status.is_valid() {
            return Err(MockerError::UnexpectedStatus {
                client: producer.id().to_string(),
                method: "forkchoiceUpdated(attributes)",
                status: response.payload_status.status,
            });
        }
        if response.payload_status.latest_valid_hash
            != Some(self.latest_forkchoice.head_block_hash)
        {
            return Err(MockerError::ForkchoiceDeviation {
                client: producer.id().to_string(),
                reason: format!(
                    "latestValidHash {:?}, expected head {}",
                    response.payload_status.latest_valid_hash,
                    self.latest_forkchoice.head_block_hash
                ),
            });
        }
        let payload_id = response.payload_id.ok_or_else(|| MockerError::MissingPayloadId {
            client: producer.id().to_string(),
        })?;

        // The same id twice means the client ignored the fresh attributes.
        let seen = self.payload_id_history.entry(producer.id().to_string()).or_default();
        if !seen.insert(payload_id) {
            return Err(MockerError::PayloadIdReuse {
                client: producer.id().to_string(),
                payload_id: payload_id.to_string(),
            });
        }
        self.latest_payload_id = Some(payload_id);
        Ok(())
    }

    async fn retrieve_next_payload(
        &mut self,
        producer: &Arc<EngineClient>,
    ) -> Result<(), MockerError> {
        tokio::time::sleep(self.config.payload_production_client_delay).await;

        let head_hash = self.latest_forkchoice.head_block_hash;
        let head_number = self
            .latest_header
            .as_ref()
            .map(|header| header.inner.number)
            .ok_or(MockerError::NotRunning)?;
        let attributes =
            self.latest_payload_attributes.clone().ok_or(MockerError::NotRunning)?;
        let payload_id = self.latest_payload_id.ok_or(MockerError::NotRunning)?;

        let version = self.config.fork_config.get_payload_version(attributes.timestamp);
        let response = producer
            .get_payload(version, payload_id)
            .await
            .map_err(|err| MockerError::engine(producer.id(), err))?;

        let mut payload = response.execution_payload;
        if payload.timestamp != attributes.timestamp {
            return Err(MockerError::PayloadMismatch { field: "timestamp" });
        }
        if payload.prev_randao != attributes.prev_randao {
            return Err(MockerError::PayloadMismatch { field: "prevRandao" });
        }
        if payload.fee_recipient != attributes.suggested_fee_recipient {
            return Err(MockerError::PayloadMismatch { field: "feeRecipient" });
        }
        if payload.parent_hash != head_hash {
            return Err(MockerError::PayloadMismatch { field: "parentHash" });
        }
        if payload.block_number != head_number + 1 {
            return Err(MockerError::PayloadMismatch { field: "blockNumber" });
        }

        // Attach the V3 companions the later broadcasts need.
        payload.parent_beacon_block_root = attributes.parent_beacon_block_root;
        if self.config.fork_config.is_cancun(attributes.timestamp) {
            payload.versioned_hashes = Some(
                response
                    .blobs_bundle
                    .as_ref()
                    .map(|bundle| bundle.versioned_hashes(1))
                    .unwrap_or_default(),
            );
        }

        debug!(
            target: "clmock",
            client = producer.id(),
            number = payload.block_number,
            hash = %payload.block_hash,
            transactions = payload.transactions.len(),
            "payload retrieved"
        );
        self.latest_blobs_bundle = response.blobs_bundle;
        self.latest_should_override_builder = response.should_override_builder;
        self.latest_payload_built = Some(payload);
        Ok(())
    }

    /// Sends `newPayload` for `payload` to every peer in parallel, returning
    /// the per-peer outcomes in peer order.
    pub async fn broadcast_new_payload(
        &self,
        payload: &ExecutableData,
    ) -> Vec<(Arc<EngineClient>, Result<PayloadStatus, EngineApiError>)> {
        let version = self.config.fork_config.new_payload_version(payload.timestamp);
        let calls = self.engines.iter().cloned().map(|engine| {
            let payload = payload.clone();
            async move {
                let result = engine.new_payload(version, &payload).await;
                (engine, result)
            }
        });
        futures::future::join_all(calls).await
    }

    /// Sends `forkchoiceUpdated` to every peer in parallel, returning the
    /// per-peer outcomes in peer order.
    pub async fn broadcast_forkchoice_updated(
        &self,
        version: baton_types::EngineVersion,
        state: &ForkchoiceState,
        attributes: Option<&PayloadAttributes>,
    ) -> Vec<(Arc<EngineClient>, Result<baton_types::ForkchoiceResponse, EngineApiError>)> {
        let calls = self.engines.iter().cloned().map(|engine| {
            let state = *state;
            let attributes = attributes.cloned();
            async move {
                let result = engine.forkchoice_updated(version, &state, attributes.as_ref()).await;
                (engine, result)
            }
        });
        futures::future::join_all(calls).await
    }

    async fn broadcast_latest_payload(
        &mut self,
        payload: &ExecutableData,
    ) -> Result<(), MockerError> {
        let results = self.broadcast_new_payload(payload).await;
        let mut any_valid = false;
        for (engine, result) in results {
            let status = result.map_err(|err| MockerError::engine(engine.id(), err))?;
            match status.status {
                PayloadStatusKind::Valid => {
                    if status.latest_valid_hash != Some(payload.block_hash) {
                        return Err(MockerError::ForkchoiceDeviation {
                            client: engine.id().to_string(),
                            reason: format!(
                                "VALID newPayload with latestValidHash {:?}, expected {}",
                                status.latest_valid_hash, payload.block_hash
                            ),
                        });
                    }
                    any_valid = true;
                }
                PayloadStatusKind::Accepted => {
                    // Tolerated for peers behind the canonical tip; both a
                    // null and a zero latestValidHash are accepted.
                    if status
                        .latest_valid_hash
                        .is_some_and(|hash| hash != B256::ZERO)
                    {
                        return Err(MockerError::ForkchoiceDeviation {
                            client: engine.id().to_string(),
                            reason: format!(
                                "ACCEPTED newPayload with latestValidHash {:?}",
                                status.latest_valid_hash
                            ),
                        });
                    }
                }
                other => warn!(
                    target: "clmock",
                    client = engine.id(),
                    status = %other,
                    "newPayload broadcast not VALID"
                ),
            }
        }
        if !any_valid {
            return Err(MockerError::NoValidNewPayload {
                block_hash: payload.block_hash.to_string(),
            });
        }
        self.executed_payload_history.insert(payload.block_number, payload.clone());
        Ok(())
    }

    fn lagged_hash(history: &[B256], slots: u64) -> B256 {
        if history.len() > slots as usize {
            history[history.len() - 1 - slots as usize]
        } else {
            B256::ZERO
        }
    }

    async fn broadcast_next_forkchoice(
        &mut self,
        payload: &ExecutableData,
    ) -> Result<(), MockerError> {
        self.head_history.push(payload.block_hash);
        self.latest_forkchoice = ForkchoiceState {
            head_block_hash: payload.block_hash,
            safe_block_hash: Self::lagged_hash(&self.head_history, self.config.slots_to_safe),
            finalized_block_hash: Self::lagged_hash(
                &self.head_history,
                self.config.slots_to_finalized,
            ),
        };

        let version =
            self.config.fork_config.forkchoice_updated_version(payload.timestamp, None);
        let state = self.latest_forkchoice;
        let results = self.broadcast_forkchoice_updated(version, &state, None).await;
        for (engine, result) in results {
            let response = result.map_err(|err| MockerError::engine(engine.id(), err))?;
            let status = &response.payload_status;
            if !status.status.is_valid() {
                return Err(MockerError::UnexpectedStatus {
                    client: engine.id().to_string(),
                    method: "forkchoiceUpdated",
                    status: status.status,
                });
            }
            if status.latest_valid_hash != Some(payload.block_hash) {
                return Err(MockerError::ForkchoiceDeviation {
                    client: engine.id().to_string(),
                    reason: format!(
                        "latestValidHash {:?}, expected {}",
                        status.latest_valid_hash, payload.block_hash
                    ),
                });
            }
            if let Some(error) = &status.validation_error {
                return Err(MockerError::ForkchoiceDeviation {
                    client: engine.id().to_string(),
                    reason: format!("unexpected validationError {error:?}"),
                });
            }
            if response.payload_id.is_some() {
                return Err(MockerError::ForkchoiceDeviation {
                    client: engine.id().to_string(),
                    reason: "payloadId returned without attributes".to_string(),
                });
            }
        }
        Ok(())
    }

    async fn verify_canonicalized(
        &mut self,
        payload: &ExecutableData,
    ) -> Result<(), MockerError> {
        for engine in self.engines.clone() {
            let header = match engine
                .header_by_number(BlockNumberOrTag::Number(payload.block_number))
                .await
            {
                Ok(header) => header,
                Err(err) => {
                    warn!(target: "clmock", client = engine.id(), %err, "canonical check failed");
                    continue;
                }
            };
            if header.hash != payload.block_hash {
                continue;
            }
            Self::check_pos_header(&header.inner, payload)?;
            self.header_history.insert(header.inner.number, header.inner.clone());
            self.latest_header = Some(header);
            return Ok(());
        }
        Err(MockerError::NotCanonicalized {
            number: payload.block_number,
            block_hash: payload.block_hash.to_string(),
        })
    }

    fn check_pos_header(
        header: &alloy_consensus::Header,
        payload: &ExecutableData,
    ) -> Result<(), MockerError> {
        let bad = |reason| MockerError::BadPosHeader { number: header.number, reason };
        if header.ommers_hash != EMPTY_OMMER_ROOT_HASH {
            return Err(bad("ommers hash not the empty-list hash"));
        }
        if !header.difficulty.is_zero() {
            return Err(bad("difficulty not zero"));
        }
        if header.nonce != B64::ZERO {
            return Err(bad("nonce not zero"));
        }
        if header.mix_hash != payload.prev_randao {
            return Err(bad("mix digest does not carry prevRandao"));
        }
        if header.extra_data.len() > 32 {
            return Err(bad("extra data longer than 32 bytes"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(1, 1, B256::ZERO)]
    #[case(2, 1, B256::repeat_byte(1))]
    #[case(2, 2, B256::ZERO)]
    #[case(3, 2, B256::repeat_byte(1))]
    #[case(3, 1, B256::repeat_byte(2))]
    fn safe_finalized_lag(
        #[case] blocks: usize,
        #[case] slots: u64,
        #[case] expected: B256,
    ) {
        let history: Vec<B256> =
            (1..=blocks).map(|i| B256::repeat_byte(i as u8)).collect();
        assert_eq!(ClMocker::lagged_hash(&history, slots), expected);
    }

    #[test]
    fn beacon_root_is_deterministic() {
        assert_eq!(timestamp_to_beacon_root(0x1234), timestamp_to_beacon_root(0x1234));
        assert_ne!(timestamp_to_beacon_root(0x1234), timestamp_to_beacon_root(0x1235));
    }

    fn running_mocker(config: ClMockerConfig) -> ClMocker {
        let mut mocker = ClMocker::new(config, 7);
        let header = RpcHeader {
            hash: B256::repeat_byte(0xaa),
            inner: alloy_consensus::Header { number: 5, timestamp: 100, ..Default::default() },
            total_difficulty: None,
            size: None,
        };
        mocker.latest_header = Some(header);
        mocker.first_pos_block_number = Some(6);
        mocker.ttd_reached = true;
        mocker
    }

    #[test]
    fn attributes_advance_timestamp_and_record_randao() {
        let mut mocker = running_mocker(ClMockerConfig {
            fork_config: ForkConfig::cancun_genesis(),
            ..Default::default()
        });
        let attributes = mocker.generate_payload_attributes().expect("generates");
        assert_eq!(attributes.timestamp, 101);
        assert!(attributes.withdrawals.is_some());
        assert_eq!(
            attributes.parent_beacon_block_root,
            Some(timestamp_to_beacon_root(101))
        );
        assert_eq!(mocker.prev_randao(6), Some(attributes.prev_randao));
    }

    #[test]
    fn transition_timestamp_overrides_first_pos_block_only() {
        let mut mocker = running_mocker(ClMockerConfig {
            transition_payload_timestamp: Some(12345),
            ..Default::default()
        });
        let attributes = mocker.generate_payload_attributes().expect("generates");
        assert_eq!(attributes.timestamp, 12345);

        // Once a PoS block exists the override no longer applies.
        mocker.first_pos_block_number = Some(5);
        let attributes = mocker.generate_payload_attributes().expect("generates");
        assert_eq!(attributes.timestamp, 101);
    }

    #[test]
    fn paris_attributes_have_no_fork_fields() {
        let mut mocker = running_mocker(ClMockerConfig {
            fork_config: ForkConfig::paris(),
            ..Default::default()
        });
        let attributes = mocker.generate_payload_attributes().expect("generates");
        assert!(attributes.withdrawals.is_none());
        assert!(attributes.parent_beacon_block_root.is_none());
    }

    #[test]
    fn withdrawal_indexes_are_continuous_across_blocks() {
        let mut mocker = running_mocker(ClMockerConfig::default());
        let first = mocker.next_withdrawals();
        let second = mocker.next_withdrawals();
        assert_eq!(first.last().map(|w| w.index), Some(9));
        assert_eq!(second.first().map(|w| w.index), Some(10));
    }

    #[test]
    fn seeded_rng_reproduces_attributes() {
        let mut a = running_mocker(ClMockerConfig::default());
        let mut b = running_mocker(ClMockerConfig::default());
        let randao_a = a.generate_payload_attributes().expect("generates").prev_randao;
        let randao_b = b.generate_payload_attributes().expect("generates").prev_randao;
        assert_eq!(randao_a, randao_b);
    }
}

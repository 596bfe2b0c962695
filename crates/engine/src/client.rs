//! The Engine + Eth API facade over one execution-layer client.

use crate::{EngineApiError, JwtAuthLayer};
use alloy_eips::BlockNumberOrTag;
use alloy_primitives::{Address, B256, Bytes, U64, U256, map::HashMap};
use alloy_rpc_client::RpcClient;
use alloy_rpc_types_engine::{ExecutionPayloadBodyV1, ForkchoiceState, JwtSecret, PayloadId};
use alloy_rpc_types_eth::{Block, Header, Transaction, TransactionReceipt};
use alloy_transport_http::{
    Http, HyperClient,
    hyper_util::{client::legacy::Client, rt::TokioExecutor},
};
use baton_types::{
    EngineVersion, ExecutableData, ForkchoiceResponse, GetPayloadResponse, PayloadAttributes,
    PayloadStatus,
    globals::RPC_TIMEOUT,
};
use http_body_util::Full;
use serde::{Deserialize, Serialize};
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicI64, Ordering},
};
use tower::ServiceBuilder;
use tracing::debug;
use url::Url;

/// The legacy `engine_exchangeTransitionConfigurationV1` parameter/response.
///
/// Kept only because it is the cheapest authenticated method for JWT tests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionConfiguration {
    /// Terminal total difficulty.
    pub terminal_total_difficulty: U256,
    /// Terminal block hash.
    pub terminal_block_hash: B256,
    /// Terminal block number.
    #[serde(with = "alloy_serde::quantity")]
    pub terminal_block_number: u64,
}

/// The most recent requests sent to and responses received from one client.
///
/// Owned by the client and queried by the mocker, never written from outside.
#[derive(Debug, Clone, Default)]
pub struct LastCall {
    /// Last forkchoice state sent.
    pub forkchoice_sent: Option<ForkchoiceState>,
    /// Last payload attributes sent (with a forkchoice update).
    pub attributes_sent: Option<PayloadAttributes>,
    /// Last payload sent via `newPayload`.
    pub payload_sent: Option<ExecutableData>,
    /// Last `forkchoiceUpdated` response.
    pub forkchoice_response: Option<ForkchoiceResponse>,
    /// Last `newPayload` response.
    pub new_payload_response: Option<PayloadStatus>,
}

/// Where and how to reach one client under test.
#[derive(Debug, Clone)]
pub struct EngineClientConfig {
    /// Display name, unique within a test.
    pub id: String,
    /// Engine API endpoint.
    pub engine_url: Url,
    /// Eth API endpoint.
    pub eth_url: Url,
    /// JWT secret the client was started with.
    pub jwt_secret: JwtSecret,
    /// The client's enode URL, when devp2p steps will dial it.
    pub enode: Option<String>,
    /// Terminal total difficulty of the test chain.
    pub terminal_total_difficulty: U256,
}

#[derive(Debug, Default)]
struct NonceInfo {
    previous_block: B256,
    previous_nonce: u64,
}

/// One execution-layer client under test.
#[derive(Debug)]
pub struct EngineClient {
    id: String,
    engine: RpcClient,
    eth: RpcClient,
    enode: Option<String>,
    terminal_total_difficulty: U256,
    jwt_drift: Arc<AtomicI64>,
    last_call: Mutex<LastCall>,
    nonce_cache: Mutex<HashMap<Address, NonceInfo>>,
}

impl EngineClient {
    /// Connects the facade to a client's two RPC endpoints.
    pub fn new(config: EngineClientConfig) -> Self {
        let auth = JwtAuthLayer::new(config.jwt_secret);
        let jwt_drift = auth.drift_handle();

        let engine_hyper = Client::builder(TokioExecutor::new()).build_http::<Full<Bytes>>();
        let engine_service = ServiceBuilder::new().layer(auth).service(engine_hyper);
        let engine = RpcClient::new(
            Http::with_client(HyperClient::with_service(engine_service), config.engine_url),
            true,
        );

        let eth_hyper = Client::builder(TokioExecutor::new()).build_http::<Full<Bytes>>();
        let eth_service = ServiceBuilder::new().service(eth_hyper);
        let eth = RpcClient::new(
            Http::with_client(HyperClient::with_service(eth_service), config.eth_url),
            true,
        );

        Self {
            id: config.id,
            engine,
            eth,
            enode: config.enode,
            terminal_total_difficulty: config.terminal_total_difficulty,
            jwt_drift,
            last_call: Mutex::new(LastCall::default()),
            nonce_cache: Mutex::new(HashMap::default()),
        }
    }

    /// Display name of the client.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The client's enode URL, when known.
    pub fn enode(&self) -> Option<&str> {
        self.enode.as_deref()
    }

    /// Terminal total difficulty of the chain this client runs.
    pub const fn terminal_total_difficulty(&self) -> U256 {
        self.terminal_total_difficulty
    }

    /// Shifts the `iat` claim of every subsequent Engine API token by
    /// `seconds`.
    pub fn set_jwt_drift(&self, seconds: i64) {
        self.jwt_drift.store(seconds, Ordering::Relaxed);
    }

    /// Restores undrifted tokens.
    pub fn clear_jwt_drift(&self) {
        self.set_jwt_drift(0);
    }

    /// Snapshot of the latest sent/received Engine API traffic.
    pub fn last_call(&self) -> LastCall {
        self.lock_last_call().clone()
    }

    fn lock_last_call(&self) -> std::sync::MutexGuard<'_, LastCall> {
        self.last_call.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    async fn call<T>(
        &self,
        fut: impl Future<Output = Result<T, alloy_transport::RpcError<alloy_transport::TransportErrorKind>>>,
    ) -> Result<T, EngineApiError> {
        match tokio::time::timeout(RPC_TIMEOUT, fut).await {
            Ok(result) => result.map_err(EngineApiError::from_transport),
            Err(_) => Err(EngineApiError::Timeout),
        }
    }

    // --- Engine API -------------------------------------------------------

    /// `engine_newPayloadV{version}`. V3 and later append the versioned
    /// hashes and parent beacon block root carried by the payload.
    pub async fn new_payload(
        &self,
        version: EngineVersion,
        payload: &ExecutableData,
    ) -> Result<PayloadStatus, EngineApiError> {
        let method = format!("engine_newPayloadV{}", version.as_u8());
        debug!(target: "engine_client", client = %self.id, %method, block = payload.block_number, hash = %payload.block_hash, "sending payload");
        self.lock_last_call().payload_sent = Some(payload.clone());

        let result: Result<PayloadStatus, EngineApiError> = if version >= EngineVersion::V3 {
            self.call(self.engine.request(
                method,
                (
                    payload.clone(),
                    payload.versioned_hashes.clone(),
                    payload.parent_beacon_block_root,
                ),
            ))
            .await
        } else {
            self.call(self.engine.request(method, (payload.clone(),))).await
        };

        if let Ok(status) = &result {
            self.lock_last_call().new_payload_response = Some(status.clone());
        }
        result
    }

    /// `engine_forkchoiceUpdatedV{version}`.
    pub async fn forkchoice_updated(
        &self,
        version: EngineVersion,
        state: &ForkchoiceState,
        attributes: Option<&PayloadAttributes>,
    ) -> Result<ForkchoiceResponse, EngineApiError> {
        let method = format!("engine_forkchoiceUpdatedV{}", version.as_u8());
        debug!(target: "engine_client", client = %self.id, %method, head = %state.head_block_hash, with_attributes = attributes.is_some(), "updating forkchoice");
        {
            let mut last = self.lock_last_call();
            last.forkchoice_sent = Some(*state);
            last.attributes_sent = attributes.cloned();
        }

        let result: Result<ForkchoiceResponse, EngineApiError> = self
            .call(self.engine.request(method, (*state, attributes.cloned())))
            .await;
        if let Ok(response) = &result {
            self.lock_last_call().forkchoice_response = Some(response.clone());
        }
        result
    }

    /// `engine_getPayloadV{version}`. V1 returns the bare payload, shimmed
    /// into the envelope with a zero block value.
    pub async fn get_payload(
        &self,
        version: EngineVersion,
        payload_id: PayloadId,
    ) -> Result<GetPayloadResponse, EngineApiError> {
        let method = format!("engine_getPayloadV{}", version.as_u8());
        debug!(target: "engine_client", client = %self.id, %method, id = %payload_id, "requesting payload");
        if version == EngineVersion::V1 {
            let execution_payload: ExecutableData =
                self.call(self.engine.request(method, (payload_id,))).await?;
            Ok(GetPayloadResponse { execution_payload, ..Default::default() })
        } else {
            self.call(self.engine.request(method, (payload_id,))).await
        }
    }

    /// `engine_exchangeCapabilities`.
    pub async fn exchange_capabilities(
        &self,
        capabilities: Vec<String>,
    ) -> Result<Vec<String>, EngineApiError> {
        self.call(self.engine.request("engine_exchangeCapabilities", (capabilities,))).await
    }

    /// `engine_exchangeTransitionConfigurationV1`.
    pub async fn exchange_transition_configuration(
        &self,
        configuration: &TransitionConfiguration,
    ) -> Result<TransitionConfiguration, EngineApiError> {
        self.call(
            self.engine
                .request("engine_exchangeTransitionConfigurationV1", (configuration.clone(),)),
        )
        .await
    }

    /// `engine_getPayloadBodiesByRangeV1`.
    pub async fn get_payload_bodies_by_range(
        &self,
        start: u64,
        count: u64,
    ) -> Result<Vec<Option<ExecutionPayloadBodyV1>>, EngineApiError> {
        self.call(self.engine.request(
            "engine_getPayloadBodiesByRangeV1",
            (U64::from(start), U64::from(count)),
        ))
        .await
    }

    /// `engine_getPayloadBodiesByHashV1`.
    pub async fn get_payload_bodies_by_hash(
        &self,
        hashes: Vec<B256>,
    ) -> Result<Vec<Option<ExecutionPayloadBodyV1>>, EngineApiError> {
        self.call(self.engine.request("engine_getPayloadBodiesByHashV1", (hashes,))).await
    }

    // --- Eth API ----------------------------------------------------------

    /// `eth_getBlockByNumber` with transaction hashes only.
    pub async fn block_by_number(
        &self,
        tag: BlockNumberOrTag,
    ) -> Result<Option<Block>, EngineApiError> {
        self.call(self.eth.request("eth_getBlockByNumber", (tag, false))).await
    }

    /// `eth_getBlockByHash` with transaction hashes only.
    pub async fn block_by_hash(&self, hash: B256) -> Result<Option<Block>, EngineApiError> {
        self.call(self.eth.request("eth_getBlockByHash", (hash, false))).await
    }

    /// Header of the block at `tag`, failing on absence.
    pub async fn header_by_number(&self, tag: BlockNumberOrTag) -> Result<Header, EngineApiError> {
        self.block_by_number(tag)
            .await?
            .map(|block| block.header)
            .ok_or(EngineApiError::NullResponse("eth_getBlockByNumber"))
    }

    /// Latest header together with the client-reported total difficulty.
    pub async fn head_and_total_difficulty(
        &self,
    ) -> Result<(Header, U256), EngineApiError> {
        let header = self.header_by_number(BlockNumberOrTag::Latest).await?;
        let total_difficulty = header.total_difficulty.unwrap_or_default();
        Ok((header, total_difficulty))
    }

    /// `eth_blockNumber`.
    pub async fn block_number(&self) -> Result<u64, EngineApiError> {
        let number: U64 = self.call(self.eth.request("eth_blockNumber", ())).await?;
        Ok(number.to())
    }

    /// `eth_getBalance`.
    pub async fn balance_at(
        &self,
        address: Address,
        tag: BlockNumberOrTag,
    ) -> Result<U256, EngineApiError> {
        self.call(self.eth.request("eth_getBalance", (address, tag))).await
    }

    /// `eth_getTransactionCount`.
    pub async fn nonce_at(
        &self,
        address: Address,
        tag: BlockNumberOrTag,
    ) -> Result<u64, EngineApiError> {
        let nonce: U64 = self.call(self.eth.request("eth_getTransactionCount", (address, tag))).await?;
        Ok(nonce.to())
    }

    /// `eth_getStorageAt`.
    pub async fn storage_at(
        &self,
        address: Address,
        key: U256,
        tag: BlockNumberOrTag,
    ) -> Result<B256, EngineApiError> {
        self.call(self.eth.request("eth_getStorageAt", (address, key, tag))).await
    }

    /// Several `eth_getStorageAt` reads as one id-correlated JSON-RPC batch.
    pub async fn storage_at_keys(
        &self,
        address: Address,
        keys: &[U256],
        tag: BlockNumberOrTag,
    ) -> Result<HashMap<U256, B256>, EngineApiError> {
        let mut batch = self.eth.new_batch();
        let mut waiters = Vec::with_capacity(keys.len());
        for key in keys {
            let waiter = batch
                .add_call::<_, B256>("eth_getStorageAt", &(address, *key, tag))
                .map_err(EngineApiError::from_transport)?;
            waiters.push((*key, waiter));
        }
        match tokio::time::timeout(RPC_TIMEOUT, batch.send()).await {
            Ok(result) => result.map_err(EngineApiError::from_transport)?,
            Err(_) => return Err(EngineApiError::Timeout),
        }
        let mut values = HashMap::default();
        for (key, waiter) in waiters {
            values.insert(key, waiter.await.map_err(EngineApiError::from_transport)?);
        }
        Ok(values)
    }

    /// `eth_getTransactionReceipt`.
    pub async fn transaction_receipt(
        &self,
        hash: B256,
    ) -> Result<Option<TransactionReceipt>, EngineApiError> {
        self.call(self.eth.request("eth_getTransactionReceipt", (hash,))).await
    }

    /// `eth_getTransactionByHash`.
    pub async fn transaction_by_hash(
        &self,
        hash: B256,
    ) -> Result<Option<Transaction>, EngineApiError> {
        self.call(self.eth.request("eth_getTransactionByHash", (hash,))).await
    }

    /// `eth_sendRawTransaction`.
    pub async fn send_raw_transaction(&self, raw: &Bytes) -> Result<B256, EngineApiError> {
        self.call(self.eth.request("eth_sendRawTransaction", (raw.clone(),))).await
    }

    // --- Nonce cache ------------------------------------------------------

    /// The next nonce to use for `address`, avoiding a round-trip when the
    /// chain has advanced at most one block since the last query and has not
    /// reorged.
    pub async fn next_account_nonce(&self, address: Address) -> Result<u64, EngineApiError> {
        let head = self.header_by_number(BlockNumberOrTag::Latest).await?;
        {
            let mut cache = self.nonce_cache.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            if let Some(info) = cache.get_mut(&address) {
                if info.previous_block == head.hash || info.previous_block == head.parent_hash {
                    info.previous_nonce += 1;
                    info.previous_block = head.hash;
                    return Ok(info.previous_nonce);
                }
            }
        }
        let nonce = self.nonce_at(address, BlockNumberOrTag::Latest).await?;
        let mut cache = self.nonce_cache.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        cache.insert(address, NonceInfo { previous_block: head.hash, previous_nonce: nonce });
        Ok(nonce)
    }

    /// The nonce handed out by the last [`Self::next_account_nonce`] call,
    /// used to build replacement transactions.
    pub fn last_account_nonce(&self, address: Address) -> Option<u64> {
        let cache = self.nonce_cache.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        cache.get(&address).map(|info| info.previous_nonce)
    }
}

impl std::fmt::Display for EngineClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.id)
    }
}

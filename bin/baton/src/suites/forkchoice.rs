//! Forkchoice scenarios: unknown heads and reorg round-trips.

use crate::runner::{TestCase, TestKind};
use alloy_eips::BlockNumberOrTag;
use alloy_primitives::B256;
use alloy_rpc_types_engine::ForkchoiceState;
use async_trait::async_trait;
use baton_clmock::ClMockerConfig;
use baton_steps::{NewPayloads, StepError, TestContext, TestStep};
use baton_types::EngineVersion;
use rand::Rng;
use tracing::info;

/// A forkchoice pointing at a head the client has never seen must come back
/// `SYNCING` with no payload id.
pub fn unknown_head() -> TestCase {
    let steps: Vec<Box<dyn TestStep>> = vec![
        Box::new(NewPayloads::count(1)),
        Box::new(ForkchoiceToUnknownHead),
    ];
    TestCase {
        name: "forkchoice/unknown-head-syncing".to_string(),
        // Paris keeps V1 the fork-correct version for the probe.
        kind: TestKind::Scenario { mocker_config: ClMockerConfig::default(), steps },
    }
}

/// Rewinding the head one block and restoring it must both round-trip with
/// `VALID` and move `eth_getBlockByNumber("latest")` accordingly.
pub fn reorg_round_trip() -> TestCase {
    let steps: Vec<Box<dyn TestStep>> =
        vec![Box::new(NewPayloads::count(2)), Box::new(ReorgRoundTrip)];
    TestCase {
        name: "forkchoice/reorg-round-trip".to_string(),
        kind: TestKind::Scenario { mocker_config: ClMockerConfig::default(), steps },
    }
}

#[derive(Debug, Clone, Copy)]
struct ForkchoiceToUnknownHead;

#[async_trait]
impl TestStep for ForkchoiceToUnknownHead {
    async fn execute(&self, ctx: &TestContext) -> Result<(), StepError> {
        let engine = ctx.engine(0)?;
        let genesis_hash = ctx.cl_mock.lock().await.chain_view().genesis_hash;
        let unknown_head = {
            let mut rng = ctx.rng();
            B256::from(rng.random::<[u8; 32]>())
        };
        let state = ForkchoiceState {
            head_block_hash: unknown_head,
            safe_block_hash: genesis_hash,
            finalized_block_hash: genesis_hash,
        };
        let response = engine
            .forkchoice_updated(EngineVersion::V1, &state, None)
            .await
            .map_err(|err| StepError::engine(engine.id(), err))?;
        if !matches!(response.payload_status.status, baton_types::PayloadStatusKind::Syncing) {
            return Err(StepError::expectation(format!(
                "{}: forkchoice to unknown head {unknown_head} returned {}, expected SYNCING",
                engine.id(),
                response.payload_status.status
            )));
        }
        if let Some(payload_id) = response.payload_id {
            return Err(StepError::expectation(format!(
                "{}: syncing forkchoice returned payload id {payload_id}",
                engine.id()
            )));
        }
        Ok(())
    }

    fn description(&self) -> String {
        "forkchoice to a random unknown head".to_string()
    }
}

#[derive(Debug, Clone, Copy)]
struct ReorgRoundTrip;

impl ReorgRoundTrip {
    /// Points the head at `target` and checks the client adopts it.
    async fn move_head(
        engine: &baton_engine::EngineClient,
        version: EngineVersion,
        mut state: ForkchoiceState,
        target: B256,
    ) -> Result<(), StepError> {
        state.head_block_hash = target;
        let response = engine
            .forkchoice_updated(version, &state, None)
            .await
            .map_err(|err| StepError::engine(engine.id(), err))?;
        if !response.payload_status.status.is_valid()
            || response.payload_status.latest_valid_hash != Some(target)
        {
            return Err(StepError::expectation(format!(
                "{}: forkchoice to {target} returned {} (latestValidHash {:?})",
                engine.id(),
                response.payload_status.status,
                response.payload_status.latest_valid_hash
            )));
        }

        let head = engine
            .header_by_number(BlockNumberOrTag::Latest)
            .await
            .map_err(|err| StepError::engine(engine.id(), err))?;
        if head.hash != target {
            return Err(StepError::expectation(format!(
                "{}: latest block is {}, expected {target}",
                engine.id(),
                head.hash
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl TestStep for ReorgRoundTrip {
    async fn execute(&self, ctx: &TestContext) -> Result<(), StepError> {
        let engine = ctx.engine(0)?;
        let (previous, current, state, version) = {
            let mocker = ctx.cl_mock.lock().await;
            let history = mocker.head_history();
            if history.len() < 3 {
                return Err(StepError::MissingPrerequisite(
                    "reorg round-trip needs at least two produced blocks",
                ));
            }
            let head = mocker
                .latest_header()
                .ok_or(StepError::MissingPrerequisite("no canonical head"))?;
            let version =
                mocker.fork_config().forkchoice_updated_version(head.inner.timestamp, None);
            (
                history[history.len() - 2],
                history[history.len() - 1],
                mocker.latest_forkchoice(),
                version,
            )
        };

        info!(target: "forkchoice", %previous, %current, "reorging one block back and forth");
        Self::move_head(&engine, version, state, previous).await?;
        Self::move_head(&engine, version, state, current).await
    }

    fn description(&self) -> String {
        "reorg the head one block back, then restore it".to_string()
    }
}

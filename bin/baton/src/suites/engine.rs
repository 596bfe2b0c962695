//! Capability and payload-body retrieval scenarios.

use crate::runner::{TestCase, TestKind};
use async_trait::async_trait;
use baton_clmock::ClMockerConfig;
use baton_steps::{NewPayloads, StepError, TestContext, TestStep};
use baton_types::{ExecutableData, ForkConfig};
use tracing::debug;

const CAPABILITIES: &[&str] = &[
    "engine_newPayloadV1",
    "engine_newPayloadV2",
    "engine_newPayloadV3",
    "engine_forkchoiceUpdatedV1",
    "engine_forkchoiceUpdatedV2",
    "engine_forkchoiceUpdatedV3",
    "engine_getPayloadV1",
    "engine_getPayloadV2",
    "engine_getPayloadV3",
    "engine_getPayloadBodiesByRangeV1",
    "engine_getPayloadBodiesByHashV1",
];

/// Payload bodies fetched by range and by hash must agree with the payloads
/// the mocker broadcast, and the advertised capabilities must cover every
/// method the harness uses.
pub fn payload_bodies() -> TestCase {
    let steps: Vec<Box<dyn TestStep>> =
        vec![Box::new(NewPayloads::count(3)), Box::new(VerifyPayloadBodies)];
    TestCase {
        name: "engine/payload-bodies".to_string(),
        kind: TestKind::Scenario {
            mocker_config: ClMockerConfig {
                fork_config: ForkConfig::cancun_genesis(),
                ..Default::default()
            },
            steps,
        },
    }
}

#[derive(Debug, Clone, Copy)]
struct VerifyPayloadBodies;

impl VerifyPayloadBodies {
    fn check_body(
        payload: &ExecutableData,
        body: Option<&alloy_rpc_types_engine::ExecutionPayloadBodyV1>,
    ) -> Result<(), StepError> {
        let body = body.ok_or_else(|| {
            StepError::expectation(format!("no body returned for block {}", payload.block_number))
        })?;
        if body.transactions != payload.transactions {
            return Err(StepError::expectation(format!(
                "block {}: body transactions differ from the broadcast payload",
                payload.block_number
            )));
        }
        if body.withdrawals.as_deref() != payload.withdrawals.as_deref() {
            return Err(StepError::expectation(format!(
                "block {}: body withdrawals differ from the broadcast payload",
                payload.block_number
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl TestStep for VerifyPayloadBodies {
    async fn execute(&self, ctx: &TestContext) -> Result<(), StepError> {
        let engine = ctx.engine(0)?;

        let advertised = engine
            .exchange_capabilities(CAPABILITIES.iter().map(|cap| cap.to_string()).collect())
            .await
            .map_err(|err| StepError::engine(engine.id(), err))?;
        for required in CAPABILITIES {
            if !advertised.iter().any(|cap| cap == required) {
                return Err(StepError::expectation(format!(
                    "{}: capability {required} not advertised",
                    engine.id()
                )));
            }
        }

        let mocker = ctx.cl_mock.lock().await;
        let first = mocker
            .first_pos_block_number()
            .ok_or(StepError::MissingPrerequisite("transition did not happen"))?;
        let head_number = mocker
            .latest_header()
            .map(|header| header.inner.number)
            .ok_or(StepError::MissingPrerequisite("no canonical head"))?;
        let payloads: Vec<ExecutableData> = (first..=head_number)
            .filter_map(|number| mocker.executed_payload(number).cloned())
            .collect();
        if payloads.is_empty() {
            return Err(StepError::MissingPrerequisite("no payloads were produced"));
        }
        debug!(target: "engine", count = payloads.len(), "verifying payload bodies");

        let by_range = engine
            .get_payload_bodies_by_range(first, payloads.len() as u64)
            .await
            .map_err(|err| StepError::engine(engine.id(), err))?;
        if by_range.len() != payloads.len() {
            return Err(StepError::expectation(format!(
                "range response holds {} bodies, expected {}",
                by_range.len(),
                payloads.len()
            )));
        }
        for (payload, body) in payloads.iter().zip(&by_range) {
            Self::check_body(payload, body.as_ref())?;
        }

        let hashes = payloads.iter().map(|payload| payload.block_hash).collect();
        let by_hash = engine
            .get_payload_bodies_by_hash(hashes)
            .await
            .map_err(|err| StepError::engine(engine.id(), err))?;
        for (payload, body) in payloads.iter().zip(&by_hash) {
            Self::check_body(payload, body.as_ref())?;
        }
        Ok(())
    }

    fn description(&self) -> String {
        "verify advertised capabilities and payload bodies by range and hash".to_string()
    }
}

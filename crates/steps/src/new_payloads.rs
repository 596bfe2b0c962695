//! Block production with optional adversarial side calls.

use crate::{
    StepError, TestContext, TestStep, check_error_expectation, check_forkchoice_expectation,
    check_payload_expectation,
};
use alloy_eips::BlockNumberOrTag;
use alloy_primitives::{B256, U256};
use async_trait::async_trait;
use baton_clmock::{ClMocker, CycleHooks, MockerError, ProductionPhase};
use baton_customizer::{
    Expectation, FcuCustomizer, GetPayloadCustomizer, PayloadCustomizer, VersionShift,
};
use baton_types::{
    BlobId, ExecutableData, calc_excess_blob_gas, blob_gas_price,
    beacon_root_storage_indexes,
    globals::{BEACON_ROOTS_ADDRESS, GAS_PER_BLOB},
    test_accounts,
};
use std::time::Duration;
use tracing::debug;

/// Produces blocks through the consensus mock, optionally interleaving
/// customized Engine API calls at specific phases of each cycle, and
/// verifies the outcome of every produced payload.
#[derive(Debug, Default)]
pub struct NewPayloads {
    /// How many blocks to produce. Zero-valued `Default` still produces one.
    pub count: u64,
    /// Total blobs each payload must include.
    pub expected_included_blob_count: u64,
    /// Blob ids each payload's bundle must carry, with correct KZG data.
    pub expected_blobs: Vec<BlobId>,
    /// Overrides the build delay between `forkchoiceUpdated` and
    /// `getPayload`.
    pub get_payload_delay: Option<Duration>,
    /// Extra `forkchoiceUpdated` with attributes, sent to the producer after
    /// the canonical one. Its attributes patch also rewrites the canonical
    /// attributes of the cycle.
    pub fcu_customizer: Option<FcuCustomizer>,
    /// Extra `getPayload` sent to the producer after the canonical one.
    pub get_payload_customizer: Option<GetPayloadCustomizer>,
    /// Extra `newPayload` broadcast after the canonical one.
    pub new_payload_customizer: Option<PayloadCustomizer>,
    /// Extra `forkchoiceUpdated` without attributes, sent after the head
    /// moved to the new payload.
    pub fcu_on_head_set: Option<FcuCustomizer>,
}

impl NewPayloads {
    /// Produces `count` blocks with no customization.
    pub fn count(count: u64) -> Self {
        Self { count, ..Default::default() }
    }

    fn block_count(&self) -> u64 {
        self.count.max(1)
    }
}

#[async_trait]
impl TestStep for NewPayloads {
    async fn execute(&self, ctx: &TestContext) -> Result<(), StepError> {
        let mut mocker = ctx.cl_mock.lock().await;
        if let Some(delay) = self.get_payload_delay {
            mocker.config_mut().payload_production_client_delay = delay;
        }

        for _ in 0..self.block_count() {
            let mut hooks = CycleDriver { step: self, ctx };
            mocker.produce_single_block(&mut hooks).await?;
            self.verify_payload(ctx, &mocker).await?;
            self.verify_blobs_bundle(&mocker)?;
        }
        Ok(())
    }

    fn description(&self) -> String {
        let mut parts = vec![format!("produce {} block(s)", self.block_count())];
        if self.expected_included_blob_count > 0 {
            parts.push(format!("{} blob(s) each", self.expected_included_blob_count));
        }
        if self.new_payload_customizer.is_some() {
            parts.push("with customized newPayload".to_string());
        }
        if self.fcu_customizer.is_some() || self.fcu_on_head_set.is_some() {
            parts.push("with customized forkchoiceUpdated".to_string());
        }
        if self.get_payload_customizer.is_some() {
            parts.push("with customized getPayload".to_string());
        }
        parts.join(", ")
    }
}

impl NewPayloads {
    /// Checks the broadcast payload against the chain the producer reports:
    /// blob gas accounting, per-transaction receipts and the beacon-roots
    /// ring buffer.
    async fn verify_payload(
        &self,
        ctx: &TestContext,
        mocker: &ClMocker,
    ) -> Result<(), StepError> {
        let payload = mocker
            .latest_payload_built()
            .ok_or(StepError::MissingPrerequisite("no payload was built"))?;
        if !mocker.fork_config().is_cancun(payload.timestamp) {
            return Ok(());
        }
        let producer = mocker
            .latest_producer()
            .ok_or(StepError::MissingPrerequisite("no producer recorded"))?;

        // Excess blob gas follows the consensus recursion over the parent's
        // counters, with pre-Cancun parents counting as zero.
        let parent = mocker.executed_payload(payload.block_number.saturating_sub(1));
        let expected_excess = calc_excess_blob_gas(
            parent.and_then(|p| p.excess_blob_gas).unwrap_or(0),
            parent.and_then(|p| p.blob_gas_used).unwrap_or(0),
        );
        if payload.excess_blob_gas != Some(expected_excess) {
            return Err(StepError::expectation(format!(
                "block {}: excessBlobGas {:?}, expected {expected_excess}",
                payload.block_number, payload.excess_blob_gas
            )));
        }

        let included_blobs =
            self.verify_blob_receipts(ctx, mocker, payload, producer.id()).await?;
        if included_blobs != self.expected_included_blob_count {
            return Err(StepError::expectation(format!(
                "block {}: {included_blobs} blob(s) included, expected {}",
                payload.block_number, self.expected_included_blob_count
            )));
        }

        if let Some(beacon_root) = payload.parent_beacon_block_root {
            self.verify_beacon_root_storage(producer, payload, beacon_root).await?;
        }
        Ok(())
    }

    /// Receipts of every included blob transaction must report the blob gas
    /// the payload's counters imply. Returns the total included blob count.
    async fn verify_blob_receipts(
        &self,
        ctx: &TestContext,
        mocker: &ClMocker,
        payload: &ExecutableData,
        producer_id: &str,
    ) -> Result<u64, StepError> {
        let producer = mocker
            .latest_producer()
            .ok_or(StepError::MissingPrerequisite("no producer recorded"))?;
        let expected_price = blob_gas_price(payload.excess_blob_gas.unwrap_or(0));

        let included: Vec<(B256, u64)> = {
            let pool = ctx.blob_pool.lock().await;
            pool.in_order()
                .filter(|tx| payload.transactions.contains(&tx.payload_encoding))
                .map(|tx| (tx.hash, tx.blob_ids.len() as u64))
                .collect()
        };

        let mut included_blobs = 0u64;
        for (hash, blob_count) in included {
            let receipt = producer
                .transaction_receipt(hash)
                .await
                .map_err(|err| StepError::engine(producer_id, err))?
                .ok_or_else(|| {
                    StepError::expectation(format!(
                        "{producer_id}: no receipt for included blob transaction {hash}"
                    ))
                })?;
            let expected_gas = u128::from(GAS_PER_BLOB) * u128::from(blob_count);
            let reported_gas = receipt.blob_gas_used.map(u128::from);
            if reported_gas != Some(expected_gas) {
                return Err(StepError::expectation(format!(
                    "receipt of {hash}: blobGasUsed {reported_gas:?}, expected {expected_gas}"
                )));
            }
            let reported_price = receipt.blob_gas_price.map(u128::from);
            if reported_price != Some(expected_price) {
                return Err(StepError::expectation(format!(
                    "receipt of {hash}: blobGasPrice {reported_price:?}, expected {expected_price}"
                )));
            }
            included_blobs += blob_count;
            debug!(
                target: "steps",
                %hash,
                blobs = blob_count,
                "blob transaction receipt verified"
            );
        }

        // The payload's own counter must agree with the receipts.
        let counted_gas = included_blobs * GAS_PER_BLOB;
        if payload.blob_gas_used != Some(counted_gas) {
            return Err(StepError::expectation(format!(
                "block {}: blobGasUsed {:?}, receipts imply {counted_gas}",
                payload.block_number, payload.blob_gas_used
            )));
        }
        Ok(included_blobs)
    }

    /// The beacon-roots contract must hold `(timestamp, parent_beacon_root)`
    /// in its ring buffer at the new block.
    async fn verify_beacon_root_storage(
        &self,
        producer: &std::sync::Arc<baton_engine::EngineClient>,
        payload: &ExecutableData,
        beacon_root: B256,
    ) -> Result<(), StepError> {
        let (timestamp_slot, root_slot) = beacon_root_storage_indexes(payload.timestamp);
        let storage = producer
            .storage_at_keys(
                BEACON_ROOTS_ADDRESS,
                &[timestamp_slot, root_slot],
                BlockNumberOrTag::Number(payload.block_number),
            )
            .await
            .map_err(|err| StepError::engine(producer.id(), err))?;

        let expected_timestamp = B256::from(U256::from(payload.timestamp));
        match storage.get(&timestamp_slot) {
            Some(stored) if *stored == expected_timestamp => {}
            stored => {
                return Err(StepError::expectation(format!(
                    "beacon-roots slot {timestamp_slot}: {stored:?}, expected timestamp {expected_timestamp}"
                )));
            }
        }
        match storage.get(&root_slot) {
            Some(stored) if *stored == beacon_root => Ok(()),
            stored => Err(StepError::expectation(format!(
                "beacon-roots slot {root_slot}: {stored:?}, expected root {beacon_root}"
            ))),
        }
    }

    /// The bundle returned with the payload must carry exactly the expected
    /// blobs, each with the KZG data its id derives.
    fn verify_blobs_bundle(&self, mocker: &ClMocker) -> Result<(), StepError> {
        if self.expected_included_blob_count == 0 && self.expected_blobs.is_empty() {
            return Ok(());
        }
        let bundle = mocker
            .latest_blobs_bundle()
            .ok_or(StepError::MissingPrerequisite("no blobs bundle was returned"))?;
        let len = bundle
            .len()
            .map_err(|err| StepError::expectation(format!("malformed bundle: {err}")))?;
        if len as u64 != self.expected_included_blob_count {
            return Err(StepError::expectation(format!(
                "bundle holds {len} blob(s), expected {}",
                self.expected_included_blob_count
            )));
        }
        for hash in bundle.versioned_hashes(1) {
            if hash[0] != 0x01 {
                return Err(StepError::expectation(format!(
                    "bundle versioned hash {hash} lacks the 0x01 version byte"
                )));
            }
        }
        for id in &self.expected_blobs {
            let position = bundle.position_of(*id).ok_or_else(|| {
                StepError::expectation(format!("{id} missing from the returned bundle"))
            })?;
            let (_, commitment, proof) = id.generate().map_err(|err| {
                StepError::expectation(format!("kzg derivation for {id}: {err}"))
            })?;
            if bundle.commitments[position] != commitment {
                return Err(StepError::expectation(format!(
                    "{id}: commitment mismatch at bundle index {position}"
                )));
            }
            if bundle.proofs[position] != proof {
                return Err(StepError::expectation(format!(
                    "{id}: proof mismatch at bundle index {position}"
                )));
            }
        }
        Ok(())
    }
}

/// Fires the step's customized calls at the matching production phases.
struct CycleDriver<'a> {
    step: &'a NewPayloads,
    ctx: &'a TestContext,
}

impl CycleDriver<'_> {
    async fn run_phase(
        &mut self,
        phase: ProductionPhase,
        mocker: &mut ClMocker,
    ) -> Result<(), StepError> {
        match phase {
            ProductionPhase::AttributesGenerated => self.patch_attributes(mocker),
            ProductionPhase::PayloadRequested => self.resend_fcu_with_attributes(mocker).await,
            ProductionPhase::PayloadRetrieved => self.resend_get_payload(mocker).await,
            ProductionPhase::NewPayloadBroadcast => self.send_customized_payload(mocker).await,
            ProductionPhase::ForkchoiceBroadcast => self.resend_head_fcu(mocker).await,
            ProductionPhase::ProducerSelected => Ok(()),
        }
    }

    fn patch_attributes(&self, mocker: &mut ClMocker) -> Result<(), StepError> {
        let Some(patch) = self.step.fcu_customizer.as_ref().and_then(|fcu| fcu.attributes.as_ref())
        else {
            return Ok(());
        };
        let mut attributes = mocker
            .latest_payload_attributes()
            .cloned()
            .ok_or(StepError::MissingPrerequisite("no attributes were generated"))?;
        patch.apply(&mut attributes);
        mocker.set_latest_payload_attributes(attributes);
        Ok(())
    }

    async fn resend_fcu_with_attributes(&self, mocker: &ClMocker) -> Result<(), StepError> {
        let Some(fcu) = &self.step.fcu_customizer else { return Ok(()) };
        if fcu.version == VersionShift::Keep && fcu.expectation == Expectation::default() {
            return Ok(());
        }
        let producer = mocker
            .latest_producer()
            .ok_or(StepError::MissingPrerequisite("no producer recorded"))?;
        let head = mocker
            .latest_header()
            .ok_or(StepError::MissingPrerequisite("no canonical head"))?;
        let attributes = mocker
            .latest_payload_attributes()
            .ok_or(StepError::MissingPrerequisite("no attributes were generated"))?;
        let version = fcu.version.apply(
            mocker
                .fork_config()
                .forkchoice_updated_version(head.inner.timestamp, Some(attributes.timestamp)),
        );
        let result = producer
            .forkchoice_updated(version, &mocker.latest_forkchoice(), Some(attributes))
            .await;
        check_forkchoice_expectation(&fcu.expectation, producer.id(), result)
    }

    async fn resend_get_payload(&self, mocker: &ClMocker) -> Result<(), StepError> {
        let Some(get_payload) = &self.step.get_payload_customizer else { return Ok(()) };
        let producer = mocker
            .latest_producer()
            .ok_or(StepError::MissingPrerequisite("no producer recorded"))?;
        let attributes = mocker
            .latest_payload_attributes()
            .ok_or(StepError::MissingPrerequisite("no attributes were generated"))?;
        let payload_id = mocker
            .latest_payload_id()
            .ok_or(StepError::MissingPrerequisite("no payload id recorded"))?;
        let version = get_payload
            .version
            .apply(mocker.fork_config().get_payload_version(attributes.timestamp));
        let result = producer.get_payload(version, payload_id).await;
        check_error_expectation(&get_payload.expectation, producer.id(), result)
    }

    async fn send_customized_payload(&self, mocker: &ClMocker) -> Result<(), StepError> {
        let Some(customizer) = &self.step.new_payload_customizer else { return Ok(()) };
        let base = mocker
            .latest_payload_built()
            .ok_or(StepError::MissingPrerequisite("no payload was built"))?;
        let customized = {
            let mut rng = self.ctx.rng();
            customizer.customize(base, test_accounts()[0].signer(), &mut *rng)?
        };
        let version = customizer
            .version
            .apply(mocker.fork_config().new_payload_version(customized.timestamp));
        for engine in mocker.engines() {
            let result = engine.new_payload(version, &customized).await;
            check_payload_expectation(&customizer.expectation, engine.id(), result)?;
        }
        Ok(())
    }

    async fn resend_head_fcu(&self, mocker: &ClMocker) -> Result<(), StepError> {
        let Some(fcu) = &self.step.fcu_on_head_set else { return Ok(()) };
        let head = mocker
            .latest_header()
            .ok_or(StepError::MissingPrerequisite("no canonical head"))?;
        let version = fcu
            .version
            .apply(mocker.fork_config().forkchoice_updated_version(head.inner.timestamp, None));
        let state = mocker.latest_forkchoice();
        for engine in mocker.engines() {
            let result = engine.forkchoice_updated(version, &state, None).await;
            check_forkchoice_expectation(&fcu.expectation, engine.id(), result)?;
        }
        Ok(())
    }
}

#[async_trait]
impl CycleHooks for CycleDriver<'_> {
    async fn on_phase(
        &mut self,
        phase: ProductionPhase,
        mocker: &mut ClMocker,
    ) -> Result<(), MockerError> {
        self.run_phase(phase, mocker).await.map_err(MockerError::hook)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, 1)]
    #[case(1, 1)]
    #[case(4, 4)]
    fn block_count_clamps_to_one(#[case] count: u64, #[case] expected: u64) {
        assert_eq!(NewPayloads::count(count).block_count(), expected);
    }

    #[test]
    fn description_names_the_customizations() {
        let plain = NewPayloads::count(2);
        assert_eq!(plain.description(), "produce 2 block(s)");

        let customized = NewPayloads {
            count: 1,
            expected_included_blob_count: 3,
            new_payload_customizer: Some(PayloadCustomizer::default()),
            ..Default::default()
        };
        let description = customized.description();
        assert!(description.contains("3 blob(s)"));
        assert!(description.contains("customized newPayload"));
    }
}

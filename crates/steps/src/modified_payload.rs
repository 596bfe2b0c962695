//! Re-sending a doctored copy of the canonical payload.

use crate::{StepError, TestContext, TestStep, check_payload_expectation};
use async_trait::async_trait;
use baton_customizer::PayloadCustomizer;
use baton_types::test_accounts;
use tracing::info;

/// Sends a customized copy of the most recently produced payload to one
/// client and checks the response against the customizer's expectation.
///
/// The canonical chain is untouched: the mocker keeps broadcasting the
/// original payload, this step only probes how a client judges the doctored
/// variant.
#[derive(Debug)]
pub struct SendModifiedLatestPayload {
    /// Which client receives the payload.
    pub client_index: usize,
    /// What to change and what to expect back.
    pub customizer: PayloadCustomizer,
}

#[async_trait]
impl TestStep for SendModifiedLatestPayload {
    async fn execute(&self, ctx: &TestContext) -> Result<(), StepError> {
        let engine = ctx.engine(self.client_index)?;
        let (payload, version) = {
            let mocker = ctx.cl_mock.lock().await;
            let base = mocker
                .latest_payload_built()
                .ok_or(StepError::MissingPrerequisite("no payload was built"))?;
            let payload = {
                let mut rng = ctx.rng();
                self.customizer.customize(base, test_accounts()[0].signer(), &mut *rng)?
            };
            let version = self
                .customizer
                .version
                .apply(mocker.fork_config().new_payload_version(payload.timestamp));
            (payload, version)
        };

        info!(
            target: "steps",
            client = engine.id(),
            number = payload.block_number,
            hash = %payload.block_hash,
            "sending modified payload"
        );
        let result = engine.new_payload(version, &payload).await;
        check_payload_expectation(&self.customizer.expectation, engine.id(), result)
    }

    fn description(&self) -> String {
        let mutation = self
            .customizer
            .invalid
            .map(|field| format!(" invalidating {}", field.name()))
            .unwrap_or_default();
        format!("send modified latest payload{mutation} to client {}", self.client_index)
    }
}

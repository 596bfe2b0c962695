//! Blob transaction submission.

use crate::{StepError, TestContext, TestStep};
use async_trait::async_trait;
use baton_types::{
    BlobId, BlobTransactionSpec,
    globals::{GAS_PRICE, GAS_TIP_PRICE},
    test_accounts,
};
use tracing::info;

/// Builds and submits EIP-4844 transactions carrying deterministic blobs,
/// recording them in the shared pool for later verification.
#[derive(Debug, Clone)]
pub struct SendBlobTransactions {
    /// How many transactions to send.
    pub count: u64,
    /// Blobs each transaction carries.
    pub blobs_per_tx: u64,
    /// Max fee per blob gas.
    pub max_fee_per_blob_gas: u128,
    /// Max fee per gas.
    pub gas_fee_cap: u128,
    /// Max priority fee per gas.
    pub gas_tip_cap: u128,
    /// Replace the previously sent transaction instead of using a fresh
    /// nonce, bumping both fees to beat the mempool's replacement rule.
    pub replace: bool,
    /// Which deterministic test account signs.
    pub account_index: usize,
    /// Which client receives the transactions.
    pub client_index: usize,
}

impl Default for SendBlobTransactions {
    fn default() -> Self {
        Self {
            count: 1,
            blobs_per_tx: 1,
            max_fee_per_blob_gas: 1,
            gas_fee_cap: GAS_PRICE,
            gas_tip_cap: GAS_TIP_PRICE,
            replace: false,
            account_index: 0,
            client_index: 0,
        }
    }
}

#[async_trait]
impl TestStep for SendBlobTransactions {
    async fn execute(&self, ctx: &TestContext) -> Result<(), StepError> {
        let engine = ctx.engine(self.client_index)?;
        let accounts = test_accounts();
        let account = accounts
            .get(self.account_index)
            .ok_or(StepError::MissingPrerequisite("test account index out of range"))?;

        for _ in 0..self.count {
            let (nonce, fee_multiplier) = if self.replace {
                let nonce = engine
                    .last_account_nonce(account.address())
                    .ok_or(StepError::MissingPrerequisite(
                        "replacement requires a previously sent transaction",
                    ))?;
                (nonce, 2u128)
            } else {
                let nonce = engine
                    .next_account_nonce(account.address())
                    .await
                    .map_err(|err| StepError::engine(engine.id(), err))?;
                (nonce, 1u128)
            };

            let first_blob_id = {
                let pool = ctx.blob_pool.lock().await;
                pool.current_blob_id
            };
            let spec = BlobTransactionSpec {
                nonce,
                gas_fee_cap: self.gas_fee_cap * fee_multiplier,
                gas_tip_cap: self.gas_tip_cap * fee_multiplier,
                max_fee_per_blob_gas: self.max_fee_per_blob_gas * fee_multiplier,
                first_blob_id,
                blob_count: self.blobs_per_tx,
                ..Default::default()
            };
            let tx = spec.sign(account.signer())?;

            engine
                .send_raw_transaction(&tx.pooled_encoding)
                .await
                .map_err(|err| StepError::engine(engine.id(), err))?;
            info!(
                target: "steps",
                client = engine.id(),
                hash = %tx.hash,
                nonce,
                blobs = self.blobs_per_tx,
                replace = self.replace,
                "blob transaction sent"
            );

            let mut pool = ctx.blob_pool.lock().await;
            pool.current_blob_id = BlobId(pool.current_blob_id.0 + self.blobs_per_tx);
            pool.add_transaction(tx);
        }
        Ok(())
    }

    fn description(&self) -> String {
        format!(
            "send {} blob transaction(s) with {} blob(s) each to client {}{}",
            self.count,
            self.blobs_per_tx,
            self.client_index,
            if self.replace { " (replacement)" } else { "" }
        )
    }
}

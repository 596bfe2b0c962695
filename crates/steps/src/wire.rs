//! Wire-protocol steps: peering with a client over devp2p and retrieving
//! pooled blob transactions.

use crate::{StepError, TestContext, TestStep};
use alloy_primitives::B256;
use async_trait::async_trait;
use baton_devp2p::{Conn, DevP2pError, TxAnnouncement};
use rand::{RngCore, SeedableRng, rngs::StdRng};
use std::time::Duration;
use tracing::info;

const WIRE_DEADLINE: Duration = Duration::from_secs(60);

/// Dials a client's enode, performs the RLPx and eth/68 handshakes against
/// the canonical chain view, and exchanges a ping.
#[derive(Debug, Clone, Default)]
pub struct DevP2PClientPeering {
    /// Which client to dial.
    pub client_index: usize,
}

impl DevP2PClientPeering {
    async fn connect(&self, ctx: &TestContext) -> Result<Conn, StepError> {
        let engine = ctx.engine(self.client_index)?;
        let enode = engine
            .enode()
            .ok_or_else(|| StepError::MissingEnode(engine.id().to_string()))?
            .parse()
            .map_err(DevP2pError::from)?;
        // The session gets its own rng forked off the test's, so the shared
        // guard is not held across the dial.
        let mut session_rng = {
            let mut rng = ctx.rng();
            StdRng::seed_from_u64(rng.next_u64())
        };
        let mut conn = Conn::dial(&enode, &mut session_rng).await?;
        let hello = conn.handshake().await?;
        info!(
            target: "steps",
            client = engine.id(),
            remote = %hello.client_id,
            "rlpx handshake complete"
        );

        let chain = ctx.cl_mock.lock().await.chain_view();
        let status = conn.status_exchange(&chain).await?;
        info!(
            target: "steps",
            client = engine.id(),
            head = %status.head,
            "eth status exchanged"
        );
        Ok(conn)
    }
}

#[async_trait]
impl TestStep for DevP2PClientPeering {
    async fn execute(&self, ctx: &TestContext) -> Result<(), StepError> {
        let mut conn = self.connect(ctx).await?;
        conn.ping(WIRE_DEADLINE).await?;
        Ok(())
    }

    fn description(&self) -> String {
        format!("peer with client {} over devp2p", self.client_index)
    }
}

/// Requests previously submitted blob transactions from a client's mempool
/// over devp2p and checks the returned pooled encodings byte for byte.
#[derive(Debug, Clone, Default)]
pub struct DevP2PRequestPooledTransactionHash {
    /// Which client to dial.
    pub client_index: usize,
    /// Submission indexes of the transactions to request.
    pub transaction_indexes: Vec<u64>,
    /// Wait for the client to announce the hashes before requesting them.
    pub wait_for_announcement: bool,
}

#[async_trait]
impl TestStep for DevP2PRequestPooledTransactionHash {
    async fn execute(&self, ctx: &TestContext) -> Result<(), StepError> {
        let (hashes, announcements, expected): (Vec<B256>, Vec<TxAnnouncement>, Vec<_>) = {
            let pool = ctx.blob_pool.lock().await;
            let mut hashes = Vec::with_capacity(self.transaction_indexes.len());
            let mut announcements = Vec::with_capacity(self.transaction_indexes.len());
            let mut expected = Vec::with_capacity(self.transaction_indexes.len());
            for index in &self.transaction_indexes {
                let tx = pool.by_index(*index).ok_or(StepError::MissingPrerequisite(
                    "requested transaction index was never submitted",
                ))?;
                hashes.push(tx.hash);
                announcements.push(TxAnnouncement {
                    hash: tx.hash,
                    tx_type: 0x03,
                    size: tx.pooled_encoding.len() as u64,
                });
                expected.push(tx.pooled_encoding.clone());
            }
            (hashes, announcements, expected)
        };

        let peering = DevP2PClientPeering { client_index: self.client_index };
        let mut conn = peering.connect(ctx).await?;

        if self.wait_for_announcement {
            conn.wait_for_transaction_announcement(&announcements, WIRE_DEADLINE).await?;
            info!(
                target: "steps",
                count = announcements.len(),
                "transaction announcements received"
            );
        }

        let returned = conn.get_pooled_transactions(&hashes, WIRE_DEADLINE).await?;
        if returned.len() != expected.len() {
            return Err(StepError::expectation(format!(
                "pooled transactions response holds {} item(s), expected {}",
                returned.len(),
                expected.len()
            )));
        }
        for (index, (got, want)) in returned.iter().zip(&expected).enumerate() {
            if got != want {
                return Err(StepError::expectation(format!(
                    "pooled transaction {index} differs from the submitted encoding"
                )));
            }
        }
        Ok(())
    }

    fn description(&self) -> String {
        format!(
            "retrieve {} pooled transaction(s) from client {} over devp2p",
            self.transaction_indexes.len(),
            self.client_index
        )
    }
}

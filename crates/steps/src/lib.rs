//! # baton-steps
//!
//! The declarative test-step layer: a test is a sequence of [`TestStep`]s
//! executed against a shared [`TestContext`], the first error terminating
//! the sequence.
//!
//! ## Overview
//!
//! Steps cover block production with adversarial customizations
//! ([`NewPayloads`], [`SendModifiedLatestPayload`]), blob transaction
//! submission ([`SendBlobTransactions`]), wire-protocol checks
//! ([`DevP2PClientPeering`], [`DevP2PRequestPooledTransactionHash`]),
//! client-set growth ([`LaunchClients`]) and fork-join composition
//! ([`ParallelSteps`]).

#![cfg_attr(not(test), warn(unused_crate_dependencies))]

use async_trait::async_trait;

mod error;
pub use error::StepError;

mod context;
pub use context::{ClientStarter, StaticStarter, TestBlobTxPool, TestContext, TestEnv};

mod launch;
pub use launch::LaunchClients;

mod new_payloads;
pub use new_payloads::NewPayloads;

mod blob_transactions;
pub use blob_transactions::SendBlobTransactions;

mod modified_payload;
pub use modified_payload::SendModifiedLatestPayload;

mod wire;
pub use wire::{DevP2PClientPeering, DevP2PRequestPooledTransactionHash};

mod parallel;
pub use parallel::ParallelSteps;

mod expect;
pub use expect::{
    check_error_expectation, check_forkchoice_expectation, check_payload_expectation,
};

/// One executable unit of a test sequence.
#[async_trait]
pub trait TestStep: Send + Sync {
    /// Runs the step against the shared context.
    async fn execute(&self, ctx: &TestContext) -> Result<(), StepError>;

    /// Human-readable summary for `INFO`/`FAIL` lines.
    fn description(&self) -> String;
}

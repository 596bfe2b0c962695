//! # baton-clmock
//!
//! A deterministic imitation of a beacon chain driving execution-layer
//! clients through the PoS block-production cycle.
//!
//! ## Overview
//!
//! The [`ClMocker`] owns a set of [`EngineClient`]s and advances them one
//! block at a time:
//!
//! 1. pick a producer whose head agrees with the canonical view;
//! 2. generate payload attributes and request a build via
//!    `forkchoiceUpdated`;
//! 3. collect the payload via `getPayload` and cross-check it against the
//!    attributes;
//! 4. broadcast `newPayload` to every peer;
//! 5. broadcast the advanced forkchoice (head/safe/finalized) to every peer;
//! 6. verify at least one peer canonicalized the block.
//!
//! Between phases the cycle reports to a [`CycleHooks`] implementation, which
//! is how the test-step layer wires customized payloads and extra calls into
//! a cycle without the mocker knowing about test DSL types.
//!
//! [`EngineClient`]: baton_engine::EngineClient

#![cfg_attr(not(test), warn(unused_crate_dependencies))]

mod error;
pub use error::MockerError;

mod hooks;
pub use hooks::{CycleHooks, NoHooks, ProductionPhase};

mod mocker;
pub use mocker::{ClMocker, ClMockerConfig, timestamp_to_beacon_root};

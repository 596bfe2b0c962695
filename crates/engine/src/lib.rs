//! # baton-engine
//!
//! The Engine API client facade of the baton harness.
//!
//! ## Overview
//!
//! One [`EngineClient`] fronts one execution-layer client under test. It
//! speaks both RPC surfaces of the client:
//!
//! - the **Engine API** (port 8551), authenticated per call with a freshly
//!   minted JWT whose `iat` can be drifted by tests;
//! - the **Eth API** (port 8545), unauthenticated, used by assertions.
//!
//! Calls go through a raw [`alloy_rpc_client::RpcClient`] so tests choose the
//! exact versioned method string and observe JSON-RPC error codes verbatim.
//! The client keeps a [`LastCall`] record of the most recent requests and
//! responses, which the CL mocker queries instead of being written into.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]

mod auth;
pub use auth::JwtAuthLayer;

mod error;
pub use error::{EngineApiError, codes};

mod client;
pub use client::{
    EngineClient, EngineClientConfig, LastCall, TransitionConfiguration,
};

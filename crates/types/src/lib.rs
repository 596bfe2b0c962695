//! # baton-types
//!
//! Core data model for the baton Engine API conformance harness.
//!
//! ## Overview
//!
//! This crate holds the types every other layer of the harness speaks:
//!
//! - [`ExecutableData`]: the Engine API execution payload, with bit-exact
//!   header reconstruction and block-hash derivation.
//! - [`PayloadAttributes`] and the payload status / forkchoice response
//!   shapes returned by the Engine API.
//! - [`BlobId`] and [`BlobsBundle`]: deterministic blob construction and the
//!   KZG commitment/proof/versioned-hash derivation chain.
//! - [`BlobTransaction`]: signed EIP-4844 transactions in both payload and
//!   pooled (network) encodings.
//! - [`ForkConfig`]: per-fork activation timestamps and the Engine API
//!   version-dispatch rules, plus EIP-2124 fork identifiers.
//! - [`globals`]: the fixed chain parameters and deterministic test accounts
//!   shared by every test.
//! - [`fixtures`]: the pytest-style JSON fixture format replayed through
//!   `engine_newPayload`.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]

/// Fixed chain parameters, well-known addresses, and test accounts.
pub mod globals;
pub use globals::{TestAccount, test_accounts};

mod payload;
pub use payload::{ExecutableData, GetPayloadResponse, PayloadAttributes};

mod status;
pub use status::{ForkchoiceResponse, PayloadStatus, PayloadStatusKind};

mod blobs;
pub use blobs::{Blob, BlobError, BlobId, BlobsBundle, Bytes48, commitment_versioned_hash};

mod gas;
pub use gas::{
    beacon_root_storage_indexes, blob_gas_price, calc_excess_blob_gas, fake_exponential,
};

mod fork;
pub use fork::{EngineVersion, Fork, ForkConfig, ForkId};

mod chain;
pub use chain::{ChainView, HeadersOrigin};

mod transactions;
pub use transactions::{BlobTransaction, BlobTransactionSpec, TransactionError};

/// Pytest-style fixture format and loader.
pub mod fixtures;
pub use fixtures::{Fixture, FixtureBlock, FixtureEngineNewPayload, FixtureError};

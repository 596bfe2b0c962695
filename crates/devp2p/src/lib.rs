//! # baton-devp2p
//!
//! A minimal RLPx + `eth/68` client, just enough wire protocol to check that
//! a client under test announces and serves pooled transactions correctly.
//!
//! ## Overview
//!
//! - [`ecies`]: the RLPx v4 encrypted handshake (auth/ack) and session-secret
//!   derivation.
//! - [`frame`]: the framed transport: AES-256-CTR frame encryption with the
//!   keccak-based header and body MACs.
//! - [`Conn`]: dial by enode, `Hello` and `Status` exchange against a
//!   [`ChainView`], a serve loop answering `Ping` and `GetBlockHeaders`, and
//!   the pooled-transaction request/announcement checks.
//!
//! [`ChainView`]: baton_types::ChainView

#![cfg_attr(not(test), warn(unused_crate_dependencies))]

mod error;
pub use error::DevP2pError;

mod enode;
pub use enode::Enode;

pub mod ecies;

mod frame;
pub use frame::FrameCodec;

mod messages;
pub use messages::{
    BlockHeaders, Capability, GetBlockHeaders, GetPooledTransactions, Hello, Message,
    NewPooledTransactionHashes, PooledTransactions, Status, code,
};

mod conn;
pub use conn::{Conn, TxAnnouncement};

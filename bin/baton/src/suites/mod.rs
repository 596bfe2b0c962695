//! Built-in scenario suites.

use crate::runner::TestCase;

mod auth;
mod cancun;
mod engine;
mod forkchoice;

/// Every built-in scenario, fresh step instances included.
pub fn all() -> Vec<TestCase> {
    vec![
        cancun::blob_inclusion(),
        cancun::versioned_hashes_swap(),
        cancun::devp2p_blob_retrieval(),
        auth::jwt_time_drift(),
        forkchoice::unknown_head(),
        forkchoice::reorg_round_trip(),
        engine::payload_bodies(),
    ]
}

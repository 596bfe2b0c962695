//! Cancun blob scenarios.

use crate::runner::{TestCase, TestKind};
use baton_clmock::ClMockerConfig;
use baton_customizer::{Expectation, PayloadCustomizer, VersionedHashesCustomizer};
use baton_steps::{
    DevP2PRequestPooledTransactionHash, NewPayloads, SendBlobTransactions, TestStep,
};
use baton_types::{BlobId, ForkConfig};

fn cancun_genesis_config() -> ClMockerConfig {
    ClMockerConfig { fork_config: ForkConfig::cancun_genesis(), ..Default::default() }
}

/// Three target blobs submitted and included in one payload, with bundle,
/// gas accounting and receipts checked.
pub fn blob_inclusion() -> TestCase {
    let steps: Vec<Box<dyn TestStep>> = vec![
        Box::new(SendBlobTransactions { count: 3, blobs_per_tx: 1, ..Default::default() }),
        Box::new(NewPayloads {
            count: 1,
            expected_included_blob_count: 3,
            expected_blobs: BlobId::range(BlobId(0), 3),
            ..Default::default()
        }),
    ];
    TestCase {
        name: "cancun/blob-inclusion".to_string(),
        kind: TestKind::Scenario { mocker_config: cancun_genesis_config(), steps },
    }
}

/// The canonical payload is re-sent with its versioned-hash list reordered
/// (first and last swapped); the client must answer `INVALID`.
pub fn versioned_hashes_swap() -> TestCase {
    let steps: Vec<Box<dyn TestStep>> = vec![
        Box::new(SendBlobTransactions { count: 3, blobs_per_tx: 1, ..Default::default() }),
        Box::new(NewPayloads {
            count: 1,
            expected_included_blob_count: 3,
            expected_blobs: BlobId::range(BlobId(0), 3),
            new_payload_customizer: Some(PayloadCustomizer {
                versioned_hashes: Some(VersionedHashesCustomizer::Blobs {
                    ids: vec![BlobId(2), BlobId(1), BlobId(0)],
                    version: 1,
                }),
                expectation: Expectation::invalid(),
                ..Default::default()
            }),
            ..Default::default()
        }),
    ];
    TestCase {
        name: "cancun/versioned-hashes-swap".to_string(),
        kind: TestKind::Scenario { mocker_config: cancun_genesis_config(), steps },
    }
}

/// A pooled blob transaction announced and served over devp2p must match the
/// submitted network encoding byte for byte.
pub fn devp2p_blob_retrieval() -> TestCase {
    let steps: Vec<Box<dyn TestStep>> = vec![
        Box::new(SendBlobTransactions { count: 1, blobs_per_tx: 1, ..Default::default() }),
        Box::new(DevP2PRequestPooledTransactionHash {
            client_index: 0,
            transaction_indexes: vec![0],
            wait_for_announcement: true,
        }),
    ];
    TestCase {
        name: "cancun/devp2p-pooled-blob-retrieval".to_string(),
        kind: TestKind::Scenario { mocker_config: cancun_genesis_config(), steps },
    }
}

//! Pytest-style blockchain fixture format.
//!
//! Execution-spec-test fixtures are JSON objects mapping a test name to a
//! genesis description plus a list of blocks; each block may carry an
//! `engineNewPayload` object to replay through the Engine API together with
//! an expected validation outcome.

use crate::ExecutableData;
use alloy_primitives::{B256, Bytes};
use serde::Deserialize;
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

/// Errors raised while loading fixtures.
#[derive(Debug, thiserror::Error)]
pub enum FixtureError {
    /// Filesystem access failed.
    #[error("failed to read {path}: {source}")]
    Io {
        /// Offending path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
    /// A fixture file did not parse.
    #[error("failed to parse {path}: {source}")]
    Parse {
        /// Offending path.
        path: PathBuf,
        /// Underlying error.
        source: serde_json::Error,
    },
}

/// One named fixture.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fixture {
    /// Network/fork name the fixture was generated for.
    pub network: String,
    /// Genesis header, kept opaque: the harness only replays payloads.
    #[serde(default)]
    pub genesis_block_header: serde_json::Value,
    /// Pre-state allocation, opaque.
    #[serde(default)]
    pub pre: serde_json::Value,
    /// Blocks to replay in order.
    #[serde(default)]
    pub blocks: Vec<FixtureBlock>,
    /// Post-state allocation, opaque.
    #[serde(default)]
    pub post_state: serde_json::Value,
    /// Expected canonical head hash after replay.
    #[serde(rename = "lastblockhash")]
    pub last_block_hash: B256,
}

/// One block of a fixture.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixtureBlock {
    /// Raw block RLP, unused by payload replay.
    #[serde(default)]
    pub rlp: Option<Bytes>,
    /// The Engine API call to replay for this block.
    #[serde(default)]
    pub engine_new_payload: Option<FixtureEngineNewPayload>,
    /// Validation-error classifier expected from the client, if any.
    #[serde(default)]
    pub expect_exception: Option<String>,
}

/// The `engineNewPayload` object of a fixture block.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixtureEngineNewPayload {
    /// The payload to send.
    pub execution_payload: ExecutableData,
    /// Versioned hashes parameter for V3 calls.
    #[serde(default)]
    pub expected_blob_versioned_hashes: Option<Vec<B256>>,
    /// Parent beacon block root parameter for V3 calls.
    #[serde(default)]
    pub parent_beacon_block_root: Option<B256>,
    /// `newPayload` version to call.
    #[serde(with = "alloy_serde::quantity")]
    pub version: u64,
    /// Expected JSON-RPC error code, encoded as a decimal string.
    #[serde(default)]
    pub error_code: Option<String>,
}

impl FixtureEngineNewPayload {
    /// The expected error code parsed to an integer, when present and
    /// well-formed.
    pub fn expected_error_code(&self) -> Option<i64> {
        self.error_code.as_deref().and_then(|code| code.parse().ok())
    }
}

/// Loads every `.json` fixture file under `root`, recursively. Each file may
/// hold several named fixtures; names are qualified with the file's relative
/// path.
pub fn load_fixtures(root: &Path) -> Result<Vec<(String, Fixture)>, FixtureError> {
    let mut out = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let entries =
            std::fs::read_dir(&dir).map_err(|source| FixtureError::Io { path: dir.clone(), source })?;
        for entry in entries {
            let entry =
                entry.map_err(|source| FixtureError::Io { path: dir.clone(), source })?;
            let path = entry.path();
            if path.is_dir() {
                pending.push(path);
            } else if path.extension().is_some_and(|ext| ext == "json") {
                let raw = std::fs::read_to_string(&path)
                    .map_err(|source| FixtureError::Io { path: path.clone(), source })?;
                let file: BTreeMap<String, Fixture> = serde_json::from_str(&raw)
                    .map_err(|source| FixtureError::Parse { path: path.clone(), source })?;
                let prefix = path
                    .strip_prefix(root)
                    .unwrap_or(&path)
                    .to_string_lossy()
                    .into_owned();
                for (name, fixture) in file {
                    out.push((format!("{prefix}::{name}"), fixture));
                }
            }
        }
    }
    out.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "tests/cancun/blob_test": {
            "network": "Cancun",
            "genesisBlockHeader": {},
            "pre": {},
            "blocks": [
                {
                    "rlp": "0xc0",
                    "engineNewPayload": {
                        "executionPayload": {
                            "parentHash": "0x0000000000000000000000000000000000000000000000000000000000000000",
                            "feeRecipient": "0x0000000000000000000000000000000000000000",
                            "stateRoot": "0x0000000000000000000000000000000000000000000000000000000000000000",
                            "receiptsRoot": "0x0000000000000000000000000000000000000000000000000000000000000000",
                            "logsBloom": "0x00000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000",
                            "prevRandao": "0x0000000000000000000000000000000000000000000000000000000000000000",
                            "blockNumber": "0x1",
                            "gasLimit": "0x1c9c380",
                            "gasUsed": "0x0",
                            "timestamp": "0x1235",
                            "extraData": "0x",
                            "baseFeePerGas": "0x7",
                            "blockHash": "0x0000000000000000000000000000000000000000000000000000000000000001",
                            "transactions": [],
                            "withdrawals": [],
                            "blobGasUsed": "0x0",
                            "excessBlobGas": "0x0"
                        },
                        "expectedBlobVersionedHashes": [],
                        "parentBeaconBlockRoot": "0x0000000000000000000000000000000000000000000000000000000000000000",
                        "version": "0x3",
                        "errorCode": "-32602"
                    },
                    "expectException": "BlockException.INCORRECT_BLOB_GAS_USED"
                }
            ],
            "lastblockhash": "0x0000000000000000000000000000000000000000000000000000000000000001"
        }
    }"#;

    #[test]
    fn parses_fixture_file() {
        let file: BTreeMap<String, Fixture> = serde_json::from_str(SAMPLE).expect("parses");
        let fixture = &file["tests/cancun/blob_test"];
        assert_eq!(fixture.network, "Cancun");
        assert_eq!(fixture.blocks.len(), 1);

        let replay = fixture.blocks[0].engine_new_payload.as_ref().expect("payload");
        assert_eq!(replay.version, 3);
        assert_eq!(replay.expected_error_code(), Some(-32602));
        assert_eq!(replay.execution_payload.block_number, 1);
        assert_eq!(replay.execution_payload.blob_gas_used, Some(0));
        assert!(fixture.blocks[0].expect_exception.is_some());
    }
}

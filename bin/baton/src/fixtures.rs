//! Fixture replay: feed each block's `engineNewPayload` to the client and
//! check the expected status or error code, then settle the forkchoice on
//! the fixture's final head.

use alloy_eips::BlockNumberOrTag;
use alloy_rpc_types_engine::ForkchoiceState;
use baton_engine::{EngineApiError, EngineClient, EngineClientConfig};
use baton_types::{
    EngineVersion, Fixture, FixtureEngineNewPayload, ForkConfig, PayloadStatusKind,
};
use tracing::debug;

/// Replays `fixture` against the first configured client.
pub async fn replay(fixture: &Fixture, configs: Vec<EngineClientConfig>) -> Result<(), String> {
    let config = configs.into_iter().next().ok_or_else(|| "no client configured".to_string())?;
    let engine = EngineClient::new(config);
    let fork_config = network_fork_config(&fixture.network);

    let mut last_valid_timestamp = 0;
    for (index, block) in fixture.blocks.iter().enumerate() {
        let Some(replay) = &block.engine_new_payload else { continue };
        let expects_failure =
            replay.expected_error_code().is_some() || block.expect_exception.is_some();
        if !expects_failure {
            last_valid_timestamp = replay.execution_payload.timestamp;
        }
        replay_block(&engine, replay, block.expect_exception.as_deref())
            .await
            .map_err(|err| format!("block {index}: {err}"))?;
    }

    settle_head(&engine, fixture, &fork_config, last_valid_timestamp).await
}

async fn replay_block(
    engine: &EngineClient,
    replay: &FixtureEngineNewPayload,
    expect_exception: Option<&str>,
) -> Result<(), String> {
    let version = match replay.version {
        1 => EngineVersion::V1,
        2 => EngineVersion::V2,
        3 => EngineVersion::V3,
        other => return Err(format!("unsupported newPayload version {other}")),
    };
    let mut payload = replay.execution_payload.clone();
    payload.versioned_hashes = replay.expected_blob_versioned_hashes.clone();
    payload.parent_beacon_block_root = replay.parent_beacon_block_root;

    debug!(
        target: "fixtures",
        number = payload.block_number,
        hash = %payload.block_hash,
        %version,
        "replaying payload"
    );
    let result = engine.new_payload(version, &payload).await;

    if let Some(code) = replay.expected_error_code() {
        return match result {
            Err(EngineApiError::Rpc { code: got, .. }) if got == code => Ok(()),
            Err(err) => Err(format!("expected error code {code}, got {err}")),
            Ok(status) => {
                Err(format!("expected error code {code}, got status {}", status.status))
            }
        };
    }
    let status = result.map_err(|err| err.to_string())?;
    match (expect_exception, status.status) {
        (Some(_), PayloadStatusKind::Invalid | PayloadStatusKind::InvalidBlockHash) => Ok(()),
        (Some(exception), other) => {
            Err(format!("expected rejection ({exception}), got status {other}"))
        }
        (None, PayloadStatusKind::Valid) => Ok(()),
        (None, other) => Err(format!(
            "expected VALID, got {other} ({})",
            status.validation_error.as_deref().unwrap_or("no validation error")
        )),
    }
}

/// Moves the forkchoice to the fixture's expected head and checks the client
/// adopted it.
async fn settle_head(
    engine: &EngineClient,
    fixture: &Fixture,
    fork_config: &ForkConfig,
    head_timestamp: u64,
) -> Result<(), String> {
    let state = ForkchoiceState {
        head_block_hash: fixture.last_block_hash,
        safe_block_hash: fixture.last_block_hash,
        finalized_block_hash: fixture.last_block_hash,
    };
    let version = fork_config.forkchoice_updated_version(head_timestamp, None);
    let response = engine
        .forkchoice_updated(version, &state, None)
        .await
        .map_err(|err| format!("final forkchoice: {err}"))?;
    if !response.payload_status.status.is_valid() {
        return Err(format!(
            "final forkchoice to {} returned {}",
            fixture.last_block_hash, response.payload_status.status
        ));
    }

    let head = engine
        .header_by_number(BlockNumberOrTag::Latest)
        .await
        .map_err(|err| format!("reading head: {err}"))?;
    if head.hash != fixture.last_block_hash {
        return Err(format!(
            "head is {}, fixture expects {}",
            head.hash, fixture.last_block_hash
        ));
    }
    Ok(())
}

/// The fork schedule a fixture network name implies. Fixture chains activate
/// their newest fork at genesis.
fn network_fork_config(network: &str) -> ForkConfig {
    if network.contains("Cancun") {
        ForkConfig::cancun_genesis()
    } else if network.contains("Shanghai") {
        ForkConfig::shanghai_at(0)
    } else {
        ForkConfig::paris()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_names_map_to_fork_configs() {
        assert_eq!(network_fork_config("Cancun"), ForkConfig::cancun_genesis());
        assert_eq!(network_fork_config("ShanghaiToCancunAtTime15k"), ForkConfig::cancun_genesis());
        assert_eq!(network_fork_config("Shanghai"), ForkConfig::shanghai_at(0));
        assert_eq!(network_fork_config("Merge"), ForkConfig::paris());
    }
}

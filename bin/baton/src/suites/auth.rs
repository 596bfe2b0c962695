//! JWT authentication window scenarios.

use crate::runner::{TestCase, TestKind};
use alloy_primitives::B256;
use async_trait::async_trait;
use baton_clmock::ClMockerConfig;
use baton_engine::TransitionConfiguration;
use baton_steps::{StepError, TestContext, TestStep};
use baton_types::globals::{AUTH_RETRY_ATTEMPTS, AUTH_RETRY_BACKOFF};
use tracing::debug;

/// Tokens strictly outside the 60 s `iat` window must be rejected at the
/// HTTP layer; tokens inside must authenticate.
pub fn jwt_time_drift() -> TestCase {
    let steps: Vec<Box<dyn TestStep>> = vec![
        Box::new(ExchangeConfigWithDrift { drift_seconds: 61, expect_authenticated: false }),
        Box::new(ExchangeConfigWithDrift { drift_seconds: 59, expect_authenticated: true }),
        Box::new(ExchangeConfigWithDrift { drift_seconds: -61, expect_authenticated: false }),
        Box::new(ExchangeConfigWithDrift { drift_seconds: -59, expect_authenticated: true }),
    ];
    TestCase {
        name: "auth/jwt-time-drift".to_string(),
        kind: TestKind::Scenario { mocker_config: ClMockerConfig::default(), steps },
    }
}

/// Calls `engine_exchangeTransitionConfigurationV1` with a drifted `iat`
/// claim. This is the one place retries are allowed: clock skew between the
/// harness and the client can flake a single attempt near the window edge.
#[derive(Debug, Clone, Copy)]
struct ExchangeConfigWithDrift {
    drift_seconds: i64,
    expect_authenticated: bool,
}

impl ExchangeConfigWithDrift {
    async fn attempt_all(&self, ctx: &TestContext) -> Result<(), StepError> {
        let engine = ctx.engine(0)?;
        let configuration = TransitionConfiguration {
            terminal_total_difficulty: engine.terminal_total_difficulty(),
            terminal_block_hash: B256::ZERO,
            terminal_block_number: 0,
        };

        let mut last_error = None;
        for attempt in 1..=AUTH_RETRY_ATTEMPTS {
            let result = engine.exchange_transition_configuration(&configuration).await;
            debug!(
                target: "auth",
                client = engine.id(),
                drift = self.drift_seconds,
                attempt,
                ok = result.is_ok(),
                "transition configuration exchanged"
            );
            match (self.expect_authenticated, result) {
                (true, Ok(_)) => return Ok(()),
                // Authentication failures surface below the JSON-RPC layer.
                (false, Err(err)) if err.is_transport() => return Ok(()),
                (false, Ok(_)) => {
                    return Err(StepError::expectation(format!(
                        "{}: token with {} s drift authenticated",
                        engine.id(),
                        self.drift_seconds
                    )));
                }
                (true, Err(err)) => last_error = Some(err.to_string()),
                (false, Err(err)) => last_error = Some(format!("non-auth failure: {err}")),
            }
            tokio::time::sleep(AUTH_RETRY_BACKOFF).await;
        }
        Err(StepError::expectation(format!(
            "{}: drift {} s, expected authenticated={}, last attempt: {}",
            engine.id(),
            self.drift_seconds,
            self.expect_authenticated,
            last_error.unwrap_or_else(|| "no attempt made".to_string())
        )))
    }
}

#[async_trait]
impl TestStep for ExchangeConfigWithDrift {
    async fn execute(&self, ctx: &TestContext) -> Result<(), StepError> {
        let engine = ctx.engine(0)?;
        engine.set_jwt_drift(self.drift_seconds);
        let result = self.attempt_all(ctx).await;
        engine.clear_jwt_drift();
        result
    }

    fn description(&self) -> String {
        format!(
            "exchange transition configuration with iat drifted {} s (expect {})",
            self.drift_seconds,
            if self.expect_authenticated { "success" } else { "rejection" }
        )
    }
}

//! Test scheduling, execution and reporting.

use crate::{cli::Cli, fixtures, suites};
use anyhow::Result;
use baton_clmock::{ClMocker, ClMockerConfig};
use baton_engine::{EngineClient, EngineClientConfig};
use baton_steps::{StaticStarter, TestContext, TestEnv, TestStep};
use baton_types::{Fixture, globals::DEFAULT_TEST_TIMEOUT};
use futures::StreamExt;
use rand::RngCore;
use std::{
    hash::{DefaultHasher, Hash, Hasher},
    sync::Arc,
};
use tracing::debug;

/// One runnable test.
pub struct TestCase {
    /// Full name, matched against `--sim-limit`.
    pub name: String,
    /// What the test actually does.
    pub kind: TestKind,
}

/// The two shapes a test comes in.
pub enum TestKind {
    /// A built-in scenario: a mocker-driven step sequence.
    Scenario {
        /// Mocker tuning, fork schedule included.
        mocker_config: ClMockerConfig,
        /// Steps to execute in order.
        steps: Vec<Box<dyn TestStep>>,
    },
    /// A fixture replayed through `engine_newPayload`.
    Fixture(Box<Fixture>),
}

struct TestOutcome {
    name: String,
    client: String,
    error: Option<String>,
}

/// Runs every selected test and prints the summary. Returns whether the whole
/// run passed.
pub async fn run(cli: Cli) -> Result<bool> {
    let filter = cli.test_filter()?;
    let configs = cli.client_configs();

    let mut tests = suites::all();
    if let Some(root) = &cli.fixtures {
        for (name, fixture) in baton_types::fixtures::load_fixtures(root)? {
            tests.push(TestCase {
                name: format!("fixtures/{name}"),
                kind: TestKind::Fixture(Box::new(fixture)),
            });
        }
    }
    if let Some(filter) = &filter {
        tests.retain(|test| filter.is_match(&test.name));
    }
    if tests.is_empty() {
        println!("INFO no tests selected");
        return Ok(true);
    }

    let base_seed = if cli.random_seed == 0 {
        rand::rng().next_u64()
    } else {
        cli.random_seed
    };
    println!("INFO running {} test(s), base seed {base_seed}", tests.len());

    let outcomes: Vec<TestOutcome> = futures::stream::iter(
        tests.into_iter().map(|test| run_one(test, configs.clone(), base_seed)),
    )
    .buffer_unordered(cli.parallelism.max(1))
    .collect()
    .await;

    let failures: Vec<&TestOutcome> =
        outcomes.iter().filter(|outcome| outcome.error.is_some()).collect();
    println!(
        "INFO {} passed, {} failed",
        outcomes.len() - failures.len(),
        failures.len()
    );
    for outcome in &failures {
        println!(
            "FAIL {}/{} -> {}",
            outcome.client,
            outcome.name,
            outcome.error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(failures.is_empty())
}

async fn run_one(test: TestCase, configs: Vec<EngineClientConfig>, base_seed: u64) -> TestOutcome {
    let client = configs.first().map_or_else(|| "none".to_string(), |config| config.id.clone());
    let name = test.name.clone();
    let seed = per_test_seed(base_seed, &name);
    println!("INFO [{name}] starting (seed {seed})");

    let result = match tokio::time::timeout(DEFAULT_TEST_TIMEOUT, execute(test, configs, seed))
        .await
    {
        Ok(result) => result,
        Err(_) => Err(format!("timed out after {DEFAULT_TEST_TIMEOUT:?}")),
    };
    match &result {
        Ok(()) => println!("INFO [{name}] passed"),
        Err(error) => println!("FAIL [{name}] {error}"),
    }
    TestOutcome { name, client, error: result.err() }
}

async fn execute(
    test: TestCase,
    configs: Vec<EngineClientConfig>,
    seed: u64,
) -> Result<(), String> {
    match test.kind {
        TestKind::Scenario { mocker_config, steps } => {
            run_scenario(mocker_config, steps, configs, seed).await
        }
        TestKind::Fixture(fixture) => fixtures::replay(&fixture, configs).await,
    }
}

async fn run_scenario(
    mut mocker_config: ClMockerConfig,
    steps: Vec<Box<dyn TestStep>>,
    configs: Vec<EngineClientConfig>,
    seed: u64,
) -> Result<(), String> {
    let mut configs = configs.into_iter();
    let first = configs.next().ok_or_else(|| "no client configured".to_string())?;
    mocker_config.terminal_total_difficulty = first.terminal_total_difficulty;
    let fork_config = mocker_config.fork_config;

    let engine = Arc::new(EngineClient::new(first));
    let mut mocker = ClMocker::new(mocker_config, seed);
    mocker.add_engine(engine.clone());

    let env = TestEnv { random_seed: seed, test_path: None };
    let starter = Arc::new(StaticStarter::new(configs.collect()));
    let ctx = TestContext::new(env, vec![engine], mocker, fork_config, starter);

    ctx.cl_mock
        .lock()
        .await
        .wait_for_ttd()
        .await
        .map_err(|err| format!("waiting for the transition: {err}"))?;

    for step in steps {
        debug!(target: "runner", step = %step.description(), "executing step");
        step.execute(&ctx)
            .await
            .map_err(|err| format!("step `{}`: {err}", step.description()))?;
    }
    Ok(())
}

fn per_test_seed(base_seed: u64, name: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    name.hash(&mut hasher);
    base_seed ^ hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_test_seeds_are_stable_and_distinct() {
        let a = per_test_seed(42, "cancun/blob-inclusion");
        assert_eq!(a, per_test_seed(42, "cancun/blob-inclusion"));
        assert_ne!(a, per_test_seed(42, "auth/jwt-time-drift"));
        assert_ne!(a, per_test_seed(43, "cancun/blob-inclusion"));
    }
}

//! Command-line interface of the harness.

use alloy_primitives::U256;
use alloy_rpc_types_engine::JwtSecret;
use anyhow::{Context, Result, bail};
use baton_engine::EngineClientConfig;
use baton_types::globals::DEFAULT_JWT_SECRET;
use clap::Parser;
use std::{path::PathBuf, str::FromStr};
use url::Url;

/// Conformance harness for the Ethereum Engine API.
///
/// Runs the built-in scenario suites (and, when `TESTPATH` is set, replays
/// execution-spec-test fixtures) against one or more pre-launched execution
/// clients.
#[derive(Parser, Clone, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// A client under test as `engine_url,eth_url[,enode]`. Repeatable;
    /// tests that launch extra clients consume the additional entries in
    /// order.
    #[clap(long = "client", required = true)]
    pub clients: Vec<ClientEndpoint>,
    /// Regex selecting which tests to run, matched against the full test
    /// name.
    #[clap(long = "sim-limit")]
    pub sim_limit: Option<String>,
    /// Root of a fixture tree to replay through `engine_newPayload`.
    #[clap(long, env = "TESTPATH")]
    pub fixtures: Option<PathBuf>,
    /// How many tests run concurrently.
    #[clap(long, env = "HIVE_PARALLELISM", default_value_t = 16)]
    pub parallelism: usize,
    /// Seed of every per-test PRNG; 0 draws a fresh seed for the run.
    #[clap(long, env = "HIVE_RANDOM_SEED", default_value_t = 0)]
    pub random_seed: u64,
    /// Log filter directive, e.g. `info` or `baton=debug,devp2p=trace`.
    #[clap(long, env = "HIVE_LOGLEVEL", default_value = "info")]
    pub log_level: String,
    /// Terminal total difficulty the clients were started with.
    #[clap(long, default_value_t = 0)]
    pub ttd: u64,
}

impl Cli {
    /// The regex filter, compiled.
    pub fn test_filter(&self) -> Result<Option<regex::Regex>> {
        self.sim_limit
            .as_deref()
            .map(|pattern| {
                regex::Regex::new(pattern)
                    .with_context(|| format!("invalid --sim-limit pattern {pattern:?}"))
            })
            .transpose()
    }

    /// Connection configs for every `--client`, in order.
    pub fn client_configs(&self) -> Vec<EngineClientConfig> {
        self.clients
            .iter()
            .enumerate()
            .map(|(index, endpoint)| endpoint.config(index, U256::from(self.ttd)))
            .collect()
    }
}

/// One `--client` value.
#[derive(Debug, Clone)]
pub struct ClientEndpoint {
    /// Engine API endpoint.
    pub engine_url: Url,
    /// Eth API endpoint.
    pub eth_url: Url,
    /// Devp2p enode URL, when wire tests should dial this client.
    pub enode: Option<String>,
}

impl ClientEndpoint {
    fn config(&self, index: usize, terminal_total_difficulty: U256) -> EngineClientConfig {
        EngineClientConfig {
            id: format!("client-{index}"),
            engine_url: self.engine_url.clone(),
            eth_url: self.eth_url.clone(),
            jwt_secret: JwtSecret::from_hex(alloy_primitives::hex::encode(DEFAULT_JWT_SECRET))
                .expect("default JWT secret is valid"),
            enode: self.enode.clone(),
            terminal_total_difficulty,
        }
    }
}

impl FromStr for ClientEndpoint {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        let mut parts = value.split(',');
        let (Some(engine), Some(eth)) = (parts.next(), parts.next()) else {
            bail!("expected `engine_url,eth_url[,enode]`, got {value:?}");
        };
        let enode = parts.next().map(str::to_string);
        if parts.next().is_some() {
            bail!("too many comma-separated fields in {value:?}");
        }
        Ok(Self {
            engine_url: engine.parse().with_context(|| format!("bad engine url {engine:?}"))?,
            eth_url: eth.parse().with_context(|| format!("bad eth url {eth:?}"))?,
            enode,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_two_and_three_field_endpoints() {
        let two: ClientEndpoint = "http://127.0.0.1:8551,http://127.0.0.1:8545"
            .parse()
            .expect("two fields parse");
        assert!(two.enode.is_none());

        let three: ClientEndpoint =
            "http://127.0.0.1:8551,http://127.0.0.1:8545,enode://aa@1.2.3.4:30303"
                .parse()
                .expect("three fields parse");
        assert_eq!(three.enode.as_deref(), Some("enode://aa@1.2.3.4:30303"));
    }

    #[test]
    fn rejects_malformed_endpoints() {
        assert!("http://only-one".parse::<ClientEndpoint>().is_err());
        assert!("a,b,c,d".parse::<ClientEndpoint>().is_err());
        assert!("not a url,http://127.0.0.1:8545".parse::<ClientEndpoint>().is_err());
    }
}

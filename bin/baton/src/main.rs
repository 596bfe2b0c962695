//! # baton
//!
//! Conformance test harness for the Ethereum Engine API. Drives one or more
//! pre-launched execution clients through a mocked consensus layer, built-in
//! adversarial scenarios, and optional fixture replay.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]

use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod cli;
mod fixtures;
mod runner;
mod suites;

fn main() -> ExitCode {
    let cli = cli::Cli::parse();

    let filter = EnvFilter::try_new(&cli.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("failed to start runtime: {err}");
            return ExitCode::FAILURE;
        }
    };
    match runtime.block_on(runner::run(cli)) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("harness error: {err}");
            ExitCode::FAILURE
        }
    }
}

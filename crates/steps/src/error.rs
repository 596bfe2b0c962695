//! Step failure taxonomy.

use baton_clmock::MockerError;
use baton_customizer::CustomizerError;
use baton_devp2p::DevP2pError;
use baton_engine::EngineApiError;
use baton_types::TransactionError;

/// Failure of one test step.
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    /// An Engine or Eth API call failed.
    #[error("client {client}: {source}")]
    Engine {
        /// The client the call targeted.
        client: String,
        /// The underlying failure.
        #[source]
        source: EngineApiError,
    },
    /// The block-production cycle failed.
    #[error(transparent)]
    Mocker(#[from] MockerError),
    /// A customization could not be applied.
    #[error(transparent)]
    Customizer(#[from] CustomizerError),
    /// A blob transaction could not be built.
    #[error(transparent)]
    Transaction(#[from] TransactionError),
    /// The wire-protocol session failed.
    #[error(transparent)]
    DevP2p(#[from] DevP2pError),
    /// The step addressed a client index that does not exist.
    #[error("no client at index {index} ({available} available)")]
    MissingClient {
        /// The requested index.
        index: usize,
        /// How many clients exist.
        available: usize,
    },
    /// The step needs the client's enode but none was configured.
    #[error("client {0} has no enode configured")]
    MissingEnode(String),
    /// A response disagrees with what the test expects.
    #[error("expectation failed: {0}")]
    Expectation(String),
    /// The step needs state an earlier step did not produce.
    #[error("missing prerequisite: {0}")]
    MissingPrerequisite(&'static str),
}

impl StepError {
    /// Wraps a call failure with the client it targeted.
    pub fn engine(client: &str, source: EngineApiError) -> Self {
        Self::Engine { client: client.to_string(), source }
    }

    /// An expectation-failure with a formatted diagnostic.
    pub fn expectation(diagnostic: impl Into<String>) -> Self {
        Self::Expectation(diagnostic.into())
    }
}

//! Enum-driven production-cycle hooks.

use crate::{ClMocker, MockerError};
use async_trait::async_trait;

/// The points of a production cycle a hook can observe, in firing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ProductionPhase {
    /// A producer agreeing with the canonical head was selected.
    ProducerSelected,
    /// Payload attributes for the next block were generated and recorded.
    /// Hooks may rewrite them before the build is requested.
    AttributesGenerated,
    /// The producer acknowledged the build request with a payload id.
    PayloadRequested,
    /// The payload was retrieved and recorded as the latest built payload.
    PayloadRetrieved,
    /// The payload was broadcast to all peers and at least one said `VALID`.
    NewPayloadBroadcast,
    /// The advanced forkchoice was broadcast and accepted by all peers.
    ForkchoiceBroadcast,
}

impl std::fmt::Display for ProductionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::ProducerSelected => "producer-selected",
            Self::AttributesGenerated => "attributes-generated",
            Self::PayloadRequested => "payload-requested",
            Self::PayloadRetrieved => "payload-retrieved",
            Self::NewPayloadBroadcast => "new-payload-broadcast",
            Self::ForkchoiceBroadcast => "forkchoice-broadcast",
        };
        f.write_str(name)
    }
}

/// Observer of one production cycle.
///
/// The mocker passes itself mutably so a hook can rewrite pending attributes,
/// reach the engine set, or issue extra calls; a hook error aborts the cycle.
#[async_trait]
pub trait CycleHooks: Send {
    /// Called after each phase completes.
    async fn on_phase(
        &mut self,
        phase: ProductionPhase,
        mocker: &mut ClMocker,
    ) -> Result<(), MockerError>;
}

/// The default, inert hook set.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHooks;

#[async_trait]
impl CycleHooks for NoHooks {
    async fn on_phase(
        &mut self,
        _phase: ProductionPhase,
        _mocker: &mut ClMocker,
    ) -> Result<(), MockerError> {
        Ok(())
    }
}

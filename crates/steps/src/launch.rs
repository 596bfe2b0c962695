//! Growing the client set mid-test.

use crate::{StepError, TestContext, TestStep};
use async_trait::async_trait;
use tracing::info;

/// Launches additional clients through the context's starter, peered with
/// the first client by default, and registers them with the mocker so they
/// receive subsequent broadcasts.
#[derive(Debug, Clone)]
pub struct LaunchClients {
    /// How many clients to launch.
    pub count: usize,
    /// Do not pass the first client's enode as bootnode.
    pub skip_bootnode: bool,
    /// Launch without registering for mocker broadcasts.
    pub skip_adding_to_mock: bool,
}

impl Default for LaunchClients {
    fn default() -> Self {
        Self { count: 1, skip_bootnode: false, skip_adding_to_mock: false }
    }
}

#[async_trait]
impl TestStep for LaunchClients {
    async fn execute(&self, ctx: &TestContext) -> Result<(), StepError> {
        let bootnode = if self.skip_bootnode {
            None
        } else {
            ctx.engine(0)?.enode().map(str::to_string)
        };
        for _ in 0..self.count {
            let engine = ctx.starter.start_client(bootnode.clone()).await?;
            info!(
                target: "steps",
                client = engine.id(),
                bootnode = bootnode.as_deref().unwrap_or("none"),
                "client launched"
            );
            if !self.skip_adding_to_mock {
                ctx.cl_mock.lock().await.add_engine(engine.clone());
            }
            ctx.push_engine(engine);
        }
        Ok(())
    }

    fn description(&self) -> String {
        format!("launch {} client(s)", self.count)
    }
}

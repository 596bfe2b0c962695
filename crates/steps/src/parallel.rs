//! Fork-join composition of steps.

use crate::{StepError, TestContext, TestStep};
use async_trait::async_trait;

/// Runs a set of steps concurrently against the same context; every step is
/// driven to completion and the first error (in declaration order) is
/// surfaced.
#[derive(Default)]
pub struct ParallelSteps {
    /// The steps to run concurrently.
    pub steps: Vec<Box<dyn TestStep>>,
}

impl std::fmt::Debug for ParallelSteps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParallelSteps").field("steps", &self.steps.len()).finish()
    }
}

#[async_trait]
impl TestStep for ParallelSteps {
    async fn execute(&self, ctx: &TestContext) -> Result<(), StepError> {
        let results =
            futures::future::join_all(self.steps.iter().map(|step| step.execute(ctx))).await;
        for result in results {
            result?;
        }
        Ok(())
    }

    fn description(&self) -> String {
        let inner: Vec<String> = self.steps.iter().map(|step| step.description()).collect();
        format!("in parallel: [{}]", inner.join("; "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;

    #[async_trait]
    impl TestStep for Noop {
        async fn execute(&self, _ctx: &TestContext) -> Result<(), StepError> {
            Ok(())
        }

        fn description(&self) -> String {
            "noop".to_string()
        }
    }

    #[test]
    fn description_joins_inner_steps() {
        let parallel = ParallelSteps { steps: vec![Box::new(Noop), Box::new(Noop)] };
        assert_eq!(parallel.description(), "in parallel: [noop; noop]");
    }
}

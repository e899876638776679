// Gather Facts Step
// Warms the runtime facts cache for each target host

use crate::inventory::Host;
use crate::step::{Step, StepContext, StepError, StepMeta, StepOutput};

use tracing::info;

#[derive(Debug, Clone)]
pub struct GatherFactsStep {
    meta: StepMeta,
}

impl GatherFactsStep {
    pub fn new() -> Self {
        Self {
            meta: StepMeta::new("gather-facts", "collect OS and hardware facts"),
        }
    }
}

impl Default for GatherFactsStep {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Step for GatherFactsStep {
    fn meta(&self) -> &StepMeta {
        &self.meta
    }

    async fn run(&self, ctx: &StepContext, host: &Host) -> Result<StepOutput, StepError> {
        let facts = ctx.facts(host).await?;
        info!(
            parent: ctx.span(),
            host = %host,
            os = %facts.os.pretty_name,
            cpus = facts.cpu_cores,
            memory_mb = facts.memory_mb,
            "gathered facts"
        );
        Ok(StepOutput::unchanged().with_message(format!(
            "{} {} ({} cpu, {} MB)",
            facts.os.id, facts.os.version_id, facts.cpu_cores, facts.memory_mb
        )))
    }

    async fn check(&self, ctx: &StepContext, host: &Host) -> Result<bool, StepError> {
        Ok(ctx.runtime().cached_facts(&host.name).is_some())
    }

    fn describe(&self, host: &Host) -> Option<String> {
        Some(format!("{}: gather facts", host))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{memory_host, runtime_with, sample_facts};

    #[tokio::test]
    async fn test_facts_are_cached_after_run() {
        let (runtime, connectors) = runtime_with(vec![memory_host("node1", |c| {
            c.with_facts(sample_facts("node1"))
        })]);
        let host = runtime.inventory().hosts()[0].clone();
        let ctx = StepContext::new(runtime.clone(), "preflight:gather-facts".into(), Default::default());
        let step = GatherFactsStep::new();

        assert!(!step.check(&ctx, &host).await.unwrap());
        let output = step.run(&ctx, &host).await.unwrap();
        assert_eq!(output.message.as_deref(), Some("ubuntu 22.04 (4 cpu, 7946 MB)"));
        assert!(step.check(&ctx, &host).await.unwrap());

        step.run(&ctx, &host).await.unwrap();
        assert_eq!(connectors[0].read_count(), 1);
        assert_eq!(runtime.cached_facts("node1").unwrap().hostname, "node1");
    }
}

// Closure Step
// Ad-hoc steps backed by async closures

use crate::inventory::Host;
use crate::step::{Step, StepContext, StepError, StepMeta, StepOutput};

use futures::future::BoxFuture;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

type RunFn = Arc<dyn Fn(StepContext, Host) -> BoxFuture<'static, Result<StepOutput, StepError>> + Send + Sync>;
type CheckFn = Arc<dyn Fn(StepContext, Host) -> BoxFuture<'static, Result<bool, StepError>> + Send + Sync>;
type RollbackFn = Arc<dyn Fn(StepContext, Host) -> BoxFuture<'static, Result<(), StepError>> + Send + Sync>;

/// Step whose behaviour is supplied as closures.
///
/// Each closure receives an owned clone of the context and host so the
/// returned future can be `'static`.
#[derive(Clone)]
pub struct FnStep {
    meta: StepMeta,
    run: RunFn,
    check: Option<CheckFn>,
    rollback: Option<RollbackFn>,
}

impl FnStep {
    pub fn new<F, Fut>(name: impl Into<String>, run: F) -> Self
    where
        F: Fn(StepContext, Host) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<StepOutput, StepError>> + Send + 'static,
    {
        let name = name.into();
        Self {
            meta: StepMeta::new(name.clone(), name),
            run: Arc::new(move |ctx, host| Box::pin(run(ctx, host))),
            check: None,
            rollback: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.meta.description = description.into();
        self
    }

    pub fn with_check<F, Fut>(mut self, check: F) -> Self
    where
        F: Fn(StepContext, Host) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<bool, StepError>> + Send + 'static,
    {
        self.check = Some(Arc::new(move |ctx, host| Box::pin(check(ctx, host))));
        self
    }

    pub fn with_rollback<F, Fut>(mut self, rollback: F) -> Self
    where
        F: Fn(StepContext, Host) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), StepError>> + Send + 'static,
    {
        self.rollback = Some(Arc::new(move |ctx, host| Box::pin(rollback(ctx, host))));
        self
    }
}

impl fmt::Debug for FnStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnStep")
            .field("name", &self.meta.name)
            .field("check", &self.check.is_some())
            .field("rollback", &self.rollback.is_some())
            .finish()
    }
}

#[async_trait::async_trait]
impl Step for FnStep {
    fn meta(&self) -> &StepMeta {
        &self.meta
    }

    async fn run(&self, ctx: &StepContext, host: &Host) -> Result<StepOutput, StepError> {
        (self.run)(ctx.clone(), host.clone()).await
    }

    async fn check(&self, ctx: &StepContext, host: &Host) -> Result<bool, StepError> {
        match &self.check {
            Some(check) => check(ctx.clone(), host.clone()).await,
            None => Ok(false),
        }
    }

    async fn rollback(&self, ctx: &StepContext, host: &Host) -> Result<(), StepError> {
        match &self.rollback {
            Some(rollback) => rollback(ctx.clone(), host.clone()).await,
            None => Ok(()),
        }
    }
}

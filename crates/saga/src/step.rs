//! Saga steps and definitions.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use common::ExecutionId;
use thiserror::Error;

/// Error returned by a step action.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct StepError(String);

impl StepError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }

    pub fn reason(&self) -> &str {
        &self.0
    }
}

impl From<&str> for StepError {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for StepError {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// What a step action knows about the signal it is handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepContext {
    pub execution_id: ExecutionId,
    pub step_number: u32,
}

/// A forward or compensating action of a step.
///
/// Actions must be idempotent: after a restart the coordinator re-runs the
/// action of the last recorded signal.
#[async_trait]
pub trait StepAction: Send + Sync {
    async fn run(&self, ctx: StepContext) -> Result<(), StepError>;
}

/// Adapter turning an async closure into a [`StepAction`].
pub struct FnAction<F>(F);

#[async_trait]
impl<F, Fut> StepAction for FnAction<F>
where
    F: Fn(StepContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), StepError>> + Send,
{
    async fn run(&self, ctx: StepContext) -> Result<(), StepError> {
        (self.0)(ctx).await
    }
}

/// Wraps an async closure as a step action.
pub fn action<F, Fut>(f: F) -> FnAction<F>
where
    F: Fn(StepContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), StepError>> + Send,
{
    FnAction(f)
}

/// A step: a forward action paired with its compensation.
#[derive(Clone)]
pub struct Step {
    pub(crate) forward: Arc<dyn StepAction>,
    pub(crate) compensate: Arc<dyn StepAction>,
}

impl Step {
    pub fn new(forward: impl StepAction + 'static, compensate: impl StepAction + 'static) -> Self {
        Self {
            forward: Arc::new(forward),
            compensate: Arc::new(compensate),
        }
    }
}

/// An ordered list of steps under a stable name.
///
/// The name is stored on every log record so executions of different
/// sagas can share one log.
#[derive(Clone)]
pub struct SagaDefinition {
    name: String,
    steps: Vec<Step>,
}

impl SagaDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    /// Appends a step. Steps run in the order they are added.
    pub fn step(
        mut self,
        forward: impl StepAction + 'static,
        compensate: impl StepAction + 'static,
    ) -> Self {
        self.steps.push(Step::new(forward, compensate));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> u32 {
        self.steps.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub(crate) fn get(&self, step_number: u32) -> Option<&Step> {
        self.steps.get(step_number as usize)
    }
}

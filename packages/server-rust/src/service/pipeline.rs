//! Ordered stage execution with short-circuit semantics.
//!
//! Every part of request handling is a [`Stage`]: the context initializer,
//! the policy checks, the id and paging normalizers, the transition
//! sub-dispatch, and the CRUD handlers themselves. A stage either lets the
//! request continue, ends it with a final response, or fails it with an
//! [`ApiError`]. Once a stage ends or fails the request, later stages do not run.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::BoxFuture;

use super::exchange::Exchange;
use super::response::ApiResponse;
use crate::error::ApiError;

/// Outcome of a stage that did not fail.
#[derive(Debug)]
pub enum Flow {
    /// Hand the request to the next stage.
    Continue,
    /// Stop and send this response.
    Respond(ApiResponse),
}

pub type StageResult = Result<Flow, ApiError>;

/// A unit of request processing.
#[async_trait]
pub trait Stage: Send + Sync {
    async fn run(&self, ex: &mut Exchange) -> StageResult;
}

impl std::fmt::Debug for dyn Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Stage")
    }
}

/// An ordered list of stages.
///
/// A pipeline is itself a [`Stage`], so pipelines nest: the context
/// initializer runs its policy stages as an inner pipeline.
#[derive(Clone, Default)]
pub struct Pipeline {
    stages: Vec<Arc<dyn Stage>>,
}

impl Pipeline {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a stage.
    #[must_use]
    pub fn then<S: Stage + 'static>(mut self, stage: S) -> Self {
        self.stages.push(Arc::new(stage));
        self
    }

    /// Appends an already shared stage.
    #[must_use]
    pub fn then_shared(mut self, stage: Arc<dyn Stage>) -> Self {
        self.stages.push(stage);
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Runs the stages in order until one responds or fails.
    ///
    /// # Errors
    ///
    /// Returns the first error signalled by a stage.
    pub async fn run(&self, ex: &mut Exchange) -> StageResult {
        for stage in &self.stages {
            match stage.run(ex).await? {
                Flow::Continue => {}
                respond @ Flow::Respond(_) => return Ok(respond),
            }
        }
        Ok(Flow::Continue)
    }

    /// Runs the pipeline as a complete route.
    ///
    /// # Errors
    ///
    /// Returns the first stage error, or [`ApiError::NotFound`] when every
    /// stage continued and nothing produced a response.
    pub async fn respond(&self, ex: &mut Exchange) -> Result<ApiResponse, ApiError> {
        match self.run(ex).await? {
            Flow::Respond(response) => Ok(response),
            Flow::Continue => Err(ApiError::not_found(format!(
                "no handler for {} {}",
                ex.method, ex.resource
            ))),
        }
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.stages.len())
            .finish()
    }
}

#[async_trait]
impl Stage for Pipeline {
    async fn run(&self, ex: &mut Exchange) -> StageResult {
        Pipeline::run(self, ex).await
    }
}

/// A stage built from a closure returning a boxed future.
pub struct FnStage<F>(F);

/// Wraps a closure as a [`Stage`].
///
/// ```ignore
/// let stage = stage_fn(|ex| Box::pin(async move {
///     ex.location = Some("/v/users/".into());
///     Ok::<Flow, ApiError>(Flow::Continue)
/// }));
/// ```
pub fn stage_fn<F>(f: F) -> FnStage<F>
where
    F: for<'a> Fn(&'a mut Exchange) -> BoxFuture<'a, StageResult> + Send + Sync,
{
    FnStage(f)
}

#[async_trait]
impl<F> Stage for FnStage<F>
where
    F: for<'a> Fn(&'a mut Exchange) -> BoxFuture<'a, StageResult> + Send + Sync,
{
    async fn run(&self, ex: &mut Exchange) -> StageResult {
        (self.0)(ex).await
    }
}

//! The base template: defaults every resource inherits.
//!
//! Holds the default auth rules, the default workflow name, one handler per
//! CRUD operation and the built-in `bumpup` transition. The resolver copies
//! from here whenever a definition leaves a slot empty.

use std::sync::Arc;

use async_trait::async_trait;
use restkit_core::{
    entity_id, AuthRules, ModelError, WorkflowBinding, WorkflowEngine, WriteKind,
    DEFAULT_WORKFLOW,
};

use super::definition::Operation;
use super::exchange::Exchange;
use super::middleware::request::next_link;
use super::pipeline::{Flow, Stage, StageResult};
use super::response::ApiResponse;
use crate::error::ApiError;

/// Field stamped by the `bumpup` transition.
pub const BUMPED_AT: &str = "bumpedAt";

/// Default policy and handlers for resources.
#[derive(Clone)]
pub struct BaseTemplate {
    auth: AuthRules,
    workflow: String,
    create: Arc<dyn Stage>,
    find: Arc<dyn Stage>,
    find_one: Arc<dyn Stage>,
    update: Arc<dyn Stage>,
    replace: Arc<dyn Stage>,
    remove: Arc<dyn Stage>,
    bumpup: Arc<dyn Stage>,
}

impl BaseTemplate {
    /// Builds the template with the standard CRUD handlers. Updates are
    /// delegated to `workflows`.
    #[must_use]
    pub fn new(workflows: Arc<dyn WorkflowEngine>) -> Self {
        Self {
            auth: AuthRules::base(),
            workflow: DEFAULT_WORKFLOW.to_string(),
            create: Arc::new(CreateOne),
            find: Arc::new(FindMany),
            find_one: Arc::new(FindOne),
            update: Arc::new(UpdateOne { workflows }),
            replace: Arc::new(ReplaceOne),
            remove: Arc::new(RemoveOne),
            bumpup: Arc::new(BumpUp),
        }
    }

    #[must_use]
    pub fn with_auth(mut self, auth: AuthRules) -> Self {
        self.auth = auth;
        self
    }

    #[must_use]
    pub fn with_workflow(mut self, workflow: impl Into<String>) -> Self {
        self.workflow = workflow.into();
        self
    }

    #[must_use]
    pub fn auth(&self) -> &AuthRules {
        &self.auth
    }

    #[must_use]
    pub fn workflow(&self) -> &str {
        &self.workflow
    }

    #[must_use]
    pub fn handler(&self, op: Operation) -> &Arc<dyn Stage> {
        match op {
            Operation::Create => &self.create,
            Operation::Find => &self.find,
            Operation::FindOne => &self.find_one,
            Operation::Update => &self.update,
            Operation::Replace => &self.replace,
            Operation::Remove => &self.remove,
        }
    }

    /// The built-in `bumpup` transition handler.
    #[must_use]
    pub fn bumpup(&self) -> &Arc<dyn Stage> {
        &self.bumpup
    }
}

impl std::fmt::Debug for BaseTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BaseTemplate")
            .field("auth", &self.auth)
            .field("workflow", &self.workflow)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Default handlers
// ---------------------------------------------------------------------------

/// `POST /{resource}`: validate, persist, answer 201 with a location.
#[derive(Debug, Clone, Copy)]
pub struct CreateOne;

#[async_trait]
impl Stage for CreateOne {
    async fn run(&self, ex: &mut Exchange) -> StageResult {
        let ctx = ex.context()?;
        let data = ctx.model.validate(WriteKind::Create, ex.json_object()?)?;
        let created = match ctx.model.create(data).await {
            Ok(entity) => entity,
            Err(err @ ModelError::DuplicateKey { .. }) => {
                return Err(ApiError::Conflict(err.to_string()));
            }
            Err(err) => return Err(err.into()),
        };
        let location = entity_id(&created).and_then(|id| ex.locate(id));
        Ok(Flow::Respond(ApiResponse::created(location, created)))
    }
}

/// `GET /{resource}`: one page of entities plus a `next` link.
#[derive(Debug, Clone, Copy)]
pub struct FindMany;

#[async_trait]
impl Stage for FindMany {
    async fn run(&self, ex: &mut Exchange) -> StageResult {
        let ctx = ex.context()?;
        let request = ex.page.clone().unwrap_or_default();
        let page = ctx.model.find(&request).await?;
        let link = match (&page.next, &ex.location) {
            (Some(next), Some(prefix)) => Some(next_link(prefix, next)),
            _ => None,
        };
        Ok(Flow::Respond(ApiResponse::many(page.items, link)))
    }
}

/// `GET /{resource}/{id}`.
#[derive(Debug, Clone, Copy)]
pub struct FindOne;

#[async_trait]
impl Stage for FindOne {
    async fn run(&self, ex: &mut Exchange) -> StageResult {
        let ctx = ex.context()?;
        let entity = ctx.model.find_one(ex.id()?).await?;
        Ok(Flow::Respond(ApiResponse::ok(entity)))
    }
}

/// `POST /{resource}/{id}` without a matching transition.
///
/// The payload is handed to the workflow engine bound to the resource's
/// workflow; this handler never writes fields itself.
#[derive(Clone)]
pub struct UpdateOne {
    workflows: Arc<dyn WorkflowEngine>,
}

#[async_trait]
impl Stage for UpdateOne {
    async fn run(&self, ex: &mut Exchange) -> StageResult {
        let ctx = ex.context()?;
        let id = ex.id()?;
        let binding = WorkflowBinding {
            workflow: ctx.descriptor.workflow().to_string(),
            model: Arc::clone(&ctx.model),
        };
        let payload = ex.json_object()?.clone();
        let entity = self.workflows.transit(&binding, id, payload).await?;
        Ok(Flow::Respond(ApiResponse::located(ex.locate(id), entity)))
    }
}

/// `PUT /{resource}/{id}`.
#[derive(Debug, Clone, Copy)]
pub struct ReplaceOne;

#[async_trait]
impl Stage for ReplaceOne {
    async fn run(&self, ex: &mut Exchange) -> StageResult {
        let ctx = ex.context()?;
        let id = ex.id()?;
        let data = ctx.model.validate(WriteKind::Replace, ex.json_object()?)?;
        let entity = ctx.model.replace(id, data).await?;
        Ok(Flow::Respond(ApiResponse::located(ex.locate(id), entity)))
    }
}

/// `DELETE /{resource}/{id}`.
#[derive(Debug, Clone, Copy)]
pub struct RemoveOne;

#[async_trait]
impl Stage for RemoveOne {
    async fn run(&self, ex: &mut Exchange) -> StageResult {
        let ctx = ex.context()?;
        ctx.model.remove(ex.id()?).await?;
        Ok(Flow::Respond(ApiResponse::no_content()))
    }
}

/// Built-in transition: refreshes [`BUMPED_AT`] and answers 204.
#[derive(Debug, Clone, Copy)]
pub struct BumpUp;

#[async_trait]
impl Stage for BumpUp {
    async fn run(&self, ex: &mut Exchange) -> StageResult {
        let ctx = ex.context()?;
        ctx.model.touch(ex.id()?, BUMPED_AT).await?;
        Ok(Flow::Respond(ApiResponse::no_content()))
    }
}

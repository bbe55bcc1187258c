//! Per-request resolution of the target resource and its policy stages.

use std::sync::Arc;

use async_trait::async_trait;
use restkit_core::Model;
use tracing::trace;

use super::config::ServiceConfig;
use super::descriptor::ServiceDescriptor;
use super::exchange::Exchange;
use super::middleware::{Authorize, Authorizer, Locate, ParseBody, RateLimit, Throttle};
use super::pipeline::{Pipeline, Stage, StageResult};
use super::resolver::ServiceSet;
use crate::error::ApiError;

/// What a request resolved to: the resource, its model and its descriptor.
#[derive(Clone)]
pub struct RequestContext {
    pub resource: String,
    pub model: Arc<dyn Model>,
    pub descriptor: Arc<ServiceDescriptor>,
}

impl std::fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("resource", &self.resource)
            .field("model", &self.model.name())
            .finish_non_exhaustive()
    }
}

/// First stage of every resource route.
///
/// Looks the path's resource up in the installed [`ServiceSet`], attaches a
/// [`RequestContext`] to the exchange, then runs the policy stages in order:
/// location prefix, authorization, rate limiting, body parsing.
#[derive(Clone)]
pub struct ContextInitializer {
    services: Arc<ServiceSet>,
    policy: Pipeline,
}

impl ContextInitializer {
    #[must_use]
    pub fn new(
        services: Arc<ServiceSet>,
        config: &ServiceConfig,
        authorizer: Arc<dyn Authorizer>,
        throttle: Arc<dyn Throttle>,
    ) -> Self {
        let policy = Pipeline::new()
            .then(Locate::new(config.normalized_prefix()))
            .then(Authorize::new(authorizer))
            .then(RateLimit::new(throttle))
            .then(ParseBody);
        Self { services, policy }
    }

    #[must_use]
    pub fn services(&self) -> &Arc<ServiceSet> {
        &self.services
    }
}

impl std::fmt::Debug for ContextInitializer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextInitializer")
            .field("resources", &self.services.names())
            .field("policy", &self.policy)
            .finish()
    }
}

#[async_trait]
impl Stage for ContextInitializer {
    async fn run(&self, ex: &mut Exchange) -> StageResult {
        let service = self
            .services
            .get(&ex.resource)
            .ok_or_else(|| ApiError::not_found(format!("unknown resource `{}`", ex.resource)))?;
        ex.context = Some(RequestContext {
            resource: ex.resource.clone(),
            model: Arc::clone(&service.model),
            descriptor: Arc::clone(&service.descriptor),
        });
        trace!(resource = %ex.resource, "request context attached");
        self.policy.run(ex).await
    }
}

//! The dispatcher: six route templates, each a fixed pipeline of stages.
//!
//! | Route | Pipeline |
//! |-------|----------|
//! | `POST /{resource}` | init, create |
//! | `POST /{resource}/{id}` | init, require id, transition or update |
//! | `GET /{resource}/{id}` | init, require id, find one |
//! | `PUT /{resource}/{id}` | init, require id, replace |
//! | `GET /{resource}` | paginate, init, find |
//! | `DELETE /{resource}/{id}` | init, require id, remove |
//!
//! Every CRUD step is [`Guarded`]: a disabled slot answers NotFound.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use axum::extract::rejection::{BytesRejection, PathRejection, QueryRejection};
use axum::extract::{DefaultBodyLimit, Path, Query, State};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use bytes::Bytes;
use serde::Deserialize;
use tracing::{info, info_span, Instrument};

use super::config::ServiceConfig;
use super::context::ContextInitializer;
use super::definition::Operation;
use super::exchange::Exchange;
use super::middleware::auth::{Authorizer, TokenAuthorizer};
use super::middleware::throttle::{self, Throttle};
use super::middleware::{Paginate, RequireId};
use super::pipeline::{Flow, Pipeline, Stage, StageResult};
use super::resolver::ServiceSet;
use crate::error::ApiError;

/// Request header naming the transition to run on `POST /{resource}/{id}`.
pub const ACTION_HEADER: &str = "x-action";

// ---------------------------------------------------------------------------
// Route-level stages
// ---------------------------------------------------------------------------

/// Runs the resolved handler for one CRUD operation.
#[derive(Debug, Clone, Copy)]
pub struct Guarded(pub Operation);

#[async_trait]
impl Stage for Guarded {
    async fn run(&self, ex: &mut Exchange) -> StageResult {
        let handler = ex.context()?.descriptor.slot(self.0).handler().cloned();
        match handler {
            Some(handler) => handler.run(ex).await,
            None => Err(ApiError::not_found(format!(
                "`{}` is not available on `{}`",
                self.0, ex.resource
            ))),
        }
    }
}

/// Runs the named transition when the request carries one that is registered
/// for its method and resource. Otherwise lets the request continue.
#[derive(Debug, Clone)]
pub struct TransitionDispatch {
    services: Arc<ServiceSet>,
}

impl TransitionDispatch {
    #[must_use]
    pub fn new(services: Arc<ServiceSet>) -> Self {
        Self { services }
    }
}

#[async_trait]
impl Stage for TransitionDispatch {
    async fn run(&self, ex: &mut Exchange) -> StageResult {
        let Some(name) = ex.header_str(ACTION_HEADER).map(str::trim).filter(|n| !n.is_empty())
        else {
            return Ok(Flow::Continue);
        };
        let Some(handler) = self
            .services
            .transition(&ex.method, &ex.resource, name)
            .cloned()
        else {
            return Ok(Flow::Continue);
        };
        let name = name.to_string();
        match handler.run(ex).await? {
            Flow::Respond(response) => Ok(Flow::Respond(response)),
            Flow::Continue => Err(ApiError::not_found(format!(
                "transition `{name}` produced no response"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// The six route templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Create,
    TransitionOrUpdate,
    FindOne,
    Replace,
    List,
    Remove,
}

impl Route {
    /// Route template serving `method` on a collection (`has_id == false`)
    /// or instance path.
    #[must_use]
    pub fn select(method: &Method, has_id: bool) -> Option<Self> {
        match (method.as_str(), has_id) {
            ("POST", false) => Some(Self::Create),
            ("GET", false) => Some(Self::List),
            ("POST", true) => Some(Self::TransitionOrUpdate),
            ("GET", true) => Some(Self::FindOne),
            ("PUT", true) => Some(Self::Replace),
            ("DELETE", true) => Some(Self::Remove),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::TransitionOrUpdate => "transition_or_update",
            Self::FindOne => "find_one",
            Self::Replace => "replace",
            Self::List => "list",
            Self::Remove => "remove",
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Owns the six route pipelines built over one installed [`ServiceSet`].
#[derive(Debug, Clone)]
pub struct Dispatcher {
    create: Pipeline,
    transition_or_update: Pipeline,
    find_one: Pipeline,
    replace: Pipeline,
    list: Pipeline,
    remove: Pipeline,
    services: Arc<ServiceSet>,
    mount_prefix: String,
    max_body_bytes: usize,
}

impl Dispatcher {
    /// Builds the dispatcher with the token authorizer and throttle described
    /// by `config`.
    #[must_use]
    pub fn new(services: ServiceSet, config: &ServiceConfig) -> Self {
        Self::with_collaborators(
            services,
            config,
            Arc::new(TokenAuthorizer::new(config.api_tokens.clone())),
            throttle::from_config(&config.throttle),
        )
    }

    #[must_use]
    pub fn with_collaborators(
        services: ServiceSet,
        config: &ServiceConfig,
        authorizer: Arc<dyn Authorizer>,
        throttle: Arc<dyn Throttle>,
    ) -> Self {
        let services = Arc::new(services);
        let init: Arc<dyn Stage> = Arc::new(ContextInitializer::new(
            Arc::clone(&services),
            config,
            authorizer,
            throttle,
        ));
        let instance = |op: Operation| {
            Pipeline::new()
                .then_shared(Arc::clone(&init))
                .then(RequireId)
                .then(Guarded(op))
        };

        Self {
            create: Pipeline::new()
                .then_shared(Arc::clone(&init))
                .then(Guarded(Operation::Create)),
            transition_or_update: Pipeline::new()
                .then_shared(Arc::clone(&init))
                .then(RequireId)
                .then(TransitionDispatch::new(Arc::clone(&services)))
                .then(Guarded(Operation::Update)),
            find_one: instance(Operation::FindOne),
            replace: instance(Operation::Replace),
            list: Pipeline::new()
                .then(Paginate::new(config.paging))
                .then_shared(Arc::clone(&init))
                .then(Guarded(Operation::Find)),
            remove: instance(Operation::Remove),
            services,
            mount_prefix: config.normalized_prefix(),
            max_body_bytes: config.max_body_bytes,
        }
    }

    #[must_use]
    pub fn services(&self) -> &Arc<ServiceSet> {
        &self.services
    }

    #[must_use]
    pub fn mount_prefix(&self) -> &str {
        &self.mount_prefix
    }

    #[must_use]
    pub fn pipeline(&self, route: Route) -> &Pipeline {
        match route {
            Route::Create => &self.create,
            Route::TransitionOrUpdate => &self.transition_or_update,
            Route::FindOne => &self.find_one,
            Route::Replace => &self.replace,
            Route::List => &self.list,
            Route::Remove => &self.remove,
        }
    }

    /// Runs `route` for `ex` and renders the outcome.
    pub async fn handle(&self, route: Route, mut ex: Exchange) -> Response {
        let started = Instant::now();
        let span = info_span!(
            "request",
            route = route.as_str(),
            method = %ex.method,
            resource = %ex.resource,
        );
        async move {
            let response = match self.pipeline(route).respond(&mut ex).await {
                Ok(response) => response.into_response(),
                Err(err) => err.into_response(),
            };
            info!(
                status = response.status().as_u16(),
                elapsed_us = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX),
                "request handled"
            );
            response
        }
        .instrument(span)
        .await
    }

    /// The resource routes, relative to the mount prefix.
    pub fn router(self: Arc<Self>) -> Router {
        let limit = self.max_body_bytes;
        Router::new()
            .route("/{resource}", post(dispatch).get(dispatch))
            .route(
                "/{resource}/{id}",
                post(dispatch).get(dispatch).put(dispatch).delete(dispatch),
            )
            .layer(DefaultBodyLimit::max(limit))
            .with_state(self)
    }

    /// The resource routes nested under the mount prefix.
    pub fn mount(self: Arc<Self>) -> Router {
        let prefix = self.mount_prefix.clone();
        let routes = self.router();
        if prefix.is_empty() {
            routes
        } else {
            Router::new().nest(&prefix, routes)
        }
    }
}

#[derive(Debug, Deserialize)]
struct RouteParams {
    resource: String,
    id: Option<String>,
}

async fn dispatch(
    State(dispatcher): State<Arc<Dispatcher>>,
    method: Method,
    params: Result<Path<RouteParams>, PathRejection>,
    query: Result<Query<HashMap<String, String>>, QueryRejection>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    match prepare(&dispatcher, method, params, query, headers, body) {
        Ok((route, ex)) => dispatcher.handle(route, ex).await,
        Err(err) => err.into_response(),
    }
}

/// Turns the extracted request parts into an exchange. Extractor rejections
/// become [`ApiError`]s; an unknown resource answers NotFound before any
/// body rejection is reported.
fn prepare(
    dispatcher: &Dispatcher,
    method: Method,
    params: Result<Path<RouteParams>, PathRejection>,
    query: Result<Query<HashMap<String, String>>, QueryRejection>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<(Route, Exchange), ApiError> {
    let Path(params) =
        params.map_err(|rejection| ApiError::not_found(rejection.body_text()))?;
    let route = Route::select(&method, params.id.is_some())
        .ok_or_else(|| ApiError::not_found(format!("no route for {method}")))?;
    if dispatcher.services.get(&params.resource).is_none() {
        return Err(ApiError::not_found(format!(
            "unknown resource `{}`",
            params.resource
        )));
    }
    let Query(query) =
        query.map_err(|rejection| ApiError::bad_request(rejection.body_text()))?;
    let body = body.map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge(rejection.body_text())
        } else {
            ApiError::bad_request(rejection.body_text())
        }
    })?;

    let mut ex = Exchange::new(method, params.resource)
        .with_query(query)
        .with_headers(headers)
        .with_body(body);
    ex.id = params.id;
    Ok((route, ex))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use restkit_core::{MemoryModel, StateMachines};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::service::base::BaseTemplate;
    use crate::service::config::ApiToken;
    use crate::service::definition::RawServiceDefinition;
    use crate::service::registry::{ResourceRegistry, StaticDefinition};
    use crate::service::resolver::bootstrap;
    use crate::service::response::ApiResponse;

    struct Approve;

    #[async_trait]
    impl Stage for Approve {
        async fn run(&self, ex: &mut Exchange) -> StageResult {
            Ok(Flow::Respond(ApiResponse::ok(json!({"approved": ex.id()?}))))
        }
    }

    async fn app(definition: RawServiceDefinition) -> Router {
        let base = BaseTemplate::new(Arc::new(StateMachines::with_defaults()));
        let registry = ResourceRegistry::new().with(
            "orders",
            Arc::new(MemoryModel::new("orders")),
            StaticDefinition(definition),
        );
        let services = bootstrap(&registry, &base).await.unwrap();
        let config = ServiceConfig {
            api_tokens: vec![ApiToken::new("tests", "t0k")],
            ..ServiceConfig::default()
        };
        Arc::new(Dispatcher::new(services, &config)).router()
    }

    async fn call(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    fn post(uri: &str, action: Option<&str>, body: &str) -> Request<Body> {
        let mut builder = Request::post(uri)
            .header("content-type", "application/json")
            .header("authorization", "Bearer t0k");
        if let Some(action) = action {
            builder = builder.header(ACTION_HEADER, action);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    #[test]
    fn route_selection() {
        assert_eq!(Route::select(&Method::POST, false), Some(Route::Create));
        assert_eq!(Route::select(&Method::GET, false), Some(Route::List));
        assert_eq!(Route::select(&Method::POST, true), Some(Route::TransitionOrUpdate));
        assert_eq!(Route::select(&Method::DELETE, true), Some(Route::Remove));
        assert_eq!(Route::select(&Method::PUT, false), None);
    }

    #[tokio::test]
    async fn registered_transition_short_circuits_update() {
        let app = app(RawServiceDefinition::new().transition(Method::POST, "approve", Approve)).await;
        let (status, body) = call(&app, post("/orders/o1", Some("approve"), "")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"approved": "o1"}));
    }

    #[tokio::test]
    async fn unknown_action_falls_through_to_update() {
        let app = app(RawServiceDefinition::new().transition(Method::POST, "approve", Approve)).await;
        let (status, body) = call(&app, post("/orders/o1", Some("ship"), "{}")).await;
        // The update handler ran: the workflow engine asked for an action.
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn disabled_slot_is_not_found() {
        let app = app(RawServiceDefinition::new().disable(Operation::Create)).await;
        let (status, body) = call(&app, post("/orders", None, r#"{"a":1}"#)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn mount_applies_prefix() {
        let base = BaseTemplate::new(Arc::new(StateMachines::with_defaults()));
        let registry = ResourceRegistry::new().with(
            "orders",
            Arc::new(MemoryModel::new("orders")),
            StaticDefinition::default(),
        );
        let services = bootstrap(&registry, &base).await.unwrap();
        let dispatcher = Arc::new(Dispatcher::new(services, &ServiceConfig::default()));
        assert_eq!(dispatcher.mount_prefix(), "/v");
        let app = dispatcher.mount();

        let (status, body) = call(&app, Request::get("/v/orders").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([]));
    }

    #[tokio::test]
    async fn writes_without_token_are_unauthorized() {
        let app = app(RawServiceDefinition::new()).await;
        let request = Request::post("/orders").body(Body::from("{}")).unwrap();
        let (status, body) = call(&app, request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "UNAUTHORIZED");
    }

    #[tokio::test]
    async fn malformed_id_is_not_found() {
        let app = app(RawServiceDefinition::new()).await;
        let long = "x".repeat(65);
        let (status, _) = call(
            &app,
            Request::get(format!("/orders/{long}")).body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}

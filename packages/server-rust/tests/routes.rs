//! End-to-end behavior of the mounted resource routes.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use restkit_core::{MemoryModel, StateMachines};
use restkit_server::network::{NetworkConfig, NetworkModule};
use restkit_server::service::{
    bootstrap, ApiResponse, ApiToken, BaseTemplate, BootstrapError, Dispatcher, Exchange, Flow,
    Operation, RawServiceDefinition, ResourceRegistry, ServiceConfig, ServiceFactory, Stage,
    StageResult, StaticDefinition, ThrottleConfig, ACTION_HEADER, BUMPUP,
};
use serde_json::{json, Value};
use tower::ServiceExt;

const TOKEN: &str = "Bearer s3cret";

struct Approve;

#[async_trait]
impl Stage for Approve {
    async fn run(&self, ex: &mut Exchange) -> StageResult {
        Ok(Flow::Respond(ApiResponse::ok(json!({ "approved": ex.id()? }))))
    }
}

/// Counts its runs and answers 200.
struct Counted(Arc<AtomicU32>);

#[async_trait]
impl Stage for Counted {
    async fn run(&self, _ex: &mut Exchange) -> StageResult {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(Flow::Respond(ApiResponse::ok(json!({}))))
    }
}

struct Failing;

#[async_trait]
impl ServiceFactory for Failing {
    async fn definition(&self) -> anyhow::Result<RawServiceDefinition> {
        anyhow::bail!("policy store unreachable")
    }
}

fn config() -> ServiceConfig {
    ServiceConfig {
        api_tokens: vec![ApiToken::new("tests", "s3cret")],
        ..ServiceConfig::default()
    }
}

fn registry() -> ResourceRegistry {
    ResourceRegistry::new()
        .with(
            "users",
            Arc::new(MemoryModel::new("users").with_unique(["email"])),
            StaticDefinition::default(),
        )
        .with(
            "orders",
            Arc::new(MemoryModel::new("orders")),
            StaticDefinition(
                RawServiceDefinition::new()
                    .transition(Method::POST, "approve", Approve)
                    .transition(Method::POST, BUMPUP, Approve)
                    .disable(Operation::Remove),
            ),
        )
        .with(
            "tags",
            Arc::new(MemoryModel::new("tags")),
            StaticDefinition(RawServiceDefinition::new().skip_bumpup()),
        )
}

async fn app_with(config: &ServiceConfig) -> Router {
    let base = BaseTemplate::new(Arc::new(StateMachines::with_defaults()));
    let services = bootstrap(&registry(), &base).await.unwrap();
    let dispatcher = Arc::new(Dispatcher::new(services, config));
    NetworkModule::new(NetworkConfig::default()).build_router(dispatcher)
}

async fn app() -> Router {
    app_with(&config()).await
}

struct Reply {
    status: StatusCode,
    location: Option<String>,
    link: Option<String>,
    body: Value,
}

async fn send(app: &Router, request: Request<Body>) -> Reply {
    let response = app.clone().oneshot(request).await.unwrap();
    let header = |name: &str| {
        response
            .headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    let status = response.status();
    let location = header("location");
    let link = header("link");
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    Reply {
        status,
        location,
        link,
        body,
    }
}

fn request(method: Method, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", TOKEN)
        .header("content-type", "application/json");
    match body {
        Some(body) => builder.body(Body::from(body.to_string())).unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

fn action(uri: &str, name: &str, body: Value) -> Request<Body> {
    let mut request = request(Method::POST, uri, Some(body));
    request
        .headers_mut()
        .insert(ACTION_HEADER, name.parse().unwrap());
    request
}

async fn create(app: &Router, resource: &str, body: Value) -> String {
    let reply = send(app, request(Method::POST, &format!("/v/{resource}"), Some(body))).await;
    assert_eq!(reply.status, StatusCode::CREATED);
    reply.body["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn unknown_resource_is_not_found_on_every_route() {
    let app = app().await;
    let cases = [
        (Method::POST, "/v/ghosts", Some(json!({}))),
        (Method::GET, "/v/ghosts", None),
        (Method::POST, "/v/ghosts/g1", Some(json!({}))),
        (Method::GET, "/v/ghosts/g1", None),
        (Method::PUT, "/v/ghosts/g1", Some(json!({}))),
        (Method::DELETE, "/v/ghosts/g1", None),
    ];
    for (method, uri, body) in cases {
        let reply = send(&app, request(method.clone(), uri, body)).await;
        assert_eq!(reply.status, StatusCode::NOT_FOUND, "{method} {uri}");
        assert_eq!(reply.body["error"]["code"], "NOT_FOUND");
    }
}

#[tokio::test]
async fn undecodable_path_segments_are_json_not_found() {
    let app = app().await;
    for (method, uri) in [
        (Method::GET, "/v/%FF"),
        (Method::GET, "/v/nope/%FF"),
        (Method::GET, "/v/users/%FF"),
        (Method::DELETE, "/v/users/%FF"),
    ] {
        let reply = send(&app, request(method.clone(), uri, None)).await;
        assert_eq!(reply.status, StatusCode::NOT_FOUND, "{method} {uri}");
        assert_eq!(reply.body["error"]["code"], "NOT_FOUND");
    }
}

#[tokio::test]
async fn oversized_body_is_rejected_through_the_error_path() {
    let config = ServiceConfig {
        max_body_bytes: 64,
        ..config()
    };
    let app = app_with(&config).await;
    let big = json!({ "blob": "x".repeat(1024) });

    let reply = send(&app, request(Method::POST, "/v/nope", Some(big.clone()))).await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
    assert_eq!(reply.body["error"]["code"], "NOT_FOUND");

    let reply = send(&app, request(Method::POST, "/v/users", Some(big))).await;
    assert_eq!(reply.status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(reply.body["error"]["code"], "PAYLOAD_TOO_LARGE");
}

#[tokio::test]
async fn create_then_read_replace_and_remove() {
    let app = app().await;

    let reply = send(
        &app,
        request(Method::POST, "/v/users", Some(json!({"email": "a@x.io"}))),
    )
    .await;
    assert_eq!(reply.status, StatusCode::CREATED);
    let id = reply.body["id"].as_str().unwrap().to_string();
    assert_eq!(reply.location.as_deref(), Some(format!("/v/users/{id}").as_str()));

    let reply = send(&app, request(Method::GET, &format!("/v/users/{id}"), None)).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["email"], "a@x.io");

    let reply = send(
        &app,
        request(
            Method::PUT,
            &format!("/v/users/{id}"),
            Some(json!({"email": "b@x.io"})),
        ),
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.location.as_deref(), Some(format!("/v/users/{id}").as_str()));
    assert_eq!(reply.body["email"], "b@x.io");

    let reply = send(&app, request(Method::DELETE, &format!("/v/users/{id}"), None)).await;
    assert_eq!(reply.status, StatusCode::NO_CONTENT);
    assert_eq!(reply.body, Value::Null);

    let reply = send(&app, request(Method::GET, &format!("/v/users/{id}"), None)).await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn duplicate_unique_key_on_create_is_conflict() {
    let app = app().await;
    create(&app, "users", json!({"email": "dup@x.io"})).await;

    let reply = send(
        &app,
        request(Method::POST, "/v/users", Some(json!({"email": "dup@x.io"}))),
    )
    .await;
    assert_eq!(reply.status, StatusCode::CONFLICT);
    assert_eq!(reply.body["error"]["code"], "CONFLICT");
}

#[tokio::test]
async fn duplicate_key_on_replace_is_not_reclassified() {
    let app = app().await;
    create(&app, "users", json!({"email": "one@x.io"})).await;
    let id = create(&app, "users", json!({"email": "two@x.io"})).await;

    let reply = send(
        &app,
        request(
            Method::PUT,
            &format!("/v/users/{id}"),
            Some(json!({"email": "one@x.io"})),
        ),
    )
    .await;
    assert_eq!(reply.status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn list_pages_with_next_link() {
    let app = app().await;
    for n in 0..3 {
        create(&app, "users", json!({"email": format!("u{n}@x.io"), "n": n})).await;
    }

    let reply = send(&app, request(Method::GET, "/v/users?count=2&sort=n&direction=asc", None)).await;
    assert_eq!(reply.status, StatusCode::OK);
    let items = reply.body.as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["n"], 0);
    assert_eq!(
        reply.link.as_deref(),
        Some("</v/users?start=2&count=2&sort=n&direction=asc>; rel=\"next\"")
    );

    let reply = send(&app, request(Method::GET, "/v/users?start=2&count=2&sort=n&direction=asc", None)).await;
    assert_eq!(reply.body.as_array().unwrap().len(), 1);
    assert!(reply.link.is_none());

    let reply = send(&app, request(Method::GET, "/v/users?count=lots", None)).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn registered_transition_runs_instead_of_update() {
    let app = app().await;
    let id = create(&app, "orders", json!({"total": 3})).await;

    let reply = send(&app, action(&format!("/v/orders/{id}"), "approve", json!({}))).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body, json!({ "approved": id }));
}

#[tokio::test]
async fn unmatched_transition_falls_through_to_workflow_update() {
    let app = app().await;
    let id = create(&app, "orders", json!({"total": 3})).await;

    let reply = send(
        &app,
        action(&format!("/v/orders/{id}"), "ship", json!({"action": "review"})),
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["status"], "reviewing");
    assert_eq!(reply.location.as_deref(), Some(format!("/v/orders/{id}").as_str()));

    let reply = send(
        &app,
        request(Method::POST, &format!("/v/orders/{id}"), Some(json!({"action": "edit"}))),
    )
    .await;
    assert_eq!(reply.status, StatusCode::CONFLICT);
    assert_eq!(reply.body["error"]["code"], "ILLEGAL_TRANSITION");
}

#[tokio::test]
async fn transition_and_update_each_run_exactly_once() {
    let transitions = Arc::new(AtomicU32::new(0));
    let updates = Arc::new(AtomicU32::new(0));
    let base = BaseTemplate::new(Arc::new(StateMachines::with_defaults()));
    let registry = ResourceRegistry::new().with(
        "jobs",
        Arc::new(MemoryModel::new("jobs")),
        StaticDefinition(
            RawServiceDefinition::new()
                .transition(Method::POST, "run", Counted(Arc::clone(&transitions)))
                .handler(Operation::Update, Counted(Arc::clone(&updates))),
        ),
    );
    let services = bootstrap(&registry, &base).await.unwrap();
    let app = Arc::new(Dispatcher::new(services, &config())).mount();

    let reply = send(&app, action("/v/jobs/j1", "run", json!({}))).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(transitions.load(Ordering::SeqCst), 1);
    assert_eq!(updates.load(Ordering::SeqCst), 0);

    let reply = send(&app, action("/v/jobs/j1", "unknown", json!({}))).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(transitions.load(Ordering::SeqCst), 1);
    assert_eq!(updates.load(Ordering::SeqCst), 1);

    let reply = send(&app, request(Method::POST, "/v/jobs/j1", Some(json!({})))).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(transitions.load(Ordering::SeqCst), 1);
    assert_eq!(updates.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn builtin_bumpup_overrides_author_handler() {
    let app = app().await;
    let id = create(&app, "orders", json!({"total": 1})).await;

    let reply = send(&app, action(&format!("/v/orders/{id}"), BUMPUP, json!({}))).await;
    assert_eq!(reply.status, StatusCode::NO_CONTENT);

    let reply = send(&app, request(Method::GET, &format!("/v/orders/{id}"), None)).await;
    assert!(reply.body["bumpedAt"].is_number());
}

#[tokio::test]
async fn skipped_bumpup_falls_through_to_update() {
    let app = app().await;
    let id = create(&app, "tags", json!({"label": "x"})).await;

    let reply = send(&app, action(&format!("/v/tags/{id}"), BUMPUP, json!({}))).await;
    // No `action` in the payload: the update handler reached the workflow engine.
    assert_eq!(reply.status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn disabled_operation_is_not_found() {
    let app = app().await;
    let id = create(&app, "orders", json!({"total": 1})).await;

    let reply = send(&app, request(Method::DELETE, &format!("/v/orders/{id}"), None)).await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);

    let reply = send(&app, request(Method::GET, &format!("/v/orders/{id}"), None)).await;
    assert_eq!(reply.status, StatusCode::OK);
}

#[tokio::test]
async fn malformed_id_is_not_found() {
    let app = app().await;
    let long = "x".repeat(65);
    for id in ["a.b", "%20", long.as_str()] {
        let reply = send(&app, request(Method::GET, &format!("/v/users/{id}"), None)).await;
        assert_eq!(reply.status, StatusCode::NOT_FOUND, "{id}");
    }
}

#[tokio::test]
async fn writes_need_a_valid_token() {
    let app = app().await;

    let anonymous = Request::post("/v/users")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"email":"a@x.io"}"#))
        .unwrap();
    let reply = send(&app, anonymous).await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);

    let wrong = Request::post("/v/users")
        .header("authorization", "Bearer nope")
        .body(Body::from(r#"{"email":"a@x.io"}"#))
        .unwrap();
    assert_eq!(send(&app, wrong).await.status, StatusCode::FORBIDDEN);

    let read = Request::get("/v/users").body(Body::empty()).unwrap();
    assert_eq!(send(&app, read).await.status, StatusCode::OK);
}

#[tokio::test]
async fn malformed_json_is_bad_request() {
    let app = app().await;
    let reply = send(
        &app,
        Request::post("/v/users")
            .header("authorization", TOKEN)
            .body(Body::from("{not json"))
            .unwrap(),
    )
    .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn missing_required_field_is_unprocessable() {
    let base = BaseTemplate::new(Arc::new(StateMachines::with_defaults()));
    let registry = ResourceRegistry::new().with(
        "people",
        Arc::new(MemoryModel::new("people").with_required(["name"])),
        StaticDefinition::default(),
    );
    let services = bootstrap(&registry, &base).await.unwrap();
    let app = Arc::new(Dispatcher::new(services, &config())).mount();

    let reply = send(&app, request(Method::POST, "/v/people", Some(json!({"age": 3})))).await;
    assert_eq!(reply.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(reply.body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn throttle_rejects_requests_over_the_limit() {
    let config = ServiceConfig {
        throttle: ThrottleConfig {
            enabled: true,
            per_second: 1,
            burst: 1,
        },
        ..config()
    };
    let app = app_with(&config).await;

    assert_eq!(send(&app, request(Method::GET, "/v/users", None)).await.status, StatusCode::OK);
    let reply = send(&app, request(Method::GET, "/v/users", None)).await;
    assert_eq!(reply.status, StatusCode::TOO_MANY_REQUESTS);

    // Limits are per resource.
    assert_eq!(send(&app, request(Method::GET, "/v/tags", None)).await.status, StatusCode::OK);
}

#[tokio::test]
async fn one_failing_factory_aborts_bootstrap() {
    let base = BaseTemplate::new(Arc::new(StateMachines::with_defaults()));
    let registry = registry().with("broken", Arc::new(MemoryModel::new("broken")), Failing);

    let err = bootstrap(&registry, &base).await.unwrap_err();
    match err {
        BootstrapError::Factory { resource, source } => {
            assert_eq!(resource, "broken");
            assert!(source.to_string().contains("unreachable"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn health_lists_resources_outside_the_prefix() {
    let app = app().await;
    let reply = send(&app, Request::get("/health").body(Body::empty()).unwrap()).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["resources"], json!(["orders", "tags", "users"]));
}

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode},
};
use memodaemon::{
    AppState, ConflictPolicy, DaemonConfig, LifecycleController, Registry, Transport,
    build_router, server::Dataset,
};
use serde_json::{Value, json};
use tower::ServiceExt;

/// Transport whose stop never completes, so the daemon stays in `draining`.
struct StuckTransport;

#[async_trait]
impl Transport for StuckTransport {
    async fn stop(&self) -> memodaemon::Result<()> {
        std::future::pending::<()>().await;
        Ok(())
    }

    fn is_serving(&self) -> bool {
        true
    }
}

struct TestApp {
    router: axum::Router,
    registry: Arc<Registry<Dataset>>,
    lifecycle: Arc<LifecycleController>,
}

fn app_with(config: DaemonConfig) -> TestApp {
    let registry = Arc::new(Registry::with_policies(
        config.duplicate_identifier_policy,
        config.alias_conflict_policy,
    ));
    let lifecycle = LifecycleController::new(&config).expect("controller should build");
    lifecycle
        .attach_transport(Arc::new(StuckTransport))
        .expect("transport should attach");
    let router = build_router(AppState::new(registry.clone(), lifecycle.clone()));

    TestApp {
        router,
        registry,
        lifecycle,
    }
}

fn app() -> TestApp {
    app_with(DaemonConfig::new().drain_grace(Duration::from_secs(3600)))
}

async fn send(
    app: &axum::Router,
    method: Method,
    uri: &str,
    payload: Option<Value>,
) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match payload {
        Some(payload) => builder
            .header("content-type", "application/json")
            .body(Body::from(payload.to_string())),
        None => builder.body(Body::empty()),
    }
    .expect("request should build");

    let response = app
        .clone()
        .oneshot(request)
        .await
        .expect("response expected");
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body should be readable");

    if body.is_empty() {
        return (status, Value::Null);
    }

    let json = serde_json::from_slice::<Value>(&body).expect("body should be valid JSON");
    (status, json)
}

#[tokio::test]
async fn register_alias_and_lookup_scenario() {
    let app = app();

    let (status, created) = send(
        &app.router,
        Method::POST,
        "/datasets",
        Some(json!({ "identifier": "1", "alias": "foo", "data": [1, 2, 3] })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["identifier"], "1");
    assert_eq!(created["aliases"], json!(["foo"]));

    let (status, alias) = send(&app.router, Method::GET, "/aliases/foo", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(alias["identifier"], "1");

    let (status, fetched) = send(&app.router, Method::GET, "/datasets/foo", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["identifier"], "1");
    assert_eq!(fetched["resolved_via"], "alias");
    assert_eq!(fetched["data"], json!([1, 2, 3]));

    let (status, fetched) = send(&app.router, Method::GET, "/datasets/1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["resolved_via"], "identifier");

    let (status, missing) = send(&app.router, Method::GET, "/datasets/2", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(missing["code"], "unresolved_reference");
}

#[tokio::test]
async fn identifier_takes_precedence_over_alias() {
    let app = app();
    app.registry
        .register("1", Dataset { data: json!("one") })
        .unwrap();
    app.registry
        .register("2", Dataset { data: json!("two") })
        .unwrap();

    let (status, bound) = send(&app.router, Method::PUT, "/datasets/1/aliases/2", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(bound["identifier"], "1");

    let (status, fetched) = send(&app.router, Method::GET, "/datasets/2", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["identifier"], "2");
    assert_eq!(fetched["data"], "two");
}

#[tokio::test]
async fn auto_identifiers_and_duplicate_rejection() {
    let app = app();

    let (status, first) = send(
        &app.router,
        Method::POST,
        "/datasets",
        Some(json!({ "data": { "rows": 10 } })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(first["identifier"], "1");

    let (status, second) = send(
        &app.router,
        Method::POST,
        "/datasets",
        Some(json!({ "identifier": "  ", "data": null })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(second["identifier"], "2");

    let (status, conflict) = send(
        &app.router,
        Method::POST,
        "/datasets",
        Some(json!({ "identifier": "1", "data": [] })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(conflict["code"], "duplicate_identifier");

    let (status, listed) = send(&app.router, Method::GET, "/datasets", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed["datasets"].as_array().map(Vec::len), Some(2));
}

#[tokio::test]
async fn overwrite_policies_replace_instead_of_failing() {
    let app = app_with(
        DaemonConfig::new()
            .drain_grace(Duration::from_secs(3600))
            .duplicate_identifier_policy(ConflictPolicy::Overwrite)
            .alias_conflict_policy(ConflictPolicy::Overwrite),
    );

    for (id, data) in [("a", 1), ("b", 2), ("a", 3)] {
        let (status, _) = send(
            &app.router,
            Method::POST,
            "/datasets",
            Some(json!({ "identifier": id, "data": data })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    send(&app.router, Method::PUT, "/datasets/a/aliases/latest", None).await;
    let (status, _) = send(&app.router, Method::PUT, "/datasets/b/aliases/latest", None).await;
    assert_eq!(status, StatusCode::OK);

    let (_, fetched) = send(&app.router, Method::GET, "/datasets/latest", None).await;
    assert_eq!(fetched["identifier"], "b");

    let (_, fetched) = send(&app.router, Method::GET, "/datasets/a", None).await;
    assert_eq!(fetched["data"], 3);
}

#[tokio::test]
async fn alias_conflict_is_rejected_by_default() {
    let app = app();
    app.registry.register("1", Dataset { data: json!(1) }).unwrap();
    app.registry.register("2", Dataset { data: json!(2) }).unwrap();

    send(&app.router, Method::PUT, "/datasets/1/aliases/foo", None).await;
    let (status, body) = send(&app.router, Method::PUT, "/datasets/2/aliases/foo", None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "alias_conflict");

    let (status, body) = send(&app.router, Method::PUT, "/datasets/9/aliases/bar", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "unresolved_reference");
}

#[tokio::test]
async fn delete_dataset_and_unbind_alias() {
    let app = app();
    app.registry.register("1", Dataset { data: json!(1) }).unwrap();
    app.registry.bind_alias("foo", "1").unwrap();
    app.registry.bind_alias("bar", "1").unwrap();

    let (status, _) = send(&app.router, Method::DELETE, "/aliases/bar", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, body) = send(&app.router, Method::GET, "/aliases/bar", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "unknown_alias");

    let (status, _) = send(&app.router, Method::DELETE, "/datasets/foo", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&app.router, Method::GET, "/datasets/1", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&app.router, Method::GET, "/aliases/foo", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn shutdown_then_health_reports_draining() {
    let app = app();
    app.lifecycle.start();

    let (status, health) = send(&app.router, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "ok");

    let (status, ack) = send(&app.router, Method::POST, "/shutdown", None).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(ack["acknowledged"], true);
    assert_eq!(ack["already_in_progress"], false);

    let (status, health) = send(&app.router, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "draining");

    let (status, ack) = send(&app.router, Method::POST, "/shutdown", None).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(ack["acknowledged"], true);
    assert_eq!(ack["already_in_progress"], true);

    let (status, body) = send(
        &app.router,
        Method::POST,
        "/datasets",
        Some(json!({ "data": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["code"], "shutdown_in_progress");

    // reads are refused too, health keeps answering
    let (status, body) = send(&app.router, Method::GET, "/datasets", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["code"], "shutdown_in_progress");
    assert_eq!(app.lifecycle.in_flight_requests(), 0);

    let (status, health) = send(&app.router, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "draining");
}

#[tokio::test]
async fn max_numeric_identifier_leaves_registry_usable() {
    let app = app();
    let max = u64::MAX.to_string();

    let (status, created) = send(
        &app.router,
        Method::POST,
        "/datasets",
        Some(json!({ "identifier": max, "alias": "x", "data": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["identifier"], max);

    let (status, body) = send(
        &app.router,
        Method::POST,
        "/datasets",
        Some(json!({ "data": 2 })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "identifiers_exhausted");

    let (status, list) = send(&app.router, Method::GET, "/datasets", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list["datasets"].as_array().map(Vec::len), Some(1));

    let (status, found) = send(&app.router, Method::GET, "/datasets/x", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(found["identifier"], max);
    assert_eq!(app.registry.len().unwrap(), 1);
}

#[tokio::test(start_paused = true)]
async fn data_requests_reset_idle_deadline_but_health_does_not() {
    let app = app_with(
        DaemonConfig::new()
            .idle_timeout(Duration::from_secs(60))
            .drain_grace(Duration::from_secs(3600)),
    );
    app.lifecycle.start();
    let armed_at = app.lifecycle.idle_deadline().expect("reaper should be armed");

    tokio::time::advance(Duration::from_secs(10)).await;
    send(&app.router, Method::GET, "/health", None).await;
    assert_eq!(app.lifecycle.idle_deadline(), Some(armed_at));

    send(&app.router, Method::GET, "/datasets", None).await;
    assert_eq!(
        app.lifecycle.idle_deadline(),
        Some(armed_at + Duration::from_secs(10))
    );

    // failed lookups are still activity
    tokio::time::advance(Duration::from_secs(5)).await;
    let (status, _) = send(&app.router, Method::GET, "/datasets/nope", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(
        app.lifecycle.idle_deadline(),
        Some(armed_at + Duration::from_secs(15))
    );
}

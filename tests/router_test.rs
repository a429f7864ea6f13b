use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use qa_coordinator::config::CoordinatorConfig;
use qa_coordinator::results::RunResults;
use qa_coordinator::server::build_router;
use qa_coordinator::state::{CoordinatorState, SharedState};
use serde_json::{json, Value};
use tower::ServiceExt;

fn app() -> (SharedState, Router) {
    let state = CoordinatorState::new(CoordinatorConfig::default(), Vec::new()).shared();
    let router = build_router(state.clone());
    (state, router)
}

async fn call(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

#[tokio::test]
async fn test_health() {
    let (_, router) = app();
    let (status, body) = call(&router, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["clients"]["registered"], 0);
}

#[tokio::test]
async fn test_register_and_list_clients() {
    let (_, router) = app();
    let (status, _) = call(
        &router,
        "POST",
        "/clients/register",
        Some(json!({"name": "d1", "callback_url": "http://127.0.0.1:7100/"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = call(
        &router,
        "POST",
        "/clients/register",
        Some(json!({"name": "d1", "callback_url": "http://127.0.0.1:7100/"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("already registered"));

    let (_, clients) = call(&router, "GET", "/clients", None).await;
    assert_eq!(clients[0]["name"], "d1");
    assert_eq!(clients[0]["state"], "registered");

    let (_, history) = call(&router, "GET", "/events/history", None).await;
    assert_eq!(history["events"][0]["event"]["type"], "client_registered");
}

#[tokio::test]
async fn test_bad_callback_is_bad_request() {
    let (_, router) = app();
    let (status, _) = call(
        &router,
        "POST",
        "/clients/register",
        Some(json!({"name": "d1", "callback_url": "nope"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_results_from_unknown_client() {
    let (_, router) = app();
    let results = RunResults::new("s", "ghost", false).unwrap();
    let (status, _) = call(
        &router,
        "POST",
        "/clients/ghost/results",
        Some(serde_json::to_value(&results).unwrap()),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_lock_contention_over_http() {
    let (_, router) = app();
    let lock = |client: &str| {
        json!({
            "client": client,
            "script": "checkout",
            "name": "inventory",
            "wait_ms": 50,
        })
    };

    let (status, body) = call(&router, "POST", "/objects/lock", Some(lock("d1"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["acquired"], true);

    let (_, body) = call(&router, "POST", "/objects/lock", Some(lock("d2"))).await;
    assert_eq!(body["acquired"], false);

    let (_, body) = call(&router, "POST", "/objects/unlock", Some(lock("d1"))).await;
    assert_eq!(body["released"], true);

    let (_, body) = call(&router, "POST", "/objects/lock", Some(lock("d2"))).await;
    assert_eq!(body["acquired"], true);

    let (_, objects) = call(&router, "GET", "/objects", None).await;
    assert_eq!(objects[0]["holder"], "d2");
}

#[tokio::test]
async fn test_event_type_mismatch_is_conflict() {
    let (_, router) = app();
    let body = json!({"client": "d1", "script": "s", "name": "gate", "object_type": "event", "wait_ms": 0});
    let (status, _) = call(&router, "POST", "/objects/lock", Some(body)).await;
    assert_eq!(status, StatusCode::OK);

    let as_mutex = json!({"client": "d1", "script": "s", "name": "gate", "wait_ms": 0});
    let (status, _) = call(&router, "POST", "/objects/lock", Some(as_mutex)).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_shutdown_rejects_new_clients() {
    let (state, router) = app();
    let (status, body) = call(&router, "POST", "/shutdown", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["waited"], false);
    assert!(!state.coordinator.is_accepting());

    let (status, _) = call(
        &router,
        "POST",
        "/clients/register",
        Some(json!({"name": "d1", "callback_url": "http://127.0.0.1:7100/"})),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

fn reported_run() -> Value {
    let results = RunResults::new("s", "ghost", false).unwrap();
    let h = results.create_test("GET /", Value::Null).unwrap();
    results.pass_test(h, None, None).unwrap();
    serde_json::to_value(&results).unwrap()
}

#[tokio::test]
async fn test_malformed_results_are_bad_request() {
    let (_, router) = app();

    let mut forged = reported_run();
    forged["counters"]["passed"] = json!(99);
    let mut dangling = reported_run();
    dangling["current_page"] = json!(7);
    let mut hot_cpu = reported_run();
    hot_cpu["cpu"] = json!({
        "request_time": -50,
        "connect_time": -1,
        "first_byte_time": -1,
        "last_byte_time": -1,
        "bytes_sent": -1,
        "bytes_received": -1,
        "cpu_ticks": [{"timestamp_ms": 1, "percent": 150}],
        "min_cpu": 150,
        "max_cpu": 150,
    });
    let mut bad_name = reported_run();
    bad_name["client_name"] = json!("ghost\n");

    for body in [forged, dangling, hot_cpu, bad_name] {
        let (status, reply) = call(&router, "POST", "/clients/ghost/results", Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(reply["error"].as_str().unwrap().starts_with("Invalid argument"));
    }

    // A well-formed report gets past validation to the client lookup.
    let (status, _) = call(
        &router,
        "POST",
        "/clients/ghost/results",
        Some(reported_run()),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_graceful_shutdown_over_http() {
    let (state, router) = app();
    let (status, body) = call(&router, "POST", "/shutdown?wait=true&timeout_ms=100", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["waited"], true);
    assert_eq!(body["drained"], true);
    assert!(*state.coordinator.shutdown_signal().borrow());
}

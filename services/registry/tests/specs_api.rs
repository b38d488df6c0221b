//! Specification API tests driven through the router.

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use rstest::rstest;
use serde_json::{json, Value};
use topo_registry::{api, state::AppState};
use tower::ServiceExt;

fn router() -> Router {
    api::create_router(AppState::new())
}

fn spec(name: &str) -> Value {
    json!({
        "guid": 42,
        "name": name,
        "serve": { "name": "web", "public": true },
        "services": [
            { "name": "web", "replicas": 2, "containers": [{ "image": "acme/web:1" }], "ports": [{ "number": 80 }] }
        ]
    })
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn healthz() {
    let (status, body) = send(&router(), Method::GET, "/healthz", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn put_then_get_round_trips() {
    let app = router();

    let (status, stored) = send(&app, Method::PUT, "/specs/store", Some(spec("store"))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(stored["name"], "store");

    let (status, fetched) = send(&app, Method::GET, "/specs/store", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched, stored);
    assert_eq!(fetched["services"][0]["replicas"], 2);
}

#[tokio::test]
async fn second_put_replaces() {
    let app = router();
    send(&app, Method::PUT, "/specs/store", Some(spec("store"))).await;

    let mut updated = spec("store");
    updated["services"][0]["replicas"] = json!(5);
    let (status, _) = send(&app, Method::PUT, "/specs/store", Some(updated)).await;
    assert_eq!(status, StatusCode::OK);

    let (_, fetched) = send(&app, Method::GET, "/specs/store", None).await;
    assert_eq!(fetched["services"][0]["replicas"], 5);
}

#[tokio::test]
async fn unknown_spec_is_404() {
    let (status, body) = send(&router(), Method::GET, "/specs/missing", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "spec_not_found");
}

#[tokio::test]
async fn list_is_sorted_by_name() {
    let app = router();
    for name in ["zeta", "alpha", "mid"] {
        send(&app, Method::PUT, &format!("/specs/{name}"), Some(spec(name))).await;
    }

    let (status, body) = send(&app, Method::GET, "/specs", None).await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, ["alpha", "mid", "zeta"]);
}

#[tokio::test]
async fn delete_removes() {
    let app = router();
    send(&app, Method::PUT, "/specs/store", Some(spec("store"))).await;

    let (status, _) = send(&app, Method::DELETE, "/specs/store", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&app, Method::DELETE, "/specs/store", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[rstest]
#[case::name_mismatch("/specs/other", spec("store"), "name_mismatch")]
#[case::conflicting_scale(
    "/specs/store",
    json!({
        "name": "store",
        "services": [{
            "name": "cache",
            "replicas": 2,
            "shardSpec": { "shards": 3 },
            "containers": [{ "image": "acme/cache:1" }]
        }]
    }),
    "invalid_spec"
)]
#[case::not_a_spec("/specs/store", json!({ "services": "nope" }), "invalid_body")]
#[tokio::test]
async fn bad_puts_are_400(#[case] uri: &str, #[case] body: Value, #[case] code: &str) {
    let app = router();
    let (status, error) = send(&app, Method::PUT, uri, Some(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["code"], code);

    let (status, listed) = send(&app, Method::GET, "/specs", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed, json!([]));
}

#[tokio::test]
async fn validation_details_name_the_service() {
    let body = json!({
        "name": "store",
        "services": [{
            "name": "cache",
            "replicas": 1,
            "shardSpec": { "shards": 2 },
            "containers": [{ "image": "acme/cache:1" }]
        }]
    });
    let (_, error) = send(&router(), Method::PUT, "/specs/store", Some(body)).await;
    let details = error["details"].as_array().unwrap();
    assert!(details[0].as_str().unwrap().starts_with("cache:"));
}

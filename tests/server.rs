use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use rstest::*;
use serde_json::{Value, json};
use tempfile::TempDir;
use tonematch::EngineBuilder;
use tonematch::config::ConfDir;
use tonematch::index::IndexBackend;
use tonematch::server::{AppState, create_app};
use tower::ServiceExt;

const TOKEN: &str = "secret";

#[fixture]
fn temp_dir() -> TempDir {
    TempDir::new().unwrap()
}

async fn app(dir: &TempDir) -> Router {
    let engine = EngineBuilder::new(ConfDir::new(dir.path()))
        .dimension(3)
        .backend(IndexBackend::Memory)
        .open()
        .await
        .unwrap();
    create_app(AppState::new(engine, TOKEN.to_string()))
}

fn post(uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder =
        Request::post(uri).header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn records() -> Value {
    json!({
        "records": [
            { "record_id": "A", "vector": [1.0, 0.0, 0.0], "ethnicity": "asian", "skin_type": 3, "age": 30 },
            { "record_id": "B", "vector": [0.0, 1.0, 0.0] },
            { "record_id": "C", "vector": [0.9, 0.1, 0.0], "skin_type": 4 },
        ]
    })
}

#[rstest]
#[tokio::test]
async fn test_search_on_empty_index(temp_dir: TempDir) {
    let app = app(&temp_dir).await;
    let (status, body) =
        send(&app, post("/search", None, json!({ "query_vector": [1.0, 0.0, 0.0], "k": 2 }))).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body["error"].is_string());
}

#[rstest]
#[tokio::test]
async fn test_mutating_routes_require_token(temp_dir: TempDir) {
    let app = app(&temp_dir).await;

    let (status, _) = send(&app, post("/records", Some("wrong"), records())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = send(&app, post("/rebuild", Some("wrong"), json!({}))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = send(&app, post("/records", None, records())).await;
    assert!(status.is_client_error());

    let (_, health) = send(&app, Request::get("/health").body(Body::empty()).unwrap()).await;
    assert_eq!(health["total_vectors"], 0);
}

#[rstest]
#[tokio::test]
async fn test_add_and_search(temp_dir: TempDir) {
    let app = app(&temp_dir).await;

    let (status, body) = send(&app, post("/records", Some(TOKEN), records())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["added"], 3);

    let (status, body) =
        send(&app, post("/search", None, json!({ "query_vector": [1.0, 0.0, 0.0], "k": 2 }))).await;
    assert_eq!(status, StatusCode::OK);
    let results = body["results"].as_array().unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0]["record_id"], "A");
    assert_eq!(results[1]["record_id"], "C");
    assert!((results[1]["visual_similarity"].as_f64().unwrap() - 0.994).abs() < 1e-3);
    assert!(results[0]["demographic_similarity"].is_null());
    assert_eq!(body["fallback_used"], true);
    assert!(body["time"].is_u64());

    let (status, body) = send(
        &app,
        post(
            "/search",
            None,
            json!({
                "query_vector": [1.0, 0.0, 0.0],
                "k": 1,
                "demographic_context": { "ethnicity": "East Asian", "skin_type": 3, "age": 30 },
                "weights": { "visual": 0.5, "demographic": 0.5 },
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["results"][0]["record_id"], "A");
    assert!((body["results"][0]["demographic_similarity"].as_f64().unwrap() - 1.0).abs() < 1e-6);
    assert_eq!(body["fallback_used"], false);

    let (_, health) = send(&app, Request::get("/health").body(Body::empty()).unwrap()).await;
    assert_eq!(health["total_vectors"], 3);
    assert_eq!(health["dimension"], 3);
    assert_eq!(health["consistent"], true);
}

#[rstest]
#[tokio::test]
async fn test_duplicate_record_conflict(temp_dir: TempDir) {
    let app = app(&temp_dir).await;
    send(&app, post("/records", Some(TOKEN), records())).await;

    let dup = json!({ "records": [{ "record_id": "B", "vector": [0.0, 0.0, 1.0] }] });
    let (status, _) = send(&app, post("/records", Some(TOKEN), dup)).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, health) = send(&app, Request::get("/health").body(Body::empty()).unwrap()).await;
    assert_eq!(health["total_vectors"], 3);
}

#[rstest]
#[case(json!({ "query_vector": [1.0, 0.0], "k": 1 }))]
#[case(json!({ "query_vector": [1.0, 0.0, 0.0], "k": 0 }))]
#[case(json!({ "query_vector": [1.0, 0.0, 0.0], "k": -3 }))]
#[case(json!({ "query_vector": [1.0, 0.0, 0.0], "k": 1, "weights": { "visual": 0.0, "demographic": 0.0 } }))]
#[tokio::test]
async fn test_invalid_search(temp_dir: TempDir, #[case] body: Value) {
    let app = app(&temp_dir).await;
    send(&app, post("/records", Some(TOKEN), records())).await;

    let (status, _) = send(&app, post("/search", None, body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[rstest]
#[tokio::test]
async fn test_rebuild_and_persist(temp_dir: TempDir) {
    let app = app(&temp_dir).await;
    send(&app, post("/records", Some(TOKEN), records())).await;

    let (status, body) = send(&app, post("/rebuild", Some(TOKEN), json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_vectors"], 3);

    let (status, body) = send(&app, post("/persist", Some(TOKEN), json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["checksum"].as_str().unwrap().len(), 64);
    assert!(temp_dir.path().join("index.tmix").exists());
}

//! End-to-end tests for the HTTP boundary.
//!
//! Drives the real router in-process; every request passes through the
//! admin gate, caller extraction and error mapping exactly as in production.

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    response::Response,
    Router,
};
use keyvault::vault::{Cipher, Vault, VaultSettings};
use keyvault::web::{create_router, AdminToken, AppState};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

const ADMIN_TOKEN: &str = "test-admin-token";

fn app_with(conceal_forbidden: bool) -> Router {
    let cipher = Cipher::from_base64(&Cipher::generate_master_key()).unwrap();
    let vault = Arc::new(Vault::new(cipher, VaultSettings::default()));
    create_router(AppState::new(
        vault,
        AdminToken::new(ADMIN_TOKEN),
        conceal_forbidden,
    ))
}

fn app() -> Router {
    app_with(false)
}

fn admin(method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("x-api-token", ADMIN_TOKEN);
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

fn contract(caller: &str, service: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/contract/get-key")
        .header("x-contract-address", caller)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({ "service_name": service }).to_string()))
        .unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> Response {
    app.clone().oneshot(request).await.unwrap()
}

async fn body_json(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn create(app: &Router, body: Value) -> String {
    let response = send(app, admin("POST", "/admin/keys", Some(body))).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    body_json(response).await["key_id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_health_is_public() {
    let app = app();
    create(&app, json!({ "service_name": "weather", "api_key": "sk" })).await;

    let response = send(
        &app,
        Request::builder().uri("/health").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["total_keys"], 1);
    assert_eq!(body["active_keys"], 1);
}

#[tokio::test]
async fn test_admin_routes_require_token() {
    let app = app();

    let missing = Request::builder()
        .uri("/admin/keys")
        .body(Body::empty())
        .unwrap();
    assert_eq!(send(&app, missing).await.status(), StatusCode::UNAUTHORIZED);

    let wrong = Request::builder()
        .uri("/admin/keys")
        .header("x-api-token", "nope")
        .body(Body::empty())
        .unwrap();
    assert_eq!(send(&app, wrong).await.status(), StatusCode::UNAUTHORIZED);

    let ok = send(&app, admin("GET", "/admin/keys", None)).await;
    assert_eq!(ok.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_key_lifecycle() {
    let app = app();
    let id = create(
        &app,
        json!({
            "service_name": "weather",
            "api_key": "sk-live-1",
            "description": "OpenWeatherMap",
            "allowed_contracts": ["0xA"],
            "rate_limit": 5
        }),
    )
    .await;

    let listed = body_json(send(&app, admin("GET", "/admin/keys", None)).await).await;
    let keys = listed["keys"].as_array().unwrap();
    assert_eq!(keys.len(), 1);
    assert_eq!(keys[0]["key_id"], id.as_str());
    assert!(!listed.to_string().contains("sk-live-1"));

    let granted = send(&app, contract("0xA", "weather")).await;
    assert_eq!(granted.status(), StatusCode::OK);
    let grant = body_json(granted).await;
    assert_eq!(grant["api_key"], "sk-live-1");
    assert_eq!(grant["calls_remaining"], 4);

    let rotated = send(
        &app,
        admin(
            "POST",
            &format!("/admin/keys/{}/rotate", id),
            Some(json!({ "new_api_key": "sk-live-2" })),
        ),
    )
    .await;
    assert_eq!(rotated.status(), StatusCode::OK);
    assert!(body_json(rotated).await["rotated_at"].is_string());

    let grant = body_json(send(&app, contract("0xA", "weather")).await).await;
    assert_eq!(grant["api_key"], "sk-live-2");

    let usage = admin("GET", &format!("/admin/usage/{}", id), None);
    let stats = body_json(send(&app, usage).await).await;
    assert_eq!(stats["total_calls"], 2);
    assert_eq!(stats["calls_last_hour"], 2);
    assert_eq!(stats["rate_limit_hits"], 0);

    let deleted = send(&app, admin("DELETE", &format!("/admin/keys/{}", id), None)).await;
    assert_eq!(deleted.status(), StatusCode::OK);
    let again = send(&app, admin("DELETE", &format!("/admin/keys/{}", id), None)).await;
    assert_eq!(again.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_rotate_accepts_query_parameter() {
    let app = app();
    let id = create(&app, json!({ "service_name": "weather", "api_key": "sk-old" })).await;

    let uri = format!("/admin/keys/{}/rotate?new_api_key=sk-new", id);
    let rotated = send(&app, admin("POST", &uri, None)).await;
    assert_eq!(rotated.status(), StatusCode::OK);

    let grant = body_json(send(&app, contract("0xA", "weather")).await).await;
    assert_eq!(grant["api_key"], "sk-new");

    let uri = format!("/admin/keys/{}/rotate", id);
    let missing = send(&app, admin("POST", &uri, None)).await;
    assert_eq!(missing.status(), StatusCode::BAD_REQUEST);

    let empty = send(&app, admin("POST", &uri, Some(json!({ "new_api_key": "" })))).await;
    assert_eq!(empty.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_create_validation() {
    let app = app();
    for body in [
        json!({ "service_name": "", "api_key": "sk" }),
        json!({ "service_name": "weather", "api_key": "sk", "rate_limit": 0 }),
        json!({ "service_name": "weather", "api_key": "sk", "rate_limit": -1 }),
        json!({ "service_name": "weather" }),
    ] {
        let response = send(&app, admin("POST", "/admin/keys", Some(body))).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}

#[tokio::test]
async fn test_update_rejects_immutable_fields() {
    let app = app();
    let id = create(&app, json!({ "service_name": "weather", "api_key": "sk" })).await;
    let uri = format!("/admin/keys/{}", id);

    for body in [
        json!({ "service_name": "maps" }),
        json!({ "api_key": "sk-other" }),
    ] {
        let response = send(&app, admin("PUT", &uri, Some(body))).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    let response = send(&app, admin("PUT", &uri, Some(json!({ "active": false })))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let summary = body_json(response).await;
    assert_eq!(summary["active"], false);
    assert_eq!(summary["service_name"], "weather");

    let missing = send(&app, admin("PUT", "/admin/keys/unknown", Some(json!({})))).await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);

    assert_eq!(
        send(&app, contract("0xA", "weather")).await.status(),
        StatusCode::NOT_FOUND
    );
}

#[tokio::test]
async fn test_contract_denials() {
    let app = app();
    create(
        &app,
        json!({
            "service_name": "weather",
            "api_key": "sk",
            "allowed_contracts": ["A"],
            "rate_limit": 1
        }),
    )
    .await;

    let no_identity = Request::builder()
        .method("POST")
        .uri("/contract/get-key")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({ "service_name": "weather" }).to_string()))
        .unwrap();
    assert_eq!(send(&app, no_identity).await.status(), StatusCode::UNAUTHORIZED);

    let forbidden = send(&app, contract("B", "weather")).await;
    assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);
    assert!(!body_json(forbidden).await.to_string().contains("\"A\""));

    assert_eq!(
        send(&app, contract("A", "unknown")).await.status(),
        StatusCode::NOT_FOUND
    );

    assert_eq!(send(&app, contract("A", "weather")).await.status(), StatusCode::OK);
    let limited = send(&app, contract("A", "weather")).await;
    assert_eq!(limited.status(), StatusCode::TOO_MANY_REQUESTS);
    let retry_after: u64 = limited.headers()[header::RETRY_AFTER]
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!(retry_after > 3500 && retry_after <= 3600);
}

#[tokio::test]
async fn test_conceal_forbidden_answers_not_found() {
    let app = app_with(true);
    create(
        &app,
        json!({ "service_name": "weather", "api_key": "sk", "allowed_contracts": ["A"] }),
    )
    .await;

    assert_eq!(
        send(&app, contract("B", "weather")).await.status(),
        StatusCode::NOT_FOUND
    );
    assert_eq!(send(&app, contract("A", "weather")).await.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_export_import_round_trip() {
    let source = app();
    create(&source, json!({ "service_name": "weather", "api_key": "sk-w" })).await;
    create(&source, json!({ "service_name": "maps", "api_key": "sk-m", "rate_limit": 3 })).await;

    let snapshot = body_json(send(&source, admin("GET", "/admin/export", None)).await).await;
    assert_eq!(snapshot["keys"].as_array().unwrap().len(), 2);
    assert!(!snapshot.to_string().contains("sk-w"));

    let target = app();
    let imported = send(&target, admin("POST", "/admin/import", Some(snapshot.clone()))).await;
    assert_eq!(imported.status(), StatusCode::OK);
    let report = body_json(imported).await;
    assert_eq!(report["imported"], 2);
    assert_eq!(report["updated"], 0);

    let again = admin("POST", "/admin/import", Some(snapshot));
    let reimported = body_json(send(&target, again).await).await;
    assert_eq!(reimported["imported"], 0);
    assert_eq!(reimported["updated"], 2);

    // Different master key: import succeeds, release fails as an internal error.
    let internal = send(&target, contract("X", "weather")).await;
    assert_eq!(internal.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_json(internal).await["error"], "Internal error");

    let malformed = send(
        &target,
        admin("POST", "/admin/import", Some(json!({ "keys": [{ "key_id": "x" }] }))),
    )
    .await;
    assert_eq!(malformed.status(), StatusCode::BAD_REQUEST);
}

//! End-to-end tests for the JSON-RPC dispatch layer, driven through
//! network-free utility operations.

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request as HttpRequest, StatusCode},
};
use serde_json::{json, Value};
use tower::ServiceExt;

use base_mcp_server::{
    config::Config,
    rpc::{
        handler::handle_rpc_request,
        http,
        protocol::{error_codes, Request, Response},
    },
    AppState,
};

fn test_state() -> AppState {
    AppState::new(Config::default())
}

async fn call(method: &str, params: Value) -> Response {
    let req = Request {
        jsonrpc: "2.0".to_string(),
        id: json!(1),
        method: method.to_string(),
        params: Some(params),
    };
    handle_rpc_request(req, test_state())
        .await
        .expect("non-notification requests always get a response")
}

#[tokio::test]
async fn checksum_is_idempotent_through_the_rpc_surface() {
    let first = call(
        "execute",
        json!({
            "resource": "utility",
            "operation": "checksumAddress",
            "parameters": { "address": "0x833589fcd6edb6e08f4c7c32d4f71b54bda02913" },
        }),
    )
    .await;
    let checksummed = first.result.unwrap()["checksummed"]
        .as_str()
        .unwrap()
        .to_string();
    assert_eq!(checksummed, "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913");

    let second = call(
        "execute",
        json!({
            "resource": "utility",
            "operation": "checksumAddress",
            "parameters": { "address": checksummed },
        }),
    )
    .await;
    assert_eq!(second.result.unwrap()["checksummed"], checksummed);
}

#[tokio::test]
async fn unit_conversion_round_trips_exactly() {
    let to_ether = call(
        "execute",
        json!({
            "resource": "utility",
            "operation": "convertUnits",
            "parameters": { "value": "1000000000000000000", "fromUnit": "wei", "toUnit": "ether" },
        }),
    )
    .await;
    assert_eq!(to_ether.result.unwrap()["converted"], "1.0");

    let to_wei = call(
        "execute",
        json!({
            "resource": "utility",
            "operation": "convertUnits",
            "parameters": { "value": "0.5", "fromUnit": "ether", "toUnit": "wei" },
        }),
    )
    .await;
    assert_eq!(to_wei.result.unwrap()["converted"], "500000000000000000");
}

#[tokio::test]
async fn batch_with_continue_on_fail_isolates_the_failing_item() {
    let resp = call(
        "execute",
        json!({
            "resource": "utility",
            "operation": "hashMessage",
            "continueOnFail": true,
            "parameters": [
                { "message": "one" },
                { "wrong_field": true },
                { "message": "three" },
            ],
        }),
    )
    .await;
    let results = resp.result.unwrap();
    let items = results.as_array().unwrap();
    assert_eq!(items.len(), 3);
    assert!(items[0]["keccak256"].is_string());
    assert!(items[1]["error"].is_string());
    assert!(items[2]["keccak256"].is_string());
}

#[tokio::test]
async fn write_without_key_fails_with_permission_error() {
    // signMessage needs the signing key and performs no network I/O,
    // so a permission failure here proves the check precedes any call
    let resp = call(
        "execute",
        json!({
            "resource": "utility",
            "operation": "signMessage",
            "parameters": { "message": "hello" },
        }),
    )
    .await;
    let err = resp.error.unwrap();
    assert_eq!(err.code, error_codes::PERMISSION_DENIED);
    assert!(err.message.contains("No private key configured"));
}

#[tokio::test]
async fn per_request_credentials_enable_signing() {
    let resp = call(
        "execute",
        json!({
            "resource": "utility",
            "operation": "signMessage",
            "parameters": { "message": "hello" },
            "credentials": {
                "privateKey": "0x0000000000000000000000000000000000000000000000000000000000000001",
            },
        }),
    )
    .await;
    let result = resp.result.unwrap();
    assert_eq!(result["signer"], "0x7E5F4552091A69125d5DfCb7b8C2659029395Bdf");
    assert!(result["signature"].as_str().unwrap().starts_with("0x"));
}

#[tokio::test]
async fn custom_network_without_rpc_url_is_rejected() {
    let resp = call(
        "execute",
        json!({
            "resource": "utility",
            "operation": "hashMessage",
            "parameters": { "message": "hi" },
            "credentials": { "network": "custom" },
        }),
    )
    .await;
    let err = resp.error.unwrap();
    assert_eq!(err.code, error_codes::INVALID_PARAMS);
    assert!(err.message.contains("RPC URL"));
}

#[tokio::test]
async fn unknown_resource_is_invalid_params() {
    let resp = call(
        "execute",
        json!({
            "resource": "teleporter",
            "operation": "engage",
            "parameters": {},
        }),
    )
    .await;
    assert_eq!(resp.error.unwrap().code, error_codes::INVALID_PARAMS);
}

#[tokio::test]
async fn trigger_lifecycle_rejects_double_start_and_stale_stop() {
    let state = test_state();

    let stop = Request {
        jsonrpc: "2.0".to_string(),
        id: json!(1),
        method: "trigger/stop".to_string(),
        params: None,
    };
    let resp = handle_rpc_request(stop, state.clone()).await.unwrap();
    assert_eq!(resp.error.unwrap().code, error_codes::TRIGGER_ERROR);

    let poll = Request {
        jsonrpc: "2.0".to_string(),
        id: json!(2),
        method: "trigger/poll".to_string(),
        params: None,
    };
    let resp = handle_rpc_request(poll, state).await.unwrap();
    assert_eq!(resp.error.unwrap().code, error_codes::TRIGGER_ERROR);
}

#[tokio::test]
async fn health_endpoint_reports_ok() {
    let app = http::router(test_state());

    let response = app
        .oneshot(
            HttpRequest::builder()
                .method(Method::GET)
                .uri("/api/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let parsed: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(parsed["status"], "ok");
}

#[tokio::test]
async fn rpc_endpoint_serves_unit_conversion() {
    let app = http::router(test_state());

    let request = json!({
        "jsonrpc": "2.0",
        "id": 7,
        "method": "execute",
        "params": {
            "resource": "utility",
            "operation": "convertUnits",
            "parameters": { "value": "1000000000000000000", "fromUnit": "wei", "toUnit": "ether" },
        },
    });
    let response = app
        .oneshot(
            HttpRequest::builder()
                .method(Method::POST)
                .uri("/api/rpc")
                .header("Content-Type", "application/json")
                .body(Body::from(serde_json::to_vec(&request).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let parsed: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(parsed["id"], 7);
    assert_eq!(parsed["result"]["converted"], "1.0");
}

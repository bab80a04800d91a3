// src/rpc/http.rs

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};

use crate::rpc::handler::handle_rpc_request;
use crate::rpc::protocol::{error_codes, Request, Response};
use crate::AppState;

pub async fn health_handler() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn rpc_handler(State(state): State<AppState>, Json(req): Json<Request>) -> Json<Response> {
    match handle_rpc_request(req, state).await {
        Some(resp) => Json(resp),
        None => Json(Response::error(
            Value::Null,
            error_codes::INVALID_REQUEST,
            "Notifications are not supported over HTTP".into(),
        )),
    }
}

/// The API routes under `/api`, without middleware layers. The binary
/// adds tracing and CORS on top.
pub fn router(state: AppState) -> Router {
    let api_router = Router::new()
        .route("/health", get(health_handler))
        .route("/rpc", post(rpc_handler));

    Router::new().nest("/api", api_router).with_state(state)
}

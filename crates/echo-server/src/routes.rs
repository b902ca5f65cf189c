//! Routes the echo server registers on its test server.

use std::collections::HashMap;

use axum::{
    extract::Query,
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Response body for `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always `"ok"` while the server is accepting.
    pub status: String,
    /// Whether the server is serving HTTPS.
    pub tls: bool,
}

/// Build the echo router. `tls` is reported by `/health`.
pub fn build(tls: bool) -> Router {
    Router::new()
        .route("/hello", get(hello))
        .route("/echo", post(echo))
        .route("/health", get(move || health(tls)))
}

/// `GET /hello?name=<name>` → `hello <name>`.
async fn hello(Query(params): Query<HashMap<String, String>>) -> String {
    let name = params.get("name").map(String::as_str).unwrap_or_default();
    format!("hello {name}")
}

/// `POST /echo`: returns the request body unchanged.
async fn echo(body: Bytes) -> Bytes {
    body
}

async fn health(tls: bool) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        tls,
    })
}

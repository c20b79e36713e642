pub mod admin;
pub mod auth;
pub mod documents;
pub mod liquidations;
pub mod marketplace;
pub mod orders;
pub mod scan;

use axum::Json;
use serde_json::{json, Value};

/// GET /health
pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

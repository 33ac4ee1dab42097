use axum::{extract::State, response::Json};
use serde_json::{Value, json};
use std::sync::Arc;

use crate::{AppState, BUILD_TIME, GIT_HASH, VERSION};

pub async fn ping() -> Json<Value> {
    Json(json!({ "message": "pong" }))
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    let refresher = state.refresher_status.borrow().clone();
    Json(json!({ "status": "ok", "refresher": refresher }))
}

pub async fn version() -> Json<Value> {
    Json(json!({
        "version": VERSION,
        "git_hash": GIT_HASH,
        "build_time": BUILD_TIME,
    }))
}

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

use crate::AppState;
use crate::config::IdentityCredentials;

// --- Request types ---

#[derive(Deserialize)]
pub struct PuidRequest {
    puid: String,
}

#[derive(Deserialize)]
pub struct PasswordRequest {
    password: String,
}

#[derive(Deserialize)]
pub struct OpenAiCredentialsRequest {
    openai_email: String,
    openai_password: String,
}

// --- Handlers ---

/// Replace the shared `_puid`; an empty value clears it
pub async fn update_puid(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<PuidRequest>, JsonRejection>,
) -> Response {
    let Ok(Json(body)) = payload else {
        return (StatusCode::BAD_REQUEST, "puid not provided").into_response();
    };
    state.session.set(body.puid).await;
    info!("Session credential replaced by admin");
    (StatusCode::OK, "puid updated").into_response()
}

/// Rotate the admin secret
pub async fn update_password(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<PasswordRequest>, JsonRejection>,
) -> Response {
    let Ok(Json(body)) = payload else {
        return (StatusCode::BAD_REQUEST, "password not provided").into_response();
    };
    if body.password.is_empty() {
        return (StatusCode::BAD_REQUEST, "password not provided").into_response();
    }
    *state.admin_secret.write().await = body.password;
    info!("Admin password rotated");
    (StatusCode::OK, "PASSWORD updated").into_response()
}

/// Rotate the identity credentials used by the session refresher's next cycle
pub async fn update_openai(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<OpenAiCredentialsRequest>, JsonRejection>,
) -> Response {
    let Ok(Json(body)) = payload else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "JSON invalid" })),
        )
            .into_response();
    };
    *state.identity.write().await = Some(IdentityCredentials {
        email: body.openai_email,
        password: body.openai_password,
    });
    info!("Identity credentials rotated");
    (StatusCode::OK, "OpenAI credentials updated").into_response()
}

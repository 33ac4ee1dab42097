use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::arkose::ArkoseError;
use crate::transport::TransportError;

/// Terminal failures of a proxied request. Every variant ends the request
/// before anything is streamed to the client.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("{0}")]
    InvalidBody(#[from] serde_json::Error),

    #[error("Failed to acquire arkose token: {0}")]
    ArkoseToken(#[from] ArkoseError),

    #[error("Failed to build upstream request: {0}")]
    RequestBuild(String),

    #[error("{0}")]
    Transport(#[from] TransportError),
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}

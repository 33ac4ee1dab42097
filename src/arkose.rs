//! Arkose anti-bot token acquisition.
//!
//! Tokens are requested fresh for every conversation that needs one and are
//! never cached: the verifier rejects reused tokens.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use futures_util::future::BoxFuture;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE, HeaderMap, HeaderValue, ORIGIN};
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::warn;
use url::Url;

use crate::constants::{
    ARKOSE_CAPI_MODE, ARKOSE_CAPI_VERSION, ARKOSE_ORIGIN, ARKOSE_STYLE_THEME,
};
use crate::transport::{OutboundRequest, Transport, TransportError};

#[derive(Debug, thiserror::Error)]
pub enum ArkoseError {
    #[error("{0}")]
    Transport(#[from] TransportError),

    #[error("token endpoint returned status {0}")]
    Status(StatusCode),

    #[error("failed to read token response: {0}")]
    Read(#[from] std::io::Error),

    #[error("failed to decode token response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("token missing from response")]
    MissingToken,

    #[error("invalid token endpoint: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

pub trait TokenProvider: Send + Sync {
    fn acquire<'a>(
        &'a self,
        site: &'a str,
        public_key: &'a str,
        user_agent: &'a str,
    ) -> BoxFuture<'a, Result<String, ArkoseError>>;
}

/// Token endpoint response. Only `token` matters; the rest is kept for
/// debugging output.
#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct TokenResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    challenge_url: Option<String>,
    #[serde(default)]
    challenge_url_cdn: Option<String>,
    #[serde(default)]
    noscript: Option<String>,
}

/// Anti-caching nonce: a random fraction printed with 17 decimals
pub fn random_nonce() -> String {
    format!("{:.17}", rand::random::<f64>())
}

/// Browser data blob. The encrypted fingerprint fields are sent empty.
fn bda() -> String {
    let blob = json!({ "ct": "", "iv": "", "s": "" });
    STANDARD.encode(blob.to_string())
}

/// Build the urlencoded form posted to the token endpoint
pub fn build_form(site: &str, public_key: &str, user_agent: &str, nonce: &str) -> String {
    format!(
        "bda={}&public_key={}&site={}&userbrowser={}&capi_version={}&capi_mode={}&style_theme={}&rnd={}",
        urlencoding::encode(&bda()),
        public_key,
        urlencoding::encode(site),
        urlencoding::encode(user_agent),
        ARKOSE_CAPI_VERSION,
        ARKOSE_CAPI_MODE,
        ARKOSE_STYLE_THEME,
        nonce,
    )
}

pub struct ArkoseClient {
    transport: Arc<dyn Transport>,
    url: String,
    /// Extra attempts after the first failure
    retries: u32,
}

impl ArkoseClient {
    pub fn new(transport: Arc<dyn Transport>, url: impl Into<String>, retries: u32) -> Self {
        Self {
            transport,
            url: url.into(),
            retries,
        }
    }

    async fn request_token(
        &self,
        site: &str,
        public_key: &str,
        user_agent: &str,
    ) -> Result<String, ArkoseError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded; charset=UTF-8"),
        );
        headers.insert(ORIGIN, HeaderValue::from_static(ARKOSE_ORIGIN));
        headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
        headers.insert("sec-fetch-site", HeaderValue::from_static("same-origin"));
        headers.insert("sec-fetch-mode", HeaderValue::from_static("cors"));

        let form = build_form(site, public_key, user_agent, &random_nonce());
        let request = OutboundRequest {
            method: Method::POST,
            url: Url::parse(&self.url)?,
            headers,
            body: Bytes::from(form),
        };

        let response = self.transport.send(request).await?;
        if response.status != StatusCode::OK {
            return Err(ArkoseError::Status(response.status));
        }

        let body = response.bytes().await?;
        let parsed: TokenResponse = serde_json::from_slice(&body)?;
        parsed
            .token
            .filter(|t| !t.is_empty())
            .ok_or(ArkoseError::MissingToken)
    }
}

impl TokenProvider for ArkoseClient {
    fn acquire<'a>(
        &'a self,
        site: &'a str,
        public_key: &'a str,
        user_agent: &'a str,
    ) -> BoxFuture<'a, Result<String, ArkoseError>> {
        Box::pin(async move {
            let mut attempt = 0;
            loop {
                match self.request_token(site, public_key, user_agent).await {
                    Ok(token) => return Ok(token),
                    Err(e) if attempt < self.retries => {
                        attempt += 1;
                        warn!("Arkose token attempt {attempt} failed, retrying: {e}");
                    }
                    Err(e) => return Err(e),
                }
            }
        })
    }
}

//! Test doubles for the transport, token provider and authenticator seams.

use axum::response::Response;
use bytes::Bytes;
use futures_util::future::BoxFuture;
use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{RwLock, watch};

use crate::AppState;
use crate::arkose::{ArkoseError, TokenProvider};
use crate::auth::{AuthError, Authenticator, RefresherStatus, SessionCredential};
use crate::config::{IdentityCredentials, Upstream, UpstreamErrorPolicy};
use crate::constants::DEFAULT_TIMEOUT_SECS;
use crate::transport::{
    CookieJar, OutboundRequest, Transport, TransportError, UpstreamResponse,
};

type Responder =
    Box<dyn Fn(&OutboundRequest) -> Result<UpstreamResponse, TransportError> + Send + Sync>;

/// Records every request and answers with a canned response
pub struct MockTransport {
    calls: Mutex<Vec<OutboundRequest>>,
    responder: Responder,
}

impl MockTransport {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&OutboundRequest) -> Result<UpstreamResponse, TransportError> + Send + Sync + 'static,
    {
        Self {
            calls: Mutex::new(Vec::new()),
            responder: Box::new(responder),
        }
    }

    pub fn json(status: StatusCode, body: &'static str) -> Self {
        Self::new(move |_| Ok(UpstreamResponse::from_bytes(status, HeaderMap::new(), body)))
    }

    /// Every send fails before reaching the network
    pub fn failing() -> Self {
        Self::new(|_| {
            let err = reqwest::Client::new()
                .get("not a url")
                .build()
                .expect_err("invalid URL must not build");
            Err(TransportError::Network(err))
        })
    }

    pub fn calls(&self) -> Vec<OutboundRequest> {
        self.calls.lock().unwrap().clone()
    }
}

impl Transport for MockTransport {
    fn send(
        &self,
        request: OutboundRequest,
    ) -> BoxFuture<'_, Result<UpstreamResponse, TransportError>> {
        let result = (self.responder)(&request);
        self.calls.lock().unwrap().push(request);
        Box::pin(async move { result })
    }
}

/// Token provider with a fixed answer and a call counter
pub struct MockTokenProvider {
    token: Option<String>,
    calls: AtomicUsize,
}

impl MockTokenProvider {
    pub fn ok(token: &str) -> Self {
        Self {
            token: Some(token.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            token: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl TokenProvider for MockTokenProvider {
    fn acquire<'a>(
        &'a self,
        _site: &'a str,
        _public_key: &'a str,
        _user_agent: &'a str,
    ) -> BoxFuture<'a, Result<String, ArkoseError>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let result = self.token.clone().ok_or(ArkoseError::MissingToken);
        Box::pin(async move { result })
    }
}

/// Plays back scripted login results; fails with `MissingPuid` once exhausted
pub struct MockAuthenticator {
    results: Mutex<VecDeque<Result<String, AuthError>>>,
    seen: Mutex<Vec<String>>,
}

impl MockAuthenticator {
    pub fn new(results: Vec<Result<String, AuthError>>) -> Self {
        Self {
            results: Mutex::new(results.into()),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    pub fn seen_emails(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

impl Authenticator for MockAuthenticator {
    fn authenticate<'a>(
        &'a self,
        credentials: &'a IdentityCredentials,
    ) -> BoxFuture<'a, Result<String, AuthError>> {
        self.seen.lock().unwrap().push(credentials.email.clone());
        let result = self
            .results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(AuthError::MissingPuid));
        Box::pin(async move { result })
    }
}

/// State wired to the given doubles, default upstream, log-only error policy
pub fn test_state(
    transport: Arc<MockTransport>,
    tokens: Arc<MockTokenProvider>,
) -> Arc<AppState> {
    let (_status_tx, refresher_status) = watch::channel(RefresherStatus::Disabled);
    Arc::new(AppState {
        upstream: Upstream::default(),
        transport,
        cookie_jar: Arc::new(CookieJar::new()),
        session: Arc::new(SessionCredential::new(None)),
        token_provider: tokens,
        admin_secret: RwLock::new("admin-secret".to_string()),
        identity: Arc::new(RwLock::new(None)),
        upstream_errors: UpstreamErrorPolicy::LogOnly,
        timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        refresher_status,
    })
}

pub async fn body_bytes(response: Response) -> Bytes {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
}

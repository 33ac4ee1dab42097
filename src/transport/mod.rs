//! Outbound HTTP capability.
//!
//! Everything that leaves the proxy (relayed requests and arkose token
//! requests) goes through one shared [`Transport`]. The shipped
//! implementation is a `reqwest` client presenting a browser header profile
//! with a shared [`CookieJar`]; a transport that also emulates a browser TLS
//! handshake can be dropped in behind the same trait.

pub mod cookies;

use bytes::{Bytes, BytesMut};
use futures_util::future::BoxFuture;
use futures_util::stream::BoxStream;
use futures_util::{StreamExt, TryStreamExt};
use reqwest::header::{COOKIE, HeaderMap, HeaderValue};
use reqwest::{Client, Method, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

pub use cookies::CookieJar;

/// Response body as a stream of raw chunks
pub type BodyStream = BoxStream<'static, Result<Bytes, std::io::Error>>;

#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Bytes,
}

pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: BodyStream,
}

impl UpstreamResponse {
    /// Buffered response for test doubles
    #[cfg(test)]
    pub fn from_bytes(status: StatusCode, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        let body: Bytes = body.into();
        Self {
            status,
            headers,
            body: futures_util::stream::once(async move { Ok(body) }).boxed(),
        }
    }

    /// Drain the whole body into memory
    pub async fn bytes(mut self) -> Result<Bytes, std::io::Error> {
        let mut buf = BytesMut::new();
        while let Some(chunk) = self.body.next().await {
            buf.extend_from_slice(&chunk?);
        }
        Ok(buf.freeze())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid proxy URL: {0}")]
    InvalidProxy(String),
}

pub trait Transport: Send + Sync {
    fn send(&self, request: OutboundRequest)
    -> BoxFuture<'_, Result<UpstreamResponse, TransportError>>;
}

pub struct ReqwestTransport {
    client: Client,
    jar: Arc<CookieJar>,
}

impl ReqwestTransport {
    /// Build the shared client: cookie jar, optional egress proxy, no
    /// redirects, one overall timeout for every request.
    pub fn new(
        jar: Arc<CookieJar>,
        proxy: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let mut builder = Client::builder()
            .cookie_provider(jar.clone())
            .redirect(reqwest::redirect::Policy::none())
            .timeout(timeout)
            .pool_max_idle_per_host(10);

        if let Some(proxy) = proxy {
            let proxy = reqwest::Proxy::all(proxy)
                .map_err(|e| TransportError::InvalidProxy(format!("{proxy}: {e}")))?;
            builder = builder.proxy(proxy);
        }

        Ok(Self {
            client: builder.build()?,
            jar,
        })
    }
}

impl Transport for ReqwestTransport {
    fn send(
        &self,
        request: OutboundRequest,
    ) -> BoxFuture<'_, Result<UpstreamResponse, TransportError>> {
        Box::pin(async move {
            let mut headers = request.headers;
            // reqwest skips the cookie provider when a Cookie header is set
            let merged = headers
                .get(COOKIE)
                .and_then(|v| v.to_str().ok())
                .map(|explicit| self.jar.merge_header(&request.url, explicit));
            if let Some(value) = merged.and_then(|m| HeaderValue::from_str(&m).ok()) {
                headers.insert(COOKIE, value);
            }

            let mut builder = self
                .client
                .request(request.method, request.url)
                .headers(headers);
            if !request.body.is_empty() {
                builder = builder.body(request.body);
            }
            let response = builder.send().await?;

            let status = response.status();
            let headers = response.headers().clone();
            let body = response
                .bytes_stream()
                .map_err(std::io::Error::other)
                .boxed();

            Ok(UpstreamResponse {
                status,
                headers,
                body,
            })
        })
    }
}

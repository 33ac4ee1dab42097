use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{HeaderMap, HeaderValue, Method, Uri, header},
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{Instrument, info, info_span, warn};
use url::Url;
use uuid::Uuid;

use crate::config::UpstreamErrorPolicy;
use crate::constants::{
    CONVERSATION_PATH, PUID_COOKIE, SEC_CH_UA, SEC_CH_UA_PLATFORM,
    TRACKING_COOKIE, USER_AGENT,
};
use crate::error::ProxyError;
use crate::transforms::{augment_conversation, relay_body, upstream_url};
use crate::transport::OutboundRequest;
use crate::{AppState, parse_cookie};

/// `ANY /api/{*path}`: forward to the upstream backend and relay the answer.
/// Bodies over the router's `DefaultBodyLimit` are rejected with 413 before
/// this handler runs.
pub async fn proxy(
    State(state): State<Arc<AppState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path = uri.path().strip_prefix("/api").unwrap_or(uri.path()).to_string();
    let span = info_span!("proxy", request_id = %Uuid::new_v4(), %method, %path);

    async move {
        match handle(&state, method, &path, uri.query(), &headers, body).await {
            Ok(response) => response,
            Err(e) => {
                warn!("Request failed: {e}");
                e.into_response()
            }
        }
    }
    .instrument(span)
    .await
}

async fn handle(
    state: &AppState,
    method: Method,
    path: &str,
    query: Option<&str>,
    inbound: &HeaderMap,
    body: Bytes,
) -> Result<Response, ProxyError> {
    let target = upstream_url(&state.upstream, path, query);
    let url =
        Url::parse(&target).map_err(|e| ProxyError::RequestBuild(format!("{target}: {e}")))?;

    let is_conversation = path == CONVERSATION_PATH;
    let body = if is_conversation {
        augment_conversation(&body, state.token_provider.as_ref()).await?
    } else {
        body
    };

    let puid = state.session.get().await;
    let headers = outbound_headers(
        &state.upstream.host,
        inbound,
        puid.as_deref(),
        state.timeout,
    )?;

    let request = OutboundRequest {
        method,
        url,
        headers,
        body,
    };
    relay(state, request, is_conversation).await
}

fn header_value(value: &str) -> Result<HeaderValue, ProxyError> {
    HeaderValue::from_str(value)
        .map_err(|e| ProxyError::RequestBuild(format!("invalid header value {value:?}: {e}")))
}

/// The inbound request's own `_puid` cookie, if it carries one
fn inbound_puid(inbound: &HeaderMap) -> Option<String> {
    inbound
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find_map(|v| parse_cookie(v, PUID_COOKIE))
}

/// Browser-shaped header set for the upstream request.
///
/// `Authorization` comes from `X-Authorization`, falling back to the inbound
/// `Authorization`. The `_puid` cookie comes from the inbound request when
/// present, otherwise from the shared session slot. `Keep-Alive` advertises
/// the transport timeout.
pub fn outbound_headers(
    host: &str,
    inbound: &HeaderMap,
    shared_puid: Option<&str>,
    timeout: Duration,
) -> Result<HeaderMap, ProxyError> {
    let mut headers = HeaderMap::new();
    headers.insert(header::HOST, header_value(host)?);
    headers.insert(header::ORIGIN, header_value(&format!("https://{host}/chat"))?);
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(
        "keep-alive",
        header_value(&format!("timeout={}", timeout.as_secs()))?,
    );
    headers.insert("sec-ch-ua", HeaderValue::from_static(SEC_CH_UA));
    headers.insert("sec-ch-ua-mobile", HeaderValue::from_static("?0"));
    headers.insert("sec-ch-ua-platform", HeaderValue::from_static(SEC_CH_UA_PLATFORM));
    headers.insert("sec-fetch-dest", HeaderValue::from_static("empty"));
    headers.insert("sec-fetch-mode", HeaderValue::from_static("cors"));
    headers.insert("sec-fetch-site", HeaderValue::from_static("same-origin"));
    headers.insert("sec-gpc", HeaderValue::from_static("1"));
    headers.insert(header::USER_AGENT, HeaderValue::from_static(USER_AGENT));

    if let Some(auth) = inbound
        .get("x-authorization")
        .or_else(|| inbound.get(header::AUTHORIZATION))
    {
        headers.insert(header::AUTHORIZATION, auth.clone());
    }

    if let Some(puid) = inbound_puid(inbound).or_else(|| shared_puid.map(str::to_string)) {
        headers.insert(header::COOKIE, header_value(&format!("{PUID_COOKIE}={puid};"))?);
    }

    Ok(headers)
}

/// Send `request` upstream and stream the answer back.
///
/// Status and headers are mirrored, minus `content-encoding`. Conversation
/// responses are always labelled as an event stream. Error statuses follow
/// the configured [`UpstreamErrorPolicy`].
pub async fn relay(
    state: &AppState,
    request: OutboundRequest,
    is_conversation: bool,
) -> Result<Response, ProxyError> {
    state.cookie_jar.remove(&request.url, TRACKING_COOKIE);

    let upstream = state.transport.send(request).await?;
    let status = upstream.status;

    if status.as_u16() >= 300 && state.upstream_errors == UpstreamErrorPolicy::LogOnly {
        let body = match upstream.bytes().await {
            Ok(b) => String::from_utf8_lossy(&b).into_owned(),
            Err(e) => format!("<failed to read body: {e}>"),
        };
        warn!("Upstream returned {status}: {body}");
        return Ok(status.into_response());
    }
    info!("Upstream returned {status}");

    let mut response = Response::new(Body::from_stream(relay_body(upstream.body)));
    *response.status_mut() = status;

    let headers = response.headers_mut();
    for (name, value) in upstream.headers.iter() {
        if name == header::CONTENT_ENCODING {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }
    if is_conversation {
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/event-stream; charset=utf-8"),
        );
    }

    Ok(response)
}

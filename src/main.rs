mod arkose;
mod auth;
mod config;
mod constants;
mod error;
mod routes;
#[cfg(test)]
mod testing;
mod transforms;
mod transport;

use arkose::{ArkoseClient, TokenProvider};
use auth::{OpenAiAuthenticator, PuidRefresher, RefresherStatus, SessionCredential};
use axum::{
    Router,
    extract::{DefaultBodyLimit, State},
    http::{HeaderName, Method, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{any, get, patch},
};
use clap::Parser;
use config::{Config, IdentityCredentials, Upstream, UpstreamErrorPolicy};
use std::sync::Arc;
use std::time::Duration;
use subtle::ConstantTimeEq;
use tokio::sync::{RwLock, watch};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use transport::{CookieJar, ReqwestTransport, Transport};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const GIT_HASH: &str = env!("GIT_HASH");
pub const BUILD_TIME: &str = env!("BUILD_TIME");

/// Everything shared by request handlers and the session refresher.
///
/// One transport, one cookie jar and one session slot serve all clients:
/// the proxy fronts a single upstream session.
pub struct AppState {
    pub upstream: Upstream,
    pub transport: Arc<dyn Transport>,
    pub cookie_jar: Arc<CookieJar>,
    pub session: Arc<SessionCredential>,
    pub token_provider: Arc<dyn TokenProvider>,
    pub admin_secret: RwLock<String>,
    /// Read by the refresher at the start of every cycle
    pub identity: Arc<RwLock<Option<IdentityCredentials>>>,
    pub upstream_errors: UpstreamErrorPolicy,
    /// Overall transport timeout, advertised upstream in `Keep-Alive`
    pub timeout: Duration,
    pub refresher_status: watch::Receiver<RefresherStatus>,
}

#[derive(Parser)]
#[command(name = "chatgpt-proxy")]
#[command(about = "Reverse proxy for the ChatGPT backend API")]
struct Args {
    /// Host to bind to
    #[arg(short = 'H', long, env = "HOST")]
    host: Option<String>,

    /// Port to bind to
    #[arg(short, long, env = "PORT")]
    port: Option<u16>,
}

/// Parse a named cookie from the Cookie header
pub fn parse_cookie(header: &str, name: &str) -> Option<String> {
    header.split(';').find_map(|cookie| {
        let (key, value) = cookie.trim().split_once('=')?;
        if key.trim() == name {
            Some(value.trim().to_string())
        } else {
            None
        }
    })
}

/// Admin routes require the shared secret verbatim in `Authorization`.
/// An empty secret locks the admin routes.
async fn admin_auth_middleware(
    State(state): State<Arc<AppState>>,
    request: axum::extract::Request,
    next: Next,
) -> Response {
    let provided = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    let authorized = {
        let secret = state.admin_secret.read().await;
        // Constant-time comparison to prevent timing attacks
        !secret.is_empty() && bool::from(provided.as_bytes().ct_eq(secret.as_bytes()))
    };

    if authorized {
        next.run(request).await
    } else {
        (StatusCode::UNAUTHORIZED, "Unauthorized").into_response()
    }
}

fn cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::HEAD,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::ACCEPT,
            header::ORIGIN,
            header::CONTENT_LENGTH,
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-authorization"),
            HeaderName::from_static("x-requested-with"),
            header::ACCESS_CONTROL_REQUEST_METHOD,
            header::ACCESS_CONTROL_REQUEST_HEADERS,
            header::CONTENT_DISPOSITION,
        ])
        .expose_headers([
            header::CONTENT_LENGTH,
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            header::CONTENT_TYPE,
        ])
        .allow_credentials(true)
}

pub fn app(state: Arc<AppState>) -> Router {
    let admin_routes = Router::new()
        .route("/puid", patch(routes::admin::update_puid))
        .route("/password", patch(routes::admin::update_password))
        .route("/openai", patch(routes::admin::update_openai))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            admin_auth_middleware,
        ));

    Router::new()
        .route("/ping", get(routes::health::ping))
        .route("/health", get(routes::health::health))
        .route("/version", get(routes::health::version))
        .route("/api/{*path}", any(routes::proxy::proxy))
        .nest("/admin", admin_routes)
        .layer(DefaultBodyLimit::max(constants::MAX_REQUEST_BODY_BYTES))
        .layer(cors())
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = Config::from_env();
    let proxy = config.http_proxy.as_deref();

    let cookie_jar = Arc::new(CookieJar::new());
    let transport: Arc<dyn Transport> = Arc::new(
        ReqwestTransport::new(cookie_jar.clone(), proxy, config.timeout)
            .expect("Failed to create HTTP client"),
    );
    if let Some(proxy) = proxy {
        info!("Proxy set: {proxy}");
    }

    let token_provider = Arc::new(ArkoseClient::new(
        transport.clone(),
        config.arkose_url.clone(),
        config.arkose_retries,
    ));
    let session = Arc::new(SessionCredential::new(config.puid.clone()));
    let identity = Arc::new(RwLock::new(config.identity.clone()));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (refresher_status, refresher) = if config.identity.is_some() {
        let authenticator = OpenAiAuthenticator::new(&config.upstream, proxy, config.timeout)
            .expect("Failed to create identity client");
        let (refresher, status) = PuidRefresher::new(
            Arc::new(authenticator),
            identity.clone(),
            session.clone(),
            config.refresh_interval,
        );
        (status, Some(refresher.spawn(shutdown_rx)))
    } else {
        info!("OPENAI_EMAIL/OPENAI_PASSWORD not set, session refresher disabled");
        (watch::channel(RefresherStatus::Disabled).1, None)
    };

    if config.admin_secret.is_empty() {
        warn!("PASSWORD not set, admin endpoints are locked");
    }

    let addr = config.bind_addr(args.host.as_deref(), args.port);
    let state = Arc::new(AppState {
        upstream: config.upstream,
        transport,
        cookie_jar,
        session,
        token_provider,
        admin_secret: RwLock::new(config.admin_secret),
        identity,
        upstream_errors: config.upstream_errors,
        timeout: config.timeout,
        refresher_status,
    });

    info!(
        "Starting chatgpt-proxy v{}-{} (built {})",
        VERSION, GIT_HASH, BUILD_TIME
    );
    info!("Upstream: {}://{}", state.upstream.scheme, state.upstream.host);
    info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind listener");
    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    shutdown_tx.send_replace(true);
    if let Some(handle) = refresher {
        let _ = handle.await;
    }
}

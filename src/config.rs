use std::env;
use std::time::Duration;

use dotenvy::dotenv;

use crate::constants::{
    ARKOSE_PUBLIC_KEY, DEFAULT_TIMEOUT_SECS, DEFAULT_UPSTREAM_HOST, PUID_REFRESH_INTERVAL_SECS,
    arkose_token_url,
};

/// What the relay does with the body of a non-success upstream response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamErrorPolicy {
    /// Consume and log the body server-side, send only the status (default)
    LogOnly,
    /// Mirror headers and stream the body to the client like a success
    Forward,
}

impl UpstreamErrorPolicy {
    fn parse(value: Option<&str>) -> Self {
        match value.map(str::to_lowercase).as_deref() {
            Some("forward") => Self::Forward,
            _ => Self::LogOnly,
        }
    }
}

/// Credential pair used to log into the identity provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityCredentials {
    pub email: String,
    pub password: String,
}

/// Scheme and host of the proxied backend
#[derive(Debug, Clone)]
pub struct Upstream {
    pub scheme: String,
    pub host: String,
}

impl Default for Upstream {
    fn default() -> Self {
        Self {
            scheme: "https".to_string(),
            host: DEFAULT_UPSTREAM_HOST.to_string(),
        }
    }
}

pub struct Config {
    pub host: String,
    pub port: u16,
    pub upstream: Upstream,
    /// Egress proxy for the transport and the identity provider
    pub http_proxy: Option<String>,
    pub identity: Option<IdentityCredentials>,
    pub admin_secret: String,
    /// Initial session credential, before the refresher publishes one
    pub puid: Option<String>,
    pub upstream_errors: UpstreamErrorPolicy,
    pub arkose_url: String,
    pub arkose_retries: u32,
    pub timeout: Duration,
    pub refresh_interval: Duration,
}

fn non_empty(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let host = env::var("HOST").unwrap_or_default();
        let port = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(9090);

        let upstream = Upstream {
            scheme: non_empty("OPENAI_SCHEME").unwrap_or_else(|| "https".to_string()),
            host: non_empty("OPENAI_HOST").unwrap_or_else(|| DEFAULT_UPSTREAM_HOST.to_string()),
        };

        let identity = match (non_empty("OPENAI_EMAIL"), non_empty("OPENAI_PASSWORD")) {
            (Some(email), Some(password)) => Some(IdentityCredentials { email, password }),
            _ => None,
        };

        let timeout = env::var("PROXY_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        Self {
            host,
            port,
            upstream,
            http_proxy: non_empty("http_proxy"),
            identity,
            admin_secret: env::var("PASSWORD").unwrap_or_default(),
            puid: non_empty("PUID"),
            upstream_errors: UpstreamErrorPolicy::parse(
                env::var("PROXY_UPSTREAM_ERRORS").ok().as_deref(),
            ),
            arkose_url: non_empty("PROXY_ARKOSE_URL")
                .unwrap_or_else(|| arkose_token_url(ARKOSE_PUBLIC_KEY)),
            arkose_retries: env::var("PROXY_ARKOSE_RETRIES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
            timeout: Duration::from_secs(timeout),
            refresh_interval: Duration::from_secs(PUID_REFRESH_INTERVAL_SECS),
        }
    }

    /// Address to bind; an empty host listens on all interfaces
    pub fn bind_addr(&self, host: Option<&str>, port: Option<u16>) -> String {
        let host = host.unwrap_or(&self.host);
        let host = if host.is_empty() { "0.0.0.0" } else { host };
        format!("{}:{}", host, port.unwrap_or(self.port))
    }
}

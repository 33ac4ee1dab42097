use futures_util::future::BoxFuture;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use crate::config::{IdentityCredentials, Upstream};
use crate::constants::{
    AUTH_AUDIENCE, AUTH_CLIENT_ID, AUTH_REALM, AUTH_SCOPE, AUTH_TOKEN_URL, PUID_COOKIE, USER_AGENT,
};

const PASSWORD_REALM_GRANT: &str = "http://auth0.com/oauth/grant-type/password-realm";

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid proxy URL: {0}")]
    InvalidProxy(String),

    #[error("{stage} failed ({status}): {body}")]
    Rejected {
        stage: &'static str,
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("_puid cookie missing from response")]
    MissingPuid,
}

/// Logs into the identity provider and derives the session credential
pub trait Authenticator: Send + Sync {
    fn authenticate<'a>(
        &'a self,
        credentials: &'a IdentityCredentials,
    ) -> BoxFuture<'a, Result<String, AuthError>>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Password-realm login followed by a models listing whose response sets the
/// `_puid` cookie.
pub struct OpenAiAuthenticator {
    client: Client,
    token_url: String,
    models_url: String,
}

impl OpenAiAuthenticator {
    pub fn new(
        upstream: &Upstream,
        proxy: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, AuthError> {
        let mut builder = Client::builder().timeout(timeout);
        if let Some(proxy) = proxy {
            let proxy = reqwest::Proxy::all(proxy)
                .map_err(|e| AuthError::InvalidProxy(format!("{proxy}: {e}")))?;
            builder = builder.proxy(proxy);
        }

        Ok(Self::with_urls(
            builder.build()?,
            AUTH_TOKEN_URL,
            format!(
                "{}://{}/backend-api/models",
                upstream.scheme, upstream.host
            ),
        ))
    }

    pub fn with_urls(
        client: Client,
        token_url: impl Into<String>,
        models_url: impl Into<String>,
    ) -> Self {
        Self {
            client,
            token_url: token_url.into(),
            models_url: models_url.into(),
        }
    }

    async fn access_token(&self, credentials: &IdentityCredentials) -> Result<String, AuthError> {
        let body = serde_json::json!({
            "grant_type": PASSWORD_REALM_GRANT,
            "username": credentials.email,
            "password": credentials.password,
            "client_id": AUTH_CLIENT_ID,
            "audience": AUTH_AUDIENCE,
            "realm": AUTH_REALM,
            "scope": AUTH_SCOPE,
        });

        let response = self
            .client
            .post(&self.token_url)
            .header("user-agent", USER_AGENT)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Rejected {
                stage: "Login",
                status,
                body,
            });
        }

        Ok(response.json::<TokenResponse>().await?.access_token)
    }

    async fn fetch_puid(&self, access_token: &str) -> Result<String, AuthError> {
        let response = self
            .client
            .get(&self.models_url)
            .header("authorization", format!("Bearer {access_token}"))
            .header("user-agent", USER_AGENT)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Rejected {
                stage: "Session lookup",
                status,
                body,
            });
        }

        response
            .cookies()
            .find(|c| c.name() == PUID_COOKIE)
            .map(|c| c.value().to_string())
            .filter(|v| !v.is_empty())
            .ok_or(AuthError::MissingPuid)
    }
}

impl Authenticator for OpenAiAuthenticator {
    fn authenticate<'a>(
        &'a self,
        credentials: &'a IdentityCredentials,
    ) -> BoxFuture<'a, Result<String, AuthError>> {
        Box::pin(async move {
            let access_token = self.access_token(credentials).await?;
            self.fetch_puid(&access_token).await
        })
    }
}

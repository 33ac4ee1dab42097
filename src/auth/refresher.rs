//! Background refresh of the shared `_puid` session credential.
//!
//! One task per process. It logs in, publishes the derived credential, then
//! sleeps for the refresh interval. A failed login halts the task for good
//! (the last published credential stays in place) and is reported through
//! the status channel. Shutdown is signalled through a `watch` channel bound
//! to the server lifetime.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, watch};
use tokio::task::JoinHandle;
use tracing::{error, info};

use super::authenticator::Authenticator;
use super::session::SessionCredential;
use crate::config::IdentityCredentials;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RefresherStatus {
    /// No identity credentials configured at startup
    Disabled,
    Starting,
    Active { refreshed_at: String },
    /// Terminal: login failed, credential frozen until restart
    Halted { reason: String },
    /// Terminal: server shut down
    Stopped,
}

pub struct PuidRefresher {
    authenticator: Arc<dyn Authenticator>,
    credentials: Arc<RwLock<Option<IdentityCredentials>>>,
    session: Arc<SessionCredential>,
    interval: Duration,
    status: watch::Sender<RefresherStatus>,
}

impl PuidRefresher {
    pub fn new(
        authenticator: Arc<dyn Authenticator>,
        credentials: Arc<RwLock<Option<IdentityCredentials>>>,
        session: Arc<SessionCredential>,
        interval: Duration,
    ) -> (Self, watch::Receiver<RefresherStatus>) {
        let (status, rx) = watch::channel(RefresherStatus::Starting);
        (
            Self {
                authenticator,
                credentials,
                session,
                interval,
                status,
            },
            rx,
        )
    }

    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    fn halt(&self, reason: String) {
        error!("Session refresher halted: {reason}");
        self.status.send_replace(RefresherStatus::Halted { reason });
    }

    fn stop(&self) {
        info!("Session refresher stopped");
        self.status.send_replace(RefresherStatus::Stopped);
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                return self.stop();
            }

            // Re-read every cycle so credentials rotated through the admin
            // endpoint are picked up.
            let Some(credentials) = self.credentials.read().await.clone() else {
                return self.halt("no identity credentials configured".to_string());
            };

            let result = tokio::select! {
                result = self.authenticator.authenticate(&credentials) => result,
                _ = shutdown.changed() => return self.stop(),
            };

            match result {
                Ok(puid) => {
                    self.session.set(puid).await;
                    info!("Session credential refreshed");
                    self.status.send_replace(RefresherStatus::Active {
                        refreshed_at: chrono::Utc::now().to_rfc3339(),
                    });
                }
                Err(e) => return self.halt(e.to_string()),
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = shutdown.changed() => return self.stop(),
            }
        }
    }
}

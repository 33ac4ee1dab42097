use tokio::sync::RwLock;

/// Process-wide `_puid` slot shared by every request.
///
/// Written by the credential refresher and the admin endpoint, read by the
/// relay for each outbound request. Last writer wins.
#[derive(Debug, Default)]
pub struct SessionCredential {
    value: RwLock<Option<String>>,
}

impl SessionCredential {
    pub fn new(initial: Option<String>) -> Self {
        Self {
            value: RwLock::new(initial.filter(|v| !v.is_empty())),
        }
    }

    pub async fn get(&self) -> Option<String> {
        self.value.read().await.clone()
    }

    /// Publish a new value; an empty string clears the slot
    pub async fn set(&self, value: impl Into<String>) {
        let value = value.into();
        *self.value.write().await = if value.is_empty() { None } else { Some(value) };
    }
}

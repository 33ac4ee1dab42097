//! Create-conversation request augmentation.
//!
//! The client body is decoded into [`ConversationCreateRequest`], normalized,
//! given an arkose token when the model needs one, and re-encoded. The
//! re-encoded struct replaces the client's bytes, so fields outside the
//! schema are dropped.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::arkose::TokenProvider;
use crate::constants::{
    ARKOSE_MODEL_PREFIX, ARKOSE_PUBLIC_KEY, ARKOSE_SITE, ARKOSE_USER_AGENT, DEFAULT_ROLE,
};
use crate::error::ProxyError;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationCreateRequest {
    pub action: String,
    pub messages: Vec<Message>,
    pub model: String,
    pub parent_message_id: String,
    pub conversation_id: Option<String>,
    pub plugin_ids: Vec<String>,
    pub timezone_offset_min: i64,
    pub arkose_token: String,
    pub history_and_training_disabled: bool,
    pub auto_continue: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Message {
    pub author: Author,
    pub content: Content,
    pub id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Author {
    pub role: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Content {
    pub content_type: String,
    pub parts: Vec<String>,
}

impl ConversationCreateRequest {
    /// Empty conversation id means a new conversation; an empty role on the
    /// first message defaults to `user`.
    pub fn normalize(&mut self) {
        if self.conversation_id.as_deref() == Some("") {
            self.conversation_id = None;
        }
        if let Some(first) = self.messages.first_mut()
            && first.author.role.is_empty()
        {
            first.author.role = DEFAULT_ROLE.to_string();
        }
    }

    pub fn needs_arkose_token(&self) -> bool {
        self.model.starts_with(ARKOSE_MODEL_PREFIX)
    }
}

/// Decode, normalize and re-encode a create-conversation body, fetching an
/// arkose token first when the model requires one.
pub async fn augment_conversation(
    body: &[u8],
    tokens: &dyn TokenProvider,
) -> Result<Bytes, ProxyError> {
    let mut request: ConversationCreateRequest = serde_json::from_slice(body)?;
    request.normalize();

    if request.needs_arkose_token() {
        request.arkose_token = tokens
            .acquire(ARKOSE_SITE, ARKOSE_PUBLIC_KEY, ARKOSE_USER_AGENT)
            .await?;
        info!("Arkose token acquired for model {}", request.model);
    }

    Ok(Bytes::from(serde_json::to_vec(&request)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockTokenProvider;
    use serde_json::{Value, json};

    fn body(value: Value) -> Vec<u8> {
        serde_json::to_vec(&value).unwrap()
    }

    fn sample(model: &str) -> Value {
        json!({
            "action": "next",
            "messages": [
                {"author": {"role": ""}, "content": {"content_type": "text", "parts": ["hi"]}, "id": "m1"},
                {"author": {"role": ""}, "content": {"content_type": "text", "parts": ["again"]}, "id": "m2"}
            ],
            "model": model,
            "parent_message_id": "p1",
            "conversation_id": "",
            "timezone_offset_min": -120
        })
    }

    #[tokio::test]
    async fn test_defaults_first_role_only() {
        let tokens = MockTokenProvider::ok("unused");
        let out = augment_conversation(&body(sample("text-davinci-002-render-sha")), &tokens)
            .await
            .unwrap();
        let out: Value = serde_json::from_slice(&out).unwrap();

        assert_eq!(out["messages"][0]["author"]["role"], "user");
        assert_eq!(out["messages"][1]["author"]["role"], "");
        assert_eq!(out["conversation_id"], Value::Null);
        assert_eq!(out["timezone_offset_min"], -120);
    }

    #[tokio::test]
    async fn test_existing_role_untouched() {
        let mut value = sample("text-davinci-002-render-sha");
        value["messages"][0]["author"]["role"] = json!("system");
        let tokens = MockTokenProvider::ok("unused");
        let out = augment_conversation(&body(value), &tokens).await.unwrap();
        let out: ConversationCreateRequest = serde_json::from_slice(&out).unwrap();
        assert_eq!(out.messages[0].author.role, "system");
    }

    #[tokio::test]
    async fn test_non_gpt4_skips_token_provider() {
        let mut value = sample("text-davinci-002-render-sha");
        value["arkose_token"] = json!("client-supplied");
        let tokens = MockTokenProvider::ok("T");
        let out = augment_conversation(&body(value), &tokens).await.unwrap();
        let out: ConversationCreateRequest = serde_json::from_slice(&out).unwrap();

        assert_eq!(tokens.calls(), 0);
        assert_eq!(out.arkose_token, "client-supplied");
    }

    #[tokio::test]
    async fn test_gpt4_injects_token() {
        let tokens = MockTokenProvider::ok("T");
        let out = augment_conversation(&body(sample("gpt-4-browsing")), &tokens)
            .await
            .unwrap();
        let out: ConversationCreateRequest = serde_json::from_slice(&out).unwrap();

        assert_eq!(tokens.calls(), 1);
        assert_eq!(out.arkose_token, "T");
    }

    #[tokio::test]
    async fn test_token_failure_is_terminal() {
        let tokens = MockTokenProvider::failing();
        let err = augment_conversation(&body(sample("gpt-4")), &tokens)
            .await
            .unwrap_err();
        assert!(matches!(err, ProxyError::ArkoseToken(_)));
    }

    #[tokio::test]
    async fn test_malformed_json_rejected() {
        let tokens = MockTokenProvider::ok("T");
        let err = augment_conversation(b"{\"model\": ", &tokens)
            .await
            .unwrap_err();
        assert!(matches!(err, ProxyError::InvalidBody(_)));
        assert_eq!(tokens.calls(), 0);
    }

    #[tokio::test]
    async fn test_unknown_fields_dropped() {
        let mut value = sample("text-davinci-002-render-sha");
        value["suggestions"] = json!(["x"]);
        let tokens = MockTokenProvider::ok("T");
        let out = augment_conversation(&body(value), &tokens).await.unwrap();
        let out: Value = serde_json::from_slice(&out).unwrap();
        assert!(out.get("suggestions").is_none());
        assert_eq!(out["plugin_ids"], json!([]));
    }

    #[test]
    fn test_normalize_keeps_real_conversation_id() {
        let mut request = ConversationCreateRequest {
            conversation_id: Some("c-1".into()),
            ..Default::default()
        };
        request.normalize();
        assert_eq!(request.conversation_id.as_deref(), Some("c-1"));
        assert!(request.messages.is_empty());
    }
}

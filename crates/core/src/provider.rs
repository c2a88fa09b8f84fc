//! Provider trait: the abstraction over LLM backends.
//!
//! A Provider knows how to send a prompt to a language model and get a
//! complete response back. Implementations: OpenAI-compatible endpoints
//! (Groq, OpenAI, Ollama, ...) and scripted test doubles.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::message::Message;

/// One stateless completion call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequest {
    pub model: String,
    /// System prompt (with any retrieved context) followed by the query
    pub messages: Vec<Message>,
    #[serde(default)]
    pub temperature: f32,
    /// Upper bound on generated tokens, when the endpoint supports one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse {
    pub message: Message,
    /// The model that answered, as reported by the backend
    pub model: String,
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// A language-model backend.
///
/// The answer generator owns one of these and never learns which backend it is.
#[async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> &str;

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError>;

    /// Whether the backend answers at all. Defaults to `true` for backends
    /// without a cheap probe.
    async fn health_check(&self) -> Result<bool, ProviderError> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl Provider for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
            let last = request
                .messages
                .last()
                .map(|m| m.content.clone())
                .unwrap_or_default();
            Ok(ProviderResponse {
                message: Message::assistant(last),
                model: request.model,
                usage: None,
            })
        }
    }

    #[tokio::test]
    async fn default_health_check_is_ok() {
        assert!(Echo.health_check().await.unwrap());
    }

    #[tokio::test]
    async fn complete_returns_assistant_message() {
        let response = Echo
            .complete(ProviderRequest {
                model: "m".into(),
                messages: vec![Message::user("ping")],
                temperature: 0.0,
                max_tokens: None,
            })
            .await
            .unwrap();
        assert_eq!(response.message.content, "ping");
        assert_eq!(response.model, "m");
    }

    #[test]
    fn request_omits_absent_max_tokens() {
        let req = ProviderRequest {
            model: "m".into(),
            messages: vec![],
            temperature: 0.0,
            max_tokens: None,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert!(json.get("max_tokens").is_none());
    }
}
